//! Call lifecycle.
//!
//! ```text
//! active ──submit_triage──► active (priority set)
//! active ──dispatch──► dispatched ──mark_in_progress──► in_progress ──close──► closed
//! active ──cancel──► cancelled
//! create_call(General) ──► closed
//! ```
//!
//! `closed` and `cancelled` are terminal. Every change goes through a single
//! compare-and-set in the store and appends an audit entry in the same
//! transaction; a rejected change writes nothing.

use crate::caller;
use crate::error::{IntakeError, StoreError};
use crate::models::{
    AuditAction, AuditEntry, Call, CallId, CallStats, CallStatus, Caller, CallerId, CallerInput,
    NewCall, Operator, TriageRecord,
};
use crate::notify::{AlertContext, NotificationSender};
use crate::store::{RecordStore, Transition, TransitionOutcome, TriageOutcome};
use crate::triage::{Evaluation, TriageAnswers};
use category_registry::EmergencyCategory;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const MAX_NUMBER_ATTEMPTS: u32 = 50;
const GENERAL_CLOSURE_NOTE: &str = "General call filed without triage";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriageSubmission {
    pub call: Call,
    pub evaluation: Evaluation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Dispatched {
        call: Call,
        notification_queued: bool,
    },
    /// The call had already left `active` through an earlier dispatch.
    AlreadyDispatched { call: Call },
}

impl DispatchOutcome {
    pub fn call(&self) -> &Call {
        match self {
            Self::Dispatched { call, .. } | Self::AlreadyDispatched { call } => call,
        }
    }
}

pub struct CallController {
    store: Arc<dyn RecordStore>,
    notifications: Arc<dyn NotificationSender>,
    operator: Operator,
    number_prefix: String,
}

impl CallController {
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifications: Arc<dyn NotificationSender>,
        operator: Operator,
        number_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifications,
            operator,
            number_prefix: number_prefix.into(),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn resolve_caller(
        &self,
        document: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<CallerId>, IntakeError> {
        caller::resolve_caller(self.store.as_ref(), document, phone)
            .inspect_err(|err| log_failure("resolve_caller", None, err))
    }

    pub fn find_or_create_caller(&self, input: &CallerInput) -> Result<Caller, IntakeError> {
        caller::find_or_create(self.store.as_ref(), input, &self.operator.username)
            .inspect_err(|err| log_failure("find_or_create_caller", None, err))
    }

    pub fn create_call(
        &self,
        caller_id: Option<CallerId>,
        category: EmergencyCategory,
        description: &str,
        address: &str,
    ) -> Result<Call, IntakeError> {
        self.create_call_inner(caller_id, category, description, address)
            .inspect_err(|err| log_failure("create_call", None, err))
    }

    fn create_call_inner(
        &self,
        caller_id: Option<CallerId>,
        category: EmergencyCategory,
        description: &str,
        address: &str,
    ) -> Result<Call, IntakeError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(IntakeError::InvalidCall("address is required".into()));
        }
        if let Some(id) = caller_id {
            if self.store.get_caller(id)?.is_none() {
                return Err(IntakeError::CallerNotFound(id));
            }
        }

        let now = Utc::now();
        let general = !category.requires_triage();
        let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
        let audit = AuditEntry::new(
            AuditAction::CallCreated,
            None,
            &self.operator.username,
            if general {
                format!("{category} call filed and closed")
            } else {
                format!("{category} call opened")
            },
        )
        .with_details(serde_json::json!({ "category": category, "caller_id": caller_id }));

        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            let number = if attempt == 1 {
                format!("{}{stamp}", self.number_prefix)
            } else {
                format!("{}{stamp}-{attempt}", self.number_prefix)
            };
            let new_call = NewCall {
                number,
                caller_id,
                category,
                operator: self.operator.username.clone(),
                address: address.to_string(),
                description: description.trim().to_string(),
                status: if general {
                    CallStatus::Closed
                } else {
                    CallStatus::Active
                },
                created_at: now,
                closed_at: general.then_some(now),
                closure_notes: general.then(|| GENERAL_CLOSURE_NOTE.to_string()),
            };
            match self.store.create_call(&new_call, &audit) {
                Ok(call) => {
                    info!(call_id = call.id, number = %call.number, %category, "call created");
                    return Ok(call);
                }
                Err(StoreError::Conflict(_)) => {
                    debug!(number = %new_call.number, "call number taken, renumbering");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(IntakeError::StoreUnavailable(format!(
            "no free call number after {MAX_NUMBER_ATTEMPTS} attempts"
        )))
    }

    pub fn submit_triage(
        &self,
        call_id: CallId,
        answers: TriageAnswers,
    ) -> Result<TriageSubmission, IntakeError> {
        self.submit_triage_inner(call_id, answers)
            .inspect_err(|err| log_failure("submit_triage", Some(call_id), err))
    }

    fn submit_triage_inner(
        &self,
        call_id: CallId,
        answers: TriageAnswers,
    ) -> Result<TriageSubmission, IntakeError> {
        let call = self.call(call_id)?;
        if !call.category.requires_triage() || call.status != CallStatus::Active {
            return Err(IntakeError::InvalidState {
                call_id,
                status: call.status,
                action: "submit triage",
            });
        }
        if answers.category() != call.category {
            return Err(IntakeError::CategoryMismatch {
                call_id,
                call: call.category,
                answers: answers.category(),
            });
        }

        let evaluation = answers.evaluate()?;
        let record = TriageRecord {
            id: None,
            call_id,
            answers,
            evaluation,
            created_at: Utc::now(),
        };
        let audit = AuditEntry::new(
            AuditAction::TriageSubmitted,
            Some(call_id),
            &self.operator.username,
            format!("triage priority {} ({})", evaluation.priority, evaluation.priority.label()),
        )
        .with_details(serde_json::json!({
            "priority": evaluation.priority,
            "recommend_dispatch": evaluation.recommend_dispatch,
        }));

        match self.store.insert_triage(&record, &audit)? {
            TriageOutcome::Inserted(call) => {
                info!(
                    call_id,
                    priority = evaluation.priority.value(),
                    recommend_dispatch = evaluation.recommend_dispatch,
                    "triage submitted"
                );
                Ok(TriageSubmission { call, evaluation })
            }
            TriageOutcome::AlreadyTriaged => Err(IntakeError::DuplicateTriage { call_id }),
            TriageOutcome::WrongStatus(status) => Err(IntakeError::InvalidState {
                call_id,
                status,
                action: "submit triage",
            }),
            TriageOutcome::CallMissing => Err(IntakeError::CallNotFound(call_id)),
        }
    }

    pub fn dispatch(&self, call_id: CallId) -> Result<DispatchOutcome, IntakeError> {
        self.dispatch_inner(call_id, None)
            .inspect_err(|err| log_failure("dispatch", Some(call_id), err))
    }

    /// Dispatch recording the responding unit.
    pub fn dispatch_unit(&self, call_id: CallId, unit: &str) -> Result<DispatchOutcome, IntakeError> {
        let unit = unit.trim();
        let unit = (!unit.is_empty()).then(|| unit.to_string());
        self.dispatch_inner(call_id, unit)
            .inspect_err(|err| log_failure("dispatch_unit", Some(call_id), err))
    }

    fn dispatch_inner(
        &self,
        call_id: CallId,
        unit: Option<String>,
    ) -> Result<DispatchOutcome, IntakeError> {
        let mut transition = Transition::new(CallStatus::Dispatched, &[CallStatus::Active]);
        transition.requires_triage = true;
        transition.unit = unit.clone();
        let audit = AuditEntry::new(
            AuditAction::Dispatched,
            Some(call_id),
            &self.operator.username,
            match &unit {
                Some(unit) => format!("dispatched unit {unit}"),
                None => "dispatched".to_string(),
            },
        );

        match self.store.transition_call(call_id, &transition, &audit)? {
            TransitionOutcome::Applied(call) => {
                info!(call_id, "call dispatched");
                let notification_queued = self.queue_notification(&call);
                Ok(DispatchOutcome::Dispatched {
                    call,
                    notification_queued,
                })
            }
            TransitionOutcome::Rejected(CallStatus::Dispatched | CallStatus::InProgress) => {
                debug!(call_id, "dispatch repeated, nothing to do");
                Ok(DispatchOutcome::AlreadyDispatched {
                    call: self.call(call_id)?,
                })
            }
            TransitionOutcome::Rejected(status) => Err(IntakeError::InvalidState {
                call_id,
                status,
                action: "dispatch",
            }),
            TransitionOutcome::Untriaged => Err(IntakeError::InvalidState {
                call_id,
                status: CallStatus::Active,
                action: "dispatch without a triage",
            }),
            TransitionOutcome::Missing => Err(IntakeError::CallNotFound(call_id)),
        }
    }

    /// Takes the call's notification claim and submits the fan-out. The
    /// dispatch has already committed, so failures here are logged only.
    fn queue_notification(&self, call: &Call) -> bool {
        match self.store.claim_notification(call.id) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(err) => {
                error!(call_id = call.id, error = %err, "could not claim notification");
                return false;
            }
        }
        let context = match self.alert_context(call) {
            Ok(context) => context,
            Err(err) => {
                error!(call_id = call.id, error = %err, "could not build alert");
                return false;
            }
        };
        match self.notifications.submit(context) {
            Ok(()) => true,
            Err(err) => {
                warn!(call_id = call.id, error = %err, "notification not queued");
                false
            }
        }
    }

    fn alert_context(&self, call: &Call) -> Result<AlertContext, StoreError> {
        let caller = match call.caller_id {
            Some(id) => self.store.get_caller(id)?,
            None => None,
        };
        Ok(AlertContext::new(call, caller.as_ref()))
    }

    /// Re-submits the fan-out of a dispatched call. Targets that already
    /// received the alert are skipped by the notifier. A dispatched call whose
    /// claim was never taken gets it here.
    pub fn resend_notifications(&self, call_id: CallId) -> Result<(), IntakeError> {
        self.resend_inner(call_id)
            .inspect_err(|err| log_failure("resend_notifications", Some(call_id), err))
    }

    fn resend_inner(&self, call_id: CallId) -> Result<(), IntakeError> {
        let call = self.call(call_id)?;
        if !call.notification_sent {
            if !matches!(call.status, CallStatus::Dispatched | CallStatus::InProgress) {
                return Err(IntakeError::InvalidState {
                    call_id,
                    status: call.status,
                    action: "resend notifications before dispatch",
                });
            }
            if self.store.claim_notification(call_id)? {
                warn!(call_id, "notification claim taken late, alert was never queued");
            }
        }
        let context = self.alert_context(&call)?;
        self.notifications.submit(context)?;
        info!(call_id, "notifications re-queued");
        Ok(())
    }

    pub fn mark_in_progress(&self, call_id: CallId) -> Result<Call, IntakeError> {
        let transition = Transition::new(CallStatus::InProgress, &[CallStatus::Dispatched]);
        let audit = AuditEntry::new(
            AuditAction::InProgress,
            Some(call_id),
            &self.operator.username,
            "unit on scene",
        );
        self.apply(call_id, &transition, &audit, "mark in progress")
            .inspect_err(|err| log_failure("mark_in_progress", Some(call_id), err))
    }

    pub fn close_call(&self, call_id: CallId, notes: &str) -> Result<Call, IntakeError> {
        self.close_inner(call_id, notes)
            .inspect_err(|err| log_failure("close_call", Some(call_id), err))
    }

    fn close_inner(&self, call_id: CallId, notes: &str) -> Result<Call, IntakeError> {
        // Category is immutable; only the status needs the compare-and-set.
        let call = self.call(call_id)?;
        let allowed: &[CallStatus] = if call.category.requires_triage() {
            &[CallStatus::Dispatched, CallStatus::InProgress]
        } else {
            &[CallStatus::Active, CallStatus::Dispatched, CallStatus::InProgress]
        };
        let notes = notes.trim();
        let mut transition = Transition::new(CallStatus::Closed, allowed);
        transition.notes = (!notes.is_empty()).then(|| notes.to_string());
        let audit = AuditEntry::new(
            AuditAction::Closed,
            Some(call_id),
            &self.operator.username,
            "call closed",
        )
        .with_details(serde_json::json!({ "notes": notes }));
        self.apply(call_id, &transition, &audit, "close")
    }

    pub fn cancel_call(&self, call_id: CallId) -> Result<Call, IntakeError> {
        let transition = Transition::new(CallStatus::Cancelled, &[CallStatus::Active]);
        let audit = AuditEntry::new(
            AuditAction::Cancelled,
            Some(call_id),
            &self.operator.username,
            "call cancelled",
        );
        self.apply(call_id, &transition, &audit, "cancel")
            .inspect_err(|err| log_failure("cancel_call", Some(call_id), err))
    }

    fn apply(
        &self,
        call_id: CallId,
        transition: &Transition,
        audit: &AuditEntry,
        action: &'static str,
    ) -> Result<Call, IntakeError> {
        match self.store.transition_call(call_id, transition, audit)? {
            TransitionOutcome::Applied(call) => {
                info!(call_id, status = %call.status, "call status changed");
                Ok(call)
            }
            TransitionOutcome::Rejected(status) => Err(IntakeError::InvalidState {
                call_id,
                status,
                action,
            }),
            TransitionOutcome::Untriaged => Err(IntakeError::InvalidState {
                call_id,
                status: CallStatus::Active,
                action,
            }),
            TransitionOutcome::Missing => Err(IntakeError::CallNotFound(call_id)),
        }
    }

    pub fn call(&self, call_id: CallId) -> Result<Call, IntakeError> {
        self.store
            .get_call(call_id)?
            .ok_or(IntakeError::CallNotFound(call_id))
    }

    pub fn caller(&self, caller_id: CallerId) -> Result<Caller, IntakeError> {
        self.store
            .get_caller(caller_id)?
            .ok_or(IntakeError::CallerNotFound(caller_id))
    }

    pub fn triage(&self, call_id: CallId) -> Result<Option<TriageRecord>, IntakeError> {
        Ok(self.store.triage_for_call(call_id)?)
    }

    pub fn timeline(&self, call_id: CallId) -> Result<Vec<AuditEntry>, IntakeError> {
        Ok(self.store.audit_for_call(call_id)?)
    }

    pub fn open_calls(&self) -> Result<Vec<Call>, IntakeError> {
        Ok(self.store.open_calls()?)
    }

    pub fn recent_calls(&self, limit: usize) -> Result<Vec<Call>, IntakeError> {
        Ok(self.store.recent_calls(limit)?)
    }

    /// Dashboard counters, with `today` measured from local midnight.
    pub fn call_stats(&self) -> Result<CallStats, IntakeError> {
        Ok(self.store.call_stats(local_day_start())?)
    }
}

fn local_day_start() -> DateTime<Utc> {
    let now = Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc))
}

fn log_failure(operation: &'static str, call_id: Option<CallId>, err: &IntakeError) {
    if err.is_validation() {
        debug!(operation, ?call_id, error = %err, "operation rejected");
    } else {
        error!(operation, ?call_id, error = %err, "operation failed");
    }
}
