//! Alert fan-out to responder targets.
//!
//! The controller takes the per-call notification claim before anything is
//! submitted here, so a call is fanned out once. Within a fan-out, targets
//! that already have a `NotificationSent` entry in the audit trail are
//! skipped, which keeps a resend from messaging the same phone twice.

use crate::config::{DialingDefaults, NotificationConfig};
use crate::error::{DeliveryError, StoreError};
use crate::models::{AuditAction, AuditEntry, Call, CallId, Caller};
use crate::store::RecordStore;
use crate::transport::{normalize_phone, MessageTransport, SendReceipt};
use crate::triage::Priority;
use category_registry::{EmergencyCategory, MedicalReceiver, ResponderKey};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, warn};

const NOTIFIER_OPERATOR: &str = "notifier";

/// What an alert needs to know about a call, captured at dispatch time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertContext {
    pub call_id: CallId,
    pub number: String,
    pub category: EmergencyCategory,
    pub receiver: Option<MedicalReceiver>,
    pub address: String,
    pub description: String,
    pub priority: Option<Priority>,
    pub caller_name: Option<String>,
    pub caller_phone: Option<String>,
}

impl AlertContext {
    pub fn new(call: &Call, caller: Option<&Caller>) -> Self {
        Self {
            call_id: call.id,
            number: call.number.clone(),
            category: call.category,
            receiver: call.destination,
            address: call.address.clone(),
            description: call.description.clone(),
            priority: call.priority,
            caller_name: caller.map(Caller::full_name).filter(|n| !n.is_empty()),
            caller_phone: caller.map(|c| c.phone.clone()).filter(|p| !p.is_empty()),
        }
    }
}

pub fn format_alert(context: &AlertContext, signature: &str, now: DateTime<Local>) -> String {
    let mut text = String::from("🚨 *ALERTA DE EMERGENCIA* 🚨\n\n");
    text.push_str(&format!("📋 *Llamada:* {}\n", context.number));
    text.push_str(&format!("🚨 *Tipo:* {}\n", context.category.display_name()));
    if let Some(priority) = context.priority {
        text.push_str(&format!("⚠️ *Prioridad:* {} ({})\n", priority, priority.label()));
    }
    text.push_str(&format!("📍 *Dirección:* {}\n", context.address));
    if let Some(name) = &context.caller_name {
        text.push_str(&format!("👤 *Solicitante:* {name}\n"));
    }
    if let Some(phone) = &context.caller_phone {
        text.push_str(&format!("📞 *Teléfono:* {phone}\n"));
    }
    if !context.description.trim().is_empty() {
        text.push_str(&format!("📝 *Descripción:* {}\n", context.description.trim()));
    }
    text.push_str(&format!("\n⏰ *Hora:* {}\n", now.format("%d/%m/%Y %H:%M:%S")));
    text.push_str(&format!("🏥 *{signature}*"));
    text
}

/// Message used to check a gateway setup end to end.
pub fn format_test_message(signature: &str, now: DateTime<Local>) -> String {
    format!(
        "🧪 *Mensaje de Prueba*\n\n\
         Este es un mensaje de prueba del {signature}.\n\n\
         ⏰ Enviado: {}\n\
         ✅ Si recibe este mensaje, la configuración es correcta.",
        now.format("%d/%m/%Y %H:%M:%S")
    )
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetStatus {
    Delivered { attempts: u32 },
    AlreadyDelivered,
    Failed { attempts: u32, error: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub target: String,
    #[serde(flatten)]
    pub status: TargetStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub call_id: CallId,
    pub targets: Vec<TargetOutcome>,
    /// Targets delivered by this fan-out.
    pub successes: usize,
}

pub struct Notifier {
    store: Arc<dyn RecordStore>,
    transport: Arc<dyn MessageTransport>,
    config: NotificationConfig,
    dialing: DialingDefaults,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn RecordStore>,
        transport: Arc<dyn MessageTransport>,
        config: NotificationConfig,
        dialing: DialingDefaults,
    ) -> Self {
        Self {
            store,
            transport,
            config,
            dialing,
        }
    }

    /// Sends the test message to one phone. Single attempt, no audit entry.
    pub fn send_test_message(&self, phone: &str) -> Result<SendReceipt, DeliveryError> {
        let target = normalize_phone(phone, &self.dialing)?;
        let text = format_test_message(&self.config.signature, Local::now());
        let receipt = self
            .transport
            .send(&target, &text)
            .inspect_err(|err| warn!(phone = %target, error = %err, "test message failed"))?;
        info!(phone = %target, status = %receipt.status, "test message sent");
        Ok(receipt)
    }

    pub fn notify(&self, context: &AlertContext) -> Result<NotificationResult, StoreError> {
        let mut result = NotificationResult {
            call_id: context.call_id,
            ..NotificationResult::default()
        };
        let Some(key) = ResponderKey::for_call(context.category, context.receiver) else {
            return Ok(result);
        };
        let configured = self.config.targets_for(key);
        if configured.is_empty() {
            warn!(call_id = context.call_id, key = %key.code(), "no responder targets configured");
            return Ok(result);
        }

        let delivered: HashSet<String> = self
            .store
            .audit_for_call(context.call_id)?
            .iter()
            .filter(|entry| entry.action == AuditAction::NotificationSent)
            .filter_map(|entry| entry.target().map(str::to_string))
            .collect();

        let text = format_alert(context, &self.config.signature, Local::now());
        let mut seen = HashSet::new();

        for raw in configured {
            let target = match normalize_phone(&raw, &self.dialing) {
                Ok(target) => target,
                Err(err) => {
                    let status = TargetStatus::Failed {
                        attempts: 0,
                        error: err.to_string(),
                    };
                    self.record(context.call_id, &raw, &status);
                    result.targets.push(TargetOutcome { target: raw, status });
                    continue;
                }
            };
            if !seen.insert(target.clone()) {
                continue;
            }
            if delivered.contains(&target) {
                result.targets.push(TargetOutcome {
                    target,
                    status: TargetStatus::AlreadyDelivered,
                });
                continue;
            }

            let status = self.send_with_retries(context.call_id, &target, &text);
            self.record(context.call_id, &target, &status);
            if matches!(status, TargetStatus::Delivered { .. }) {
                result.successes += 1;
            }
            result.targets.push(TargetOutcome { target, status });
        }

        info!(
            call_id = context.call_id,
            targets = result.targets.len(),
            successes = result.successes,
            "notification fan-out finished"
        );
        Ok(result)
    }

    fn send_with_retries(&self, call_id: CallId, target: &str, text: &str) -> TargetStatus {
        let max_attempts = self.config.retries.saturating_add(1);
        let mut last_error = DeliveryError::Transport("not attempted".into());
        for attempt in 1..=max_attempts {
            match self.transport.send(target, text) {
                Ok(_) => return TargetStatus::Delivered { attempts: attempt },
                Err(err) => {
                    warn!(call_id, phone = target, attempt, error = %err, "send failed");
                    last_error = err;
                    if attempt < max_attempts && !self.config.backoff().is_zero() {
                        std::thread::sleep(self.config.backoff());
                    }
                }
            }
        }
        TargetStatus::Failed {
            attempts: max_attempts,
            error: last_error.to_string(),
        }
    }

    fn record(&self, call_id: CallId, target: &str, status: &TargetStatus) {
        let entry = match status {
            TargetStatus::Delivered { attempts } => AuditEntry::new(
                AuditAction::NotificationSent,
                Some(call_id),
                NOTIFIER_OPERATOR,
                format!("alert delivered to {target}"),
            )
            .with_details(serde_json::json!({ "target": target, "attempts": attempts })),
            TargetStatus::Failed { attempts, error } => AuditEntry::new(
                AuditAction::NotificationFailed,
                Some(call_id),
                NOTIFIER_OPERATOR,
                format!("alert to {target} failed: {error}"),
            )
            .with_details(serde_json::json!({
                "target": target,
                "attempts": attempts,
                "error": error,
            })),
            TargetStatus::AlreadyDelivered => return,
        };
        if let Err(err) = self.store.append_audit(&entry) {
            warn!(call_id, phone = target, error = %err, "could not record notification outcome");
        }
    }
}

/// Hands an alert to whatever runs the fan-out.
pub trait NotificationSender: Send + Sync {
    fn submit(&self, context: AlertContext) -> Result<(), DeliveryError>;
}

/// Runs the fan-out on the calling thread.
pub struct InlineSender {
    notifier: Arc<Notifier>,
}

impl InlineSender {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self { notifier }
    }
}

impl NotificationSender for InlineSender {
    fn submit(&self, context: AlertContext) -> Result<(), DeliveryError> {
        if let Err(err) = self.notifier.notify(&context) {
            warn!(call_id = context.call_id, error = %err, "notification fan-out aborted");
        }
        Ok(())
    }
}

/// Queues alerts for a worker thread so intake never waits on the gateway.
pub struct BackgroundSender {
    tx: mpsc::Sender<AlertContext>,
}

impl BackgroundSender {
    /// Starts the worker. It exits once every sender handle is dropped and
    /// the queue is drained.
    pub fn spawn(notifier: Arc<Notifier>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel::<AlertContext>();
        let handle = std::thread::spawn(move || {
            for context in rx {
                if let Err(err) = notifier.notify(&context) {
                    warn!(call_id = context.call_id, error = %err, "notification fan-out aborted");
                }
            }
        });
        (Self { tx }, handle)
    }
}

impl NotificationSender for BackgroundSender {
    fn submit(&self, context: AlertContext) -> Result<(), DeliveryError> {
        self.tx.send(context).map_err(|_| DeliveryError::QueueClosed)
    }
}
