use category_registry::EmergencyCategory;
use intake_core::config::{DialingDefaults, NotificationConfig};
use chrono::{DateTime, Utc};
use intake_core::error::{DeliveryError, StoreError};
use intake_core::models::{
    Address, AuditAction, AuditEntry, AuditId, Call, CallId, CallStats, CallStatus, Caller,
    CallerId, CallerInput, CategoryInfo, NewCall, Operator, TriageRecord,
};
use intake_core::store::{Transition, TransitionOutcome, TriageOutcome};
use intake_core::transport::SendReceipt;
use intake_core::triage::{Priority, TriageAnswers};
use intake_core::{
    BackgroundSender, CallController, DispatchOutcome, InlineSender, IntakeError,
    MessageTransport, Notifier, RecordStore, SqliteStore,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier, Mutex};

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<String>>,
}

impl RecordingTransport {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("lock").clone()
    }
}

impl MessageTransport for RecordingTransport {
    fn send(&self, phone: &str, _text: &str) -> Result<SendReceipt, DeliveryError> {
        self.sent.lock().expect("lock").push(phone.to_string());
        Ok(SendReceipt::default())
    }

    fn check_channel_status(&self) -> bool {
        true
    }
}

fn db_path(name: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    format!("/tmp/dispatch-desk-tests/{name}-{nanos}.db")
}

fn notification_config() -> NotificationConfig {
    NotificationConfig {
        retry_backoff_ms: 0,
        targets: BTreeMap::from([
            (
                "BOMBEROS".to_string(),
                vec!["4000001".to_string(), "0351 400-0002".to_string()],
            ),
            ("MEDICA_DEMVA".to_string(), vec!["4000003".to_string()]),
            ("SEGURIDAD".to_string(), vec!["4000004".to_string()]),
        ]),
        ..NotificationConfig::default()
    }
}

struct Desk {
    store: Arc<dyn RecordStore>,
    transport: Arc<RecordingTransport>,
    controller: CallController,
}

fn desk(name: &str) -> Desk {
    let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open(&db_path(name)).expect("open"));
    let transport = Arc::new(RecordingTransport::default());
    let notifier = Arc::new(Notifier::new(
        store.clone(),
        transport.clone(),
        notification_config(),
        DialingDefaults::default(),
    ));
    let controller = CallController::new(
        store.clone(),
        Arc::new(InlineSender::new(notifier)),
        Operator::new("op1", "Operadora Uno"),
        "EM",
    );
    Desk {
        store,
        transport,
        controller,
    }
}

fn answers(value: serde_json::Value) -> TriageAnswers {
    serde_json::from_value(value).expect("answers")
}

fn fire_answers() -> TriageAnswers {
    answers(serde_json::json!({"category": "fire", "type": "domicilio", "trapped": "si"}))
}

#[test]
fn fire_call_notifies_every_fire_target_once() {
    let desk = desk("fire-e2e");
    let call = desk
        .controller
        .create_call(None, EmergencyCategory::Fire, "sale humo del techo", "Rivadavia 50")
        .expect("create");

    let submission = desk.controller.submit_triage(call.id, fire_answers()).expect("triage");
    assert_eq!(submission.evaluation.priority, Priority::CRITICAL);
    assert!(submission.evaluation.recommend_dispatch);
    assert_eq!(submission.call.status, CallStatus::Active);

    let outcome = desk.controller.dispatch(call.id).expect("dispatch");
    assert!(matches!(
        outcome,
        DispatchOutcome::Dispatched {
            notification_queued: true,
            ..
        }
    ));
    assert_eq!(
        desk.transport.sent(),
        vec!["543514000001".to_string(), "543514000002".to_string()]
    );
    assert!(desk.controller.call(call.id).expect("call").notification_sent);
}

#[test]
fn repeated_dispatch_fans_out_once() {
    let desk = desk("double-dispatch");
    let call = desk
        .controller
        .create_call(None, EmergencyCategory::Fire, "", "Rivadavia 50")
        .expect("create");
    desk.controller.submit_triage(call.id, fire_answers()).expect("triage");

    let first = desk.controller.dispatch(call.id).expect("first");
    let second = desk.controller.dispatch(call.id).expect("second");
    assert!(matches!(first, DispatchOutcome::Dispatched { .. }));
    assert!(matches!(second, DispatchOutcome::AlreadyDispatched { .. }));
    assert_eq!(first.call().dispatched_at, second.call().dispatched_at);
    assert_eq!(desk.transport.sent().len(), 2);

    let dispatch_entries = desk
        .controller
        .timeline(call.id)
        .expect("timeline")
        .into_iter()
        .filter(|e| e.action == AuditAction::Dispatched)
        .count();
    assert_eq!(dispatch_entries, 1);
}

#[test]
fn concurrent_dispatch_has_a_single_winner() {
    let path = db_path("concurrent");
    let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open(&path).expect("open"));
    let transport = Arc::new(RecordingTransport::default());
    let notifier = Arc::new(Notifier::new(
        store.clone(),
        transport.clone(),
        notification_config(),
        DialingDefaults::default(),
    ));

    let setup = CallController::new(
        store.clone(),
        Arc::new(InlineSender::new(notifier.clone())),
        Operator::new("op0", "Setup"),
        "EM",
    );
    let call = setup
        .create_call(None, EmergencyCategory::Fire, "", "Rivadavia 50")
        .expect("create");
    setup.submit_triage(call.id, fire_answers()).expect("triage");

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let store: Arc<dyn RecordStore> =
                Arc::new(SqliteStore::open(&path).expect("open"));
            let notifier = notifier.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                let controller = CallController::new(
                    store,
                    Arc::new(InlineSender::new(notifier)),
                    Operator::new(format!("op{i}"), "Operador"),
                    "EM",
                );
                barrier.wait();
                controller.dispatch(call.id).expect("dispatch")
            })
        })
        .collect();

    let outcomes: Vec<DispatchOutcome> = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect();
    let winners = outcomes
        .iter()
        .filter(|o| matches!(o, DispatchOutcome::Dispatched { .. }))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(transport.sent().len(), 2);
}

#[test]
fn triage_after_dispatch_is_rejected_without_writing() {
    let desk = desk("triage-after-dispatch");
    let call = desk
        .controller
        .create_call(None, EmergencyCategory::Fire, "", "Rivadavia 50")
        .expect("create");
    desk.controller.submit_triage(call.id, fire_answers()).expect("triage");
    desk.controller.dispatch(call.id).expect("dispatch");
    let before = desk.controller.triage(call.id).expect("read");

    let err = desk
        .controller
        .submit_triage(
            call.id,
            answers(serde_json::json!({"category": "fire", "type": "vehiculo", "trapped": "no"})),
        )
        .expect_err("dispatched");
    assert!(matches!(
        err,
        IntakeError::InvalidState {
            status: CallStatus::Dispatched,
            ..
        }
    ));
    assert_eq!(desk.controller.triage(call.id).expect("read"), before);
    let triage_entries = desk
        .store
        .audit_for_call(call.id)
        .expect("audit")
        .into_iter()
        .filter(|e| e.action == AuditAction::TriageSubmitted)
        .count();
    assert_eq!(triage_entries, 1);
}

#[test]
fn secondary_phone_finds_existing_caller() {
    let desk = desk("secondary-phone");
    let caller = desk
        .controller
        .find_or_create_caller(&CallerInput {
            document: Some("30111222".into()),
            given_name: "Lucía".into(),
            family_name: "Ferreyra".into(),
            phone: "3514000000".into(),
            secondary_phone: Some("3516555555".into()),
            address: Address {
                street: "Del Carmen".into(),
                number: "800".into(),
                ..Address::default()
            },
            ..CallerInput::default()
        })
        .expect("caller");

    let found = desk
        .controller
        .resolve_caller(None, Some("3516555555"))
        .expect("resolve");
    assert_eq!(found, Some(caller.id));

    let again = desk
        .controller
        .find_or_create_caller(&CallerInput {
            given_name: "Lucía".into(),
            family_name: "Ferreyra".into(),
            phone: "3516555555".into(),
            ..CallerInput::default()
        })
        .expect("caller");
    assert_eq!(again.id, caller.id);
}

#[test]
fn medical_call_stays_active_until_dispatched() {
    let desk = desk("medical-e2e");
    let caller = desk
        .controller
        .find_or_create_caller(&CallerInput {
            given_name: "Jorge".into(),
            family_name: "Luna".into(),
            phone: "3514777777".into(),
            ..CallerInput::default()
        })
        .expect("caller");
    let call = desk
        .controller
        .create_call(Some(caller.id), EmergencyCategory::Medical, "mareo", "Goycoechea 20")
        .expect("create");

    let submission = desk
        .controller
        .submit_triage(
            call.id,
            answers(serde_json::json!({
                "category": "medical",
                "consciousness": "si",
                "breathing": "si",
                "pulse": "si",
                "bleeding": "no",
                "chest_pain": "no"
            })),
        )
        .expect("triage");
    assert_eq!(submission.evaluation.priority, Priority::LOW);
    assert!(!submission.evaluation.recommend_dispatch);
    assert_eq!(submission.call.status, CallStatus::Active);
    assert!(desk.transport.sent().is_empty());

    let outcome = desk.controller.dispatch(call.id).expect("dispatch");
    assert_eq!(outcome.call().status, CallStatus::Dispatched);
    assert_eq!(desk.transport.sent(), vec!["543514000003".to_string()]);
}

#[test]
fn background_worker_delivers_after_dispatch_returns() {
    let store: Arc<dyn RecordStore> =
        Arc::new(SqliteStore::open(&db_path("background")).expect("open"));
    let transport = Arc::new(RecordingTransport::default());
    let notifier = Arc::new(Notifier::new(
        store.clone(),
        transport.clone(),
        notification_config(),
        DialingDefaults::default(),
    ));
    let (sender, worker) = BackgroundSender::spawn(notifier);
    let controller = CallController::new(
        store.clone(),
        Arc::new(sender),
        Operator::new("op1", "Operadora Uno"),
        "EM",
    );

    let call = controller
        .create_call(None, EmergencyCategory::Security, "robo", "San Martín 5")
        .expect("create");
    controller
        .submit_triage(
            call.id,
            answers(serde_json::json!({
                "category": "security",
                "incident_type": "theft",
                "injuries": "none",
                "aggressor_present": "no"
            })),
        )
        .expect("triage");
    controller.dispatch(call.id).expect("dispatch");

    drop(controller);
    worker.join().expect("worker");
    assert_eq!(transport.sent(), vec!["543514000004".to_string()]);
    let delivered = store
        .audit_for_call(call.id)
        .expect("audit")
        .into_iter()
        .any(|e| e.action == AuditAction::NotificationSent);
    assert!(delivered);
}

/// SQLite store whose first notification claims fail as if the database
/// were locked.
struct ClaimOutageStore {
    inner: SqliteStore,
    failing_claims: AtomicU32,
}

impl RecordStore for ClaimOutageStore {
    fn create_caller(&self, input: &CallerInput, audit: &AuditEntry) -> Result<Caller, StoreError> {
        self.inner.create_caller(input, audit)
    }
    fn update_caller(
        &self,
        id: CallerId,
        input: &CallerInput,
        audit: &AuditEntry,
    ) -> Result<Option<Caller>, StoreError> {
        self.inner.update_caller(id, input, audit)
    }
    fn get_caller(&self, id: CallerId) -> Result<Option<Caller>, StoreError> {
        self.inner.get_caller(id)
    }
    fn find_caller_by_document(&self, document: &str) -> Result<Option<Caller>, StoreError> {
        self.inner.find_caller_by_document(document)
    }
    fn find_caller_by_phone(&self, phone: &str) -> Result<Option<Caller>, StoreError> {
        self.inner.find_caller_by_phone(phone)
    }
    fn create_call(&self, call: &NewCall, audit: &AuditEntry) -> Result<Call, StoreError> {
        self.inner.create_call(call, audit)
    }
    fn get_call(&self, id: CallId) -> Result<Option<Call>, StoreError> {
        self.inner.get_call(id)
    }
    fn find_call_by_number(&self, number: &str) -> Result<Option<Call>, StoreError> {
        self.inner.find_call_by_number(number)
    }
    fn open_calls(&self) -> Result<Vec<Call>, StoreError> {
        self.inner.open_calls()
    }
    fn recent_calls(&self, limit: usize) -> Result<Vec<Call>, StoreError> {
        self.inner.recent_calls(limit)
    }
    fn insert_triage(
        &self,
        record: &TriageRecord,
        audit: &AuditEntry,
    ) -> Result<TriageOutcome, StoreError> {
        self.inner.insert_triage(record, audit)
    }
    fn triage_for_call(&self, call_id: CallId) -> Result<Option<TriageRecord>, StoreError> {
        self.inner.triage_for_call(call_id)
    }
    fn transition_call(
        &self,
        id: CallId,
        transition: &Transition,
        audit: &AuditEntry,
    ) -> Result<TransitionOutcome, StoreError> {
        self.inner.transition_call(id, transition, audit)
    }
    fn claim_notification(&self, id: CallId) -> Result<bool, StoreError> {
        let failing = self
            .failing_claims
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("database is locked".into()));
        }
        self.inner.claim_notification(id)
    }
    fn append_audit(&self, entry: &AuditEntry) -> Result<AuditId, StoreError> {
        self.inner.append_audit(entry)
    }
    fn audit_for_call(&self, call_id: CallId) -> Result<Vec<AuditEntry>, StoreError> {
        self.inner.audit_for_call(call_id)
    }
    fn audit_after(&self, after_id: AuditId) -> Result<Vec<AuditEntry>, StoreError> {
        self.inner.audit_after(after_id)
    }
    fn latest_audit_id(&self) -> Result<Option<AuditId>, StoreError> {
        self.inner.latest_audit_id()
    }
    fn categories(&self) -> Result<Vec<CategoryInfo>, StoreError> {
        self.inner.categories()
    }
    fn call_stats(&self, day_start: DateTime<Utc>) -> Result<CallStats, StoreError> {
        self.inner.call_stats(day_start)
    }
}

#[test]
fn resend_recovers_an_alert_whose_claim_failed() {
    let store: Arc<dyn RecordStore> = Arc::new(ClaimOutageStore {
        inner: SqliteStore::open(&db_path("claim-outage")).expect("open"),
        failing_claims: AtomicU32::new(1),
    });
    let transport = Arc::new(RecordingTransport::default());
    let notifier = Arc::new(Notifier::new(
        store.clone(),
        transport.clone(),
        notification_config(),
        DialingDefaults::default(),
    ));
    let controller = CallController::new(
        store.clone(),
        Arc::new(InlineSender::new(notifier)),
        Operator::new("op1", "Operadora Uno"),
        "EM",
    );

    let call = controller
        .create_call(None, EmergencyCategory::Fire, "", "Rivadavia 50")
        .expect("create");
    controller.submit_triage(call.id, fire_answers()).expect("triage");

    let outcome = controller.dispatch(call.id).expect("dispatch");
    assert!(matches!(
        outcome,
        DispatchOutcome::Dispatched {
            notification_queued: false,
            ..
        }
    ));
    assert!(transport.sent().is_empty());
    assert!(matches!(
        controller.dispatch(call.id).expect("again"),
        DispatchOutcome::AlreadyDispatched { .. }
    ));

    controller.resend_notifications(call.id).expect("resend");
    assert_eq!(
        transport.sent(),
        vec!["543514000001".to_string(), "543514000002".to_string()]
    );
    assert!(controller.call(call.id).expect("call").notification_sent);

    controller.resend_notifications(call.id).expect("resend again");
    assert_eq!(transport.sent().len(), 2);
}

#[test]
fn stats_reflect_the_desk() {
    let desk = desk("stats");
    let fire = desk
        .controller
        .create_call(None, EmergencyCategory::Fire, "", "Rivadavia 50")
        .expect("create");
    desk.controller.submit_triage(fire.id, fire_answers()).expect("triage");
    desk.controller.dispatch(fire.id).expect("dispatch");
    desk.controller
        .create_call(None, EmergencyCategory::General, "consulta", "Colón 10")
        .expect("general");

    let stats = desk.controller.call_stats().expect("stats");
    assert_eq!(stats.total, 2);
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.closed, 1);
    assert_eq!(stats.today, 2);
    assert_eq!(stats.closed_ratio(), 0.5);
}
