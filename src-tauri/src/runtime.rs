use crate::state::AppState;
use intake_core::models::{AuditAction, AuditEntry};

pub trait EventSink: Send + Sync + 'static {
    fn emit_json(&self, event: &str, payload: serde_json::Value);
}

pub fn start(state: &AppState) {
    start_with_sink(state, NoopSink);
}

pub fn start_with_sink(state: &AppState, sink: impl EventSink) {
    let state_clone = state.clone();
    std::thread::spawn(move || {
        let mut last_id = state_clone.store.latest_audit_id().ok().flatten().unwrap_or(0);

        loop {
            emit_updates(&state_clone, &sink, &mut last_id);
            std::thread::sleep(std::time::Duration::from_millis(750));
        }
    });
}

#[cfg(feature = "tauri-app")]
pub fn start_tauri_runtime(state: &AppState, app: tauri::AppHandle) {
    start_with_sink(state, TauriSink::new(app));
}

/// UI event name for an audit action, when the desk cares about it.
fn event_name(action: AuditAction) -> Option<&'static str> {
    match action {
        AuditAction::CallCreated => Some("call-created"),
        AuditAction::TriageSubmitted => Some("triage-submitted"),
        AuditAction::Dispatched => Some("call-dispatched"),
        AuditAction::Closed | AuditAction::Cancelled => Some("call-closed"),
        AuditAction::NotificationSent => Some("notification-delivered"),
        AuditAction::NotificationFailed => Some("notification-failed"),
        AuditAction::CallerCreated | AuditAction::CallerAmended | AuditAction::InProgress => None,
    }
}

fn payload(entry: &AuditEntry) -> serde_json::Value {
    serde_json::json!({
        "call_id": entry.call_id,
        "action": format!("{:?}", entry.action),
        "description": entry.description,
        "target": entry.target(),
        "timestamp": entry.timestamp.to_rfc3339(),
    })
}

fn emit_updates(state: &AppState, sink: &impl EventSink, last_id: &mut i64) {
    let open_count = state.store.open_calls().map(|v| v.len()).unwrap_or(0);
    sink.emit_json(
        "calls-updated",
        serde_json::json!({ "open_call_count": open_count }),
    );

    let entries = match state.store.audit_after(*last_id) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(error = %err, last_id = *last_id, "audit poll failed");
            return;
        }
    };

    for entry in entries {
        if let Some(id) = entry.id {
            if id > *last_id {
                *last_id = id;
            }
        }

        if let Some(event) = event_name(entry.action) {
            sink.emit_json(event, payload(&entry));
        }
    }
}

struct NoopSink;

impl EventSink for NoopSink {
    fn emit_json(&self, _event: &str, _payload: serde_json::Value) {}
}

#[cfg(feature = "tauri-app")]
pub struct TauriSink {
    app: tauri::AppHandle,
}

#[cfg(feature = "tauri-app")]
impl TauriSink {
    pub fn new(app: tauri::AppHandle) -> Self {
        Self { app }
    }
}

#[cfg(feature = "tauri-app")]
impl EventSink for TauriSink {
    fn emit_json(&self, event: &str, payload: serde_json::Value) {
        use tauri::Manager;
        if let Err(err) = self.app.emit_all(event, payload) {
            tracing::debug!(event, error = %err, "ui event dropped");
        }
    }
}
