use crate::state::AppState;
use category_registry::EmergencyCategory;
use chrono::{DateTime, Utc};
use intake_core::models::{AuditEntry, Call, Caller, CallerInput, TriageRecord};
use intake_core::triage::TriageAnswers;
use intake_core::DispatchOutcome;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CallDto {
    pub id: i64,
    pub number: String,
    pub category: String,
    pub category_name: String,
    pub status: String,
    pub priority: Option<u8>,
    pub priority_label: Option<String>,
    pub address: String,
    pub description: String,
    pub operator: String,
    pub caller_id: Option<i64>,
    pub dispatched_unit: Option<String>,
    pub destination: Option<String>,
    pub created_at: String,
    pub dispatched_at: Option<String>,
    pub closed_at: Option<String>,
    pub closure_notes: Option<String>,
    pub notification_sent: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallerDto {
    pub id: i64,
    pub document: Option<String>,
    pub full_name: String,
    pub phone: String,
    pub secondary_phone: Option<String>,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TriageDto {
    pub category: String,
    pub answers: serde_json::Value,
    pub priority: u8,
    pub priority_label: String,
    pub recommend_dispatch: bool,
    pub submitted_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallDetailDto {
    pub call: CallDto,
    pub caller: Option<CallerDto>,
    pub triage: Option<TriageDto>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimelineEntryDto {
    pub id: i64,
    pub action: String,
    pub operator: String,
    pub description: String,
    pub target: Option<String>,
    pub timestamp: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateCallRequest {
    pub caller_id: Option<i64>,
    pub category: String,
    #[serde(default)]
    pub description: String,
    /// Falls back to the caller's registered address when blank.
    #[serde(default)]
    pub address: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TriageResultDto {
    pub call: CallDto,
    pub priority: u8,
    pub priority_label: String,
    pub recommend_dispatch: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchResultDto {
    pub outcome: String,
    pub notification_queued: bool,
    pub call: CallDto,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelStatusDto {
    pub connected: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestMessageDto {
    pub phone: String,
    pub status: String,
    pub message_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CategoryCountDto {
    pub category: String,
    pub category_name: String,
    pub total: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallStatsDto {
    pub total: u64,
    pub open: u64,
    pub active: u64,
    pub dispatched: u64,
    pub in_progress: u64,
    pub closed: u64,
    pub cancelled: u64,
    pub today: u64,
    pub closed_ratio: f64,
    pub by_category: Vec<CategoryCountDto>,
}

pub fn list_open_calls(state: &AppState) -> Result<Vec<CallDto>, String> {
    let calls = state.controller.open_calls().map_err(|e| e.to_string())?;
    Ok(calls.iter().map(call_dto).collect())
}

pub fn get_call(state: &AppState, call_id: i64) -> Result<CallDetailDto, String> {
    let call = state.controller.call(call_id).map_err(|e| e.to_string())?;
    let caller = match call.caller_id {
        Some(id) => state
            .store
            .get_caller(id)
            .map_err(|e| e.to_string())?
            .map(|c| caller_dto(&c)),
        None => None,
    };
    let triage = state
        .controller
        .triage(call_id)
        .map_err(|e| e.to_string())?
        .map(|record| triage_dto(&record))
        .transpose()?;

    Ok(CallDetailDto {
        call: call_dto(&call),
        caller,
        triage,
    })
}

pub fn get_timeline(state: &AppState, call_id: i64) -> Result<Vec<TimelineEntryDto>, String> {
    state
        .controller
        .timeline(call_id)
        .map(|entries| entries.iter().map(timeline_entry).collect())
        .map_err(|e| e.to_string())
}

pub fn register_caller(state: &AppState, input: CallerInput) -> Result<CallerDto, String> {
    state
        .controller
        .find_or_create_caller(&input)
        .map(|c| caller_dto(&c))
        .map_err(|e| e.to_string())
}

pub fn lookup_caller(
    state: &AppState,
    document: Option<String>,
    phone: Option<String>,
) -> Result<Option<CallerDto>, String> {
    let Some(id) = state
        .controller
        .resolve_caller(document.as_deref(), phone.as_deref())
        .map_err(|e| e.to_string())?
    else {
        return Ok(None);
    };
    state
        .controller
        .caller(id)
        .map(|c| Some(caller_dto(&c)))
        .map_err(|e| e.to_string())
}

pub fn create_call(state: &AppState, request: CreateCallRequest) -> Result<CallDto, String> {
    let category = parse_category(&request.category)?;
    let mut address = request.address.trim().to_string();
    if address.is_empty() {
        if let Some(caller_id) = request.caller_id {
            let caller = state.controller.caller(caller_id).map_err(|e| e.to_string())?;
            address = caller.address.resolved();
        }
    }

    state
        .controller
        .create_call(request.caller_id, category, &request.description, &address)
        .map(|c| call_dto(&c))
        .map_err(|e| e.to_string())
}

pub fn submit_triage(
    state: &AppState,
    call_id: i64,
    answers: TriageAnswers,
) -> Result<TriageResultDto, String> {
    let submission = state
        .controller
        .submit_triage(call_id, answers)
        .map_err(|e| e.to_string())?;
    Ok(TriageResultDto {
        call: call_dto(&submission.call),
        priority: submission.evaluation.priority.value(),
        priority_label: submission.evaluation.priority.label().to_string(),
        recommend_dispatch: submission.evaluation.recommend_dispatch,
    })
}

pub fn dispatch_call(
    state: &AppState,
    call_id: i64,
    unit: Option<String>,
) -> Result<DispatchResultDto, String> {
    let outcome = match unit {
        Some(unit) => state.controller.dispatch_unit(call_id, &unit),
        None => state.controller.dispatch(call_id),
    }
    .map_err(|e| e.to_string())?;

    Ok(match outcome {
        DispatchOutcome::Dispatched {
            call,
            notification_queued,
        } => DispatchResultDto {
            outcome: "dispatched".into(),
            notification_queued,
            call: call_dto(&call),
        },
        DispatchOutcome::AlreadyDispatched { call } => DispatchResultDto {
            outcome: "already_dispatched".into(),
            notification_queued: false,
            call: call_dto(&call),
        },
    })
}

pub fn mark_in_progress(state: &AppState, call_id: i64) -> Result<CallDto, String> {
    state
        .controller
        .mark_in_progress(call_id)
        .map(|c| call_dto(&c))
        .map_err(|e| e.to_string())
}

pub fn close_call(state: &AppState, call_id: i64, notes: String) -> Result<CallDto, String> {
    state
        .controller
        .close_call(call_id, &notes)
        .map(|c| call_dto(&c))
        .map_err(|e| e.to_string())
}

pub fn cancel_call(state: &AppState, call_id: i64) -> Result<CallDto, String> {
    state
        .controller
        .cancel_call(call_id)
        .map(|c| call_dto(&c))
        .map_err(|e| e.to_string())
}

pub fn resend_notifications(state: &AppState, call_id: i64) -> Result<(), String> {
    state
        .controller
        .resend_notifications(call_id)
        .map_err(|e| e.to_string())
}

pub fn channel_status(state: &AppState) -> Result<ChannelStatusDto, String> {
    Ok(ChannelStatusDto {
        connected: state.transport.check_channel_status(),
    })
}

pub fn send_test_message(state: &AppState, phone: String) -> Result<TestMessageDto, String> {
    let receipt = state
        .notifier
        .send_test_message(&phone)
        .map_err(|e| e.to_string())?;
    Ok(TestMessageDto {
        phone,
        status: receipt.status,
        message_id: receipt.message_id,
    })
}

pub fn call_stats(state: &AppState) -> Result<CallStatsDto, String> {
    let stats = state.controller.call_stats().map_err(|e| e.to_string())?;
    Ok(CallStatsDto {
        total: stats.total,
        open: stats.open(),
        active: stats.active,
        dispatched: stats.dispatched,
        in_progress: stats.in_progress,
        closed: stats.closed,
        cancelled: stats.cancelled,
        today: stats.today,
        closed_ratio: stats.closed_ratio(),
        by_category: stats
            .by_category
            .iter()
            .map(|c| CategoryCountDto {
                category: c.category.code().to_string(),
                category_name: c.category.display_name().to_string(),
                total: c.total,
            })
            .collect(),
    })
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn list_open_calls_cmd(state: tauri::State<'_, AppState>) -> Result<Vec<CallDto>, String> {
    list_open_calls(&state)
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn get_call_cmd(state: tauri::State<'_, AppState>, call_id: i64) -> Result<CallDetailDto, String> {
    get_call(&state, call_id)
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn get_timeline_cmd(
    state: tauri::State<'_, AppState>,
    call_id: i64,
) -> Result<Vec<TimelineEntryDto>, String> {
    get_timeline(&state, call_id)
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn register_caller_cmd(
    state: tauri::State<'_, AppState>,
    input: CallerInput,
) -> Result<CallerDto, String> {
    register_caller(&state, input)
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn lookup_caller_cmd(
    state: tauri::State<'_, AppState>,
    document: Option<String>,
    phone: Option<String>,
) -> Result<Option<CallerDto>, String> {
    lookup_caller(&state, document, phone)
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn create_call_cmd(
    state: tauri::State<'_, AppState>,
    request: CreateCallRequest,
) -> Result<CallDto, String> {
    create_call(&state, request)
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn submit_triage_cmd(
    state: tauri::State<'_, AppState>,
    call_id: i64,
    answers: TriageAnswers,
) -> Result<TriageResultDto, String> {
    submit_triage(&state, call_id, answers)
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn dispatch_call_cmd(
    state: tauri::State<'_, AppState>,
    call_id: i64,
    unit: Option<String>,
) -> Result<DispatchResultDto, String> {
    dispatch_call(&state, call_id, unit)
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn mark_in_progress_cmd(state: tauri::State<'_, AppState>, call_id: i64) -> Result<CallDto, String> {
    mark_in_progress(&state, call_id)
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn close_call_cmd(
    state: tauri::State<'_, AppState>,
    call_id: i64,
    notes: String,
) -> Result<CallDto, String> {
    close_call(&state, call_id, notes)
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn cancel_call_cmd(state: tauri::State<'_, AppState>, call_id: i64) -> Result<CallDto, String> {
    cancel_call(&state, call_id)
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn resend_notifications_cmd(state: tauri::State<'_, AppState>, call_id: i64) -> Result<(), String> {
    resend_notifications(&state, call_id)
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn channel_status_cmd(state: tauri::State<'_, AppState>) -> Result<ChannelStatusDto, String> {
    channel_status(&state)
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn send_test_message_cmd(
    state: tauri::State<'_, AppState>,
    phone: String,
) -> Result<TestMessageDto, String> {
    send_test_message(&state, phone)
}

#[cfg(feature = "tauri-app")]
#[tauri::command(rename_all = "camelCase")]
pub fn call_stats_cmd(state: tauri::State<'_, AppState>) -> Result<CallStatsDto, String> {
    call_stats(&state)
}

/// Accepts the registry code (`BOMBEROS`) or the serialized name (`fire`).
fn parse_category(raw: &str) -> Result<EmergencyCategory, String> {
    EmergencyCategory::from_code(raw).or_else(|err| {
        serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase())).map_err(|_| err)
    })
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

pub(crate) fn call_dto(call: &Call) -> CallDto {
    CallDto {
        id: call.id,
        number: call.number.clone(),
        category: call.category.code().to_string(),
        category_name: call.category.display_name().to_string(),
        status: call.status.to_string(),
        priority: call.priority.map(|p| p.value()),
        priority_label: call.priority.map(|p| p.label().to_string()),
        address: call.address.clone(),
        description: call.description.clone(),
        operator: call.operator.clone(),
        caller_id: call.caller_id,
        dispatched_unit: call.dispatched_unit.clone(),
        destination: call.destination.map(|d| d.tag().to_string()),
        created_at: timestamp(call.created_at),
        dispatched_at: call.dispatched_at.map(timestamp),
        closed_at: call.closed_at.map(timestamp),
        closure_notes: call.closure_notes.clone(),
        notification_sent: call.notification_sent,
    }
}

fn caller_dto(caller: &Caller) -> CallerDto {
    CallerDto {
        id: caller.id,
        document: caller.document.clone(),
        full_name: caller.full_name(),
        phone: caller.phone.clone(),
        secondary_phone: caller.secondary_phone.clone(),
        address: caller.address.resolved(),
        latitude: caller.latitude,
        longitude: caller.longitude,
    }
}

fn triage_dto(record: &TriageRecord) -> Result<TriageDto, String> {
    Ok(TriageDto {
        category: record.category().code().to_string(),
        answers: serde_json::to_value(&record.answers).map_err(|e| e.to_string())?,
        priority: record.evaluation.priority.value(),
        priority_label: record.evaluation.priority.label().to_string(),
        recommend_dispatch: record.evaluation.recommend_dispatch,
        submitted_at: timestamp(record.created_at),
    })
}

fn timeline_entry(entry: &AuditEntry) -> TimelineEntryDto {
    TimelineEntryDto {
        id: entry.id.unwrap_or(0),
        action: format!("{:?}", entry.action),
        operator: entry.operator.clone(),
        description: entry.description.clone(),
        target: entry.target().map(str::to_string),
        timestamp: timestamp(entry.timestamp),
    }
}
