pub mod commands;
pub mod runtime;
pub mod state;

use crate::state::AppState;
use intake_core::config::NotificationConfig;
use intake_core::models::{Address, CallerInput, Operator};
use intake_core::{
    BackgroundSender, CallController, GatewayTransport, InlineSender, IntakeConfig,
    LoggingTransport, MessageTransport, NotificationSender, Notifier, RecordStore, SqliteStore,
};
#[cfg(feature = "tauri-app")]
use tauri::Manager;
use std::sync::Arc;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "dispatch.json";

pub fn load_config() -> Result<IntakeConfig, String> {
    let path = std::env::var("DISPATCH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    IntakeConfig::load(&path).map_err(|e| e.to_string())
}

fn desk_operator() -> Operator {
    let username = std::env::var("DISPATCH_OPERATOR").unwrap_or_else(|_| "operador".into());
    Operator::new(username.clone(), username)
}

/// Desk wired against the configured gateway, with delivery on a worker
/// thread. A disabled notification section swaps in the logging transport.
pub fn build_state(config: &IntakeConfig) -> Result<AppState, String> {
    let transport: Arc<dyn MessageTransport> = if config.notification.enabled {
        Arc::new(
            GatewayTransport::new(
                &config.notification.gateway_url,
                &config.notification.gateway_token,
                config.notification.timeout(),
            )
            .map_err(|e| e.to_string())?,
        )
    } else {
        info!("notifications disabled, alerts will only be logged");
        Arc::new(LoggingTransport)
    };
    assemble(config, &config.notification, transport, true)
}

fn assemble(
    config: &IntakeConfig,
    notification: &NotificationConfig,
    transport: Arc<dyn MessageTransport>,
    background: bool,
) -> Result<AppState, String> {
    let store: Arc<dyn RecordStore> =
        Arc::new(SqliteStore::open(&config.database_path).map_err(|e| e.to_string())?);
    let notifier = Arc::new(Notifier::new(
        store.clone(),
        transport.clone(),
        notification.clone(),
        config.dialing.clone(),
    ));
    let sender: Arc<dyn NotificationSender> = if background {
        let (sender, _worker) = BackgroundSender::spawn(notifier.clone());
        Arc::new(sender)
    } else {
        Arc::new(InlineSender::new(notifier.clone()))
    };
    let controller = CallController::new(
        store.clone(),
        sender,
        desk_operator(),
        config.call_number_prefix.clone(),
    );
    info!(database = %config.database_path, "dispatch desk ready");

    Ok(AppState {
        store,
        controller: Arc::new(controller),
        transport,
        notifier,
    })
}

pub fn run() -> Result<(), String> {
    let config = load_config()?;
    let state = build_state(&config)?;
    runtime::start(&state);

    let open = commands::list_open_calls(&state)?;
    info!(open_calls = open.len(), "desk backend started");
    Ok(())
}

#[cfg(feature = "tauri-app")]
pub fn run_tauri() {
    let result = tauri::Builder::default()
        .setup(|app| {
            let config = load_config().map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
            let state =
                build_state(&config).map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;

            runtime::start_tauri_runtime(&state, app.handle());
            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::list_open_calls_cmd,
            commands::get_call_cmd,
            commands::get_timeline_cmd,
            commands::register_caller_cmd,
            commands::lookup_caller_cmd,
            commands::create_call_cmd,
            commands::submit_triage_cmd,
            commands::dispatch_call_cmd,
            commands::mark_in_progress_cmd,
            commands::close_call_cmd,
            commands::cancel_call_cmd,
            commands::resend_notifications_cmd,
            commands::channel_status_cmd,
            commands::send_test_message_cmd,
            commands::call_stats_cmd
        ])
        .run(tauri::generate_context!());
    if let Err(err) = result {
        tracing::error!(error = %err, "tauri application exited with an error");
    }
}

/// Runs one Fire call end to end against the configured database, with
/// alerts logged instead of sent.
pub fn run_demo() -> Result<(), String> {
    let config = load_config()?;
    let mut notification = config.notification.clone();
    notification.retry_backoff_ms = 0;
    notification
        .targets
        .entry("BOMBEROS".to_string())
        .or_insert_with(|| vec!["4000100".to_string()]);
    let state = assemble(&config, &notification, Arc::new(LoggingTransport), false)?;

    let call_id = seed_demo_data(&state)?;

    let detail = commands::get_call(&state, call_id)?;
    println!(
        "call:\n{}",
        serde_json::to_string_pretty(&detail).map_err(|e| e.to_string())?
    );

    let timeline = commands::get_timeline(&state, call_id)?;
    println!(
        "timeline:\n{}",
        serde_json::to_string_pretty(&timeline).map_err(|e| e.to_string())?
    );

    Ok(())
}

fn seed_demo_data(state: &AppState) -> Result<i64, String> {
    let caller = commands::register_caller(
        state,
        CallerInput {
            document: Some("30111222".into()),
            given_name: "Lucía".into(),
            family_name: "Ferreyra".into(),
            phone: "3514000000".into(),
            address: Address {
                street: "Del Carmen".into(),
                number: "800".into(),
                neighborhood: "Centro".into(),
                ..Address::default()
            },
            ..CallerInput::default()
        },
    )?;

    let call = commands::create_call(
        state,
        commands::CreateCallRequest {
            caller_id: Some(caller.id),
            category: "fire".into(),
            description: "humo saliendo de la cocina".into(),
            address: String::new(),
        },
    )?;

    let answers = serde_json::from_value(serde_json::json!({
        "category": "fire",
        "type": "domicilio",
        "trapped": "si",
        "extent": "cocina"
    }))
    .map_err(|e| e.to_string())?;
    let triage = commands::submit_triage(state, call.id, answers)?;
    info!(
        call_id = call.id,
        priority = triage.priority,
        recommend_dispatch = triage.recommend_dispatch,
        "demo call triaged"
    );

    commands::dispatch_call(state, call.id, Some("Bomberos 1".into()))?;
    Ok(call.id)
}
