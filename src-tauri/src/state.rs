use intake_core::{CallController, MessageTransport, Notifier, RecordStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub controller: Arc<CallController>,
    /// Same channel the notifier sends through; only asked for its status here.
    pub transport: Arc<dyn MessageTransport>,
    pub notifier: Arc<Notifier>,
}
