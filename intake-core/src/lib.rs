//! Call intake and triage engine for the dispatch desk.

pub mod caller;
pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod notify;
pub mod store;
pub mod transport;
pub mod triage;

pub use config::IntakeConfig;
pub use controller::{CallController, DispatchOutcome, TriageSubmission};
pub use error::{ConfigError, DeliveryError, IntakeError, StoreError};
pub use notify::{BackgroundSender, InlineSender, NotificationSender, Notifier};
pub use store::{RecordStore, SqliteStore};
pub use transport::{GatewayTransport, LoggingTransport, MessageTransport};
