use crate::models::{CallId, CallStatus, CallerId};
use crate::triage::IncompleteTriage;
use category_registry::EmergencyCategory;
use thiserror::Error;

/// Failures of the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("stored record could not be decoded: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(err.to_string())
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..) => StoreError::Corrupt(err.to_string()),
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Everything the lifecycle controller can reject or fail with.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    IncompleteTriage(#[from] IncompleteTriage),

    #[error("call {call_id} is {status}; cannot {action}")]
    InvalidState {
        call_id: CallId,
        status: CallStatus,
        action: &'static str,
    },

    #[error("call {call_id} already has a triage record")]
    DuplicateTriage { call_id: CallId },

    #[error("document matches caller {by_document} but phone matches caller {by_phone}")]
    AmbiguousCallerMatch {
        by_document: CallerId,
        by_phone: CallerId,
    },

    #[error("triage answers are for {answers} but call {call_id} is {call}")]
    CategoryMismatch {
        call_id: CallId,
        call: EmergencyCategory,
        answers: EmergencyCategory,
    },

    #[error("call {0} not found")]
    CallNotFound(CallId),

    #[error("caller {0} not found")]
    CallerNotFound(CallerId),

    #[error("invalid caller: {0}")]
    InvalidCaller(String),

    #[error("invalid call: {0}")]
    InvalidCall(String),

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("notifications unavailable: {0}")]
    NotificationUnavailable(#[from] DeliveryError),
}

impl From<StoreError> for IntakeError {
    fn from(err: StoreError) -> Self {
        IntakeError::StoreUnavailable(err.to_string())
    }
}

impl IntakeError {
    /// Operator-actionable rejections, as opposed to system failures.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            IntakeError::StoreUnavailable(_) | IntakeError::NotificationUnavailable(_)
        )
    }
}

/// A single failed send to one responder target.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("gateway returned HTTP {0}")]
    Http(u16),
    #[error("gateway rejected message: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid target phone '{0}'")]
    InvalidTarget(String),
    #[error("notification worker is not running")]
    QueueClosed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}
