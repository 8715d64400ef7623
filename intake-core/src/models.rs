use crate::triage::{Evaluation, Priority, TriageAnswers};
use category_registry::{EmergencyCategory, MedicalReceiver};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type CallId = i64;
pub type CallerId = i64;
pub type AuditId = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Active,
    Dispatched,
    InProgress,
    Closed,
    Cancelled,
}

impl CallStatus {
    /// Statuses a call is still being worked in.
    pub const OPEN: [CallStatus; 3] = [Self::Active, Self::Dispatched, Self::InProgress];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Dispatched => "dispatched",
            Self::InProgress => "in_progress",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "dispatched" => Ok(Self::Dispatched),
            "in_progress" => Ok(Self::InProgress),
            "closed" => Ok(Self::Closed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown call status '{other}'")),
        }
    }
}

/// Free-text address parts as the operator typed them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub street: String,
    pub number: String,
    pub floor: String,
    pub unit: String,
    pub neighborhood: String,
}

impl Address {
    /// Single-line address used on calls and alerts, e.g.
    /// `"San Martín 120, Piso 2, Depto B, Centro"`. Blank parts are omitted.
    pub fn resolved(&self) -> String {
        let street = [self.street.trim(), self.number.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let mut parts = Vec::new();
        if !street.is_empty() {
            parts.push(street);
        }
        if !self.floor.trim().is_empty() {
            parts.push(format!("Piso {}", self.floor.trim()));
        }
        if !self.unit.trim().is_empty() {
            parts.push(format!("Depto {}", self.unit.trim()));
        }
        if !self.neighborhood.trim().is_empty() {
            parts.push(self.neighborhood.trim().to_string());
        }
        parts.join(", ")
    }

    pub fn is_blank(&self) -> bool {
        self.resolved().is_empty()
    }
}

/// Caller data as submitted by an operator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallerInput {
    pub document: Option<String>,
    pub given_name: String,
    pub family_name: String,
    pub phone: String,
    pub secondary_phone: Option<String>,
    pub address: Address,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Caller {
    pub id: CallerId,
    pub document: Option<String>,
    pub given_name: String,
    pub family_name: String,
    pub phone: String,
    pub secondary_phone: Option<String>,
    pub address: Address,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Caller {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.given_name.trim(), self.family_name.trim())
            .trim()
            .to_string()
    }
}

/// The operator on shift, injected into the controller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub username: String,
    pub full_name: String,
}

impl Operator {
    pub fn new(username: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            full_name: full_name.into(),
        }
    }
}

/// Row to insert for a new call. Built by the controller only.
#[derive(Clone, Debug, PartialEq)]
pub struct NewCall {
    pub number: String,
    pub caller_id: Option<CallerId>,
    pub category: EmergencyCategory,
    pub operator: String,
    pub address: String,
    pub description: String,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closure_notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub number: String,
    pub caller_id: Option<CallerId>,
    pub category: EmergencyCategory,
    pub operator: String,
    pub address: String,
    pub description: String,
    /// Absent until a triage is completed. General calls never get one.
    pub priority: Option<Priority>,
    pub status: CallStatus,
    pub dispatched_unit: Option<String>,
    pub destination: Option<MedicalReceiver>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closure_notes: Option<String>,
    pub notification_sent: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TriageRecord {
    pub id: Option<i64>,
    pub call_id: CallId,
    pub answers: TriageAnswers,
    pub evaluation: Evaluation,
    pub created_at: DateTime<Utc>,
}

impl TriageRecord {
    pub fn category(&self) -> EmergencyCategory {
        self.answers.category()
    }
}

/// Reference row of the seeded category table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub category: EmergencyCategory,
    pub display_name: String,
    pub weight: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: EmergencyCategory,
    pub total: u64,
}

/// Counters behind the desk dashboard.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallStats {
    pub total: u64,
    pub active: u64,
    pub dispatched: u64,
    pub in_progress: u64,
    pub closed: u64,
    pub cancelled: u64,
    /// Calls created since the start of the reporting day.
    pub today: u64,
    /// Every category, including those without calls, by registry weight.
    pub by_category: Vec<CategoryCount>,
}

impl CallStats {
    pub fn open(&self) -> u64 {
        self.active + self.dispatched + self.in_progress
    }

    /// Share of all calls that ended closed, `0.0` on an empty desk.
    pub fn closed_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.closed as f64 / self.total as f64
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    CallerCreated,
    CallerAmended,
    CallCreated,
    TriageSubmitted,
    Dispatched,
    InProgress,
    Closed,
    Cancelled,
    NotificationSent,
    NotificationFailed,
}

/// Append-only, timestamped fact about a caller or call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Option<AuditId>,
    pub call_id: Option<CallId>,
    pub action: AuditAction,
    pub operator: String,
    pub description: String,
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        call_id: Option<CallId>,
        operator: &str,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            call_id,
            action,
            operator: operator.to_string(),
            description: description.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Responder target the entry refers to, for notification entries.
    pub fn target(&self) -> Option<&str> {
        self.details.as_ref()?.get("target")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_address_omits_blank_parts() {
        let full = Address {
            street: "San Martín".into(),
            number: "120".into(),
            floor: "2".into(),
            unit: "B".into(),
            neighborhood: "Centro".into(),
        };
        assert_eq!(full.resolved(), "San Martín 120, Piso 2, Depto B, Centro");

        let bare = Address {
            street: " Av. del Carmen ".into(),
            neighborhood: "Villa Brizuela".into(),
            ..Address::default()
        };
        assert_eq!(bare.resolved(), "Av. del Carmen, Villa Brizuela");
        assert!(Address::default().is_blank());
    }

    #[test]
    fn status_text_roundtrips_and_terminality() {
        for status in [
            CallStatus::Active,
            CallStatus::Dispatched,
            CallStatus::InProgress,
            CallStatus::Closed,
            CallStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<CallStatus>(), Ok(status));
        }
        assert!(CallStatus::Closed.is_terminal());
        assert!(CallStatus::Cancelled.is_terminal());
        assert!(!CallStatus::InProgress.is_terminal());
        assert!("finalizada".parse::<CallStatus>().is_err());
    }

    #[test]
    fn closed_ratio_handles_an_empty_desk() {
        assert_eq!(CallStats::default().closed_ratio(), 0.0);
        let stats = CallStats {
            total: 4,
            active: 1,
            closed: 2,
            cancelled: 1,
            ..CallStats::default()
        };
        assert_eq!(stats.closed_ratio(), 0.5);
        assert_eq!(stats.open(), 1);
    }

    #[test]
    fn audit_target_reads_details() {
        let entry = AuditEntry::new(AuditAction::NotificationSent, Some(3), "op", "sent")
            .with_details(serde_json::json!({"target": "5493511234567"}));
        assert_eq!(entry.target(), Some("5493511234567"));
        let bare = AuditEntry::new(AuditAction::CallCreated, Some(3), "op", "created");
        assert_eq!(bare.target(), None);
    }
}
