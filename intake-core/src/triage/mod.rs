//! Triage questionnaires and the per-category priority evaluators.
//!
//! Each evaluator is a first-match override cascade over the discrete answers
//! of one questionnaire: the most urgent tier whose trigger matches wins.
//! Free-text answers are carried along for the record and never influence the
//! outcome.

pub mod civil_defense;
pub mod fire;
pub mod medical;
pub mod security;

pub use civil_defense::{CivilDefenseAnswers, Evacuation, StructuralDamage, VehicularAccess};
pub use fire::{FireAnswers, FireKind};
pub use medical::{Bleeding, Breathing, ChestPain, Consciousness, MedicalAnswers, Pulse};
pub use security::{Armed, IncidentType, Injuries, SecurityAnswers};

use category_registry::{EmergencyCategory, MedicalReceiver};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Urgency rank. 1 is the most urgent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(u8);

impl Priority {
    pub const CRITICAL: Priority = Priority(1);
    pub const HIGH: Priority = Priority(2);
    pub const MEDIUM: Priority = Priority(3);
    pub const LOW: Priority = Priority(4);

    pub fn new(value: u8) -> Option<Self> {
        (1..=4).contains(&value).then_some(Priority(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// True when `self` is as urgent as `threshold` or more.
    pub fn meets(self, threshold: Priority) -> bool {
        self.0 <= threshold.0
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "Crítica",
            2 => "Alta",
            3 => "Media",
            _ => "Baja",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tri-state answer for yes/no questions the caller may not know.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    #[serde(alias = "si", alias = "sí")]
    Yes,
    No,
    #[serde(alias = "desconocido")]
    Unknown,
}

/// Result of a completed triage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub priority: Priority,
    pub recommend_dispatch: bool,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("incomplete {category} triage: missing {}", .missing.join(", "))]
pub struct IncompleteTriage {
    pub category: EmergencyCategory,
    pub missing: Vec<&'static str>,
}

pub trait Evaluator {
    const CATEGORY: EmergencyCategory;
    /// Least urgent priority that still recommends immediate dispatch.
    const DISPATCH_THRESHOLD: Priority;

    /// Names of required discrete answers that are absent.
    fn missing_fields(&self) -> Vec<&'static str>;

    /// Runs the override cascade. Only meaningful once `missing_fields` is empty.
    fn tier(&self) -> Priority;

    fn evaluate(&self) -> Result<Evaluation, IncompleteTriage> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(IncompleteTriage {
                category: Self::CATEGORY,
                missing,
            });
        }
        let priority = self.tier();
        Ok(Evaluation {
            priority,
            recommend_dispatch: priority.meets(Self::DISPATCH_THRESHOLD),
        })
    }
}

/// A submitted questionnaire, tagged by the category it belongs to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum TriageAnswers {
    Medical(MedicalAnswers),
    Fire(FireAnswers),
    CivilDefense(CivilDefenseAnswers),
    Security(SecurityAnswers),
}

impl TriageAnswers {
    pub fn category(&self) -> EmergencyCategory {
        match self {
            Self::Medical(_) => MedicalAnswers::CATEGORY,
            Self::Fire(_) => FireAnswers::CATEGORY,
            Self::CivilDefense(_) => CivilDefenseAnswers::CATEGORY,
            Self::Security(_) => SecurityAnswers::CATEGORY,
        }
    }

    pub fn evaluate(&self) -> Result<Evaluation, IncompleteTriage> {
        match self {
            Self::Medical(answers) => answers.evaluate(),
            Self::Fire(answers) => answers.evaluate(),
            Self::CivilDefense(answers) => answers.evaluate(),
            Self::Security(answers) => answers.evaluate(),
        }
    }

    /// Receiving center chosen during a medical triage.
    pub fn medical_receiver(&self) -> Option<MedicalReceiver> {
        match self {
            Self::Medical(answers) => Some(answers.receiver),
            _ => None,
        }
    }
}

/// Pushes `name` onto `missing` when `value` is absent.
pub(crate) fn require<T>(missing: &mut Vec<&'static str>, name: &'static str, value: &Option<T>) {
    if value.is_none() {
        missing.push(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_threshold_comparison() {
        assert!(Priority::CRITICAL.meets(Priority::HIGH));
        assert!(Priority::HIGH.meets(Priority::HIGH));
        assert!(!Priority::MEDIUM.meets(Priority::HIGH));
        assert!(Priority::MEDIUM.meets(Priority::MEDIUM));
        assert_eq!(Priority::new(0), None);
        assert_eq!(Priority::new(5), None);
        assert_eq!(Priority::new(3), Some(Priority::MEDIUM));
    }

    #[test]
    fn answers_parse_from_tagged_json() {
        let answers: TriageAnswers = serde_json::from_value(serde_json::json!({
            "category": "fire",
            "type": "domicilio",
            "trapped": "si"
        }))
        .expect("fire answers");
        assert_eq!(answers.category(), EmergencyCategory::Fire);
        let evaluation = answers.evaluate().expect("complete");
        assert_eq!(evaluation.priority, Priority::CRITICAL);
        assert!(evaluation.recommend_dispatch);
    }

    #[test]
    fn incomplete_error_names_every_missing_field() {
        let answers = TriageAnswers::Security(SecurityAnswers::default());
        let err = answers.evaluate().expect_err("incomplete");
        assert_eq!(err.category, EmergencyCategory::Security);
        assert_eq!(err.missing, vec!["incident_type", "injuries", "aggressor_present"]);
        assert_eq!(
            err.to_string(),
            "incomplete SEGURIDAD triage: missing incident_type, injuries, aggressor_present"
        );
    }

    #[test]
    fn only_medical_answers_carry_a_receiver() {
        let medical = TriageAnswers::Medical(MedicalAnswers {
            receiver: MedicalReceiver::Cec,
            ..MedicalAnswers::default()
        });
        assert_eq!(medical.medical_receiver(), Some(MedicalReceiver::Cec));
        let fire = TriageAnswers::Fire(FireAnswers::default());
        assert_eq!(fire.medical_receiver(), None);
    }
}
