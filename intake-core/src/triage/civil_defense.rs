use super::{require, Evaluator, Priority};
use category_registry::EmergencyCategory;
use serde::{Deserialize, Serialize};

/// More than this many affected people makes an event at least medium.
const AFFECTED_PEOPLE_ESCALATION: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuralDamage {
    #[serde(rename = "none", alias = "no")]
    Absent,
    #[serde(rename = "minor", alias = "menores")]
    Minor,
    #[serde(rename = "major", alias = "importantes")]
    Major,
    /// Collapse or serious risk of it.
    #[serde(rename = "severe", alias = "grave")]
    Severe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evacuation {
    #[serde(rename = "none", alias = "no")]
    NotNeeded,
    #[serde(rename = "preventive", alias = "preventiva")]
    Preventive,
    #[serde(rename = "immediate", alias = "inmediata")]
    Immediate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VehicularAccess {
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "difficult", alias = "dificultoso")]
    Difficult,
    #[serde(rename = "blocked", alias = "bloqueado")]
    Blocked,
}

/// Civil-defense questionnaire. Structural damage and evacuation need are
/// required; unanswered vehicular access counts as normal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CivilDefenseAnswers {
    pub event_type: Option<String>,
    pub structural_damage: Option<StructuralDamage>,
    #[serde(alias = "evacuation_need")]
    pub evacuation: Option<Evacuation>,
    pub vehicular_access: Option<VehicularAccess>,
    pub affected_people: Option<u32>,
    pub evacuated_people: Option<u32>,
    pub services_affected: String,
    pub resources_needed: String,
    pub coordination: String,
    pub notes: String,
}

impl Evaluator for CivilDefenseAnswers {
    const CATEGORY: EmergencyCategory = EmergencyCategory::CivilDefense;
    const DISPATCH_THRESHOLD: Priority = Priority::HIGH;

    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        require(&mut missing, "structural_damage", &self.structural_damage);
        require(&mut missing, "evacuation", &self.evacuation);
        missing
    }

    fn tier(&self) -> Priority {
        let many_affected = self
            .affected_people
            .is_some_and(|n| n > AFFECTED_PEOPLE_ESCALATION);

        if self.structural_damage == Some(StructuralDamage::Severe)
            || self.evacuation == Some(Evacuation::Immediate)
        {
            Priority::CRITICAL
        } else if self.structural_damage == Some(StructuralDamage::Major)
            || self.evacuation == Some(Evacuation::Preventive)
            || self.vehicular_access == Some(VehicularAccess::Blocked)
        {
            Priority::HIGH
        } else if self.structural_damage == Some(StructuralDamage::Minor)
            || self.vehicular_access == Some(VehicularAccess::Difficult)
            || many_affected
        {
            Priority::MEDIUM
        } else {
            Priority::LOW
        }
    }
}
