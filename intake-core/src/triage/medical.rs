use super::{require, Evaluator, Priority};
use category_registry::{EmergencyCategory, MedicalReceiver};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consciousness {
    /// Conscious and able to speak.
    #[serde(alias = "si", alias = "yes")]
    Alert,
    #[serde(alias = "confundido")]
    Confused,
    #[serde(alias = "no")]
    Unresponsive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Breathing {
    #[serde(alias = "si", alias = "yes")]
    Normal,
    #[serde(alias = "dificultad")]
    Difficulty,
    #[serde(alias = "no")]
    Absent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pulse {
    #[serde(alias = "si", alias = "yes")]
    Normal,
    #[serde(alias = "alterado")]
    Altered,
    #[serde(alias = "no")]
    Absent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bleeding {
    #[serde(rename = "none", alias = "no")]
    Absent,
    #[serde(rename = "mild", alias = "leve")]
    Mild,
    #[serde(rename = "severe", alias = "abundante")]
    Severe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChestPain {
    #[serde(rename = "none", alias = "no")]
    Absent,
    #[serde(rename = "mild", alias = "leve")]
    Mild,
    #[serde(rename = "intense", alias = "intenso")]
    Intense,
}

/// Medical questionnaire. Consciousness, breathing, pulse and bleeding are
/// required; an unanswered chest-pain question counts as no pain.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedicalAnswers {
    pub consciousness: Option<Consciousness>,
    pub breathing: Option<Breathing>,
    pub pulse: Option<Pulse>,
    pub bleeding: Option<Bleeding>,
    pub chest_pain: Option<ChestPain>,
    pub approximate_age: Option<u16>,
    pub sex: Option<String>,
    pub symptoms: String,
    pub history: String,
    pub medications: String,
    pub notes: String,
    pub receiver: MedicalReceiver,
}

impl Evaluator for MedicalAnswers {
    const CATEGORY: EmergencyCategory = EmergencyCategory::Medical;
    const DISPATCH_THRESHOLD: Priority = Priority::HIGH;

    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        require(&mut missing, "consciousness", &self.consciousness);
        require(&mut missing, "breathing", &self.breathing);
        require(&mut missing, "pulse", &self.pulse);
        require(&mut missing, "bleeding", &self.bleeding);
        missing
    }

    fn tier(&self) -> Priority {
        if self.consciousness == Some(Consciousness::Unresponsive)
            || self.breathing == Some(Breathing::Absent)
            || self.pulse == Some(Pulse::Absent)
            || self.bleeding == Some(Bleeding::Severe)
        {
            Priority::CRITICAL
        } else if self.consciousness == Some(Consciousness::Confused)
            || self.breathing == Some(Breathing::Difficulty)
            || self.pulse == Some(Pulse::Altered)
            || self.chest_pain == Some(ChestPain::Intense)
        {
            Priority::HIGH
        } else if self.chest_pain == Some(ChestPain::Mild) || self.bleeding == Some(Bleeding::Mild) {
            Priority::MEDIUM
        } else {
            Priority::LOW
        }
    }
}
