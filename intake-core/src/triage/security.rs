use super::{require, Answer, Evaluator, Priority};
use category_registry::EmergencyCategory;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    #[serde(alias = "robo", alias = "Robo/Hurto")]
    Theft,
    #[serde(alias = "violencia_domestica", alias = "Violencia doméstica")]
    DomesticViolence,
    #[serde(alias = "accidente_transito", alias = "Accidente de tránsito")]
    TrafficAccident,
    #[serde(alias = "disturbios", alias = "Disturbios/Peleas")]
    Disturbance,
    #[serde(alias = "vandalismo", alias = "Vandalismo")]
    Vandalism,
    #[serde(alias = "persona_sospechosa", alias = "Persona sospechosa")]
    SuspiciousPerson,
    #[serde(alias = "vehiculo_abandonado")]
    AbandonedVehicle,
    #[serde(alias = "ruidos_molestos")]
    NoiseComplaint,
    #[serde(alias = "denuncia_vecinal")]
    NeighborComplaint,
    #[serde(alias = "otro")]
    Other,
}

impl IncidentType {
    fn is_high(self) -> bool {
        matches!(
            self,
            Self::Theft | Self::DomesticViolence | Self::TrafficAccident
        )
    }

    fn is_medium(self) -> bool {
        matches!(
            self,
            Self::Disturbance | Self::Vandalism | Self::SuspiciousPerson
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Injuries {
    #[serde(rename = "none", alias = "no")]
    Absent,
    #[serde(rename = "minor", alias = "leves")]
    Minor,
    #[serde(rename = "severe", alias = "graves")]
    Severe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Armed {
    No,
    #[serde(alias = "desconocido")]
    Unknown,
    /// Armed, weapon not specified.
    #[serde(alias = "si")]
    Yes,
    #[serde(alias = "arma_fuego")]
    Firearm,
    #[serde(alias = "arma_blanca")]
    Blade,
}

impl Armed {
    pub fn is_armed(self) -> bool {
        matches!(self, Self::Yes | Self::Firearm | Self::Blade)
    }
}

/// Citizen-security questionnaire. Incident type, injuries and aggressor
/// presence are required; the remaining discrete answers count as no when
/// unanswered.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityAnswers {
    pub incident_type: Option<IncidentType>,
    pub injuries: Option<Injuries>,
    pub aggressor_present: Option<Answer>,
    pub aggressor_armed: Option<Armed>,
    pub witnesses: Option<Answer>,
    pub immediate_danger: Option<Answer>,
    pub needs_ambulance: Option<Answer>,
    pub needs_fire_brigade: Option<Answer>,
    pub vehicles_involved: String,
    pub notes: String,
}

impl Evaluator for SecurityAnswers {
    const CATEGORY: EmergencyCategory = EmergencyCategory::Security;
    const DISPATCH_THRESHOLD: Priority = Priority::MEDIUM;

    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        require(&mut missing, "incident_type", &self.incident_type);
        require(&mut missing, "injuries", &self.injuries);
        require(&mut missing, "aggressor_present", &self.aggressor_present);
        missing
    }

    fn tier(&self) -> Priority {
        let aggressor_present = self.aggressor_present == Some(Answer::Yes);
        let armed = self.aggressor_armed.is_some_and(Armed::is_armed);

        if self.injuries == Some(Injuries::Severe)
            || (aggressor_present && armed)
            || self.immediate_danger == Some(Answer::Yes)
        {
            Priority::CRITICAL
        } else if self.injuries == Some(Injuries::Minor)
            || aggressor_present
            || self.incident_type.is_some_and(IncidentType::is_high)
        {
            Priority::HIGH
        } else if self.incident_type.is_some_and(IncidentType::is_medium)
            || self.witnesses == Some(Answer::Yes)
        {
            Priority::MEDIUM
        } else {
            Priority::LOW
        }
    }
}
