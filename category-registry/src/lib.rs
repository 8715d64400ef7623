use serde::{Deserialize, Serialize};
use std::fmt;

/// Emergency categories an operator can open a call under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyCategory {
    #[serde(alias = "MEDICA")]
    Medical,
    #[serde(alias = "BOMBEROS")]
    Fire,
    #[serde(alias = "DEFENSA_CIVIL")]
    CivilDefense,
    #[serde(alias = "SEGURIDAD")]
    Security,
    #[serde(alias = "GENERAL")]
    General,
}

/// Seed order for the reference table.
pub const CATEGORIES: [EmergencyCategory; 5] = [
    EmergencyCategory::Medical,
    EmergencyCategory::Fire,
    EmergencyCategory::CivilDefense,
    EmergencyCategory::Security,
    EmergencyCategory::General,
];

impl EmergencyCategory {
    pub fn code(self) -> &'static str {
        match self {
            Self::Medical => "MEDICA",
            Self::Fire => "BOMBEROS",
            Self::CivilDefense => "DEFENSA_CIVIL",
            Self::Security => "SEGURIDAD",
            Self::General => "GENERAL",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Medical => "Emergencia Médica",
            Self::Fire => "Bomberos",
            Self::CivilDefense => "Defensa Civil",
            Self::Security => "Seguridad Ciudadana",
            Self::General => "Llamada General",
        }
    }

    /// Default ordering weight of the category on the operator board.
    pub fn default_weight(self) -> u8 {
        match self {
            Self::Medical => 1,
            Self::Fire => 2,
            Self::CivilDefense => 3,
            Self::Security => 4,
            Self::General => 5,
        }
    }

    /// Whether calls of this category go through a triage questionnaire.
    pub fn requires_triage(self) -> bool {
        !matches!(self, Self::General)
    }

    pub fn from_code(code: &str) -> Result<Self, String> {
        let normalized = code.trim().to_uppercase();
        CATEGORIES
            .into_iter()
            .find(|c| c.code() == normalized)
            .ok_or_else(|| format!("unknown emergency category code '{}'", code.trim()))
    }
}

impl fmt::Display for EmergencyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Receiving center a medical case is routed to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicalReceiver {
    #[default]
    #[serde(alias = "DEMVA")]
    Demva,
    #[serde(alias = "CEC")]
    Cec,
}

impl MedicalReceiver {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Demva => "DEMVA",
            Self::Cec => "CEC",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        match tag.trim().to_uppercase().as_str() {
            "DEMVA" => Ok(Self::Demva),
            "CEC" => Ok(Self::Cec),
            other => Err(format!("unknown medical receiver '{other}'")),
        }
    }
}

/// Key under which responder phone targets are configured.
///
/// Medical calls are keyed by receiving center; every other category that
/// notifies is keyed by its own code. General calls never notify.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResponderKey {
    Medical(MedicalReceiver),
    Category(EmergencyCategory),
}

impl ResponderKey {
    pub fn for_call(
        category: EmergencyCategory,
        receiver: Option<MedicalReceiver>,
    ) -> Option<Self> {
        match category {
            EmergencyCategory::General => None,
            EmergencyCategory::Medical => Some(Self::Medical(receiver.unwrap_or_default())),
            other => Some(Self::Category(other)),
        }
    }

    pub fn code(&self) -> String {
        match self {
            Self::Medical(receiver) => format!("MEDICA_{}", receiver.tag()),
            Self::Category(category) => category.code().to_string(),
        }
    }
}

/// Checks a responder configuration key before it is accepted into config.
pub fn validate_responder_key(key: &str) -> Result<ResponderKey, String> {
    let key = key.trim().to_uppercase();
    if let Some(tag) = key.strip_prefix("MEDICA_") {
        return MedicalReceiver::from_tag(tag).map(ResponderKey::Medical);
    }
    match EmergencyCategory::from_code(&key)? {
        EmergencyCategory::General => Err("general calls have no responder targets".into()),
        EmergencyCategory::Medical => Err("medical targets must name a receiver (MEDICA_DEMVA or MEDICA_CEC)".into()),
        category => Ok(ResponderKey::Category(category)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_from_code() {
        for category in CATEGORIES {
            assert_eq!(EmergencyCategory::from_code(category.code()), Ok(category));
        }
        assert!(EmergencyCategory::from_code("police").is_err());
        assert_eq!(
            EmergencyCategory::from_code(" bomberos "),
            Ok(EmergencyCategory::Fire)
        );
    }

    #[test]
    fn general_is_the_only_untriaged_category() {
        let untriaged = CATEGORIES
            .into_iter()
            .filter(|c| !c.requires_triage())
            .collect::<Vec<_>>();
        assert_eq!(untriaged, vec![EmergencyCategory::General]);
    }

    #[test]
    fn medical_responder_key_defaults_to_demva() {
        let key = ResponderKey::for_call(EmergencyCategory::Medical, None).expect("key");
        assert_eq!(key.code(), "MEDICA_DEMVA");
        let key = ResponderKey::for_call(EmergencyCategory::Medical, Some(MedicalReceiver::Cec))
            .expect("key");
        assert_eq!(key.code(), "MEDICA_CEC");
        assert!(ResponderKey::for_call(EmergencyCategory::General, None).is_none());
    }

    #[test]
    fn responder_keys_are_distinct_per_receiver() {
        let keys: std::collections::HashSet<ResponderKey> = [
            ResponderKey::Medical(MedicalReceiver::Demva),
            ResponderKey::Medical(MedicalReceiver::Cec),
            ResponderKey::Medical(MedicalReceiver::default()),
            ResponderKey::Category(EmergencyCategory::Fire),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn validates_responder_keys() {
        assert_eq!(
            validate_responder_key("bomberos"),
            Ok(ResponderKey::Category(EmergencyCategory::Fire))
        );
        assert_eq!(
            validate_responder_key("MEDICA_CEC"),
            Ok(ResponderKey::Medical(MedicalReceiver::Cec))
        );
        assert!(validate_responder_key("MEDICA").is_err());
        assert!(validate_responder_key("GENERAL").is_err());
        assert!(validate_responder_key("MEDICA_XYZ").is_err());
    }

    #[test]
    fn accepts_legacy_codes_when_deserializing() {
        let category: EmergencyCategory = serde_json::from_str("\"DEFENSA_CIVIL\"").expect("json");
        assert_eq!(category, EmergencyCategory::CivilDefense);
        let category: EmergencyCategory = serde_json::from_str("\"security\"").expect("json");
        assert_eq!(category, EmergencyCategory::Security);
    }
}
