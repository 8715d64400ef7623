use super::{require, Answer, Evaluator, Priority};
use category_registry::EmergencyCategory;
use serde::{Deserialize, Serialize};

/// Where the fire is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireKind {
    #[serde(alias = "domicilio", alias = "house")]
    Residence,
    #[serde(alias = "via_publica")]
    PublicRoad,
    #[serde(alias = "vehiculo")]
    Vehicle,
    #[serde(alias = "otro")]
    Other,
}

/// Fire questionnaire. Fire type and trapped people are required; an
/// unanswered hazmat question counts as no.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FireAnswers {
    #[serde(alias = "type")]
    pub fire_type: Option<FireKind>,
    pub trapped: Option<Answer>,
    /// Explosives or hazardous materials on site.
    pub hazmat: Option<Answer>,
    pub hydrants_nearby: Option<Answer>,
    pub extent: String,
    pub materials: String,
    pub wind_direction: String,
    pub access: String,
    pub notes: String,
}

impl Evaluator for FireAnswers {
    const CATEGORY: EmergencyCategory = EmergencyCategory::Fire;
    const DISPATCH_THRESHOLD: Priority = Priority::HIGH;

    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        require(&mut missing, "fire_type", &self.fire_type);
        require(&mut missing, "trapped", &self.trapped);
        missing
    }

    /// Without trapped people or hazmat only a residence ranks above low; a
    /// vehicle fire with both answered "no" stays at priority 4.
    fn tier(&self) -> Priority {
        let at_residence = self.fire_type == Some(FireKind::Residence);

        if self.trapped == Some(Answer::Yes) || self.hazmat == Some(Answer::Yes) {
            Priority::CRITICAL
        } else if at_residence && self.trapped == Some(Answer::Unknown) {
            Priority::HIGH
        } else if at_residence {
            Priority::MEDIUM
        } else {
            Priority::LOW
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers(kind: FireKind, trapped: Answer, hazmat: Option<Answer>) -> FireAnswers {
        FireAnswers {
            fire_type: Some(kind),
            trapped: Some(trapped),
            hazmat,
            ..FireAnswers::default()
        }
    }

    #[test]
    fn trapped_people_or_hazmat_are_critical_anywhere() {
        for kind in [FireKind::Residence, FireKind::PublicRoad, FireKind::Vehicle, FireKind::Other] {
            let evaluation = answers(kind, Answer::Yes, None).evaluate().expect("complete");
            assert_eq!(evaluation.priority, Priority::CRITICAL);
            assert!(evaluation.recommend_dispatch);
            assert_eq!(
                answers(kind, Answer::No, Some(Answer::Yes)).tier(),
                Priority::CRITICAL
            );
        }
    }

    #[test]
    fn unknown_trapped_only_escalates_at_a_residence() {
        let evaluation = answers(FireKind::Residence, Answer::Unknown, Some(Answer::No))
            .evaluate()
            .expect("complete");
        assert_eq!(evaluation.priority, Priority::HIGH);
        assert!(evaluation.recommend_dispatch);

        assert_eq!(
            answers(FireKind::PublicRoad, Answer::Unknown, None).tier(),
            Priority::LOW
        );
        assert_eq!(
            answers(FireKind::Vehicle, Answer::Unknown, Some(Answer::Unknown)).tier(),
            Priority::LOW
        );
    }

    #[test]
    fn residence_fire_without_escalation_is_medium() {
        let evaluation = answers(FireKind::Residence, Answer::No, Some(Answer::No))
            .evaluate()
            .expect("complete");
        assert_eq!(evaluation.priority, Priority::MEDIUM);
        assert!(!evaluation.recommend_dispatch);
    }

    #[test]
    fn vehicle_fire_with_no_escalation_falls_through() {
        let evaluation = answers(FireKind::Vehicle, Answer::No, Some(Answer::No))
            .evaluate()
            .expect("complete");
        assert_eq!(evaluation.priority, Priority::LOW);
        assert!(!evaluation.recommend_dispatch);
    }

    #[test]
    fn type_and_trapped_are_required() {
        let err = FireAnswers::default().evaluate().expect_err("incomplete");
        assert_eq!(err.missing, vec!["fire_type", "trapped"]);

        let err = FireAnswers {
            fire_type: Some(FireKind::Other),
            hazmat: Some(Answer::Yes),
            ..FireAnswers::default()
        }
        .evaluate()
        .expect_err("incomplete");
        assert_eq!(err.missing, vec!["trapped"]);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let input = answers(FireKind::Residence, Answer::Unknown, None);
        let first = input.evaluate();
        for _ in 0..10 {
            assert_eq!(input.clone().evaluate(), first);
        }
    }
}
