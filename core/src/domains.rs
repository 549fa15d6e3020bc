use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The thirteen life/health domains used to classify input text.
///
/// The set is closed. Every domain carries a fixed priority (1 = highest);
/// classification tie-breaks and constraint ranking both read this table,
/// so adding a variant means updating `priority` and the factor-code map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    SafetyRisk,
    SymptomsBodySignals,
    MedicalContext,
    MentalEmotionalState,
    DurationPattern,
    CapacityEnergy,
    AccessToCare,
    EnvironmentExposures,
    SocialSupportContext,
    ResourcesConstraints,
    KnowledgeBeliefsPreferences,
    GoalsIntent,
    UnknownOther,
}

impl Domain {
    pub const ALL: [Domain; 13] = [
        Domain::SafetyRisk,
        Domain::SymptomsBodySignals,
        Domain::MedicalContext,
        Domain::MentalEmotionalState,
        Domain::DurationPattern,
        Domain::CapacityEnergy,
        Domain::AccessToCare,
        Domain::EnvironmentExposures,
        Domain::SocialSupportContext,
        Domain::ResourcesConstraints,
        Domain::KnowledgeBeliefsPreferences,
        Domain::GoalsIntent,
        Domain::UnknownOther,
    ];

    /// Fixed priority, 1 = highest. Lower number wins classification ties.
    pub fn priority(self) -> u8 {
        match self {
            Domain::SafetyRisk => 1,
            Domain::SymptomsBodySignals => 2,
            Domain::MedicalContext => 3,
            Domain::MentalEmotionalState => 4,
            Domain::DurationPattern => 5,
            Domain::CapacityEnergy => 6,
            Domain::AccessToCare => 7,
            Domain::EnvironmentExposures => 8,
            Domain::SocialSupportContext => 9,
            Domain::ResourcesConstraints => 10,
            Domain::KnowledgeBeliefsPreferences => 11,
            Domain::GoalsIntent => 12,
            Domain::UnknownOther => 13,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::SafetyRisk => "safety_risk",
            Domain::SymptomsBodySignals => "symptoms_body_signals",
            Domain::MedicalContext => "medical_context",
            Domain::MentalEmotionalState => "mental_emotional_state",
            Domain::DurationPattern => "duration_pattern",
            Domain::CapacityEnergy => "capacity_energy",
            Domain::AccessToCare => "access_to_care",
            Domain::EnvironmentExposures => "environment_exposures",
            Domain::SocialSupportContext => "social_support_context",
            Domain::ResourcesConstraints => "resources_constraints",
            Domain::KnowledgeBeliefsPreferences => "knowledge_beliefs_preferences",
            Domain::GoalsIntent => "goals_intent",
            Domain::UnknownOther => "unknown_other",
        }
    }

    pub fn parse(value: &str) -> Option<Domain> {
        Domain::ALL.into_iter().find(|d| d.as_str() == value)
    }

    /// Domains where responses must carry the "not medical advice" status line.
    pub fn touches_health(self) -> bool {
        matches!(
            self,
            Domain::SafetyRisk
                | Domain::SymptomsBodySignals
                | Domain::MedicalContext
                | Domain::MentalEmotionalState
                | Domain::DurationPattern
        )
    }
}

/// A domain paired with the classifier's confidence in it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DomainTag {
    pub domain: Domain,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

/// Result of classifying one entry. Exactly one per entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DomainClassification {
    pub primary: DomainTag,
    /// Other matches above the secondary floor, confidence-descending, capped at 3.
    pub secondary: Vec<DomainTag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// True when the local safety matcher forced `primary` to safety_risk.
    /// Later stages re-check this rather than trusting any single layer.
    pub safety_override: bool,
}

impl DomainClassification {
    pub fn is_safety(&self) -> bool {
        self.safety_override || self.primary.domain == Domain::SafetyRisk
    }
}

#[cfg(test)]
mod tests {
    use super::Domain;

    #[test]
    fn priorities_cover_one_to_thirteen_uniquely() {
        let mut priorities: Vec<u8> = Domain::ALL.iter().map(|d| d.priority()).collect();
        priorities.sort_unstable();
        assert_eq!(priorities, (1..=13).collect::<Vec<u8>>());
    }

    #[test]
    fn safety_risk_has_highest_priority() {
        for domain in Domain::ALL {
            if domain != Domain::SafetyRisk {
                assert!(domain.priority() > Domain::SafetyRisk.priority());
            }
        }
    }

    #[test]
    fn as_str_parse_roundtrip() {
        for domain in Domain::ALL {
            assert_eq!(Domain::parse(domain.as_str()), Some(domain));
        }
        assert_eq!(Domain::parse("weather"), None);
    }

    #[test]
    fn wire_format_is_snake_case() {
        let json = serde_json::to_string(&Domain::MentalEmotionalState).unwrap();
        assert_eq!(json, "\"mental_emotional_state\"");
    }
}
