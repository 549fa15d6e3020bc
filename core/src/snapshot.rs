use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entries::EntryIntent;
use crate::factors::{FactorCode, MissingInfoKey, SymptomKey};

/// Severity of the situation described by an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Low,
    Moderate,
    High,
    Urgent,
}

/// How much structural friction (access, cost, logistics) stands in the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FrictionBand {
    Low,
    Moderate,
    High,
}

/// How confident the engine is in what it extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UncertaintyBand {
    Low,
    Moderate,
    High,
}

/// What the engine decided to do next for this entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NextActionKind {
    Answer,
    AskFollowup,
    LogOnly,
    SafetyEscalation,
}

/// One immutable decision record per entry. Pure function of the entry, its
/// classification, the extracted payload, the profile, and follow-up state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StateSnapshot {
    pub entry_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub intent: EntryIntent,
    pub risk_band: RiskBand,
    pub friction_band: FrictionBand,
    pub uncertainty_band: UncertaintyBand,
    pub next_action: NextActionKind,
    /// Ordered highlights, deduplicated, at most 3.
    pub what_matters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followup_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_copy: Option<String>,
    /// Provenance: the factor codes this decision read.
    pub used_factors: Vec<FactorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symptom_key: Option<SymptomKey>,
    /// Clarifying questions already asked today, including this one if asked.
    pub follow_up_count: u8,
}

/// An active clarifying question awaiting its answer entry.
/// Resolved when the answer arrives or when the daily cap is reached.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingFollowUp {
    pub id: Uuid,
    pub parent_entry_id: Uuid,
    pub question: String,
    pub missing_info_key: MissingInfoKey,
    pub created_at: DateTime<Utc>,
    pub follow_up_count: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symptom_key: Option<SymptomKey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_order_by_severity() {
        assert!(RiskBand::Urgent > RiskBand::High);
        assert!(RiskBand::High > RiskBand::Moderate);
        assert!(RiskBand::Moderate > RiskBand::Low);
        assert!(UncertaintyBand::High > UncertaintyBand::Low);
        assert!(FrictionBand::High > FrictionBand::Moderate);
    }

    #[test]
    fn next_action_wire_format() {
        assert_eq!(
            serde_json::to_string(&NextActionKind::SafetyEscalation).unwrap(),
            "\"safety_escalation\""
        );
        assert_eq!(
            serde_json::to_string(&NextActionKind::AskFollowup).unwrap(),
            "\"ask_followup\""
        );
    }
}
