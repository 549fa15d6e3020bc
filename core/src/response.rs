use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domains::Domain;
use crate::factors::FactorCode;

/// The six canonical response formats. The UI binds to these names directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    ClarifyingQuestion,
    GentleReflection,
    ConcreteNextStep,
    OptionComparison,
    EscalationSupport,
    PatternRecall,
}

/// 0–3 scale from normal response to crisis flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTier {
    None,
    SoftSupport,
    DirectedSupport,
    Crisis,
}

impl EscalationTier {
    pub fn level(self) -> u8 {
        match self {
            EscalationTier::None => 0,
            EscalationTier::SoftSupport => 1,
            EscalationTier::DirectedSupport => 2,
            EscalationTier::Crisis => 3,
        }
    }
}

/// Action chips offered under a response. At most three per response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChipKind {
    GetSupport,
    Clarify,
    Save,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Chip {
    pub kind: ChipKind,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatusLineKind {
    Saved,
    NotMedicalAdvice,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusLine {
    pub kind: StatusLineKind,
    pub text: String,
}

/// Secondary add-ons layered onto a response, independent of tier and shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AddOn {
    PatternRecall,
    MemoryFooter,
    SoftSupportPrompt,
}

/// Transparency payload: which stored facts shaped this response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FactorChip {
    pub code: FactorCode,
    pub domain: Domain,
    pub label: String,
    pub confidence: f64,
}

/// User-togglable response controls.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResponseControls {
    /// Expand the "why am I seeing this" factor chips
    pub show_why: bool,
    /// Offer saving this entry to the journal
    pub save_to_journal: bool,
    /// Let the user pause clarifying questions for today
    pub pause_followups: bool,
}

/// The outward response contract handed to the presentation layer.
/// Field names and the closed enumerations above are a stability contract.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResponseModel {
    pub shape: ResponseShape,
    pub escalation_tier: EscalationTier,
    /// Short acknowledgement of what was understood/saved
    pub confirmation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_plan: Option<String>,
    /// Present from tier 2 upward: who to reach and when
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_net: Option<String>,
    /// What matters most right now, at most 3 entries
    pub what_matters: Vec<String>,
    /// At most 3; overflow drops in priority order [get_support, clarify, save]
    pub chips: Vec<Chip>,
    pub status_lines: Vec<StatusLine>,
    pub add_ons: Vec<AddOn>,
    pub factor_chips: Vec<FactorChip>,
    pub controls: ResponseControls,
    /// Populated by the pattern_recall add-on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remembered_summary: Option<String>,
}

/// Situational signal set consumed by the response selector. Derived from the
/// raw text and the decision engine's output, but distinct from both.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SituationalSignals {
    pub intent_type: SignalIntent,
    pub emotional_load: SignalLevel,
    pub time_pressure: SignalLevel,
    pub complexity: ComplexityLevel,
    pub agency: Agency,
    /// Resource/access constraints are in play
    pub social_determinants: bool,
    pub risk_flags: Vec<RiskFlag>,
    pub recurrence: Recurrence,
    /// Stored profile facts or insights informed this response
    pub memory_used: bool,
    /// "still stuck", "keeps happening" phrasing present
    pub stuckness: bool,
    /// "no one to talk to", "can't cope" phrasing present
    pub isolation: bool,
    /// At least two distinguishable alternatives appear in the text
    pub alternatives_present: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SignalIntent {
    Question,
    Uncertainty,
    Reflection,
    Request,
    Statement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SignalLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Simple,
    Compound,
    Systemic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Agency {
    CanActNow,
    Limited,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    SelfHarm,
    HarmToOthers,
    ImminentDanger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    None,
    Occasional,
    Frequent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_tiers_are_ordered_zero_to_three() {
        assert_eq!(EscalationTier::None.level(), 0);
        assert_eq!(EscalationTier::SoftSupport.level(), 1);
        assert_eq!(EscalationTier::DirectedSupport.level(), 2);
        assert_eq!(EscalationTier::Crisis.level(), 3);
        assert!(EscalationTier::Crisis > EscalationTier::None);
    }

    #[test]
    fn shape_wire_format() {
        assert_eq!(
            serde_json::to_string(&ResponseShape::GentleReflection).unwrap(),
            "\"gentle_reflection\""
        );
        assert_eq!(
            serde_json::to_string(&ResponseShape::EscalationSupport).unwrap(),
            "\"escalation_support\""
        );
    }

    #[test]
    fn risk_flag_wire_format() {
        assert_eq!(
            serde_json::to_string(&RiskFlag::SelfHarm).unwrap(),
            "\"self_harm\""
        );
    }
}
