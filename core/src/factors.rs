use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domains::Domain;

/// Whether a fact describes something the user chose, something that happened
/// to them, or a choice made under constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    Choice,
    Chance,
    ConstrainedChoice,
}

impl FactorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FactorKind::Choice => "choice",
            FactorKind::Chance => "chance",
            FactorKind::ConstrainedChoice => "constrained_choice",
        }
    }

    pub fn parse(value: &str) -> Option<FactorKind> {
        match value {
            "choice" => Some(FactorKind::Choice),
            "chance" => Some(FactorKind::Chance),
            "constrained_choice" => Some(FactorKind::ConstrainedChoice),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimeHorizon {
    Acute,
    Chronic,
    LifeCourse,
    Unknown,
}

impl TimeHorizon {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeHorizon::Acute => "acute",
            TimeHorizon::Chronic => "chronic",
            TimeHorizon::LifeCourse => "life_course",
            TimeHorizon::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<TimeHorizon> {
        match value {
            "acute" => Some(TimeHorizon::Acute),
            "chronic" => Some(TimeHorizon::Chronic),
            "life_course" => Some(TimeHorizon::LifeCourse),
            "unknown" => Some(TimeHorizon::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Modifiability {
    High,
    Medium,
    Low,
    Unknown,
}

impl Modifiability {
    pub fn as_str(self) -> &'static str {
        match self {
            Modifiability::High => "high",
            Modifiability::Medium => "medium",
            Modifiability::Low => "low",
            Modifiability::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Modifiability> {
        match value {
            "high" => Some(Modifiability::High),
            "medium" => Some(Modifiability::Medium),
            "low" => Some(Modifiability::Low),
            "unknown" => Some(Modifiability::Unknown),
            _ => None,
        }
    }
}

/// Typed factor value. Untagged on the wire: `true`, `3.5`, or `"text"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum FactorValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// The closed set of canonical factor identifiers.
///
/// Every code maps to exactly one domain, a fixed set of allowed kinds, and
/// default horizon/modifiability used when the extractor has no better
/// evidence. Codes arriving from the oracle that are not in this set are
/// quarantined at ingestion, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FactorCode {
    AcuteRiskLanguage,
    RecurringSymptom,
    AcuteSymptom,
    ChronicCondition,
    MedicationBurden,
    AwaitingDiagnosis,
    LowMood,
    AnxietyLoad,
    EmotionalOverwhelm,
    LongDuration,
    SymptomRecurrence,
    LowEnergy,
    TimeScarcity,
    CareAccessBarrier,
    NoRegularProvider,
    CostBarrier,
    EnvironmentalExposure,
    SocialIsolation,
    CaregiverLoad,
    FinancialStrain,
    HousingInstability,
    InformationGap,
    TreatmentHesitancy,
    ImprovementGoal,
    HabitIntent,
    UnclassifiedNote,
}

impl FactorCode {
    pub const ALL: [FactorCode; 26] = [
        FactorCode::AcuteRiskLanguage,
        FactorCode::RecurringSymptom,
        FactorCode::AcuteSymptom,
        FactorCode::ChronicCondition,
        FactorCode::MedicationBurden,
        FactorCode::AwaitingDiagnosis,
        FactorCode::LowMood,
        FactorCode::AnxietyLoad,
        FactorCode::EmotionalOverwhelm,
        FactorCode::LongDuration,
        FactorCode::SymptomRecurrence,
        FactorCode::LowEnergy,
        FactorCode::TimeScarcity,
        FactorCode::CareAccessBarrier,
        FactorCode::NoRegularProvider,
        FactorCode::CostBarrier,
        FactorCode::EnvironmentalExposure,
        FactorCode::SocialIsolation,
        FactorCode::CaregiverLoad,
        FactorCode::FinancialStrain,
        FactorCode::HousingInstability,
        FactorCode::InformationGap,
        FactorCode::TreatmentHesitancy,
        FactorCode::ImprovementGoal,
        FactorCode::HabitIntent,
        FactorCode::UnclassifiedNote,
    ];

    pub fn domain(self) -> Domain {
        match self {
            FactorCode::AcuteRiskLanguage => Domain::SafetyRisk,
            FactorCode::RecurringSymptom | FactorCode::AcuteSymptom => Domain::SymptomsBodySignals,
            FactorCode::ChronicCondition
            | FactorCode::MedicationBurden
            | FactorCode::AwaitingDiagnosis => Domain::MedicalContext,
            FactorCode::LowMood | FactorCode::AnxietyLoad | FactorCode::EmotionalOverwhelm => {
                Domain::MentalEmotionalState
            }
            FactorCode::LongDuration | FactorCode::SymptomRecurrence => Domain::DurationPattern,
            FactorCode::LowEnergy | FactorCode::TimeScarcity => Domain::CapacityEnergy,
            FactorCode::CareAccessBarrier
            | FactorCode::NoRegularProvider
            | FactorCode::CostBarrier => Domain::AccessToCare,
            FactorCode::EnvironmentalExposure => Domain::EnvironmentExposures,
            FactorCode::SocialIsolation | FactorCode::CaregiverLoad => {
                Domain::SocialSupportContext
            }
            FactorCode::FinancialStrain | FactorCode::HousingInstability => {
                Domain::ResourcesConstraints
            }
            FactorCode::InformationGap | FactorCode::TreatmentHesitancy => {
                Domain::KnowledgeBeliefsPreferences
            }
            FactorCode::ImprovementGoal | FactorCode::HabitIntent => Domain::GoalsIntent,
            FactorCode::UnclassifiedNote => Domain::UnknownOther,
        }
    }

    /// Factor kinds this code may be committed as. The extractor drops
    /// candidates whose kind is not in this list.
    pub fn allowed_kinds(self) -> &'static [FactorKind] {
        match self {
            FactorCode::AcuteRiskLanguage
            | FactorCode::RecurringSymptom
            | FactorCode::AcuteSymptom
            | FactorCode::ChronicCondition
            | FactorCode::AwaitingDiagnosis
            | FactorCode::LowMood
            | FactorCode::AnxietyLoad
            | FactorCode::EmotionalOverwhelm
            | FactorCode::LongDuration
            | FactorCode::SymptomRecurrence
            | FactorCode::LowEnergy
            | FactorCode::EnvironmentalExposure
            | FactorCode::SocialIsolation
            | FactorCode::HousingInstability => &[FactorKind::Chance],
            FactorCode::MedicationBurden
            | FactorCode::CareAccessBarrier
            | FactorCode::FinancialStrain => &[FactorKind::Chance, FactorKind::ConstrainedChoice],
            FactorCode::TimeScarcity
            | FactorCode::NoRegularProvider
            | FactorCode::CostBarrier
            | FactorCode::CaregiverLoad => &[FactorKind::ConstrainedChoice],
            FactorCode::InformationGap
            | FactorCode::TreatmentHesitancy
            | FactorCode::ImprovementGoal
            | FactorCode::HabitIntent => &[FactorKind::Choice],
            FactorCode::UnclassifiedNote => &[FactorKind::Choice, FactorKind::Chance],
        }
    }

    /// Horizon assumed when the extractor has no explicit duration evidence.
    pub fn default_time_horizon(self) -> TimeHorizon {
        match self {
            FactorCode::AcuteRiskLanguage
            | FactorCode::AcuteSymptom
            | FactorCode::AwaitingDiagnosis
            | FactorCode::LowMood
            | FactorCode::AnxietyLoad
            | FactorCode::EmotionalOverwhelm
            | FactorCode::LowEnergy
            | FactorCode::HousingInstability
            | FactorCode::InformationGap
            | FactorCode::ImprovementGoal => TimeHorizon::Acute,
            FactorCode::RecurringSymptom
            | FactorCode::MedicationBurden
            | FactorCode::LongDuration
            | FactorCode::SymptomRecurrence
            | FactorCode::TimeScarcity
            | FactorCode::CareAccessBarrier
            | FactorCode::NoRegularProvider
            | FactorCode::CostBarrier
            | FactorCode::EnvironmentalExposure
            | FactorCode::SocialIsolation
            | FactorCode::CaregiverLoad
            | FactorCode::FinancialStrain
            | FactorCode::TreatmentHesitancy
            | FactorCode::HabitIntent => TimeHorizon::Chronic,
            FactorCode::ChronicCondition => TimeHorizon::LifeCourse,
            FactorCode::UnclassifiedNote => TimeHorizon::Unknown,
        }
    }

    pub fn default_modifiability(self) -> Modifiability {
        match self {
            FactorCode::AcuteRiskLanguage
            | FactorCode::ChronicCondition
            | FactorCode::AwaitingDiagnosis
            | FactorCode::LongDuration
            | FactorCode::SymptomRecurrence
            | FactorCode::CareAccessBarrier
            | FactorCode::CostBarrier
            | FactorCode::EnvironmentalExposure
            | FactorCode::CaregiverLoad
            | FactorCode::FinancialStrain
            | FactorCode::HousingInstability => Modifiability::Low,
            FactorCode::RecurringSymptom
            | FactorCode::AcuteSymptom
            | FactorCode::MedicationBurden
            | FactorCode::LowMood
            | FactorCode::AnxietyLoad
            | FactorCode::EmotionalOverwhelm
            | FactorCode::LowEnergy
            | FactorCode::TimeScarcity
            | FactorCode::NoRegularProvider
            | FactorCode::SocialIsolation
            | FactorCode::TreatmentHesitancy => Modifiability::Medium,
            FactorCode::InformationGap | FactorCode::ImprovementGoal | FactorCode::HabitIntent => {
                Modifiability::High
            }
            FactorCode::UnclassifiedNote => Modifiability::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FactorCode::AcuteRiskLanguage => "acute_risk_language",
            FactorCode::RecurringSymptom => "recurring_symptom",
            FactorCode::AcuteSymptom => "acute_symptom",
            FactorCode::ChronicCondition => "chronic_condition",
            FactorCode::MedicationBurden => "medication_burden",
            FactorCode::AwaitingDiagnosis => "awaiting_diagnosis",
            FactorCode::LowMood => "low_mood",
            FactorCode::AnxietyLoad => "anxiety_load",
            FactorCode::EmotionalOverwhelm => "emotional_overwhelm",
            FactorCode::LongDuration => "long_duration",
            FactorCode::SymptomRecurrence => "symptom_recurrence",
            FactorCode::LowEnergy => "low_energy",
            FactorCode::TimeScarcity => "time_scarcity",
            FactorCode::CareAccessBarrier => "care_access_barrier",
            FactorCode::NoRegularProvider => "no_regular_provider",
            FactorCode::CostBarrier => "cost_barrier",
            FactorCode::EnvironmentalExposure => "environmental_exposure",
            FactorCode::SocialIsolation => "social_isolation",
            FactorCode::CaregiverLoad => "caregiver_load",
            FactorCode::FinancialStrain => "financial_strain",
            FactorCode::HousingInstability => "housing_instability",
            FactorCode::InformationGap => "information_gap",
            FactorCode::TreatmentHesitancy => "treatment_hesitancy",
            FactorCode::ImprovementGoal => "improvement_goal",
            FactorCode::HabitIntent => "habit_intent",
            FactorCode::UnclassifiedNote => "unclassified_note",
        }
    }

    pub fn parse(value: &str) -> Option<FactorCode> {
        FactorCode::ALL.into_iter().find(|c| c.as_str() == value)
    }

    /// Short human label for transparency chips.
    pub fn label(self) -> &'static str {
        match self {
            FactorCode::AcuteRiskLanguage => "safety concern",
            FactorCode::RecurringSymptom => "recurring symptom",
            FactorCode::AcuteSymptom => "new symptom",
            FactorCode::ChronicCondition => "ongoing condition",
            FactorCode::MedicationBurden => "medication load",
            FactorCode::AwaitingDiagnosis => "waiting on answers",
            FactorCode::LowMood => "low mood",
            FactorCode::AnxietyLoad => "anxiety",
            FactorCode::EmotionalOverwhelm => "feeling overwhelmed",
            FactorCode::LongDuration => "going on a while",
            FactorCode::SymptomRecurrence => "keeps coming back",
            FactorCode::LowEnergy => "low energy",
            FactorCode::TimeScarcity => "short on time",
            FactorCode::CareAccessBarrier => "hard to reach care",
            FactorCode::NoRegularProvider => "no regular GP",
            FactorCode::CostBarrier => "cost of care",
            FactorCode::EnvironmentalExposure => "environment",
            FactorCode::SocialIsolation => "low support",
            FactorCode::CaregiverLoad => "caring for others",
            FactorCode::FinancialStrain => "money pressure",
            FactorCode::HousingInstability => "housing",
            FactorCode::InformationGap => "missing information",
            FactorCode::TreatmentHesitancy => "treatment doubts",
            FactorCode::ImprovementGoal => "a goal",
            FactorCode::HabitIntent => "building a habit",
            FactorCode::UnclassifiedNote => "note",
        }
    }

    /// True for the codes the decision engine treats as a standing safety flag.
    pub fn is_safety_flagged(self) -> bool {
        matches!(self, FactorCode::AcuteRiskLanguage)
    }
}

/// Symptom identifiers tracked by the pattern detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SymptomKey {
    Headache,
    Fatigue,
    Pain,
    Breathing,
    Digestive,
    PoorSleep,
    LowMood,
    Anxiety,
}

impl SymptomKey {
    pub const ALL: [SymptomKey; 8] = [
        SymptomKey::Headache,
        SymptomKey::Fatigue,
        SymptomKey::Pain,
        SymptomKey::Breathing,
        SymptomKey::Digestive,
        SymptomKey::PoorSleep,
        SymptomKey::LowMood,
        SymptomKey::Anxiety,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SymptomKey::Headache => "headache",
            SymptomKey::Fatigue => "fatigue",
            SymptomKey::Pain => "pain",
            SymptomKey::Breathing => "breathing",
            SymptomKey::Digestive => "digestive",
            SymptomKey::PoorSleep => "poor_sleep",
            SymptomKey::LowMood => "low_mood",
            SymptomKey::Anxiety => "anxiety",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SymptomKey::Headache => "headaches",
            SymptomKey::Fatigue => "fatigue",
            SymptomKey::Pain => "pain",
            SymptomKey::Breathing => "breathing trouble",
            SymptomKey::Digestive => "digestive discomfort",
            SymptomKey::PoorSleep => "poor sleep",
            SymptomKey::LowMood => "low mood",
            SymptomKey::Anxiety => "anxiety",
        }
    }
}

/// A single typed, confidence-scored, time-stamped fact extracted from an entry.
/// Append-only: never mutated or deleted. A newer factor for the same code
/// supersedes the old one only in derived indexes, not in the historical log.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Factor {
    pub id: Uuid,
    pub domain: Domain,
    pub kind: FactorKind,
    pub code: FactorCode,
    pub value: FactorValue,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub time_horizon: TimeHorizon,
    pub modifiability: Modifiability,
    pub source_entry_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Keys for the clarifying questions the engine may ask. Closed set:
/// the follow-up idempotency pair is `(parent_entry_id, key)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MissingInfoKey {
    SymptomDuration,
    SymptomSeverity,
    MainConcern,
    SupportAvailability,
    CareAccess,
    EnergyLevel,
    GoalClarity,
}

impl MissingInfoKey {
    pub const ALL: [MissingInfoKey; 7] = [
        MissingInfoKey::SymptomDuration,
        MissingInfoKey::SymptomSeverity,
        MissingInfoKey::MainConcern,
        MissingInfoKey::SupportAvailability,
        MissingInfoKey::CareAccess,
        MissingInfoKey::EnergyLevel,
        MissingInfoKey::GoalClarity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MissingInfoKey::SymptomDuration => "symptom_duration",
            MissingInfoKey::SymptomSeverity => "symptom_severity",
            MissingInfoKey::MainConcern => "main_concern",
            MissingInfoKey::SupportAvailability => "support_availability",
            MissingInfoKey::CareAccess => "care_access",
            MissingInfoKey::EnergyLevel => "energy_level",
            MissingInfoKey::GoalClarity => "goal_clarity",
        }
    }

    pub fn parse(value: &str) -> Option<MissingInfoKey> {
        MissingInfoKey::ALL.into_iter().find(|k| k.as_str() == value)
    }

    /// Default question wording when the oracle did not supply one.
    pub fn question(self) -> &'static str {
        match self {
            MissingInfoKey::SymptomDuration => "How long has this been going on?",
            MissingInfoKey::SymptomSeverity => {
                "How strongly is this affecting your day, on a scale from mild to severe?"
            }
            MissingInfoKey::MainConcern => "What feels like the main thing right now?",
            MissingInfoKey::SupportAvailability => {
                "Is there someone around you who could help with this?"
            }
            MissingInfoKey::CareAccess => "Do you have a GP or clinic you can get to?",
            MissingInfoKey::EnergyLevel => "How is your energy today — enough to take a small step?",
            MissingInfoKey::GoalClarity => "What would feeling a bit better look like for you?",
        }
    }
}

/// A candidate clarifying question: produced when evidence was too weak to
/// commit a factor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MissingInfo {
    pub key: MissingInfoKey,
    pub question: String,
    pub domain: Domain,
    /// 1 = ask first
    pub priority: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_has_domain_kinds_and_defaults() {
        for code in FactorCode::ALL {
            assert!(!code.allowed_kinds().is_empty(), "{:?} allows no kinds", code);
            // Exercise the full tables; a new code without table entries
            // fails to compile, a mismatched one fails here.
            let _ = code.domain();
            let _ = code.default_time_horizon();
            let _ = code.default_modifiability();
            assert_eq!(FactorCode::parse(code.as_str()), Some(code));
        }
    }

    #[test]
    fn safety_code_maps_to_safety_domain() {
        assert_eq!(
            FactorCode::AcuteRiskLanguage.domain(),
            crate::domains::Domain::SafetyRisk
        );
        assert!(FactorCode::AcuteRiskLanguage.is_safety_flagged());
        assert!(!FactorCode::LowEnergy.is_safety_flagged());
    }

    #[test]
    fn unknown_code_string_is_rejected() {
        assert_eq!(FactorCode::parse("sleep_quality"), None);
        assert_eq!(FactorCode::parse(""), None);
    }

    #[test]
    fn factor_value_is_untagged_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&FactorValue::Bool(true)).unwrap(),
            "true"
        );
        assert_eq!(
            serde_json::to_string(&FactorValue::Number(2.5)).unwrap(),
            "2.5"
        );
        let parsed: FactorValue = serde_json::from_str("\"three weeks\"").unwrap();
        assert_eq!(parsed, FactorValue::Text("three weeks".to_string()));
    }

    #[test]
    fn missing_info_keys_roundtrip_and_have_questions() {
        for key in MissingInfoKey::ALL {
            assert_eq!(MissingInfoKey::parse(key.as_str()), Some(key));
            assert!(key.question().ends_with('?'));
        }
    }
}
