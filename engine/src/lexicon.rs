use compass_core::domains::{Domain, DomainTag};
use compass_core::factors::{FactorCode, FactorKind, FactorValue, SymptomKey};
use compass_core::response::SignalLevel;

/// A factor candidate produced locally, before oracle candidates are merged in.
#[derive(Debug, Clone)]
pub struct LocalCandidate {
    pub code: FactorCode,
    pub kind: FactorKind,
    pub value: FactorValue,
    pub confidence: f64,
}

/// Deterministic keyword heuristics over the raw text.
///
/// This is the always-available layer: it runs on every entry whether or not
/// the oracle answers, so its vocabulary errs toward recall on the domains
/// that matter for safety and triage.
pub struct DomainLexicon;

const DOMAIN_TERMS: &[(Domain, &[&str])] = &[
    (
        Domain::SymptomsBodySignals,
        &[
            "headache", "migraine", "pain", "ache", "sore", "nause", "dizzy", "tired", "fatigue",
            "exhausted", "insomnia", "stomach", "rash", "cough", "fever", "bloat", "cramp",
            "sleep", "breath",
        ],
    ),
    (
        Domain::MedicalContext,
        &[
            "doctor", "gp ", " gp", "diagnos", "medication", "prescri", "specialist", "condition",
            "treatment", "surgery", "test results", "clinic", "referral",
        ],
    ),
    (
        Domain::MentalEmotionalState,
        &[
            "anxious", "anxiety", "stress", "overwhelm", "sad", "depress", "worried", "hopeless",
            "panic", "mood", "crying", "cry ",
        ],
    ),
    (
        Domain::DurationPattern,
        &[
            "weeks", "months", "every day", "every night", "again", "keeps", "still", "for years",
            "since",
        ],
    ),
    (
        Domain::CapacityEnergy,
        &[
            "no energy", "drained", "too tired", "can't keep up", "burnt out", "burned out",
            "no time", "too busy",
        ],
    ),
    (
        Domain::AccessToCare,
        &[
            "appointment", "waitlist", "waiting list", "can't get in", "no gp", "bulk bill",
            "telehealth", "out of pocket", "booked out",
        ],
    ),
    (
        Domain::EnvironmentExposures,
        &["mould", "mold", "smoke", "noise", "air quality", "damp", "pollution", "cold house"],
    ),
    (
        Domain::SocialSupportContext,
        &[
            "alone", "lonely", "no one", "nobody", "partner", "family", "carer", "caring for",
            "friends",
        ],
    ),
    (
        Domain::ResourcesConstraints,
        &[
            "afford", "money", "rent", "bills", "expensive", "cost", "broke", "financ", "housing",
        ],
    ),
    (
        Domain::KnowledgeBeliefsPreferences,
        &[
            "don't understand", "confused", "what does", "is it normal", "should i",
            "not sure what",
        ],
    ),
    (
        Domain::GoalsIntent,
        &["want to", "trying to", "goal", "improve", "get better at", "habit", "plan to"],
    ),
];

const SYMPTOM_TERMS: &[(SymptomKey, &[&str])] = &[
    (SymptomKey::Headache, &["headache", "migraine", "head is pounding"]),
    (
        SymptomKey::Fatigue,
        &["fatigue", "exhausted", "drained", "no energy", "so tired", "worn out"],
    ),
    (SymptomKey::Pain, &["pain", "aches", "aching", "sore", "hurts"]),
    (SymptomKey::Breathing, &["breath", "wheez", "short of air"]),
    (
        SymptomKey::Digestive,
        &["stomach", "nause", "bloat", "digest", "gut", "cramp"],
    ),
    (
        SymptomKey::PoorSleep,
        &["can't sleep", "insomnia", "slept badly", "poor sleep", "awake all night", "sleeping badly"],
    ),
    (SymptomKey::LowMood, &["sad", "hopeless", "flat", "depress", "down lately"]),
    (
        SymptomKey::Anxiety,
        &["anxious", "anxiety", "on edge", "panick", "panic", "worried sick"],
    ),
];

const DURATION_TERMS: &[&str] = &[
    "weeks", "months", "for years", "every day", "every night", "again", "keeps", "still", "since",
];

const HIGH_LOAD_TERMS: &[&str] = &[
    "overwhelm", "can't cope", "breaking down", "desperate", "terrified", "panic", "hopeless",
    "unbearable", "falling apart",
];

const MEDIUM_LOAD_TERMS: &[&str] = &[
    "stressed", "worried", "anxious", "upset", "struggling", "scared", "frustrated", "exhausted",
];

const HIGH_PRESSURE_TERMS: &[&str] = &[
    "urgent", "right now", "asap", "immediately", "can't wait", "by tomorrow", "today or",
];

const MEDIUM_PRESSURE_TERMS: &[&str] = &["soon", "this week", "quickly", "before long"];

const STUCKNESS_TERMS: &[&str] = &[
    "still stuck", "keeps happening", "nothing works", "tried everything", "no matter what",
    "same thing again", "going in circles", "still happening", "keeps coming back",
];

const ISOLATION_TERMS: &[&str] = &[
    "no one to talk to", "nobody to talk to", "completely alone", "can't cope", "on my own with",
    "no one around",
];

const UNCERTAINTY_TERMS: &[&str] = &[
    "not sure", "don't know", "confused", "no idea", "can't tell", "unsure", "maybe it's",
];

const READINESS_TERMS: &[&str] = &[
    "i will", "going to", "ready to", "today i", "planning to", "i can ", "i'll",
];

const BLOCKED_TERMS: &[&str] = &[
    "can't do anything", "nothing i can do", "impossible", "no way to", "out of options",
    "hands are tied", "can't get", "won't let me",
];

fn hits(text: &str, terms: &[&str]) -> usize {
    terms.iter().filter(|t| text.contains(*t)).count()
}

impl DomainLexicon {
    pub fn new() -> Self {
        Self
    }

    /// Local domain scores. Base confidence per matched domain, nudged up for
    /// every additional term hit, capped below oracle-grade certainty.
    pub fn score_domains(&self, text: &str) -> Vec<DomainTag> {
        let text = text.to_lowercase();
        let mut tags = Vec::new();
        for (domain, terms) in DOMAIN_TERMS {
            let n = hits(&text, terms);
            if n > 0 {
                let confidence = (0.4 + 0.12 * (n as f64 - 1.0)).min(0.85);
                tags.push(DomainTag {
                    domain: *domain,
                    confidence,
                });
            }
        }
        tags
    }

    pub fn detect_symptoms(&self, text: &str) -> Vec<SymptomKey> {
        let text = text.to_lowercase();
        SYMPTOM_TERMS
            .iter()
            .filter(|(_, terms)| hits(&text, terms) > 0)
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn has_duration_language(&self, text: &str) -> bool {
        hits(&text.to_lowercase(), DURATION_TERMS) > 0
    }

    pub fn emotional_load(&self, text: &str) -> SignalLevel {
        let text = text.to_lowercase();
        if hits(&text, HIGH_LOAD_TERMS) > 0 {
            SignalLevel::High
        } else if hits(&text, MEDIUM_LOAD_TERMS) > 0 {
            SignalLevel::Medium
        } else {
            SignalLevel::Low
        }
    }

    pub fn time_pressure(&self, text: &str) -> SignalLevel {
        let text = text.to_lowercase();
        if hits(&text, HIGH_PRESSURE_TERMS) > 0 {
            SignalLevel::High
        } else if hits(&text, MEDIUM_PRESSURE_TERMS) > 0 {
            SignalLevel::Medium
        } else {
            SignalLevel::Low
        }
    }

    pub fn has_stuckness(&self, text: &str) -> bool {
        hits(&text.to_lowercase(), STUCKNESS_TERMS) > 0
    }

    pub fn has_isolation(&self, text: &str) -> bool {
        hits(&text.to_lowercase(), ISOLATION_TERMS) > 0
    }

    pub fn has_uncertainty(&self, text: &str) -> bool {
        hits(&text.to_lowercase(), UNCERTAINTY_TERMS) > 0
    }

    pub fn has_action_readiness(&self, text: &str) -> bool {
        hits(&text.to_lowercase(), READINESS_TERMS) > 0
    }

    pub fn has_blocked_language(&self, text: &str) -> bool {
        hits(&text.to_lowercase(), BLOCKED_TERMS) > 0
    }

    /// Text-local factor candidates. Confidence here reflects how specific
    /// the phrasing is, not how severe the situation is.
    pub fn factor_candidates(&self, text: &str) -> Vec<LocalCandidate> {
        let lower = text.to_lowercase();
        let mut out = Vec::new();
        let symptoms = self.detect_symptoms(text);
        let has_duration = hits(&lower, DURATION_TERMS) > 0;

        if let Some(first) = symptoms.first() {
            if has_duration {
                out.push(LocalCandidate {
                    code: FactorCode::RecurringSymptom,
                    kind: FactorKind::Chance,
                    value: FactorValue::Text(first.as_str().to_string()),
                    confidence: 0.6,
                });
                out.push(LocalCandidate {
                    code: FactorCode::SymptomRecurrence,
                    kind: FactorKind::Chance,
                    value: FactorValue::Bool(true),
                    confidence: 0.55,
                });
            } else {
                out.push(LocalCandidate {
                    code: FactorCode::AcuteSymptom,
                    kind: FactorKind::Chance,
                    value: FactorValue::Text(first.as_str().to_string()),
                    confidence: 0.5,
                });
            }
        }

        let mut push_if = |terms: &[&str], code: FactorCode, kind: FactorKind, confidence: f64| {
            if hits(&lower, terms) > 0 {
                out.push(LocalCandidate {
                    code,
                    kind,
                    value: FactorValue::Bool(true),
                    confidence,
                });
            }
        };

        push_if(&["diagnos", "my condition"], FactorCode::ChronicCondition, FactorKind::Chance, 0.5);
        push_if(
            &["medication", "prescri", "tablets", "my meds"],
            FactorCode::MedicationBurden,
            FactorKind::Chance,
            0.5,
        );
        push_if(
            &["waiting for results", "waiting to hear", "referred", "referral"],
            FactorCode::AwaitingDiagnosis,
            FactorKind::Chance,
            0.45,
        );
        push_if(
            &["sad", "hopeless", "feeling flat", "depress", "down lately"],
            FactorCode::LowMood,
            FactorKind::Chance,
            0.55,
        );
        push_if(
            &["anxious", "anxiety", "on edge", "panic"],
            FactorCode::AnxietyLoad,
            FactorKind::Chance,
            0.55,
        );
        push_if(
            &["overwhelm", "can't cope", "too much at once"],
            FactorCode::EmotionalOverwhelm,
            FactorKind::Chance,
            0.6,
        );
        push_if(
            &["for weeks", "for months", "for years", "since last"],
            FactorCode::LongDuration,
            FactorKind::Chance,
            0.5,
        );
        push_if(
            &["no energy", "drained", "exhausted", "burnt out", "burned out"],
            FactorCode::LowEnergy,
            FactorKind::Chance,
            0.55,
        );
        push_if(
            &["no time", "too busy", "can't find time"],
            FactorCode::TimeScarcity,
            FactorKind::ConstrainedChoice,
            0.5,
        );
        push_if(
            &["can't get in", "waitlist", "waiting list", "no appointments", "booked out"],
            FactorCode::CareAccessBarrier,
            FactorKind::Chance,
            0.55,
        );
        push_if(
            &["no gp", "no doctor", "don't have a doctor", "don't have a gp"],
            FactorCode::NoRegularProvider,
            FactorKind::ConstrainedChoice,
            0.55,
        );
        push_if(
            &["can't afford", "too expensive", "out of pocket", "gap fee"],
            FactorCode::CostBarrier,
            FactorKind::ConstrainedChoice,
            0.6,
        );
        push_if(
            &["mould", "mold", "damp", "smoke", "pollution"],
            FactorCode::EnvironmentalExposure,
            FactorKind::Chance,
            0.5,
        );
        push_if(
            &["alone", "lonely", "no one", "nobody"],
            FactorCode::SocialIsolation,
            FactorKind::Chance,
            0.5,
        );
        push_if(
            &["caring for", "carer for", "looking after my"],
            FactorCode::CaregiverLoad,
            FactorKind::ConstrainedChoice,
            0.55,
        );
        push_if(
            &["money", "bills", "rent", "broke", "financ"],
            FactorCode::FinancialStrain,
            FactorKind::Chance,
            0.5,
        );
        push_if(
            &["evicted", "homeless", "couch surfing", "nowhere to live"],
            FactorCode::HousingInstability,
            FactorKind::Chance,
            0.6,
        );
        push_if(
            &["don't understand", "confused about", "what does"],
            FactorCode::InformationGap,
            FactorKind::Choice,
            0.45,
        );
        push_if(
            &["don't want to take", "side effects", "not keen on"],
            FactorCode::TreatmentHesitancy,
            FactorKind::Choice,
            0.4,
        );
        push_if(
            &["want to", "trying to", "my goal"],
            FactorCode::ImprovementGoal,
            FactorKind::Choice,
            0.45,
        );
        push_if(
            &["habit", "routine", "every morning"],
            FactorCode::HabitIntent,
            FactorKind::Choice,
            0.4,
        );

        out
    }
}

impl Default for DomainLexicon {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_symptom_domain_for_symptom_text() {
        let lexicon = DomainLexicon::new();
        let tags = lexicon.score_domains("I've had a headache every day for weeks");
        assert!(tags.iter().any(|t| t.domain == Domain::SymptomsBodySignals));
        assert!(tags.iter().any(|t| t.domain == Domain::DurationPattern));
    }

    #[test]
    fn more_hits_raise_confidence() {
        let lexicon = DomainLexicon::new();
        let one = lexicon
            .score_domains("a headache")
            .into_iter()
            .find(|t| t.domain == Domain::SymptomsBodySignals)
            .unwrap();
        let many = lexicon
            .score_domains("headache, nausea, dizzy and so tired")
            .into_iter()
            .find(|t| t.domain == Domain::SymptomsBodySignals)
            .unwrap();
        assert!(many.confidence > one.confidence);
        assert!(many.confidence <= 0.85);
    }

    #[test]
    fn detects_symptom_keys() {
        let lexicon = DomainLexicon::new();
        let keys = lexicon.detect_symptoms("migraine again and I slept badly");
        assert!(keys.contains(&SymptomKey::Headache));
        assert!(keys.contains(&SymptomKey::PoorSleep));
    }

    #[test]
    fn recurring_symptom_needs_duration_language() {
        let lexicon = DomainLexicon::new();
        let recurring = lexicon.factor_candidates("headaches every day for weeks");
        assert!(recurring.iter().any(|c| c.code == FactorCode::RecurringSymptom));

        let acute = lexicon.factor_candidates("woke up with a headache");
        assert!(acute.iter().any(|c| c.code == FactorCode::AcuteSymptom));
        assert!(!acute.iter().any(|c| c.code == FactorCode::RecurringSymptom));
    }

    #[test]
    fn emotional_load_levels() {
        let lexicon = DomainLexicon::new();
        assert_eq!(lexicon.emotional_load("completely overwhelmed"), SignalLevel::High);
        assert_eq!(lexicon.emotional_load("a bit worried about it"), SignalLevel::Medium);
        assert_eq!(lexicon.emotional_load("noting my lunch"), SignalLevel::Low);
    }

    #[test]
    fn cost_language_yields_cost_barrier() {
        let lexicon = DomainLexicon::new();
        let candidates = lexicon.factor_candidates("I can't afford the specialist gap fee");
        assert!(candidates.iter().any(|c| c.code == FactorCode::CostBarrier));
    }
}
