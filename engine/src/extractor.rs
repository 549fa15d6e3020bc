use chrono::{DateTime, Utc};
use uuid::Uuid;

use compass_core::domains::{Domain, DomainClassification};
use compass_core::factors::{
    Factor, FactorCode, FactorKind, FactorValue, MissingInfo, MissingInfoKey, SymptomKey,
};
use compass_core::oracle::OracleResponse;

use crate::config::EngineConfig;
use crate::lexicon::DomainLexicon;
use crate::safety::SafetyCheck;
use crate::vocabulary::{QuarantinedCandidate, VocabularyRegistry};

/// Everything extraction produced for one entry.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPayload {
    /// Committed factors, at most one per code.
    pub factors: Vec<Factor>,
    /// Candidate clarifying questions, priority-ascending.
    pub missing_info: Vec<MissingInfo>,
    /// Oracle candidates refused by the vocabulary guardrails.
    pub quarantined: Vec<QuarantinedCandidate>,
    /// Symptoms detected in the text, for the pattern log.
    pub symptoms: Vec<SymptomKey>,
}

struct Candidate {
    code: FactorCode,
    kind: FactorKind,
    value: FactorValue,
    confidence: f64,
    time_horizon: compass_core::factors::TimeHorizon,
    modifiability: compass_core::factors::Modifiability,
}

/// Turn classified text plus oracle candidates into committed factors or
/// missing-info prompts.
///
/// Candidates below the commit floor never become factors. Within one entry,
/// duplicate codes merge keeping the maximum confidence.
pub fn extract(
    lexicon: &DomainLexicon,
    vocabulary: &VocabularyRegistry,
    safety: &SafetyCheck,
    classification: &DomainClassification,
    text: &str,
    oracle: Option<&OracleResponse>,
    source_entry_id: Uuid,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> ExtractedPayload {
    let mut payload = ExtractedPayload {
        symptoms: lexicon.detect_symptoms(text),
        ..Default::default()
    };

    let classified: Vec<Domain> = std::iter::once(classification.primary.domain)
        .chain(classification.secondary.iter().map(|t| t.domain))
        .collect();

    let mut candidates: Vec<Candidate> = Vec::new();

    // The safety result is committed as a factor so that the standing flag
    // survives into the profile and every later stage can re-check it.
    if safety.triggered() {
        candidates.push(Candidate {
            code: FactorCode::AcuteRiskLanguage,
            kind: FactorKind::Chance,
            value: FactorValue::Bool(true),
            confidence: 0.95,
            time_horizon: FactorCode::AcuteRiskLanguage.default_time_horizon(),
            modifiability: FactorCode::AcuteRiskLanguage.default_modifiability(),
        });
    }

    // Local candidates: keep those in a classified domain; very specific
    // phrasing keeps its factor even when the domain missed the secondary cap.
    for local in lexicon.factor_candidates(text) {
        let in_classified = classified.contains(&local.code.domain());
        if !in_classified && local.confidence < 0.55 {
            continue;
        }
        candidates.push(Candidate {
            time_horizon: refine_time_horizon(lexicon, text, local.code),
            modifiability: local.code.default_modifiability(),
            code: local.code,
            kind: local.kind,
            value: local.value,
            confidence: local.confidence,
        });
    }

    // Oracle candidates pass the vocabulary guardrails; refused ones are
    // quarantined for the audit log, never coerced.
    if let Some(response) = oracle {
        for raw in &response.factors {
            match vocabulary.admit(raw) {
                Ok(admitted) => candidates.push(Candidate {
                    code: admitted.code,
                    kind: admitted.kind,
                    value: admitted.value,
                    confidence: admitted.confidence,
                    time_horizon: admitted.time_horizon,
                    modifiability: admitted.modifiability,
                }),
                Err(quarantined) => payload.quarantined.push(quarantined),
            }
        }
    }

    // Merge duplicates by code, keeping max confidence: one factor per code
    // per entry.
    candidates.sort_by(|a, b| {
        a.code
            .cmp(&b.code)
            .then(b.confidence.total_cmp(&a.confidence))
    });
    candidates.dedup_by(|b, a| a.code == b.code);

    for candidate in candidates {
        if candidate.confidence >= config.factor_commit_floor {
            payload.factors.push(Factor {
                id: Uuid::now_v7(),
                domain: candidate.code.domain(),
                kind: candidate.kind,
                code: candidate.code,
                value: candidate.value,
                confidence: candidate.confidence,
                time_horizon: candidate.time_horizon,
                modifiability: candidate.modifiability,
                source_entry_id,
                created_at: now,
            });
        } else {
            push_missing(&mut payload.missing_info, missing_key_for(candidate.code));
        }
    }

    // Oracle-suggested gaps, keys validated against the closed set.
    if let Some(response) = oracle {
        for raw in &response.missing_info {
            let Some(key) = MissingInfoKey::parse(&raw.key) else {
                tracing::warn!(key = %raw.key, "dropping unknown missing-info key");
                continue;
            };
            let domain = Domain::parse(&raw.domain).unwrap_or(Domain::UnknownOther);
            push_missing_full(
                &mut payload.missing_info,
                key,
                raw.question.clone().unwrap_or_else(|| key.question().to_string()),
                domain,
                raw.priority,
            );
        }
    }

    // A symptom without duration language is a gap worth asking about.
    if !payload.symptoms.is_empty()
        && !lexicon.has_duration_language(text)
        && !safety.triggered()
    {
        push_missing(&mut payload.missing_info, MissingInfoKey::SymptomDuration);
    }

    // Nothing committed and nothing asked: the entry was too vague to act on.
    if payload.factors.is_empty() && payload.missing_info.is_empty() && !safety.triggered() {
        push_missing(&mut payload.missing_info, MissingInfoKey::MainConcern);
    }

    payload.missing_info.sort_by_key(|m| m.priority);

    tracing::debug!(
        factors = payload.factors.len(),
        missing = payload.missing_info.len(),
        quarantined = payload.quarantined.len(),
        "extracted entry payload"
    );

    payload
}

/// Duration phrasing upgrades the horizon of symptom/duration codes.
fn refine_time_horizon(
    lexicon: &DomainLexicon,
    text: &str,
    code: FactorCode,
) -> compass_core::factors::TimeHorizon {
    use compass_core::factors::TimeHorizon;
    if matches!(
        code,
        FactorCode::RecurringSymptom | FactorCode::SymptomRecurrence | FactorCode::LongDuration
    ) && lexicon.has_duration_language(text)
    {
        TimeHorizon::Chronic
    } else {
        code.default_time_horizon()
    }
}

/// Which question to ask when a candidate for this code was too weak to commit.
fn missing_key_for(code: FactorCode) -> MissingInfoKey {
    match code.domain() {
        Domain::SymptomsBodySignals | Domain::MedicalContext => MissingInfoKey::SymptomSeverity,
        Domain::DurationPattern => MissingInfoKey::SymptomDuration,
        Domain::CapacityEnergy => MissingInfoKey::EnergyLevel,
        Domain::AccessToCare => MissingInfoKey::CareAccess,
        Domain::SocialSupportContext => MissingInfoKey::SupportAvailability,
        Domain::GoalsIntent => MissingInfoKey::GoalClarity,
        Domain::SafetyRisk
        | Domain::MentalEmotionalState
        | Domain::EnvironmentExposures
        | Domain::ResourcesConstraints
        | Domain::KnowledgeBeliefsPreferences
        | Domain::UnknownOther => MissingInfoKey::MainConcern,
    }
}

fn default_priority(key: MissingInfoKey) -> u8 {
    match key {
        MissingInfoKey::MainConcern => 1,
        MissingInfoKey::SymptomDuration | MissingInfoKey::SymptomSeverity => 2,
        MissingInfoKey::CareAccess | MissingInfoKey::SupportAvailability => 3,
        MissingInfoKey::EnergyLevel => 4,
        MissingInfoKey::GoalClarity => 5,
    }
}

fn push_missing(list: &mut Vec<MissingInfo>, key: MissingInfoKey) {
    push_missing_full(
        list,
        key,
        key.question().to_string(),
        missing_domain(key),
        default_priority(key),
    );
}

fn push_missing_full(
    list: &mut Vec<MissingInfo>,
    key: MissingInfoKey,
    question: String,
    domain: Domain,
    priority: u8,
) {
    if list.iter().any(|m| m.key == key) {
        return;
    }
    list.push(MissingInfo {
        key,
        question,
        domain,
        priority,
    });
}

fn missing_domain(key: MissingInfoKey) -> Domain {
    match key {
        MissingInfoKey::SymptomDuration => Domain::DurationPattern,
        MissingInfoKey::SymptomSeverity => Domain::SymptomsBodySignals,
        MissingInfoKey::MainConcern => Domain::UnknownOther,
        MissingInfoKey::SupportAvailability => Domain::SocialSupportContext,
        MissingInfoKey::CareAccess => Domain::AccessToCare,
        MissingInfoKey::EnergyLevel => Domain::CapacityEnergy,
        MissingInfoKey::GoalClarity => Domain::GoalsIntent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::safety::SafetyMatcher;
    use compass_core::oracle::OracleFactorCandidate;

    fn run(text: &str, oracle: Option<&OracleResponse>) -> ExtractedPayload {
        let lexicon = DomainLexicon::new();
        let vocabulary = VocabularyRegistry::new();
        let config = EngineConfig::default();
        let matcher = SafetyMatcher::new();
        let safety = matcher.scan(text, false);
        let classification = classify(&lexicon, &safety, text, oracle, &config);
        extract(
            &lexicon,
            &vocabulary,
            &safety,
            &classification,
            text,
            oracle,
            Uuid::now_v7(),
            Utc::now(),
            &config,
        )
    }

    #[test]
    fn commits_recurring_symptom_with_duration_language() {
        let payload = run("headaches every day for weeks now", None);
        let factor = payload
            .factors
            .iter()
            .find(|f| f.code == FactorCode::RecurringSymptom)
            .expect("recurring symptom committed");
        assert_eq!(factor.domain, Domain::SymptomsBodySignals);
        assert_eq!(factor.time_horizon, compass_core::factors::TimeHorizon::Chronic);
        assert!(payload.symptoms.contains(&SymptomKey::Headache));
    }

    #[test]
    fn one_factor_per_code_keeps_max_confidence() {
        let oracle = OracleResponse {
            domains: Vec::new(),
            factors: vec![
                OracleFactorCandidate {
                    code: "low_energy".to_string(),
                    kind: "chance".to_string(),
                    value: serde_json::Value::Bool(true),
                    confidence: 0.8,
                    time_horizon: None,
                    modifiability: None,
                },
                OracleFactorCandidate {
                    code: "low_energy".to_string(),
                    kind: "chance".to_string(),
                    value: serde_json::Value::Bool(true),
                    confidence: 0.5,
                    time_horizon: None,
                    modifiability: None,
                },
            ],
            missing_info: Vec::new(),
            rationale: None,
        };
        let payload = run("completely drained, no energy at all", Some(&oracle));
        let matches: Vec<&Factor> = payload
            .factors
            .iter()
            .filter(|f| f.code == FactorCode::LowEnergy)
            .collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 0.8);
    }

    #[test]
    fn quarantined_codes_do_not_become_factors() {
        let oracle = OracleResponse {
            domains: Vec::new(),
            factors: vec![OracleFactorCandidate {
                code: "sleep_quality".to_string(),
                kind: "chance".to_string(),
                value: serde_json::Value::Bool(true),
                confidence: 0.9,
                time_horizon: None,
                modifiability: None,
            }],
            missing_info: Vec::new(),
            rationale: None,
        };
        let payload = run("slept badly again", Some(&oracle));
        assert_eq!(payload.quarantined.len(), 1);
        assert!(!payload
            .factors
            .iter()
            .any(|f| f.code.as_str() == "sleep_quality"));
    }

    #[test]
    fn vague_text_yields_missing_info_not_factors() {
        let payload = run("feeling a bit off today", None);
        assert!(payload.factors.is_empty());
        assert!(payload
            .missing_info
            .iter()
            .any(|m| m.key == MissingInfoKey::MainConcern));
    }

    #[test]
    fn symptom_without_duration_asks_for_duration() {
        let payload = run("woke up with a headache", None);
        assert!(payload
            .missing_info
            .iter()
            .any(|m| m.key == MissingInfoKey::SymptomDuration));
    }

    #[test]
    fn safety_trigger_commits_risk_factor() {
        let payload = run("I want to die", None);
        let factor = payload
            .factors
            .iter()
            .find(|f| f.code == FactorCode::AcuteRiskLanguage)
            .expect("risk factor committed");
        assert!(factor.code.is_safety_flagged());
        assert!(factor.confidence >= 0.9);
    }

    #[test]
    fn missing_info_is_sorted_by_priority_and_deduplicated() {
        let payload = run("feeling off", None);
        let mut priorities: Vec<u8> = payload.missing_info.iter().map(|m| m.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_unstable();
        assert_eq!(priorities, sorted);
        priorities.dedup();
        let mut keys: Vec<MissingInfoKey> = payload.missing_info.iter().map(|m| m.key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), payload.missing_info.len());
    }
}
