use compass_core::domains::{Domain, DomainClassification, DomainTag};
use compass_core::oracle::OracleResponse;

use crate::config::EngineConfig;
use crate::lexicon::DomainLexicon;
use crate::safety::SafetyCheck;

/// Classify one entry's text into a primary domain plus secondaries.
///
/// The safety result is an input, not something this function derives: the
/// matcher has already run before any oracle data was considered, and a
/// triggered check overrides everything here.
pub fn classify(
    lexicon: &DomainLexicon,
    safety: &SafetyCheck,
    text: &str,
    oracle: Option<&OracleResponse>,
    config: &EngineConfig,
) -> DomainClassification {
    let merged = merge_scores(lexicon, text, oracle);

    if safety.triggered() {
        let secondary = secondary_tags(&merged, Domain::SafetyRisk, config);
        return DomainClassification {
            primary: DomainTag {
                domain: Domain::SafetyRisk,
                confidence: 1.0,
            },
            secondary,
            rationale: Some("local safety matcher triggered".to_string()),
            safety_override: true,
        };
    }

    let Some(max_confidence) = merged
        .iter()
        .map(|t| t.confidence)
        .max_by(|a, b| a.total_cmp(b))
    else {
        return DomainClassification {
            primary: DomainTag {
                domain: Domain::UnknownOther,
                confidence: 0.2,
            },
            secondary: Vec::new(),
            rationale: Some("no domain signal in text or oracle output".to_string()),
            safety_override: false,
        };
    };

    // Among domains within the tie window of the top confidence, the lower
    // priority number wins.
    let primary = merged
        .iter()
        .filter(|t| max_confidence - t.confidence <= config.tie_window)
        .min_by_key(|t| t.domain.priority())
        .copied()
        .expect("merged scores are non-empty here");

    let secondary = secondary_tags(&merged, primary.domain, config);

    tracing::debug!(
        primary = primary.domain.as_str(),
        confidence = primary.confidence,
        secondaries = secondary.len(),
        "classified entry"
    );

    DomainClassification {
        primary,
        secondary,
        rationale: oracle.and_then(|o| o.rationale.clone()),
        safety_override: false,
    }
}

/// Per-domain max of local lexicon scores and oracle candidate scores.
/// Oracle domains outside the closed set are dropped, not guessed at.
fn merge_scores(
    lexicon: &DomainLexicon,
    text: &str,
    oracle: Option<&OracleResponse>,
) -> Vec<DomainTag> {
    let mut tags = lexicon.score_domains(text);

    if let Some(response) = oracle {
        for candidate in &response.domains {
            let Some(domain) = Domain::parse(&candidate.domain) else {
                tracing::warn!(domain = %candidate.domain, "dropping unknown oracle domain");
                continue;
            };
            let confidence = candidate.confidence.clamp(0.0, 1.0);
            match tags.iter_mut().find(|t| t.domain == domain) {
                Some(existing) => existing.confidence = existing.confidence.max(confidence),
                None => tags.push(DomainTag { domain, confidence }),
            }
        }
    }

    tags
}

/// All non-primary matches above the floor, confidence-descending, capped.
fn secondary_tags(merged: &[DomainTag], primary: Domain, config: &EngineConfig) -> Vec<DomainTag> {
    let mut secondary: Vec<DomainTag> = merged
        .iter()
        .filter(|t| t.domain != primary && t.confidence >= config.secondary_floor)
        .copied()
        .collect();
    secondary.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.domain.priority().cmp(&b.domain.priority()))
    });
    secondary.truncate(config.secondary_cap);
    secondary
}
