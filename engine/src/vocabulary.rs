use compass_core::factors::{FactorCode, FactorKind, FactorValue, Modifiability, TimeHorizon};
use compass_core::oracle::OracleFactorCandidate;

/// Why an oracle factor candidate was refused at ingestion.
#[derive(Debug, Clone, PartialEq, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineReason {
    UnknownCode,
    UnknownKind,
    DisallowedKind,
    InvalidConfidence,
    InvalidValue,
}

/// A refused candidate, kept for the audit log. The nearest canonical code is
/// reported so vocabulary drift is visible — the candidate is never coerced
/// onto it.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct QuarantinedCandidate {
    pub code: String,
    pub reason: QuarantineReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest: Option<FactorCode>,
}

/// An oracle candidate that passed every vocabulary guardrail.
#[derive(Debug, Clone)]
pub struct AdmittedCandidate {
    pub code: FactorCode,
    pub kind: FactorKind,
    pub value: FactorValue,
    pub confidence: f64,
    pub time_horizon: TimeHorizon,
    pub modifiability: Modifiability,
}

/// Guardrails between the oracle's open-vocabulary output and the closed
/// canonical factor set.
pub struct VocabularyRegistry;

impl VocabularyRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Validate one oracle candidate. Unknown codes, kinds the code does not
    /// allow, and malformed payloads are quarantined.
    pub fn admit(
        &self,
        candidate: &OracleFactorCandidate,
    ) -> Result<AdmittedCandidate, QuarantinedCandidate> {
        let Some(code) = FactorCode::parse(&candidate.code) else {
            let nearest = nearest_code(&candidate.code);
            tracing::warn!(
                code = %candidate.code,
                nearest = nearest.map(|c| c.as_str()),
                "quarantining out-of-vocabulary factor code"
            );
            return Err(QuarantinedCandidate {
                code: candidate.code.clone(),
                reason: QuarantineReason::UnknownCode,
                nearest,
            });
        };

        let Some(kind) = FactorKind::parse(&candidate.kind) else {
            return Err(QuarantinedCandidate {
                code: candidate.code.clone(),
                reason: QuarantineReason::UnknownKind,
                nearest: Some(code),
            });
        };

        if !code.allowed_kinds().contains(&kind) {
            tracing::warn!(
                code = code.as_str(),
                kind = %candidate.kind,
                "quarantining factor candidate with disallowed kind"
            );
            return Err(QuarantinedCandidate {
                code: candidate.code.clone(),
                reason: QuarantineReason::DisallowedKind,
                nearest: Some(code),
            });
        }

        if !candidate.confidence.is_finite() {
            return Err(QuarantinedCandidate {
                code: candidate.code.clone(),
                reason: QuarantineReason::InvalidConfidence,
                nearest: Some(code),
            });
        }

        let Some(value) = parse_value(&candidate.value) else {
            return Err(QuarantinedCandidate {
                code: candidate.code.clone(),
                reason: QuarantineReason::InvalidValue,
                nearest: Some(code),
            });
        };

        let time_horizon = candidate
            .time_horizon
            .as_deref()
            .and_then(TimeHorizon::parse)
            .unwrap_or_else(|| code.default_time_horizon());
        let modifiability = candidate
            .modifiability
            .as_deref()
            .and_then(Modifiability::parse)
            .unwrap_or_else(|| code.default_modifiability());

        Ok(AdmittedCandidate {
            code,
            kind,
            value,
            confidence: candidate.confidence.clamp(0.0, 1.0),
            time_horizon,
            modifiability,
        })
    }
}

impl Default for VocabularyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Closest canonical code by Jaro-Winkler similarity, for quarantine reports.
fn nearest_code(raw: &str) -> Option<FactorCode> {
    FactorCode::ALL
        .into_iter()
        .map(|code| (code, strsim::jaro_winkler(raw, code.as_str())))
        .filter(|(_, similarity)| *similarity >= 0.8)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(code, _)| code)
}

fn parse_value(raw: &serde_json::Value) -> Option<FactorValue> {
    match raw {
        serde_json::Value::Bool(b) => Some(FactorValue::Bool(*b)),
        serde_json::Value::Number(n) => n.as_f64().map(FactorValue::Number),
        serde_json::Value::String(s) => Some(FactorValue::Text(s.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(code: &str, kind: &str, confidence: f64) -> OracleFactorCandidate {
        OracleFactorCandidate {
            code: code.to_string(),
            kind: kind.to_string(),
            value: serde_json::Value::Bool(true),
            confidence,
            time_horizon: None,
            modifiability: None,
        }
    }

    #[test]
    fn known_code_and_kind_are_admitted_with_defaults() {
        let registry = VocabularyRegistry::new();
        let admitted = registry
            .admit(&candidate("cost_barrier", "constrained_choice", 0.7))
            .unwrap();
        assert_eq!(admitted.code, FactorCode::CostBarrier);
        assert_eq!(admitted.time_horizon, FactorCode::CostBarrier.default_time_horizon());
        assert_eq!(
            admitted.modifiability,
            FactorCode::CostBarrier.default_modifiability()
        );
    }

    #[test]
    fn unknown_code_is_quarantined_with_nearest_named() {
        let registry = VocabularyRegistry::new();
        let err = registry
            .admit(&candidate("cost_barriers", "constrained_choice", 0.7))
            .unwrap_err();
        assert_eq!(err.reason, QuarantineReason::UnknownCode);
        assert_eq!(err.nearest, Some(FactorCode::CostBarrier));
    }

    #[test]
    fn dissimilar_unknown_code_reports_no_nearest() {
        let registry = VocabularyRegistry::new();
        let err = registry.admit(&candidate("zzz_q", "chance", 0.7)).unwrap_err();
        assert_eq!(err.reason, QuarantineReason::UnknownCode);
        assert_eq!(err.nearest, None);
    }

    #[test]
    fn disallowed_kind_is_quarantined_not_coerced() {
        let registry = VocabularyRegistry::new();
        // time_scarcity only allows constrained_choice
        let err = registry.admit(&candidate("time_scarcity", "chance", 0.7)).unwrap_err();
        assert_eq!(err.reason, QuarantineReason::DisallowedKind);
    }

    #[test]
    fn non_finite_confidence_is_quarantined() {
        let registry = VocabularyRegistry::new();
        let err = registry
            .admit(&candidate("low_energy", "chance", f64::NAN))
            .unwrap_err();
        assert_eq!(err.reason, QuarantineReason::InvalidConfidence);
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let registry = VocabularyRegistry::new();
        let admitted = registry.admit(&candidate("low_energy", "chance", 1.4)).unwrap();
        assert_eq!(admitted.confidence, 1.0);
    }

    #[test]
    fn structured_values_are_refused() {
        let registry = VocabularyRegistry::new();
        let mut c = candidate("low_energy", "chance", 0.6);
        c.value = serde_json::json!({"nested": true});
        assert_eq!(
            registry.admit(&c).unwrap_err().reason,
            QuarantineReason::InvalidValue
        );
    }
}
