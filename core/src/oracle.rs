use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request sent to the text-classification oracle: the raw text plus a short
/// profile summary. No model detail crosses this boundary.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OracleRequest {
    pub text: String,
    /// Compact summary of the active profile (domains + top constraint codes)
    pub profile_summary: String,
}

/// A domain candidate from the oracle. The domain is a raw string here:
/// values outside the closed domain set are dropped at ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OracleDomainTag {
    pub domain: String,
    pub confidence: f64,
}

/// A factor candidate from the oracle. `code` is a raw string: codes outside
/// the canonical vocabulary are quarantined, never coerced.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OracleFactorCandidate {
    pub code: String,
    pub kind: String,
    pub value: serde_json::Value,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_horizon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifiability: Option<String>,
}

/// A missing-information candidate from the oracle.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OracleMissingInfo {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub domain: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
}

fn default_priority() -> u8 {
    3
}

/// Everything the oracle returns for one entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OracleResponse {
    #[serde(default)]
    pub domains: Vec<OracleDomainTag>,
    #[serde(default)]
    pub factors: Vec<OracleFactorCandidate>,
    #[serde(default)]
    pub missing_info: Vec<OracleMissingInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Outcome of the oracle call as seen by the pipeline. The local safety
/// matcher has always already run by the time this is consumed.
#[derive(Debug, Clone)]
pub enum OracleOutcome {
    Ok(OracleResponse),
    /// Timeout, transport error, or malformed payload. The pipeline falls
    /// back to local classification and forces uncertainty high.
    Unavailable,
}

impl OracleOutcome {
    pub fn response(&self) -> Option<&OracleResponse> {
        match self {
            OracleOutcome::Ok(resp) => Some(resp),
            OracleOutcome::Unavailable => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, OracleOutcome::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_response_tolerates_missing_sections() {
        let resp: OracleResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.domains.is_empty());
        assert!(resp.factors.is_empty());
        assert!(resp.missing_info.is_empty());
    }

    #[test]
    fn missing_info_priority_defaults() {
        let mi: OracleMissingInfo = serde_json::from_value(serde_json::json!({
            "key": "symptom_duration",
            "domain": "duration_pattern"
        }))
        .unwrap();
        assert_eq!(mi.priority, 3);
        assert!(mi.question.is_none());
    }
}
