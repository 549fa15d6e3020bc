use std::time::Duration;

use compass_core::oracle::{OracleOutcome, OracleRequest, OracleResponse};

const DEFAULT_TIMEOUT_MS: u64 = 2_500;

/// HTTP client for the external text-classification oracle.
///
/// The oracle is optional and advisory: a missing URL, a timeout, or a
/// malformed payload all degrade to `OracleOutcome::Unavailable`, and the
/// engine falls back to local classification with uncertainty forced high.
/// The local safety matcher has always run before this client is called.
#[derive(Clone)]
pub struct OracleClient {
    client: reqwest::Client,
    base_url: Option<String>,
    timeout: Duration,
}

impl OracleClient {
    /// Configure from `COMPASS_ORACLE_URL` and `COMPASS_ORACLE_TIMEOUT_MS`.
    /// No URL means the deployment runs on local classification only.
    pub fn from_env() -> Self {
        let base_url = std::env::var("COMPASS_ORACLE_URL").ok().filter(|v| !v.is_empty());
        let timeout_ms = std::env::var("COMPASS_ORACLE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        if base_url.is_none() {
            tracing::info!("COMPASS_ORACLE_URL not set; running local-only classification");
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub async fn classify(&self, text: &str, profile_summary: String) -> OracleOutcome {
        let Some(base_url) = &self.base_url else {
            return OracleOutcome::Unavailable;
        };

        let request = OracleRequest {
            text: text.to_string(),
            profile_summary,
        };

        let result = self
            .client
            .post(format!("{base_url}/v1/classify"))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await;

        let response = match result {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "oracle returned non-success status");
                return OracleOutcome::Unavailable;
            }
            Err(err) => {
                tracing::warn!(error = %err, "oracle call failed");
                return OracleOutcome::Unavailable;
            }
        };

        match response.json::<OracleResponse>().await {
            Ok(parsed) => OracleOutcome::Ok(parsed),
            Err(err) => {
                tracing::warn!(error = %err, "oracle returned malformed payload");
                OracleOutcome::Unavailable
            }
        }
    }
}
