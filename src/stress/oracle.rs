//! HTTP client for the external stress-scoring service.
//!
//! POSTs `{worker_id, features}` and expects
//! `{predicted_stress_score, model_version}` back. Every call is bounded by
//! the configured timeout.

use crate::model::WorkerId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::FeatureSet;

/// Per-call budget. Also the ceiling: a configured timeout may be shorter,
/// never longer.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Model tag used when the service omits `model_version`.
const DEFAULT_MODEL_VERSION: &str = "ml-v1";

/// Ways an oracle call can fail. Never surfaced past the predictor.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),

    #[error("oracle returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed oracle payload: {0}")]
    Malformed(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    worker_id: i64,
    features: &'a FeatureSet,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predicted_stress_score: f64,
    #[serde(default)]
    model_version: Option<String>,
}

/// A successful oracle answer.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleScore {
    pub score: f64,
    pub model_version: String,
}

pub struct HttpOracle {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpOracle {
    pub fn new(url: impl Into<String>) -> Result<Self, OracleError> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    /// `timeout` is capped at [`DEFAULT_TIMEOUT`].
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        let timeout = timeout.min(DEFAULT_TIMEOUT);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    pub async fn score(
        &self,
        worker: WorkerId,
        features: &FeatureSet,
    ) -> Result<OracleScore, OracleError> {
        let request = PredictRequest {
            worker_id: worker.0,
            features,
        };

        // reqwest enforces the same bound; the outer timeout also covers
        // reading the body.
        let response = tokio::time::timeout(self.timeout, async {
            let response = self.client.post(&self.url).json(&request).send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        })
        .await
        .map_err(|_| OracleError::Timeout(self.timeout))?
        .map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout(self.timeout)
            } else {
                OracleError::Network(e)
            }
        })?;

        let (status, body) = response;
        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: PredictResponse =
            serde_json::from_str(&body).map_err(|e| OracleError::Malformed(e.to_string()))?;
        if !(0.0..=1.0).contains(&parsed.predicted_stress_score) {
            return Err(OracleError::Malformed(format!(
                "predicted_stress_score {} outside [0, 1]",
                parsed.predicted_stress_score
            )));
        }

        Ok(OracleScore {
            score: parsed.predicted_stress_score,
            model_version: parsed
                .model_version
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string()),
        })
    }
}
