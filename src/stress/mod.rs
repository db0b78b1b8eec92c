//! Stress prediction for a single worker.
//!
//! Delegates to the optional HTTP oracle and degrades to a local heuristic
//! whenever the oracle is absent or misbehaves. Oracle trouble is never an
//! error for the caller; only the [`StressSource`] tag tells the two apart.

pub mod oracle;

pub use oracle::{HttpOracle, OracleError, OracleScore};

use crate::error::{Error, Result};
use crate::model::{Candidate, Role, WorkerId, WorkerMetrics};
use crate::store::MetricsStore;
use crate::telemetry::{assign as spans, metrics};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, warn};

/// Score returned for workers with no metrics row.
pub const NO_DATA_SCORE: f64 = 0.3;

/// Features sent to the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub open_item_count: u32,
    pub avg_resolution_time_hours: f64,
    pub current_stress_score: f64,
    pub role: Role,
}

impl FeatureSet {
    pub fn new(metrics: &WorkerMetrics, role: Role) -> Self {
        Self {
            open_item_count: metrics.open_item_count,
            avg_resolution_time_hours: metrics.avg_resolution_time_hours,
            current_stress_score: metrics.current_stress_score,
            role,
        }
    }
}

impl From<&Candidate> for FeatureSet {
    fn from(candidate: &Candidate) -> Self {
        Self::new(&candidate.metrics, candidate.worker.role)
    }
}

/// Where a predicted score came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum StressSource {
    /// Worker has no metrics row.
    NoData,
    /// The oracle answered; carries its reported model version.
    Oracle(String),
    /// Oracle absent or failed.
    HeuristicFallback,
}

impl StressSource {
    pub fn tag(&self) -> &str {
        match self {
            StressSource::NoData => "no-data",
            StressSource::Oracle(version) => version,
            StressSource::HeuristicFallback => "heuristic-fallback",
        }
    }
}

impl std::fmt::Display for StressSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.tag())
    }
}

impl From<StressSource> for String {
    fn from(source: StressSource) -> Self {
        source.tag().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Always within `[0, 1]`.
    pub score: f64,
    pub source: StressSource,
}

impl Prediction {
    pub fn heuristic(features: &FeatureSet) -> Self {
        Self {
            score: heuristic_score(features.open_item_count, features.current_stress_score),
            source: StressSource::HeuristicFallback,
        }
    }
}

/// `min(1, 0.2 + 0.05 * open + 0.5 * stress)`, clamped at zero for
/// out-of-range input.
pub fn heuristic_score(open_item_count: u32, current_stress_score: f64) -> f64 {
    (0.2 + 0.05 * f64::from(open_item_count) + 0.5 * current_stress_score).clamp(0.0, 1.0)
}

pub struct StressPredictor<S> {
    store: Arc<S>,
    oracle: Option<HttpOracle>,
}

impl<S: MetricsStore> StressPredictor<S> {
    pub fn new(store: Arc<S>, oracle: Option<HttpOracle>) -> Self {
        Self { store, oracle }
    }

    /// Predict stress for one worker, loading its features from the store.
    ///
    /// # Errors
    /// Only [`Error::DependencyUnavailable`], when the store cannot be read.
    pub async fn predict(&self, worker: WorkerId) -> Result<Prediction> {
        let candidate = self
            .store
            .get_metrics(worker)
            .await
            .map_err(Error::unavailable)?;

        match candidate {
            Some(candidate) => Ok(self.predict_features(worker, &FeatureSet::from(&candidate)).await),
            None => {
                debug!(%worker, "no metrics row, using neutral score");
                let prediction = Prediction {
                    score: NO_DATA_SCORE,
                    source: StressSource::NoData,
                };
                record_prediction(&prediction);
                Ok(prediction)
            }
        }
    }

    /// Predict stress from an already-loaded feature set. Infallible.
    pub async fn predict_features(&self, worker: WorkerId, features: &FeatureSet) -> Prediction {
        let span = spans::start_predict_span(worker);
        let prediction = self
            .consult_oracle(worker, features)
            .instrument(span.clone())
            .await;
        spans::record_prediction_source(&span, prediction.source.tag());
        record_prediction(&prediction);
        prediction
    }

    async fn consult_oracle(&self, worker: WorkerId, features: &FeatureSet) -> Prediction {
        let Some(oracle) = &self.oracle else {
            debug!(%worker, "no stress oracle configured");
            return Prediction::heuristic(features);
        };

        let started = Instant::now();
        let result = oracle.score(worker, features).await;
        metrics::oracle_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("ok", result.is_ok())],
        );

        match result {
            Ok(answer) => Prediction {
                score: answer.score,
                source: StressSource::Oracle(answer.model_version),
            },
            Err(e) => {
                warn!(%worker, error = %e, "stress oracle degraded, using heuristic");
                Prediction::heuristic(features)
            }
        }
    }
}

fn record_prediction(prediction: &Prediction) {
    let source = match prediction.source {
        StressSource::Oracle(_) => "oracle",
        _ => prediction.source.tag(),
    };
    metrics::stress_predictions().add(1, &[KeyValue::new("source", source.to_string())]);
}
