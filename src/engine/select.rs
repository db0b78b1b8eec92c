//! Candidate scoring and selection.

use crate::error::{Error, Result};
use crate::model::{Candidate, Role, Worker, WorkerMetrics};
use crate::store::MetricsStore;
use crate::stress::{FeatureSet, Prediction, StressPredictor};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, warn};

/// `1 / avg_resolution_time_hours`, or `1` for a worker with no history.
///
/// A worker with no track record therefore outranks one that resolves in
/// two hours, all else equal.
pub fn productivity(avg_resolution_time_hours: f64) -> f64 {
    if avg_resolution_time_hours > 0.0 {
        1.0 / avg_resolution_time_hours
    } else {
        1.0
    }
}

/// `0.5 * (open / 10) + 0.4 * stress - 0.1 * productivity`. Lower is better.
pub fn composite_score(open_item_count: u32, predicted_stress: f64, productivity: f64) -> f64 {
    0.5 * (f64::from(open_item_count) / 10.0) + 0.4 * predicted_stress - 0.1 * productivity
}

/// One candidate with its full scoring breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub worker: Worker,
    pub metrics: WorkerMetrics,
    pub prediction: Prediction,
    pub productivity: f64,
    pub composite: f64,
}

impl ScoredCandidate {
    pub fn score(candidate: Candidate, prediction: Prediction) -> Self {
        let productivity = productivity(candidate.metrics.avg_resolution_time_hours);
        let composite = composite_score(
            candidate.metrics.open_item_count,
            prediction.score,
            productivity,
        );
        Self {
            worker: candidate.worker,
            metrics: candidate.metrics,
            prediction,
            productivity,
            composite,
        }
    }

    /// Ranking order: lowest composite first, then lowest worker id.
    fn rank(&self, other: &Self) -> Ordering {
        self.composite
            .total_cmp(&other.composite)
            .then_with(|| self.worker.id.cmp(&other.worker.id))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub chosen: ScoredCandidate,
    /// Every candidate, best first. `ranking[0]` is `chosen`.
    pub ranking: Vec<ScoredCandidate>,
}

impl Selection {
    pub fn predicted_stress(&self) -> f64 {
        self.chosen.prediction.score
    }

    pub fn composite(&self) -> f64 {
        self.chosen.composite
    }
}

#[derive(Debug, Clone)]
pub enum Choice {
    Selected(Box<Selection>),
    /// Nobody with the assignable role has complete metrics.
    NoCandidates,
}

/// Rank already-scored candidates. Pure; `None` for an empty slate.
pub fn pick(mut scored: Vec<ScoredCandidate>) -> Option<Selection> {
    scored.sort_by(ScoredCandidate::rank);
    let chosen = scored.first()?.clone();
    Some(Selection {
        chosen,
        ranking: scored,
    })
}

pub struct AssignmentSelector<S> {
    store: Arc<S>,
    predictor: Arc<StressPredictor<S>>,
    role: Role,
}

impl<S: MetricsStore> AssignmentSelector<S> {
    pub fn new(store: Arc<S>, predictor: Arc<StressPredictor<S>>) -> Self {
        Self {
            store,
            predictor,
            role: Role::ASSIGNABLE,
        }
    }

    /// Score every candidate and pick the best one.
    ///
    /// Predictions run concurrently, one task per candidate. All of them
    /// are joined before ranking.
    ///
    /// # Errors
    /// [`Error::DependencyUnavailable`] if candidates cannot be loaded.
    pub async fn choose(&self) -> Result<Choice> {
        let candidates = self
            .store
            .list_candidates(self.role)
            .await
            .map_err(Error::unavailable)?;

        if candidates.is_empty() {
            return Ok(Choice::NoCandidates);
        }
        debug!(count = candidates.len(), "scoring candidates");

        let predictions = self.predict_all(&candidates).await;
        let scored = candidates
            .into_iter()
            .zip(predictions)
            .map(|(candidate, prediction)| ScoredCandidate::score(candidate, prediction))
            .collect();

        Ok(pick(scored).map_or(Choice::NoCandidates, |s| Choice::Selected(Box::new(s))))
    }

    /// One prediction per candidate, in candidate order. A task that dies
    /// falls back to the heuristic for its own candidate only.
    async fn predict_all(&self, candidates: &[Candidate]) -> Vec<Prediction> {
        let features: Vec<FeatureSet> = candidates.iter().map(FeatureSet::from).collect();

        let mut tasks = JoinSet::new();
        for (idx, (candidate, features)) in candidates.iter().zip(&features).enumerate() {
            let predictor = Arc::clone(&self.predictor);
            let worker = candidate.worker.id;
            let features = features.clone();
            tasks.spawn(
                async move { (idx, predictor.predict_features(worker, &features).await) }
                    .in_current_span(),
            );
        }

        let mut predictions: Vec<Option<Prediction>> = vec![None; candidates.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, prediction)) => predictions[idx] = Some(prediction),
                Err(e) => warn!(error = %e, "stress prediction task failed"),
            }
        }

        predictions
            .into_iter()
            .zip(&features)
            .map(|(p, f)| p.unwrap_or_else(|| Prediction::heuristic(f)))
            .collect()
    }
}
