//! Auto-assign: select a developer, then commit.

use crate::error::{Error, Result};
use crate::model::{AssignmentRecord, WorkItemId, WorkerId};
use crate::store::MetricsStore;
use crate::stress::{HttpOracle, StressPredictor};
use crate::telemetry::{assign as spans, metrics};
use opentelemetry::KeyValue;
use serde::Serialize;
use std::sync::Arc;
use tracing::{Instrument, info};
use uuid::Uuid;

use super::commit::AssignmentTransaction;
use super::select::{AssignmentSelector, Choice, ScoredCandidate};

/// A committed assignment with the scoring that led to it.
#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub record: AssignmentRecord,
    /// The winner: identity, raw metrics, predicted stress, composite.
    pub scoring: ScoredCandidate,
    /// All candidates, best first.
    pub ranking: Vec<ScoredCandidate>,
}

#[derive(Debug, Clone)]
pub enum AssignOutcome {
    Assigned(Box<Assignment>),
    /// Left unassigned; somebody has to route it by hand.
    NoCandidates,
}

/// Composes selection and commit. Holds the store handle it was built with.
pub struct Assigner<S> {
    predictor: Arc<StressPredictor<S>>,
    selector: AssignmentSelector<S>,
    transaction: AssignmentTransaction<S>,
}

impl<S: MetricsStore> Assigner<S> {
    pub fn new(store: Arc<S>, oracle: Option<HttpOracle>) -> Self {
        let predictor = Arc::new(StressPredictor::new(Arc::clone(&store), oracle));
        Self {
            selector: AssignmentSelector::new(Arc::clone(&store), Arc::clone(&predictor)),
            transaction: AssignmentTransaction::new(store),
            predictor,
        }
    }

    pub fn predictor(&self) -> &StressPredictor<S> {
        &self.predictor
    }

    pub fn selector(&self) -> &AssignmentSelector<S> {
        &self.selector
    }

    /// Route `item` to the best-fit developer.
    ///
    /// Dropping the returned future before it resolves abandons in-flight
    /// oracle calls and commits nothing.
    ///
    /// # Errors
    /// [`Error::DependencyUnavailable`] if candidates could not be loaded,
    /// [`Error::AssignmentFailed`] if the commit rolled back. In both cases
    /// the item is still unassigned and the whole call may be retried.
    pub async fn auto_assign(&self, item: WorkItemId, assigner: WorkerId) -> Result<AssignOutcome> {
        let span = spans::start_assign_span(item, &Uuid::new_v4());
        let result = self.run(item, assigner).instrument(span.clone()).await;

        let (label, assignee) = match &result {
            Ok(AssignOutcome::Assigned(a)) => ("assigned", Some(a.record.assignee)),
            Ok(AssignOutcome::NoCandidates) => ("no_candidates", None),
            Err(Error::AssignmentFailed { .. }) => ("failed", None),
            Err(_) => ("unavailable", None),
        };
        spans::record_outcome(&span, label, assignee);
        metrics::assign_requests().add(1, &[KeyValue::new("result", label)]);
        result
    }

    /// Route `item` to a named worker, bypassing selection.
    ///
    /// Goes through the same atomic commit as [`auto_assign`](Self::auto_assign).
    /// An item that already has an assignee gets a new record; earlier
    /// records are kept.
    ///
    /// # Errors
    /// [`Error::AssignmentFailed`] if the commit rolled back, for example
    /// because `assignee` has no metrics row.
    pub async fn assign_to(
        &self,
        item: WorkItemId,
        assignee: WorkerId,
        assigner: WorkerId,
    ) -> Result<AssignmentRecord> {
        let span = spans::start_manual_span(item, assignee, &Uuid::new_v4());
        let result = self
            .transaction
            .commit(item, assignee, assigner)
            .instrument(span.clone())
            .await;

        let label = if result.is_ok() { "manual" } else { "failed" };
        span.record("assign.outcome", label);
        metrics::assign_requests().add(1, &[KeyValue::new("result", label)]);
        result
    }

    async fn run(&self, item: WorkItemId, assigner: WorkerId) -> Result<AssignOutcome> {
        let selection = match self.selector.choose().await? {
            Choice::Selected(selection) => *selection,
            Choice::NoCandidates => {
                info!(%item, "no eligible developers, leaving item unassigned");
                return Ok(AssignOutcome::NoCandidates);
            }
        };

        let chosen = &selection.chosen;
        info!(
            %item,
            assignee = %chosen.worker.id,
            composite = chosen.composite,
            predicted_stress = chosen.prediction.score,
            source = %chosen.prediction.source,
            "selected assignee"
        );

        let record = self
            .transaction
            .commit(item, chosen.worker.id, assigner)
            .await?;

        Ok(AssignOutcome::Assigned(Box::new(Assignment {
            record,
            scoring: selection.chosen,
            ranking: selection.ranking,
        })))
    }
}
