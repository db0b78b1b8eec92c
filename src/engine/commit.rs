//! The atomic assignment commit.

use crate::error::{Error, Result};
use crate::model::{AssignmentRecord, Status, WorkItemId, WorkerId};
use crate::store::{AssignmentTx, MetricsStore};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::sync::Arc;
use tracing::{info, warn};

pub struct AssignmentTransaction<S> {
    store: Arc<S>,
}

impl<S: MetricsStore> AssignmentTransaction<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record the assignment, move the item to `InProgress`, and bump the
    /// assignee's open count, all in one store transaction.
    ///
    /// The item's prior status is not checked here.
    ///
    /// # Errors
    /// [`Error::AssignmentFailed`] if any step fails; nothing is persisted.
    pub async fn commit(
        &self,
        item: WorkItemId,
        assignee: WorkerId,
        assigner: WorkerId,
    ) -> Result<AssignmentRecord> {
        match self.apply(item, assignee, assigner).await {
            Ok((record, previous)) => {
                metrics::work_item_transitions().add(
                    1,
                    &[
                        KeyValue::new("from", previous.to_string()),
                        KeyValue::new("to", Status::InProgress.to_string()),
                    ],
                );
                info!(%item, %assignee, %assigner, "assignment committed");
                Ok(record)
            }
            Err(e) => {
                warn!(%item, %assignee, error = %e, "assignment rolled back");
                Err(Error::AssignmentFailed {
                    item,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn apply(
        &self,
        item: WorkItemId,
        assignee: WorkerId,
        assigner: WorkerId,
    ) -> Result<(AssignmentRecord, Status)> {
        // An early return drops `tx`, which rolls everything back.
        let mut tx = self.store.begin().await?;
        let record = tx
            .append_assignment(item, assignee, assigner, chrono::Utc::now())
            .await?;
        let previous = tx.start_work_item(item, assignee).await?;
        tx.increment_open_items(assignee).await?;
        tx.commit().await?;
        Ok((record, previous))
    }
}
