//! The metrics store seam used by the assignment engine.
//!
//! Reads go straight through [`MetricsStore`]. Writes happen only inside an
//! [`AssignmentTx`] obtained from [`MetricsStore::begin`]: either every staged
//! effect becomes visible on [`AssignmentTx::commit`], or dropping the
//! handle discards all of them.

pub mod memory;

pub use memory::{MemoryStore, MemoryTx};

use crate::error::Result;
use crate::model::{AssignmentRecord, Candidate, Role, Status, WorkItemId, WorkerId};
use chrono::{DateTime, Utc};
use std::future::Future;

pub trait MetricsStore: Send + Sync + 'static {
    type Tx: AssignmentTx;

    /// All workers holding `role` that have a metrics row. Workers without
    /// one are left out.
    fn list_candidates(&self, role: Role) -> impl Future<Output = Result<Vec<Candidate>>> + Send;

    /// A worker joined with its metrics, or `None` if either is missing.
    fn get_metrics(
        &self,
        worker: WorkerId,
    ) -> impl Future<Output = Result<Option<Candidate>>> + Send;

    /// Open a serializing write unit.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx>> + Send;
}

/// Staged writes for one assignment. Dropping without `commit` rolls back.
pub trait AssignmentTx: Send {
    fn append_assignment(
        &mut self,
        item: WorkItemId,
        assignee: WorkerId,
        assigner: WorkerId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<AssignmentRecord>> + Send;

    /// Set the item to `InProgress` with `assignee`. Returns the status it
    /// had before.
    fn start_work_item(
        &mut self,
        item: WorkItemId,
        assignee: WorkerId,
    ) -> impl Future<Output = Result<Status>> + Send;

    /// Bump the worker's open item count. Returns the new count.
    fn increment_open_items(
        &mut self,
        worker: WorkerId,
    ) -> impl Future<Output = Result<u32>> + Send;

    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}
