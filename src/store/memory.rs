//! In-process metrics store.
//!
//! All tables sit behind one async mutex. A transaction takes the lock for
//! its whole lifetime and works on a staged copy, so concurrent commits are
//! serialized and an abandoned transaction leaves no trace.

use super::{AssignmentTx, MetricsStore};
use crate::error::{Error, Result};
use crate::model::*;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct Tables {
    workers: BTreeMap<WorkerId, Worker>,
    metrics: BTreeMap<WorkerId, WorkerMetrics>,
    items: BTreeMap<WorkItemId, WorkItem>,
    assignments: Vec<AssignmentRecord>,
    next_worker: i64,
    next_item: i64,
    next_assignment: i64,
}

impl Tables {
    fn candidate(&self, id: WorkerId) -> Option<Candidate> {
        let worker = self.workers.get(&id)?;
        let metrics = self.metrics.get(&id)?;
        Some(Candidate {
            worker: worker.clone(),
            metrics: *metrics,
        })
    }
}

/// Metrics store backed by process memory. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_worker(&self, new: NewWorker) -> Worker {
        let mut tables = self.tables.lock().await;
        tables.next_worker += 1;
        let worker = Worker {
            id: WorkerId(tables.next_worker),
            name: new.name,
            email: new.email,
            role: new.role,
        };
        tables.workers.insert(worker.id, worker.clone());
        worker
    }

    /// Create or replace a worker's metrics row.
    pub async fn set_metrics(&self, worker: WorkerId, metrics: WorkerMetrics) -> Result<()> {
        metrics.validate()?;
        let mut tables = self.tables.lock().await;
        if !tables.workers.contains_key(&worker) {
            return Err(Error::NotFound(format!("worker {worker}")));
        }
        tables.metrics.insert(worker, metrics);
        Ok(())
    }

    pub async fn metrics(&self, worker: WorkerId) -> Option<WorkerMetrics> {
        self.tables.lock().await.metrics.get(&worker).copied()
    }

    pub async fn create_work_item(&self, new: NewWorkItem) -> WorkItem {
        let mut tables = self.tables.lock().await;
        tables.next_item += 1;
        let now = Utc::now();
        let item = WorkItem {
            id: WorkItemId(tables.next_item),
            title: new.title,
            description: new.description,
            severity: new.severity,
            status: Status::Open,
            assignee: None,
            reporter: new.reporter,
            created_at: now,
            updated_at: now,
            closed_at: None,
        };
        tables.items.insert(item.id, item.clone());
        item
    }

    pub async fn get_work_item(&self, id: WorkItemId) -> Result<WorkItem> {
        self.tables
            .lock()
            .await
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("work item {id}")))
    }

    /// Close an item and release the open slot held by each of its
    /// assignment records, in one step.
    pub async fn close_work_item(&self, id: WorkItemId) -> Result<WorkItem> {
        let mut tables = self.tables.lock().await;
        let mut staged = tables.clone();

        let item = staged
            .items
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("work item {id}")))?;
        if !item.status.can_transition_to(Status::Closed) {
            return Err(Error::InvalidTransition {
                from: item.status.to_string(),
                to: Status::Closed.to_string(),
            });
        }
        let now = Utc::now();
        item.status = Status::Closed;
        item.updated_at = now;
        item.closed_at = Some(now);
        let closed = item.clone();

        // Every record for this item held one open slot for its assignee.
        let holders: Vec<WorkerId> = staged
            .assignments
            .iter()
            .filter(|r| r.work_item == id)
            .map(|r| r.assignee)
            .collect();
        for holder in holders {
            if let Some(metrics) = staged.metrics.get_mut(&holder) {
                metrics.open_item_count = metrics.open_item_count.saturating_sub(1);
            }
        }

        *tables = staged;
        Ok(closed)
    }

    /// Assignment records, oldest first, optionally for one item.
    pub async fn assignments(&self, item: Option<WorkItemId>) -> Vec<AssignmentRecord> {
        self.tables
            .lock()
            .await
            .assignments
            .iter()
            .filter(|r| item.is_none_or(|id| r.work_item == id))
            .cloned()
            .collect()
    }
}

impl MetricsStore for MemoryStore {
    type Tx = MemoryTx;

    async fn list_candidates(&self, role: Role) -> Result<Vec<Candidate>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .workers
            .values()
            .filter(|w| w.role == role)
            .filter_map(|w| tables.candidate(w.id))
            .collect())
    }

    async fn get_metrics(&self, worker: WorkerId) -> Result<Option<Candidate>> {
        Ok(self.tables.lock().await.candidate(worker))
    }

    async fn begin(&self) -> Result<MemoryTx> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTx { guard, staged })
    }
}

/// Holds the store lock until committed or dropped.
pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

impl AssignmentTx for MemoryTx {
    async fn append_assignment(
        &mut self,
        item: WorkItemId,
        assignee: WorkerId,
        assigner: WorkerId,
        at: DateTime<Utc>,
    ) -> Result<AssignmentRecord> {
        if !self.staged.items.contains_key(&item) {
            return Err(Error::NotFound(format!("work item {item}")));
        }
        for worker in [assignee, assigner] {
            if !self.staged.workers.contains_key(&worker) {
                return Err(Error::NotFound(format!("worker {worker}")));
            }
        }
        self.staged.next_assignment += 1;
        let record = AssignmentRecord {
            id: self.staged.next_assignment,
            work_item: item,
            assignee,
            assigner,
            assigned_at: at,
        };
        self.staged.assignments.push(record.clone());
        Ok(record)
    }

    async fn start_work_item(&mut self, item: WorkItemId, assignee: WorkerId) -> Result<Status> {
        let entry = self
            .staged
            .items
            .get_mut(&item)
            .ok_or_else(|| Error::NotFound(format!("work item {item}")))?;
        let previous = entry.status;
        entry.status = Status::InProgress;
        entry.assignee = Some(assignee);
        entry.updated_at = Utc::now();
        Ok(previous)
    }

    async fn increment_open_items(&mut self, worker: WorkerId) -> Result<u32> {
        let metrics = self
            .staged
            .metrics
            .get_mut(&worker)
            .ok_or_else(|| Error::NotFound(format!("metrics for worker {worker}")))?;
        metrics.open_item_count += 1;
        Ok(metrics.open_item_count)
    }

    async fn commit(self) -> Result<()> {
        let MemoryTx { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }
}
