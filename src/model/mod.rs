//! Core data model.
//!
//! Work items are routed to workers. Every routing decision appends an
//! immutable [`AssignmentRecord`]; records are never edited in place.

pub mod work;
pub mod worker;

pub use work::{NewWorkItem, Severity, Status, WorkItem, WorkItemId};
pub use worker::{NewWorker, Role, Worker, WorkerId, WorkerMetrics};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One assignment event. A work item may accumulate several over its life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: i64,
    pub work_item: WorkItemId,
    pub assignee: WorkerId,
    pub assigner: WorkerId,
    pub assigned_at: DateTime<Utc>,
}

/// A worker joined with its metrics row. Only workers that have one can be
/// candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub worker: Worker,
    pub metrics: WorkerMetrics,
}
