//! Span helpers for assignment decisions.

use crate::model::{WorkItemId, WorkerId};
use tracing::Span;
use uuid::Uuid;

/// Start the root span for one auto-assign request.
///
/// `assign.outcome` and `assign.assignee` are filled in by
/// [`record_outcome`] once the decision is made.
pub fn start_assign_span(item: WorkItemId, request_id: &Uuid) -> Span {
    tracing::info_span!(
        "assign.auto",
        "assign.item_id" = item.0,
        "assign.request_id" = %request_id,
        "assign.outcome" = tracing::field::Empty,
        "assign.assignee" = tracing::field::Empty,
    )
}

pub fn record_outcome(span: &Span, outcome: &str, assignee: Option<WorkerId>) {
    span.record("assign.outcome", outcome);
    if let Some(worker) = assignee {
        span.record("assign.assignee", worker.0);
    }
}

/// Start the span for an assignment to an explicitly named worker.
pub fn start_manual_span(item: WorkItemId, assignee: WorkerId, request_id: &Uuid) -> Span {
    tracing::info_span!(
        "assign.manual",
        "assign.item_id" = item.0,
        "assign.request_id" = %request_id,
        "assign.assignee" = assignee.0,
        "assign.outcome" = tracing::field::Empty,
    )
}

/// Start a span for one worker's stress prediction.
pub fn start_predict_span(worker: WorkerId) -> Span {
    tracing::debug_span!(
        "stress.predict",
        "stress.worker_id" = worker.0,
        "stress.source" = tracing::field::Empty,
    )
}

pub fn record_prediction_source(span: &Span, source: &str) {
    span.record("stress.source", source);
}
