//! Metric instrument factories for bugroute.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("bugroute")
}

/// Counter: assignment requests, automatic and manual.
/// Labels: `result` ("assigned" | "manual" | "no_candidates" | "failed" | "unavailable").
pub fn assign_requests() -> Counter<u64> {
    meter()
        .u64_counter("bugroute.assign.requests")
        .with_description("Number of assignment requests by outcome")
        .build()
}

/// Counter: stress predictions.
/// Labels: `source` ("oracle" | "heuristic-fallback" | "no-data").
pub fn stress_predictions() -> Counter<u64> {
    meter()
        .u64_counter("bugroute.stress.predictions")
        .with_description("Number of stress predictions by source")
        .build()
}

/// Histogram: oracle round-trip in milliseconds.
/// Labels: `ok`.
pub fn oracle_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("bugroute.oracle.duration_ms")
        .with_description("Stress oracle call duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: work item status transitions.
/// Labels: `from`, `to`.
pub fn work_item_transitions() -> Counter<u64> {
    meter()
        .u64_counter("bugroute.work_item.transitions")
        .with_description("Number of work item status transitions")
        .build()
}
