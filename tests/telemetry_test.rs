//! Integration tests for telemetry initialization and span helpers.

use bugroute::model::{WorkItemId, WorkerId};
use bugroute::telemetry::assign;
use uuid::Uuid;

#[test]
fn telemetry_initializes_without_endpoint() {
    // The global subscriber can only be set once per process; another test
    // may have won the race, which is fine.
    let config = bugroute::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "bugroute-test".to_string(),
        log_level: "debug".to_string(),
    };
    let _guard = bugroute::telemetry::init_telemetry(config);
}

#[test]
fn assign_span_records_outcome() {
    let span = assign::start_assign_span(WorkItemId(7), &Uuid::new_v4());
    assign::record_outcome(&span, "assigned", Some(WorkerId(3)));
    assign::record_outcome(&span, "no_candidates", None);
}

#[test]
fn predict_span_records_source() {
    let span = assign::start_predict_span(WorkerId(3));
    assign::record_prediction_source(&span, "heuristic-fallback");
}
