//! Integration tests for selection, commit, and auto-assign.

use bugroute::engine::{AssignOutcome, Assigner, AssignmentTransaction, Choice};
use bugroute::error::{Error, Result};
use bugroute::model::*;
use bugroute::store::{AssignmentTx, MemoryStore, MemoryTx, MetricsStore};
use bugroute::stress::{HttpOracle, StressSource};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn developer(store: &MemoryStore, name: &str, metrics: Option<WorkerMetrics>) -> Worker {
    let worker = store
        .add_worker(NewWorker::new(
            name,
            format!("{}@example.com", name.to_lowercase()),
            Role::Developer,
        ))
        .await;
    if let Some(metrics) = metrics {
        store.set_metrics(worker.id, metrics).await.unwrap();
    }
    worker
}

async fn manager(store: &MemoryStore) -> Worker {
    store
        .add_worker(NewWorker::new("Mia", "mia@example.com", Role::Manager))
        .await
}

async fn open_item(store: &MemoryStore) -> WorkItem {
    store
        .create_work_item(NewWorkItem::new("login page 500s", Severity::High))
        .await
}

fn approx(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lighter_loaded_developer_wins_without_oracle() {
    let store = MemoryStore::new();
    let a = developer(&store, "Ada", Some(WorkerMetrics::new(2, 5.0, 0.1))).await;
    let b = developer(&store, "Bob", Some(WorkerMetrics::new(8, 0.0, 0.2))).await;
    let assigner = Assigner::new(Arc::new(store), None);

    let Choice::Selected(selection) = assigner.selector().choose().await.unwrap() else {
        panic!("expected a selection");
    };

    assert_eq!(selection.chosen.worker.id, a.id);
    approx(selection.predicted_stress(), 0.35);
    approx(selection.composite(), 0.22);
    assert_eq!(selection.chosen.prediction.source, StressSource::HeuristicFallback);

    let runner_up = &selection.ranking[1];
    assert_eq!(runner_up.worker.id, b.id);
    approx(runner_up.prediction.score, 0.70);
    approx(runner_up.productivity, 1.0);
    approx(runner_up.composite, 0.58);
}

#[tokio::test]
async fn developer_without_metrics_is_not_a_candidate() {
    let store = MemoryStore::new();
    developer(&store, "Ada", None).await;
    let assigner = Assigner::new(Arc::new(store), None);

    assert!(matches!(
        assigner.selector().choose().await.unwrap(),
        Choice::NoCandidates
    ));
}

#[tokio::test]
async fn empty_store_has_no_candidates() {
    let assigner = Assigner::new(Arc::new(MemoryStore::new()), None);
    assert!(matches!(
        assigner.selector().choose().await.unwrap(),
        Choice::NoCandidates
    ));
}

#[tokio::test]
async fn non_developers_are_never_candidates() {
    let store = MemoryStore::new();
    let boss = manager(&store).await;
    store
        .set_metrics(boss.id, WorkerMetrics::new(0, 1.0, 0.0))
        .await
        .unwrap();
    let assigner = Assigner::new(Arc::new(store), None);

    assert!(matches!(
        assigner.selector().choose().await.unwrap(),
        Choice::NoCandidates
    ));
}

#[tokio::test]
async fn identical_candidates_tie_break_on_lowest_id() {
    let store = MemoryStore::new();
    let first = developer(&store, "Ada", Some(WorkerMetrics::new(3, 4.0, 0.3))).await;
    developer(&store, "Bob", Some(WorkerMetrics::new(3, 4.0, 0.3))).await;
    developer(&store, "Cy", Some(WorkerMetrics::new(3, 4.0, 0.3))).await;
    let assigner = Assigner::new(Arc::new(store), None);

    for _ in 0..5 {
        let Choice::Selected(selection) = assigner.selector().choose().await.unwrap() else {
            panic!("expected a selection");
        };
        assert_eq!(selection.chosen.worker.id, first.id);
    }
}

#[tokio::test]
async fn no_history_outranks_fast_resolver() {
    let store = MemoryStore::new();
    developer(&store, "Fast", Some(WorkerMetrics::new(1, 2.0, 0.2))).await;
    let fresh = developer(&store, "Fresh", Some(WorkerMetrics::new(1, 0.0, 0.2))).await;
    let assigner = Assigner::new(Arc::new(store), None);

    let Choice::Selected(selection) = assigner.selector().choose().await.unwrap() else {
        panic!("expected a selection");
    };
    assert_eq!(selection.chosen.worker.id, fresh.id);
}

#[tokio::test]
async fn oracle_score_flows_into_selection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "predicted_stress_score": 0.9,
            "model_version": "train-csv-v1"
        })))
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let only = developer(&store, "Ada", Some(WorkerMetrics::new(1, 3.0, 0.2))).await;
    let oracle = HttpOracle::new(format!("{}/predict", server.uri())).unwrap();
    let assigner = Assigner::new(Arc::new(store), Some(oracle));

    let Choice::Selected(selection) = assigner.selector().choose().await.unwrap() else {
        panic!("expected a selection");
    };
    assert_eq!(selection.chosen.worker.id, only.id);
    assert_eq!(selection.predicted_stress(), 0.9);
    assert_eq!(selection.chosen.prediction.source.tag(), "train-csv-v1");
}

#[tokio::test]
async fn failing_oracle_only_degrades_affected_candidates() {
    let server = MockServer::start().await;
    // Every call fails; selection must still complete with heuristic scores.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let a = developer(&store, "Ada", Some(WorkerMetrics::new(2, 5.0, 0.1))).await;
    developer(&store, "Bob", Some(WorkerMetrics::new(8, 0.0, 0.2))).await;
    let oracle = HttpOracle::new(server.uri()).unwrap();
    let assigner = Assigner::new(Arc::new(store), Some(oracle));

    let Choice::Selected(selection) = assigner.selector().choose().await.unwrap() else {
        panic!("expected a selection");
    };
    assert_eq!(selection.chosen.worker.id, a.id);
    assert!(
        selection
            .ranking
            .iter()
            .all(|c| c.prediction.source == StressSource::HeuristicFallback)
    );
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn commit_applies_all_three_effects() {
    let store = MemoryStore::new();
    let dev = developer(&store, "Ada", Some(WorkerMetrics::new(2, 5.0, 0.1))).await;
    let boss = manager(&store).await;
    let item = open_item(&store).await;

    let tx = AssignmentTransaction::new(Arc::new(store.clone()));
    let record = tx.commit(item.id, dev.id, boss.id).await.unwrap();

    assert_eq!(record.work_item, item.id);
    assert_eq!(record.assignee, dev.id);
    assert_eq!(record.assigner, boss.id);

    let item = store.get_work_item(item.id).await.unwrap();
    assert_eq!(item.status, Status::InProgress);
    assert_eq!(item.assignee, Some(dev.id));
    assert_eq!(store.metrics(dev.id).await.unwrap().open_item_count, 3);
    assert_eq!(store.assignments(Some(item.id)).await, vec![record]);
}

#[tokio::test]
async fn commit_for_missing_item_fails_cleanly() {
    let store = MemoryStore::new();
    let dev = developer(&store, "Ada", Some(WorkerMetrics::new(0, 0.0, 0.0))).await;

    let tx = AssignmentTransaction::new(Arc::new(store.clone()));
    let result = tx.commit(WorkItemId(999), dev.id, dev.id).await;

    assert!(matches!(result, Err(Error::AssignmentFailed { item, .. }) if item == WorkItemId(999)));
    assert!(store.assignments(None).await.is_empty());
    assert_eq!(store.metrics(dev.id).await.unwrap().open_item_count, 0);
}

/// Delegates to a `MemoryStore` but fails every open-count increment.
#[derive(Clone)]
struct FailAtIncrement(MemoryStore);

struct FailingTx(MemoryTx);

impl MetricsStore for FailAtIncrement {
    type Tx = FailingTx;

    async fn list_candidates(&self, role: Role) -> Result<Vec<Candidate>> {
        self.0.list_candidates(role).await
    }

    async fn get_metrics(&self, worker: WorkerId) -> Result<Option<Candidate>> {
        self.0.get_metrics(worker).await
    }

    async fn begin(&self) -> Result<FailingTx> {
        Ok(FailingTx(self.0.begin().await?))
    }
}

impl AssignmentTx for FailingTx {
    async fn append_assignment(
        &mut self,
        item: WorkItemId,
        assignee: WorkerId,
        assigner: WorkerId,
        at: DateTime<Utc>,
    ) -> Result<AssignmentRecord> {
        self.0.append_assignment(item, assignee, assigner, at).await
    }

    async fn start_work_item(&mut self, item: WorkItemId, assignee: WorkerId) -> Result<Status> {
        self.0.start_work_item(item, assignee).await
    }

    async fn increment_open_items(&mut self, _worker: WorkerId) -> Result<u32> {
        Err(Error::Other("injected write failure".into()))
    }

    async fn commit(self) -> Result<()> {
        self.0.commit().await
    }
}

#[tokio::test]
async fn failure_at_increment_rolls_back_everything() {
    let inner = MemoryStore::new();
    let dev = developer(&inner, "Ada", Some(WorkerMetrics::new(2, 5.0, 0.1))).await;
    let boss = manager(&inner).await;
    let item = open_item(&inner).await;

    let tx = AssignmentTransaction::new(Arc::new(FailAtIncrement(inner.clone())));
    let result = tx.commit(item.id, dev.id, boss.id).await;

    match result {
        Err(Error::AssignmentFailed { item: failed, reason }) => {
            assert_eq!(failed, item.id);
            assert!(reason.contains("injected"), "reason: {reason}");
        }
        other => panic!("expected AssignmentFailed, got {other:?}"),
    }

    let after = inner.get_work_item(item.id).await.unwrap();
    assert_eq!(after.status, Status::Open);
    assert_eq!(after.assignee, None);
    assert!(inner.assignments(None).await.is_empty());
    assert_eq!(inner.metrics(dev.id).await.unwrap().open_item_count, 2);
}

#[tokio::test]
async fn auto_assign_surfaces_commit_failure() {
    let inner = MemoryStore::new();
    developer(&inner, "Ada", Some(WorkerMetrics::new(2, 5.0, 0.1))).await;
    let boss = manager(&inner).await;
    let item = open_item(&inner).await;

    let assigner = Assigner::new(Arc::new(FailAtIncrement(inner.clone())), None);
    let result = assigner.auto_assign(item.id, boss.id).await;

    assert!(matches!(result, Err(Error::AssignmentFailed { .. })));
    assert_eq!(inner.get_work_item(item.id).await.unwrap().status, Status::Open);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_do_not_lose_increments() {
    let store = MemoryStore::new();
    let dev = developer(&store, "Ada", Some(WorkerMetrics::new(0, 1.0, 0.0))).await;
    let boss = manager(&store).await;

    let mut items = Vec::new();
    for _ in 0..25 {
        items.push(open_item(&store).await.id);
    }

    let (dev_id, boss_id) = (dev.id, boss.id);
    let tx = Arc::new(AssignmentTransaction::new(Arc::new(store.clone())));
    let mut tasks = tokio::task::JoinSet::new();
    for item in items {
        let tx = Arc::clone(&tx);
        tasks.spawn(async move { tx.commit(item, dev_id, boss_id).await });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    assert_eq!(store.metrics(dev.id).await.unwrap().open_item_count, 25);
    assert_eq!(store.assignments(None).await.len(), 25);
}

// ---------------------------------------------------------------------------
// Auto-assign
// ---------------------------------------------------------------------------

#[tokio::test]
async fn auto_assign_routes_and_explains() {
    let store = MemoryStore::new();
    let a = developer(&store, "Ada", Some(WorkerMetrics::new(2, 5.0, 0.1))).await;
    developer(&store, "Bob", Some(WorkerMetrics::new(8, 0.0, 0.2))).await;
    let boss = manager(&store).await;
    let item = open_item(&store).await;
    let assigner = Assigner::new(Arc::new(store.clone()), None);

    let AssignOutcome::Assigned(assignment) = assigner.auto_assign(item.id, boss.id).await.unwrap()
    else {
        panic!("expected an assignment");
    };

    assert_eq!(assignment.record.assignee, a.id);
    assert_eq!(assignment.scoring.worker.email, "ada@example.com");
    assert_eq!(assignment.scoring.metrics.open_item_count, 2);
    approx(assignment.scoring.composite, 0.22);
    assert_eq!(assignment.ranking.len(), 2);

    // Current assignee matches the most recent record.
    let item = store.get_work_item(item.id).await.unwrap();
    let last = store.assignments(Some(item.id)).await.pop().unwrap();
    assert_eq!(item.assignee, Some(last.assignee));
    assert_eq!(store.metrics(a.id).await.unwrap().open_item_count, 3);
}

#[tokio::test]
async fn auto_assign_with_no_candidates_leaves_item_open() {
    let store = MemoryStore::new();
    developer(&store, "Ada", None).await;
    let boss = manager(&store).await;
    let item = open_item(&store).await;
    let assigner = Assigner::new(Arc::new(store.clone()), None);

    let outcome = assigner.auto_assign(item.id, boss.id).await.unwrap();

    assert!(matches!(outcome, AssignOutcome::NoCandidates));
    let item = store.get_work_item(item.id).await.unwrap();
    assert_eq!(item.status, Status::Open);
    assert!(store.assignments(None).await.is_empty());
}

#[tokio::test]
async fn open_count_tracks_unclosed_assignments() {
    let store = MemoryStore::new();
    let dev = developer(&store, "Ada", Some(WorkerMetrics::new(0, 2.0, 0.0))).await;
    let boss = manager(&store).await;
    let assigner = Assigner::new(Arc::new(store.clone()), None);

    let mut items = Vec::new();
    for _ in 0..3 {
        let item = open_item(&store).await;
        assigner.auto_assign(item.id, boss.id).await.unwrap();
        items.push(item.id);
    }
    store.close_work_item(items[1]).await.unwrap();

    let mut unclosed = 0;
    for record in store.assignments(None).await {
        if store.get_work_item(record.work_item).await.unwrap().status != Status::Closed {
            unclosed += 1;
        }
    }
    assert_eq!(unclosed, 2);
    assert_eq!(store.metrics(dev.id).await.unwrap().open_item_count, 2);
}

#[tokio::test]
async fn cancelled_request_commits_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"predicted_stress_score": 0.1, "model_version": "slow"}))
                .set_delay(Duration::from_millis(800)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::new();
    let dev = developer(&store, "Ada", Some(WorkerMetrics::new(0, 1.0, 0.0))).await;
    let boss = manager(&store).await;
    let item = open_item(&store).await;
    let oracle = HttpOracle::new(server.uri()).unwrap();
    let assigner = Assigner::new(Arc::new(store.clone()), Some(oracle));

    let result = tokio::time::timeout(
        Duration::from_millis(200),
        assigner.auto_assign(item.id, boss.id),
    )
    .await;
    assert!(result.is_err(), "request should have been cancelled");

    // Outlive the oracle's response; an orphaned task would have finished by now.
    tokio::time::sleep(Duration::from_millis(1200)).await;

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(store.get_work_item(item.id).await.unwrap().status, Status::Open);
    assert!(store.assignments(None).await.is_empty());
    assert_eq!(store.metrics(dev.id).await.unwrap().open_item_count, 0);
}

#[tokio::test]
async fn manual_reassignment_appends_a_record() {
    let store = MemoryStore::new();
    let ada = developer(&store, "Ada", Some(WorkerMetrics::new(0, 2.0, 0.1))).await;
    let bob = developer(&store, "Bob", Some(WorkerMetrics::new(0, 2.0, 0.1))).await;
    let boss = manager(&store).await;
    let item = open_item(&store).await;
    let assigner = Assigner::new(Arc::new(store.clone()), None);

    let first = assigner.assign_to(item.id, ada.id, boss.id).await.unwrap();
    let second = assigner.assign_to(item.id, bob.id, boss.id).await.unwrap();

    let history = store.assignments(Some(item.id)).await;
    assert_eq!(history, vec![first, second.clone()]);

    let current = store.get_work_item(item.id).await.unwrap();
    assert_eq!(current.status, Status::InProgress);
    assert_eq!(current.assignee, Some(second.assignee));
    assert_eq!(current.assignee, Some(bob.id));

    // One open slot per unclosed record.
    assert_eq!(store.metrics(ada.id).await.unwrap().open_item_count, 1);
    assert_eq!(store.metrics(bob.id).await.unwrap().open_item_count, 1);

    store.close_work_item(item.id).await.unwrap();
    assert_eq!(store.metrics(ada.id).await.unwrap().open_item_count, 0);
    assert_eq!(store.metrics(bob.id).await.unwrap().open_item_count, 0);
}

#[tokio::test]
async fn manual_assignment_to_worker_without_metrics_fails() {
    let store = MemoryStore::new();
    let ada = developer(&store, "Ada", None).await;
    let boss = manager(&store).await;
    let item = open_item(&store).await;
    let assigner = Assigner::new(Arc::new(store.clone()), None);

    let result = assigner.assign_to(item.id, ada.id, boss.id).await;

    assert!(matches!(result, Err(Error::AssignmentFailed { .. })));
    assert_eq!(store.get_work_item(item.id).await.unwrap().status, Status::Open);
    assert!(store.assignments(None).await.is_empty());
}

/// A store whose backend is down.
struct DownStore;

impl MetricsStore for DownStore {
    type Tx = MemoryTx;

    async fn list_candidates(&self, _role: Role) -> Result<Vec<Candidate>> {
        Err(Error::Database(sqlx::Error::PoolTimedOut))
    }

    async fn get_metrics(&self, _worker: WorkerId) -> Result<Option<Candidate>> {
        Err(Error::Database(sqlx::Error::PoolTimedOut))
    }

    async fn begin(&self) -> Result<MemoryTx> {
        Err(Error::Database(sqlx::Error::PoolTimedOut))
    }
}

#[tokio::test]
async fn unreachable_store_is_surfaced() {
    let assigner = Assigner::new(Arc::new(DownStore), None);

    let choose = assigner.selector().choose().await;
    assert!(matches!(choose, Err(Error::DependencyUnavailable(_))));

    let predict = assigner.predictor().predict(WorkerId(1)).await;
    assert!(matches!(predict, Err(Error::DependencyUnavailable(_))));

    let assign = assigner.auto_assign(WorkItemId(1), WorkerId(1)).await;
    assert!(matches!(assign, Err(Error::DependencyUnavailable(_))));
}
