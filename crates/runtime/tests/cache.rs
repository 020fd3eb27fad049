//! Cache coordinator behaviour against real sqlite storage.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use tempfile::TempDir;

use eventide_core::{AggregateParams, NodeId, QueryGraph, QueryNode, ScanParams, Statistic};
use eventide_error::{ErrorCode, Result};
use eventide_runtime::{
    BuildState, CacheCoordinator, SqliteBackend, StorageBackend, WorkerPool,
};

/// Wraps a real backend, counting materializations and optionally
/// slowing them down so tests can observe queued builds.
struct CountingBackend {
    inner: SqliteBackend,
    materializations: AtomicUsize,
    delay: Duration,
}

impl CountingBackend {
    fn new(inner: SqliteBackend) -> Self {
        Self {
            inner,
            materializations: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn count(&self) -> usize {
        self.materializations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for CountingBackend {
    async fn execute(&self, sql: &str) -> Result<()> {
        self.inner.execute(sql).await
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<Value>> {
        self.inner.fetch(sql).await
    }

    async fn table_exists(&self, name: &str) -> Result<bool> {
        self.inner.table_exists(name).await
    }

    async fn materialize(&self, name: &str, select_sql: &str) -> Result<()> {
        self.materializations.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.materialize(name, select_sql).await
    }

    async fn available_dates(&self, table: &str) -> Result<Vec<NaiveDate>> {
        self.inner.available_dates(table).await
    }
}

fn timestamp(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2016, 1, day)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

async fn seeded_backend(dir: &TempDir) -> SqliteBackend {
    let path = dir.path().join("events.db");
    let backend = SqliteBackend::open(path.to_str().unwrap()).unwrap();
    backend
        .execute(
            "CREATE TABLE IF NOT EXISTS events (msisdn TEXT, datetime TEXT, location_id TEXT);
             DELETE FROM events;
             INSERT INTO events VALUES
               ('a', '2016-01-01 08:00:00', 'l1'),
               ('a', '2016-01-02 09:00:00', 'l1'),
               ('b', '2016-01-02 10:00:00', 'l1'),
               ('c', '2016-01-03 11:00:00', 'l2');",
        )
        .await
        .unwrap();
    backend
}

/// Events scan aggregated to per-location event counts.
fn counts_graph(table: &str) -> (QueryGraph, NodeId) {
    let mut graph = QueryGraph::new();
    let scan = graph
        .add(QueryNode::Scan(
            ScanParams::new(
                table,
                timestamp(1),
                timestamp(8),
                vec![
                    "msisdn".to_string(),
                    "datetime".to_string(),
                    "location_id".to_string(),
                ],
            )
            .unwrap(),
        ))
        .unwrap();
    let root = graph
        .add(QueryNode::Aggregate(
            AggregateParams::new(
                scan,
                vec!["location_id".to_string()],
                Statistic::Count,
                None,
            )
            .unwrap(),
        ))
        .unwrap();
    (graph, root)
}

#[tokio::test]
async fn concurrent_requests_build_once() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(CountingBackend::new(seeded_backend(&dir).await));
    let coordinator = Arc::new(CacheCoordinator::new(""));
    let pool = WorkerPool::new(4);
    let (graph, root) = counts_graph("events");
    let graph = Arc::new(graph);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let storage: Arc<dyn StorageBackend> = Arc::clone(&storage) as _;
        let coordinator = Arc::clone(&coordinator);
        let pool = pool.clone();
        let graph = Arc::clone(&graph);
        handles.push(tokio::spawn(async move {
            let entry = coordinator
                .get_or_build(storage, &pool, &graph, root)
                .await
                .unwrap();
            entry.wait_terminal().await
        }));
    }
    for handle in handles {
        assert!(matches!(
            handle.await.unwrap(),
            BuildState::Completed { .. }
        ));
    }
    assert_eq!(storage.count(), 1);
}

#[tokio::test]
async fn completed_table_holds_aggregated_rows() {
    let dir = TempDir::new().unwrap();
    let storage: Arc<dyn StorageBackend> =
        Arc::new(CountingBackend::new(seeded_backend(&dir).await));
    let coordinator = CacheCoordinator::new("");
    let pool = WorkerPool::new(2);
    let (graph, root) = counts_graph("events");

    let entry = coordinator
        .get_or_build(Arc::clone(&storage), &pool, &graph, root)
        .await
        .unwrap();
    let BuildState::Completed { table } = entry.wait_terminal().await else {
        panic!("build did not complete");
    };
    let rows = storage
        .fetch(&format!("SELECT * FROM {} ORDER BY location_id", table))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["location_id"], "l1");
    assert_eq!(rows[0]["value"], 3);
    assert_eq!(rows[1]["location_id"], "l2");
    assert_eq!(rows[1]["value"], 1);
}

#[tokio::test]
async fn restarted_coordinator_rediscovers_tables() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(CountingBackend::new(seeded_backend(&dir).await));
    let pool = WorkerPool::new(2);
    let (graph, root) = counts_graph("events");

    let first = CacheCoordinator::new("");
    let entry = first
        .get_or_build(Arc::clone(&storage) as _, &pool, &graph, root)
        .await
        .unwrap();
    assert!(matches!(
        entry.wait_terminal().await,
        BuildState::Completed { .. }
    ));
    assert_eq!(storage.count(), 1);

    // A fresh coordinator has an empty map but the table survives.
    let second = CacheCoordinator::new("");
    let entry = second
        .get_or_build(Arc::clone(&storage) as _, &pool, &graph, root)
        .await
        .unwrap();
    assert!(matches!(
        entry.wait_terminal().await,
        BuildState::Completed { .. }
    ));
    assert_eq!(storage.count(), 1);
}

#[tokio::test]
async fn errored_builds_retry_only_on_fresh_requests() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(CountingBackend::new(seeded_backend(&dir).await));
    let coordinator = CacheCoordinator::new("");
    let pool = WorkerPool::new(2);
    // Scans a table that does not exist, so materialization fails.
    let (graph, root) = counts_graph("absent_events");

    let entry = coordinator
        .get_or_build(Arc::clone(&storage) as _, &pool, &graph, root)
        .await
        .unwrap();
    assert!(matches!(
        entry.wait_terminal().await,
        BuildState::Errored { .. }
    ));
    assert_eq!(storage.count(), 1);

    // Polling the entry never retries it.
    assert!(matches!(entry.state(), BuildState::Errored { .. }));
    assert_eq!(storage.count(), 1);

    // A fresh build request reclaims the errored entry and rebuilds.
    let again = coordinator
        .get_or_build(Arc::clone(&storage) as _, &pool, &graph, root)
        .await
        .unwrap();
    assert!(matches!(
        again.wait_terminal().await,
        BuildState::Errored { .. }
    ));
    assert_eq!(storage.count(), 2);
}

#[tokio::test]
async fn queued_builds_can_be_cancelled() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(CountingBackend::new(
        seeded_backend(&dir).await,
    ).with_delay(Duration::from_millis(200)));
    let coordinator = CacheCoordinator::new("");
    let pool = WorkerPool::new(1);
    let (slow_graph, slow_root) = counts_graph("events");

    // Occupy the only worker slot, and wait until the build actually
    // holds it.
    let slow = coordinator
        .get_or_build(Arc::clone(&storage) as _, &pool, &slow_graph, slow_root)
        .await
        .unwrap();
    slow.subscribe()
        .wait_for(|s| !matches!(s, BuildState::Queued))
        .await
        .unwrap();

    // A structurally different query queues behind it.
    let mut graph = QueryGraph::new();
    let scan = graph
        .add(QueryNode::Scan(
            ScanParams::new(
                "events",
                timestamp(2),
                timestamp(3),
                vec!["msisdn".to_string(), "location_id".to_string()],
            )
            .unwrap(),
        ))
        .unwrap();
    let root = graph
        .add(QueryNode::Aggregate(
            AggregateParams::new(
                scan,
                vec!["location_id".to_string()],
                Statistic::CountDistinct,
                Some("subscriber".to_string()),
            )
            .unwrap(),
        ))
        .unwrap();
    let queued = coordinator
        .get_or_build(Arc::clone(&storage) as _, &pool, &graph, root)
        .await
        .unwrap();
    assert_eq!(queued.state(), BuildState::Queued);

    assert!(coordinator.cancel(queued.fingerprint()));
    assert_eq!(queued.wait_terminal().await, BuildState::Cancelled);

    assert!(matches!(
        slow.wait_terminal().await,
        BuildState::Completed { .. }
    ));
    // Only the slow build ever reached the backend.
    assert_eq!(storage.count(), 1);

    // Terminal entries cannot be cancelled.
    assert!(!coordinator.cancel(slow.fingerprint()));
}

#[tokio::test]
async fn non_cacheable_roots_are_refused() {
    let dir = TempDir::new().unwrap();
    let storage: Arc<dyn StorageBackend> =
        Arc::new(CountingBackend::new(seeded_backend(&dir).await));
    let coordinator = CacheCoordinator::new("");
    let pool = WorkerPool::new(2);

    let mut graph = QueryGraph::new();
    let scan = graph
        .add(QueryNode::Scan(
            ScanParams::new(
                "events",
                timestamp(1),
                timestamp(8),
                vec!["msisdn".to_string(), "location_id".to_string()],
            )
            .unwrap(),
        ))
        .unwrap();

    let err = coordinator
        .get_or_build(storage, &pool, &graph, scan)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotCacheable);
}
