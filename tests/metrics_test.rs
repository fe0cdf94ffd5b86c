//! Tests for metrics integration.
//!
//! Uses `metrics_util::debugging::DebuggingRecorder` to capture and assert
//! on emitted metrics without needing a real exporter. The recorder is
//! thread-local, so only metrics emitted on the calling thread are seen:
//! cache and run-level metrics, not those emitted inside pool workers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::MetricKind;
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use serde_json::json;

use munin::executor::GuardedQuery;
use munin::telemetry;
use munin::{
    CacheConfig, ComponentKind, ComponentPayload, ComponentResult, ExecutionContext, FilterValues,
    InMemoryReportStore, QueryExecutor, QueryOutput, QueryRequest, ReportComponent,
    ReportDefinition, ReportEngine, ReportRunRequest, Result, ResultCache, RowLimitGuard,
};

// ============================================================================
// Mock executor
// ============================================================================

struct FixedExecutor {
    total: u64,
}

#[async_trait]
impl QueryExecutor for FixedExecutor {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn execute(&self, _ctx: &ExecutionContext, _request: &QueryRequest<'_>) -> Result<QueryOutput> {
        Ok(QueryOutput {
            columns: vec!["n".to_string()],
            rows: vec![vec![json!(1)]],
            total_rows: None,
        })
    }

    async fn count(&self, _ctx: &ExecutionContext, _request: &QueryRequest<'_>) -> Result<u64> {
        Ok(self.total)
    }
}

// ============================================================================
// Snapshot type alias for readability
// ============================================================================

type SnapshotVec = Vec<(
    metrics_util::CompositeKey,
    Option<metrics::Unit>,
    Option<metrics::SharedString>,
    DebugValue,
)>;

// ============================================================================
// Helpers
// ============================================================================

/// Sum all counter values matching a given metric name.
fn counter_total(snapshot: &SnapshotVec, name: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| key.kind() == MetricKind::Counter && key.key().name() == name)
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Sum counter values for a metric carrying a specific label value.
fn counter_with_label(snapshot: &SnapshotVec, name: &str, label: &str, value: &str) -> u64 {
    snapshot
        .iter()
        .filter(|(key, _, _, _)| {
            key.kind() == MetricKind::Counter
                && key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label && l.value() == value)
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(v) => *v,
            _ => 0,
        })
        .sum()
}

/// Check if any histogram entries exist for a given metric name.
fn has_histogram(snapshot: &SnapshotVec, name: &str) -> bool {
    snapshot
        .iter()
        .any(|(key, _, _, _)| key.kind() == MetricKind::Histogram && key.key().name() == name)
}

fn result(id: &str) -> ComponentResult {
    ComponentResult::success(
        id,
        ComponentKind::Query,
        ComponentPayload::Rows {
            columns: vec!["n".into()],
            rows: vec![vec![json!(1)]; 10],
        },
        Duration::ZERO,
    )
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn cache_records_hits_misses_and_evictions() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    metrics::with_local_recorder(&recorder, || {
        let size = "k0".len() + result("c0").estimated_size();
        let cache = ResultCache::new(&CacheConfig::new().max_bytes(size * 2));
        cache.put("k0", result("c0"), Duration::from_secs(60));
        cache.get("k0");
        cache.get("absent");
        cache.put("k1", result("c1"), Duration::from_secs(60));
        cache.put("k2", result("c2"), Duration::from_secs(60));
        cache.clear();
    });

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL), 1);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL), 1);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::CACHE_EVICTIONS_TOTAL, "reason", "lru"),
        1
    );
    assert_eq!(
        counter_with_label(&snapshot, telemetry::CACHE_EVICTIONS_TOTAL, "reason", "clear"),
        2
    );
}

/// Runs async code within a local recorder scope on the multi-thread runtime.
///
/// `block_in_place` ensures the sync `with_local_recorder` closure stays
/// on the current thread while `block_on` drives the inner async work.
#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn guard_rejection_is_counted() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let outcome = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let guard = RowLimitGuard::new(Arc::new(FixedExecutor { total: 125_000 }));
                let filters = FilterValues::new();
                guard
                    .run(
                        &ExecutionContext::with_timeout(Duration::from_secs(5)),
                        &GuardedQuery {
                            component_id: "events",
                            connection_id: "pg",
                            sql: "select * from events",
                            limit: Some(50_000),
                            filters: &filters,
                        },
                    )
                    .await
            })
        })
    });
    assert!(outcome.is_err());

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::GUARD_REJECTIONS_TOTAL), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn report_run_records_component_and_run_metrics() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let responses = metrics::with_local_recorder(&recorder, || {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let store = InMemoryReportStore::new().with_report(
                    ReportDefinition::new("r")
                        .component(ReportComponent::query("ok", "pg", "select 1").cache_seconds(60))
                        .component(
                            ReportComponent::query("limited", "pg", "select 2")
                                .limit(10)
                                .cache_seconds(60),
                        ),
                );
                let engine = ReportEngine::builder()
                    .store(Arc::new(store))
                    .query_executor(Arc::new(FixedExecutor { total: 5 }))
                    .build()
                    .unwrap();
                let request = ReportRunRequest::new("r");
                let first = engine.run_report(&request).await.unwrap();
                let second = engine.run_report(&request).await.unwrap();
                (first, second)
            })
        })
    });
    let (first, second) = responses;
    assert!(first.is_ok());
    assert!(second.results.iter().all(|r| r.cache_hit));

    let snapshot = snapshotter.snapshot().into_vec();
    assert_eq!(counter_total(&snapshot, telemetry::REPORT_RUNS_TOTAL), 2);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::REPORT_RUNS_TOTAL, "status", "ok"),
        2
    );
    assert_eq!(counter_total(&snapshot, telemetry::COMPONENTS_TOTAL), 4);
    assert_eq!(
        counter_with_label(&snapshot, telemetry::COMPONENTS_TOTAL, "status", "succeeded"),
        4
    );
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_HITS_TOTAL), 2);
    assert_eq!(counter_total(&snapshot, telemetry::CACHE_MISSES_TOTAL), 2);
    assert!(has_histogram(&snapshot, telemetry::REPORT_DURATION_SECONDS));
    assert!(has_histogram(&snapshot, telemetry::COMPONENT_DURATION_SECONDS));
}
