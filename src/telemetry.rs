//! Telemetry metric name constants.
//!
//! Centralised metric names for munin operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `munin_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `kind`: component kind: "query" or "derived"
//! - `status`: component outcome: "succeeded", "failed" or "timed_out"
//! - `reason`: eviction reason: "lru", "expired" or "clear"

/// Result cache hits.
pub const CACHE_HITS_TOTAL: &str = "munin_cache_hits_total";

/// Result cache misses (absent or expired keys).
pub const CACHE_MISSES_TOTAL: &str = "munin_cache_misses_total";

/// Entries removed from the result cache.
///
/// Labels: `reason` ("lru" | "expired" | "clear").
pub const CACHE_EVICTIONS_TOTAL: &str = "munin_cache_evictions_total";

/// Components that reached a terminal state.
///
/// Labels: `kind`, `status`.
pub const COMPONENTS_TOTAL: &str = "munin_components_total";

/// Component execution duration in seconds (cache misses only).
///
/// Labels: `kind`.
pub const COMPONENT_DURATION_SECONDS: &str = "munin_component_duration_seconds";

/// Components rejected by the row-limit guard.
pub const GUARD_REJECTIONS_TOTAL: &str = "munin_guard_rejections_total";

/// Panics recovered at the worker boundary.
pub const TASK_PANICS_TOTAL: &str = "munin_task_panics_total";

/// Report runs.
///
/// Labels: `status` ("ok" | "error").
pub const REPORT_RUNS_TOTAL: &str = "munin_report_runs_total";

/// Report run wall-clock duration in seconds.
pub const REPORT_DURATION_SECONDS: &str = "munin_report_duration_seconds";
