//! Report orchestrator.
//!
//! [`ReportEngine`] runs a report end to end:
//!
//! 1. Load the definition from the [`ReportStore`] and select the requested
//!    components (request order; empty selection means all).
//! 2. Compute each component's cache key and resolve hits immediately.
//!    `force` skips lookups but still refreshes entries on success. A
//!    derived component with prompt context is keyed on its rendered
//!    prompt, so its lookup waits until its wave, when the context
//!    components' results of this run are available.
//! 3. Plan the misses into dependency waves and run each wave on the
//!    [`WorkerPool`]. A wave starts only after the previous one finished;
//!    its results are published to [`DependencyResults`] for later waves.
//! 4. Store successful misses in the [`ResultCache`] with the component's
//!    TTL, aggregate [`RunMetrics`] and record the run state.
//!
//! Component failures (guard rejections, executor errors, timeouts, panics)
//! end up in that component's result. Only request-level problems (empty
//! report id, unknown report, store failures) fail a run.

mod builder;
mod component;
mod dependencies;

pub use builder::ReportEngineBuilder;
pub use dependencies::DependencyResults;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use self::component::{ComponentJob, cache_identity, prompt_context};
use crate::cache::{CacheStats, ResultCache, build_key, key::short};
use crate::executor::{DerivedExecutor, RowLimitGuard};
use crate::plan::plan_waves;
use crate::pool::{Task, WorkerPool};
use crate::store::{ReportStore, RunState};
use crate::telemetry;
use crate::types::{
    ComponentResult, FilterValues, ReportComponent, ReportRunRequest, ReportRunResponse,
    RunMetrics,
};
use crate::{MuninError, Result};

/// Report execution engine.
///
/// Owns one worker pool and one result cache for its lifetime. Cheap to
/// share behind an `Arc`; all methods take `&self`.
pub struct ReportEngine {
    pub(crate) store: Arc<dyn ReportStore>,
    pub(crate) guard: Option<Arc<RowLimitGuard>>,
    pub(crate) derived: Option<Arc<dyn DerivedExecutor>>,
    pub(crate) pool: WorkerPool,
    pub(crate) cache: ResultCache,
    pub(crate) cache_enabled: bool,
}

impl std::fmt::Debug for ReportEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportEngine")
            .field("pool", &self.pool)
            .field("cache_enabled", &self.cache_enabled)
            .field("has_query_executor", &self.guard.is_some())
            .field("has_derived_executor", &self.derived.is_some())
            .finish_non_exhaustive()
    }
}

impl ReportEngine {
    /// Create a new builder for configuring the engine.
    pub fn builder() -> ReportEngineBuilder {
        ReportEngineBuilder::new()
    }

    /// Run a report.
    pub async fn run_report(&self, request: &ReportRunRequest) -> Result<ReportRunResponse> {
        self.run_report_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Run a report, cancelling outstanding components when `cancel` fires.
    ///
    /// Components not finished at cancellation time report
    /// [`MuninError::Cancelled`]; finished ones keep their results.
    /// Dropping the returned future cancels every queued and in-flight
    /// component of the run.
    #[instrument(name = "run_report", skip_all, fields(report_id = %request.report_id))]
    pub async fn run_report_with_cancel(
        &self,
        request: &ReportRunRequest,
        cancel: CancellationToken,
    ) -> Result<ReportRunResponse> {
        let report_id = request.report_id.trim();
        if report_id.is_empty() {
            return Err(MuninError::InvalidInput("report id is required".into()));
        }

        let run = cancel.child_token();
        let _abandoned = run.clone().drop_guard();

        let started_at = Utc::now();
        let start = Instant::now();

        let report = self.store.get_report(report_id).await?;
        for id in &request.component_ids {
            if report.find(id).is_none() {
                warn!(component_id = %id, "requested component not found in report, skipping");
            }
        }
        let selected = report.select(&request.component_ids);

        let filters = Arc::new(request.filter_values.clone());
        let dependencies = Arc::new(DependencyResults::new());
        let mut slots: Vec<Option<ComponentResult>> = vec![None; selected.len()];
        let mut keys: Vec<Option<String>> = vec![None; selected.len()];
        let mut misses: Vec<usize> = Vec::new();

        for (i, component) in selected.iter().enumerate() {
            // Keyed in its wave, once the context it renders is published.
            if !prompt_context(component).is_empty() {
                misses.push(i);
                continue;
            }
            keys[i] = self.cache_key(component, &filters, &dependencies);
            if let Some(hit) = self.lookup(component, keys[i].as_deref(), request.force) {
                record_component(&hit, None);
                dependencies.publish(hit.clone());
                slots[i] = Some(hit);
                continue;
            }
            misses.push(i);
        }

        let pending: Vec<&ReportComponent> = misses.iter().map(|&i| selected[i]).collect();
        let plan = plan_waves(&pending);

        if !plan.blocked.is_empty() {
            let err = MuninError::DependencyCycle(plan.blocked_ids(&pending));
            for &j in &plan.blocked {
                let component = pending[j];
                warn!(component_id = %component.id, error = %err, "component not scheduled");
                let result =
                    ComponentResult::failure(&component.id, component.kind(), &err, Duration::ZERO);
                record_component(&result, None);
                slots[misses[j]] = Some(result);
            }
        }

        let report_id: Arc<str> = Arc::from(report_id);
        for (wave_index, wave) in plan.waves.iter().enumerate() {
            debug!(wave = wave_index, components = wave.len(), "dispatching wave");
            let mut runnable = Vec::with_capacity(wave.len());
            for &j in wave {
                let component = pending[j];
                let i = misses[j];
                if keys[i].is_none() && !prompt_context(component).is_empty() {
                    keys[i] = self.cache_key(component, &filters, &dependencies);
                    if let Some(hit) = self.lookup(component, keys[i].as_deref(), request.force) {
                        record_component(&hit, None);
                        dependencies.publish(hit.clone());
                        slots[i] = Some(hit);
                        continue;
                    }
                }
                runnable.push(j);
            }
            if runnable.is_empty() {
                continue;
            }

            let wave_start = Instant::now();
            let tasks = runnable
                .iter()
                .map(|&j| {
                    let job = ComponentJob {
                        component: pending[j].clone(),
                        report_id: Arc::clone(&report_id),
                        filters: Arc::clone(&filters),
                        dependencies: Arc::clone(&dependencies),
                        guard: self.guard.clone(),
                        derived: self.derived.clone(),
                    };
                    Task::new(pending[j].id.clone(), move |ctx| async move {
                        Ok(job.run(ctx).await)
                    })
                })
                .collect();

            let outcomes = self.pool.execute(tasks, &run).await;

            for (&j, outcome) in runnable.iter().zip(outcomes) {
                let component = pending[j];
                let i = misses[j];
                let result = outcome.unwrap_or_else(|e| {
                    warn!(component_id = %component.id, error = %e, "component failed");
                    ComponentResult::failure(
                        &component.id,
                        component.kind(),
                        &e,
                        wave_start.elapsed(),
                    )
                });
                record_component(&result, Some(result.duration_ms));

                if result.is_success()
                    && let Some(key) = &keys[i]
                {
                    let ttl = Duration::from_secs(component.cache_seconds);
                    self.cache.put(key, result.clone(), ttl);
                    debug!(
                        component_id = %component.id,
                        cache_key = short(key),
                        ttl_secs = component.cache_seconds,
                        "cached result"
                    );
                }
                dependencies.publish(result.clone());
                slots[i] = Some(result);
            }
        }

        let results: Vec<ComponentResult> = slots
            .into_iter()
            .zip(&selected)
            .map(|(slot, component)| {
                slot.unwrap_or_else(|| {
                    ComponentResult::failure(
                        &component.id,
                        component.kind(),
                        &MuninError::Cancelled,
                        Duration::ZERO,
                    )
                })
            })
            .collect();

        let elapsed = start.elapsed();
        let stats = self.cache.stats();
        let metrics = RunMetrics::aggregate(&results, elapsed.as_millis() as u64, stats.clone());
        let state = if results.iter().all(ComponentResult::is_success) {
            RunState::Ok
        } else {
            RunState::Error
        };
        let completed_at = Utc::now();

        if let Err(e) = self.store.record_run(&report_id, state, completed_at).await {
            warn!(error = %e, "failed to record run state");
        }

        metrics::counter!(telemetry::REPORT_RUNS_TOTAL, "status" => state.as_str()).increment(1);
        metrics::histogram!(telemetry::REPORT_DURATION_SECONDS).record(elapsed.as_secs_f64());
        debug!(
            components = results.len(),
            cache_hits = metrics.cache_hits,
            cache_entries = stats.entries,
            cache_total_hits = stats.total_hits,
            cache_utilization = stats.utilization,
            duration_ms = metrics.total_duration_ms,
            "report run completed"
        );

        Ok(ReportRunResponse {
            report_id: report_id.to_string(),
            started_at,
            completed_at,
            results,
            metrics,
        })
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        let entries = self.cache.len();
        self.cache.clear();
        info!(entries, "cleared result cache");
    }

    /// Cache occupancy snapshot.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Remove expired cache entries, returning how many were removed.
    pub fn purge_expired_cache(&self) -> usize {
        let removed = self.cache.purge_expired();
        if removed > 0 {
            debug!(removed, "purged expired cache entries");
        }
        removed
    }

    /// The engine's result cache.
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Cache key for a component, or `None` when it is not cacheable.
    fn cache_key(
        &self,
        component: &ReportComponent,
        filters: &FilterValues,
        dependencies: &DependencyResults,
    ) -> Option<String> {
        if !self.cache_enabled || component.cache_seconds == 0 {
            return None;
        }
        let (connection_id, signature) = cache_identity(component, filters, dependencies);
        Some(build_key(&connection_id, &signature, filters))
    }

    fn lookup(
        &self,
        component: &ReportComponent,
        key: Option<&str>,
        force: bool,
    ) -> Option<ComponentResult> {
        if force {
            return None;
        }
        let key = key?;
        let hit = self.cache.get(key)?;
        debug!(component_id = %component.id, cache_key = short(key), "cache hit");
        Some(hit)
    }
}

fn record_component(result: &ComponentResult, duration_ms: Option<u64>) {
    let kind = result.kind.as_str();
    metrics::counter!(
        telemetry::COMPONENTS_TOTAL,
        "kind" => kind,
        "status" => result.status.as_str()
    )
    .increment(1);
    if let Some(ms) = duration_ms {
        metrics::histogram!(telemetry::COMPONENT_DURATION_SECONDS, "kind" => kind)
            .record(ms as f64 / 1000.0);
    }
}
