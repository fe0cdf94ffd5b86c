//! Builder for configuring engine instances

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::ReportEngine;
use crate::cache::{CacheConfig, ResultCache};
use crate::config::EngineConfig;
use crate::executor::{DerivedExecutor, QueryExecutor, RowLimitGuard};
use crate::pool::WorkerPool;
use crate::store::ReportStore;
use crate::version::build_info;
use crate::{MuninError, Result};

/// Builder for [`ReportEngine`].
///
/// Starts from [`EngineConfig::default`]; [`config`](Self::config) replaces
/// the whole configuration and the individual setters override single
/// values.
pub struct ReportEngineBuilder {
    store: Option<Arc<dyn ReportStore>>,
    query_executor: Option<Arc<dyn QueryExecutor>>,
    derived_executor: Option<Arc<dyn DerivedExecutor>>,
    config: EngineConfig,
    task_timeout: Option<Duration>,
}

impl ReportEngineBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            query_executor: None,
            derived_executor: None,
            config: EngineConfig::default(),
            task_timeout: None,
        }
    }

    /// Source of report definitions (required).
    pub fn store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Executor for query components.
    pub fn query_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.query_executor = Some(executor);
        self
    }

    /// Executor for derived components.
    pub fn derived_executor(mut self, executor: Arc<dyn DerivedExecutor>) -> Self {
        self.derived_executor = Some(executor);
        self
    }

    /// Replace the configuration.
    pub fn config(mut self, config: &EngineConfig) -> Self {
        self.config = config.clone();
        self.task_timeout = None;
        self
    }

    /// Number of workers (default: 5).
    pub fn worker_count(mut self, workers: usize) -> Self {
        self.config.pool.workers = workers;
        self
    }

    /// Per-component time budget (default: 5 minutes).
    ///
    /// Unlike the config file, accepts sub-second values.
    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Cache size budget in bytes (default: 100 MB).
    pub fn cache_max_bytes(mut self, bytes: usize) -> Self {
        self.config.cache.max_bytes = bytes;
        self
    }

    /// Bypass the result cache entirely.
    pub fn disable_cache(mut self) -> Self {
        self.config.cache.enabled = false;
        self
    }

    /// Row limit for components that configure none (default: 1000).
    pub fn default_row_limit(mut self, limit: usize) -> Self {
        self.config.limits.default_row_limit = limit;
        self
    }

    /// Advisory per-query timeout forwarded to the query executor.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.limits.query_timeout_secs = timeout.as_secs();
        self
    }

    /// Build the engine.
    ///
    /// Must be called inside a tokio runtime: the worker pool spawns its
    /// workers here.
    pub fn build(self) -> Result<ReportEngine> {
        let store = self
            .store
            .ok_or_else(|| MuninError::Configuration("a report store is required".into()))?;
        self.config.validate()?;

        let task_timeout = self
            .task_timeout
            .unwrap_or_else(|| self.config.pool.task_timeout());
        let pool = WorkerPool::new(self.config.pool.workers, task_timeout)?;
        let cache = ResultCache::new(&CacheConfig::new().max_bytes(self.config.cache.max_bytes));
        let guard = self.query_executor.map(|executor| {
            Arc::new(
                RowLimitGuard::new(executor)
                    .default_limit(self.config.limits.default_row_limit)
                    .query_timeout(self.config.limits.query_timeout()),
            )
        });

        info!(
            version = %build_info(),
            workers = pool.worker_count(),
            cache_enabled = self.config.cache.enabled,
            "report engine ready"
        );

        Ok(ReportEngine {
            store,
            guard,
            derived: self.derived_executor,
            pool,
            cache,
            cache_enabled: self.config.cache.enabled,
        })
    }
}

impl Default for ReportEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
