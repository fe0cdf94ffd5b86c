//! Munin - Report execution engine
//!
//! This crate runs multi-component reports: SQL queries against pluggable
//! data sources and derived (LLM) steps that build on earlier results. It
//! provides:
//!
//! - a content-addressed, size-bounded [`ResultCache`] with per-component
//!   TTLs and LRU eviction,
//! - a [`RowLimitGuard`] that counts before fetching and refuses result
//!   sets larger than the component's limit,
//! - a bounded [`WorkerPool`](pool::WorkerPool) with per-task timeouts,
//!   cancellation and panic isolation,
//! - dependency waves so components can consume each other's results.
//!
//! Data access stays outside the crate: implement [`QueryExecutor`] and
//! (optionally) [`DerivedExecutor`], and supply report definitions through
//! a [`ReportStore`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use munin::{
//!     ExecutionContext, InMemoryReportStore, QueryExecutor, QueryOutput, QueryRequest,
//!     ReportComponent, ReportDefinition, ReportEngine, ReportRunRequest,
//! };
//!
//! struct Warehouse;
//!
//! #[async_trait::async_trait]
//! impl QueryExecutor for Warehouse {
//!     fn name(&self) -> &str {
//!         "warehouse"
//!     }
//!
//!     async fn execute(
//!         &self,
//!         _ctx: &ExecutionContext,
//!         request: &QueryRequest<'_>,
//!     ) -> munin::Result<QueryOutput> {
//!         // run request.sql on request.connection_id ...
//!         Ok(QueryOutput::default())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> munin::Result<()> {
//!     let store = InMemoryReportStore::new().with_report(
//!         ReportDefinition::new("sales").component(
//!             ReportComponent::query("by_region", "dwh", "SELECT region, SUM(total) FROM orders GROUP BY region")
//!                 .cache_seconds(300),
//!         ),
//!     );
//!
//!     let engine = ReportEngine::builder()
//!         .store(Arc::new(store))
//!         .query_executor(Arc::new(Warehouse))
//!         .build()?;
//!
//!     let response = engine.run_report(&ReportRunRequest::new("sales")).await?;
//!     for result in &response.results {
//!         println!("{}: {:?} ({} rows)", result.component_id, result.status, result.limited_rows);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod plan;
pub mod pool;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheStats, ResultCache, build_key};
pub use config::EngineConfig;
pub use engine::{DependencyResults, ReportEngine, ReportEngineBuilder};
pub use error::{MuninError, Result};
pub use executor::{
    DerivedExecutor, DerivedOutput, DerivedRequest, ExecutionContext, QueryExecutor, QueryOutput,
    QueryRequest, RowLimitGuard,
};
pub use pool::{Task, WorkerPool};
pub use store::{InMemoryReportStore, ReportStore, RunState};
pub use types::{
    ComponentKind, ComponentPayload, ComponentResult, ComponentSource, ComponentStatus,
    DEFAULT_ROW_LIMIT, DerivedSpec, FilterValues, HARD_ROW_CEILING, QuerySpec, ReportComponent,
    ReportDefinition, ReportRunRequest, ReportRunResponse, RunMetrics,
};
pub use version::{BuildInfo, build_info, version_string};
