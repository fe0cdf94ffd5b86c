//! Executor traits for the two component kinds.
//!
//! Executors are the pluggable boundary to live data sources. The engine
//! never talks to a database or model directly; it calls a
//! [`QueryExecutor`] (through the [`RowLimitGuard`](super::RowLimitGuard))
//! for query components and a [`DerivedExecutor`] for derived components.
//!
//! # Cancellation contract
//!
//! Every call receives an [`ExecutionContext`]. Executors should observe
//! [`ExecutionContext::cancelled`] (or check
//! [`is_cancelled`](ExecutionContext::is_cancelled)) at their suspension
//! points and return promptly. The worker pool also drops the executor
//! future once the context is cancelled or its deadline passes, so an
//! executor that ignores the context is abandoned rather than awaited.
//!
//! # Example
//!
//! ```ignore
//! async fn execute(&self, ctx: &ExecutionContext, req: &QueryRequest<'_>) -> Result<QueryOutput> {
//!     tokio::select! {
//!         _ = ctx.cancelled() => Err(MuninError::Cancelled),
//!         rows = self.pool.fetch(req.connection_id, req.sql, req.row_limit) => rows,
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::engine::DependencyResults;
use crate::types::{DerivedSpec, FilterValues};
use crate::{MuninError, Result};

/// Per-task execution context: a cancellation token derived from the run
/// and the task's own deadline.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    cancel: CancellationToken,
    deadline: Instant,
}

impl ExecutionContext {
    pub fn new(cancel: CancellationToken, deadline: Instant) -> Self {
        Self { cancel, deadline }
    }

    /// Context with a fresh token and the given time budget.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(CancellationToken::new(), Instant::now() + timeout)
    }

    /// Whether the run (or this task) has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the run (or this task) is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Token for handing to child work.
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Time left before the deadline (zero once passed).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

// ============================================================================
// Query executor
// ============================================================================

/// A single query invocation.
#[derive(Debug, Clone, Copy)]
pub struct QueryRequest<'a> {
    pub connection_id: &'a str,
    pub sql: &'a str,
    pub filters: &'a FilterValues,
    /// Maximum rows to return.
    pub row_limit: usize,
    /// Advisory per-query timeout.
    pub timeout: Duration,
}

/// Rows returned by a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    /// Total matching rows, when the backend knows it.
    pub total_rows: Option<u64>,
}

/// Executes SQL against a connection.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executor name for logging/debugging.
    fn name(&self) -> &str;

    /// Execute `request.sql`, returning at most `request.row_limit` rows.
    async fn execute(&self, ctx: &ExecutionContext, request: &QueryRequest<'_>)
    -> Result<QueryOutput>;

    /// Count the rows `request.sql` would return.
    ///
    /// Default implementation wraps the query in a `COUNT(*)` subquery,
    /// executes it with a row limit of 1 and reads the first cell.
    async fn count(&self, ctx: &ExecutionContext, request: &QueryRequest<'_>) -> Result<u64> {
        let sql = count_sql(request.sql);
        let output = self
            .execute(
                ctx,
                &QueryRequest {
                    sql: &sql,
                    row_limit: 1,
                    ..*request
                },
            )
            .await?;
        output
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(count_value)
            .ok_or_else(|| MuninError::Executor("count query returned no numeric value".into()))
    }
}

/// Count-only form of a query.
pub fn count_sql(sql: &str) -> String {
    format!("SELECT COUNT(*) AS total_count FROM ({sql}) AS count_subquery")
}

fn count_value(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// Derived executor
// ============================================================================

/// A single derived (LLM) invocation.
#[derive(Debug, Clone, Copy)]
pub struct DerivedRequest<'a> {
    pub component_id: &'a str,
    /// Prompt with filter and context placeholders already substituted.
    pub prompt: &'a str,
    /// Joined context fragments of the dependency results, if any.
    pub context: Option<&'a str>,
    pub spec: &'a DerivedSpec,
    /// Spec metadata plus `report_id` and `component_id`.
    pub metadata: &'a BTreeMap<String, String>,
    /// Results of earlier waves, keyed by component id.
    pub dependencies: &'a DependencyResults,
}

/// Text produced by a derived executor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedOutput {
    pub content: String,
    /// Executor-reported details (provider, model, tokens, ...).
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl DerivedOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Executes derived/LLM components.
#[async_trait]
pub trait DerivedExecutor: Send + Sync {
    /// Executor name for logging/debugging.
    fn name(&self) -> &str;

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        request: &DerivedRequest<'_>,
    ) -> Result<DerivedOutput>;
}
