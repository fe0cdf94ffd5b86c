//! Row-limit guard around query execution.
//!
//! The guard protects the process from unexpectedly large result sets
//! while staying transparent about what was fetched:
//!
//! 1. Resolve the effective limit (`limit` or the default, never above
//!    [`HARD_ROW_CEILING`]). A configured limit above the ceiling is a
//!    configuration error and nothing runs.
//! 2. Run the count-only form of the query. If the count fails, log and
//!    continue without a known total.
//! 3. If the known total exceeds the effective limit, reject the component
//!    without running the data query. A silently truncated result would
//!    look complete to a report reader.
//! 4. Otherwise run the data query with the limit applied. Rows beyond the
//!    limit (from an executor that ignored it) are dropped.

use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, warn};

use super::traits::{ExecutionContext, QueryExecutor, QueryRequest};
use crate::telemetry;
use crate::types::{DEFAULT_ROW_LIMIT, FilterValues, HARD_ROW_CEILING};
use crate::{MuninError, Result};

/// Default advisory timeout forwarded with each query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Resolve the row limit a component runs with.
///
/// `None` or `0` selects `default`; anything above [`HARD_ROW_CEILING`] is
/// rejected.
pub fn effective_limit(limit: Option<usize>, default: usize) -> Result<usize> {
    match limit {
        None | Some(0) => Ok(default.clamp(1, HARD_ROW_CEILING)),
        Some(limit) if limit > HARD_ROW_CEILING => Err(MuninError::LimitExceedsCeiling {
            limit,
            ceiling: HARD_ROW_CEILING,
        }),
        Some(limit) => Ok(limit),
    }
}

/// Rows fetched under the guard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuardedRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    /// Pre-truncation count, when known.
    pub total_rows: Option<u64>,
    /// Rows actually returned; never above `effective_limit`.
    pub limited_rows: usize,
    pub effective_limit: usize,
}

/// A query invocation as seen by the guard.
#[derive(Debug, Clone, Copy)]
pub struct GuardedQuery<'a> {
    pub component_id: &'a str,
    pub connection_id: &'a str,
    pub sql: &'a str,
    pub limit: Option<usize>,
    pub filters: &'a FilterValues,
}

/// Wraps a [`QueryExecutor`] with pre-flight count and limit enforcement.
pub struct RowLimitGuard {
    executor: Arc<dyn QueryExecutor>,
    default_limit: usize,
    query_timeout: Duration,
}

impl RowLimitGuard {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            executor,
            default_limit: DEFAULT_ROW_LIMIT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Limit used when a component configures none.
    pub fn default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    /// Advisory timeout forwarded to the executor, capped by the time the
    /// task has left.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Run `query` under the guard.
    #[instrument(
        name = "row_limit_guard",
        skip_all,
        fields(component_id = query.component_id, executor = self.executor.name())
    )]
    pub async fn run(&self, ctx: &ExecutionContext, query: &GuardedQuery<'_>) -> Result<GuardedRows> {
        if query.connection_id.trim().is_empty() {
            return Err(MuninError::InvalidComponent(format!(
                "component {} is missing a connection",
                query.component_id
            )));
        }
        let sql = query.sql.trim();
        if sql.is_empty() {
            return Err(MuninError::InvalidComponent(format!(
                "component {} has empty SQL",
                query.component_id
            )));
        }

        let limit = effective_limit(query.limit, self.default_limit)?;
        let request = QueryRequest {
            connection_id: query.connection_id,
            sql,
            filters: query.filters,
            row_limit: limit,
            timeout: self.query_timeout.min(ctx.remaining()),
        };

        let total_rows = match self.executor.count(ctx, &request).await {
            Ok(total) => Some(total),
            Err(e) => {
                warn!(error = %e, "failed to get total count, proceeding with limited query");
                None
            }
        };

        if let Some(total) = total_rows
            && total > limit as u64
        {
            metrics::counter!(telemetry::GUARD_REJECTIONS_TOTAL).increment(1);
            return Err(MuninError::RowLimitExceeded {
                total,
                limit,
                ceiling: HARD_ROW_CEILING,
            });
        }

        let output = self.executor.execute(ctx, &request).await?;
        let mut rows = output.rows;
        if rows.len() > limit {
            warn!(
                returned = rows.len(),
                limit, "executor returned more rows than the limit, truncating"
            );
            rows.truncate(limit);
        }

        Ok(GuardedRows {
            columns: output.columns,
            limited_rows: rows.len(),
            rows,
            total_rows: total_rows.or(output.total_rows),
            effective_limit: limit,
        })
    }
}
