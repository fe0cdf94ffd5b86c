//! Munin error types

use std::time::Duration;

use crate::types::ComponentStatus;

/// Munin error types
#[derive(Debug, thiserror::Error)]
pub enum MuninError {
    // Configuration errors
    #[error(
        "query limit {limit} exceeds maximum allowed limit of {ceiling}; reduce the limit in component settings"
    )]
    LimitExceedsCeiling { limit: usize, ceiling: usize },

    #[error("invalid component: {0}")]
    InvalidComponent(String),

    #[error("dependency cycle involving components: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no {0} executor configured")]
    NoExecutor(&'static str),

    // Guard rejections
    /// The verified row count is larger than the effective limit. No data
    /// was fetched.
    #[error(
        "query returned {total} rows but limit is {limit}; add a WHERE clause or increase the limit in component settings (max {ceiling})"
    )]
    RowLimitExceeded {
        total: u64,
        limit: usize,
        ceiling: usize,
    },

    // Execution errors
    #[error("executor error: {0}")]
    Executor(String),

    #[error("execution timeout exceeded after {0:?}")]
    Timeout(Duration),

    #[error("internal error: component panicked: {0}")]
    Panicked(String),

    #[error("execution cancelled")]
    Cancelled,

    // Request errors
    #[error("report not found: {0}")]
    ReportNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MuninError {
    /// Terminal component state this error maps to.
    ///
    /// Timeouts are reported as [`ComponentStatus::TimedOut`]; every other
    /// error (guard rejection, executor failure, panic, cancellation) is
    /// [`ComponentStatus::Failed`].
    pub fn status(&self) -> ComponentStatus {
        match self {
            MuninError::Timeout(_) => ComponentStatus::TimedOut,
            _ => ComponentStatus::Failed,
        }
    }

    /// Verified total row count carried by a guard rejection.
    pub fn total_rows(&self) -> Option<u64> {
        match self {
            MuninError::RowLimitExceeded { total, .. } => Some(*total),
            _ => None,
        }
    }

    /// Whether this error was raised before any data query ran.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MuninError::LimitExceedsCeiling { .. }
                | MuninError::InvalidComponent(_)
                | MuninError::DependencyCycle(_)
                | MuninError::Configuration(_)
                | MuninError::NoExecutor(_)
        )
    }
}

/// Result type alias for Munin operations
pub type Result<T> = std::result::Result<T, MuninError>;
