//! Component executors.
//!
//! - [`traits`]: the [`QueryExecutor`] / [`DerivedExecutor`] boundary and
//!   the per-task [`ExecutionContext`].
//! - [`guard`]: [`RowLimitGuard`], the count-then-fetch wrapper every
//!   query component runs through.
//! - [`template`]: `{{placeholder}}` substitution for SQL and prompts.

pub mod guard;
pub mod template;
pub mod traits;

pub use guard::{GuardedQuery, GuardedRows, RowLimitGuard, effective_limit};
pub use traits::{
    DerivedExecutor, DerivedOutput, DerivedRequest, ExecutionContext, QueryExecutor, QueryOutput,
    QueryRequest,
};
