//! Public types for the Munin API.

mod component;
mod result;
mod run;

pub use component::{
    ComponentKind, ComponentSource, DEFAULT_ROW_LIMIT, DerivedSpec, FilterValues,
    HARD_ROW_CEILING, QuerySpec, ReportComponent, ReportDefinition,
};
pub use result::{ComponentPayload, ComponentResult, ComponentStatus};
pub use run::{ReportRunRequest, ReportRunResponse, RunMetrics};
