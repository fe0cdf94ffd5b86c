//! Run requests and responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::component::FilterValues;
use super::result::{ComponentResult, ComponentStatus};
use crate::cache::CacheStats;

/// A request to run (part of) a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRunRequest {
    pub report_id: String,
    /// Components to execute. Empty means every component.
    #[serde(default)]
    pub component_ids: Vec<String>,
    #[serde(default, rename = "filters")]
    pub filter_values: FilterValues,
    /// Bypass cache lookups for this run and refresh cached entries.
    #[serde(default)]
    pub force: bool,
}

impl ReportRunRequest {
    pub fn new(report_id: impl Into<String>) -> Self {
        Self {
            report_id: report_id.into(),
            ..Self::default()
        }
    }

    pub fn components<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.component_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filter_values.insert(name.into(), value.into());
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Aggregate metrics for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub total_duration_ms: u64,
    pub component_count: usize,
    pub cache_hits: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Sum of known pre-truncation counts.
    pub total_rows: u64,
    /// Sum of rows actually returned.
    pub returned_rows: u64,
    pub cache: CacheStats,
}

impl RunMetrics {
    pub(crate) fn aggregate(
        results: &[ComponentResult],
        total_duration_ms: u64,
        cache: CacheStats,
    ) -> Self {
        let count = |status| results.iter().filter(|r| r.status == status).count();
        Self {
            total_duration_ms,
            component_count: results.len(),
            cache_hits: results.iter().filter(|r| r.cache_hit).count(),
            succeeded: count(ComponentStatus::Succeeded),
            failed: count(ComponentStatus::Failed),
            timed_out: count(ComponentStatus::TimedOut),
            total_rows: results.iter().filter_map(|r| r.total_rows).sum(),
            returned_rows: results.iter().map(|r| r.limited_rows as u64).sum(),
            cache,
        }
    }
}

/// Results of a run, in request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRunResponse {
    pub report_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub results: Vec<ComponentResult>,
    pub metrics: RunMetrics,
}

impl ReportRunResponse {
    /// Result for a component, if it ran.
    pub fn result(&self, component_id: &str) -> Option<&ComponentResult> {
        self.results.iter().find(|r| r.component_id == component_id)
    }

    /// Whether every component succeeded.
    pub fn is_ok(&self) -> bool {
        self.results.iter().all(ComponentResult::is_success)
    }
}
