//! Report definition lookup and run-state recording.
//!
//! The engine does not persist anything itself. A [`ReportStore`] hands it
//! report definitions and is told when a run finishes.
//! [`InMemoryReportStore`] covers tests and embedded use.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::types::ReportDefinition;
use crate::{MuninError, Result};

/// Outcome of a run as recorded by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Every component succeeded.
    Ok,
    /// At least one component failed or timed out.
    Error,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Ok => "ok",
            RunState::Error => "error",
        }
    }
}

/// Source of report definitions.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Load a report definition.
    ///
    /// Returns [`MuninError::ReportNotFound`] for an unknown id.
    async fn get_report(&self, report_id: &str) -> Result<ReportDefinition>;

    /// Record the outcome of a finished run. Default: no-op.
    async fn record_run(
        &self,
        _report_id: &str,
        _state: RunState,
        _completed_at: DateTime<Utc>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Last recorded run of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedRun {
    pub state: RunState,
    pub completed_at: DateTime<Utc>,
}

/// Thread-safe in-memory [`ReportStore`].
#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    reports: RwLock<HashMap<String, ReportDefinition>>,
    runs: RwLock<HashMap<String, RecordedRun>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a report definition.
    pub fn insert(&self, report: ReportDefinition) {
        self.reports.write().insert(report.id.clone(), report);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_report(self, report: ReportDefinition) -> Self {
        self.insert(report);
        self
    }

    /// Last recorded run for `report_id`.
    pub fn last_run(&self, report_id: &str) -> Option<RecordedRun> {
        self.runs.read().get(report_id).copied()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn get_report(&self, report_id: &str) -> Result<ReportDefinition> {
        self.reports
            .read()
            .get(report_id)
            .cloned()
            .ok_or_else(|| MuninError::ReportNotFound(report_id.to_owned()))
    }

    async fn record_run(
        &self,
        report_id: &str,
        state: RunState,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        self.runs.write().insert(
            report_id.to_owned(),
            RecordedRun {
                state,
                completed_at,
            },
        );
        Ok(())
    }
}
