//! Per-component results

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::component::ComponentKind;
use crate::MuninError;

/// Terminal state of a component within one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    #[default]
    Succeeded,
    Failed,
    TimedOut,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Succeeded => "succeeded",
            ComponentStatus::Failed => "failed",
            ComponentStatus::TimedOut => "timed_out",
        }
    }
}

/// Result payload: tabular rows or generated text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentPayload {
    #[default]
    Empty,
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
    Text {
        content: String,
    },
}

impl ComponentPayload {
    /// Number of rows carried (0 for text and empty payloads).
    pub fn row_count(&self) -> usize {
        match self {
            ComponentPayload::Rows { rows, .. } => rows.len(),
            _ => 0,
        }
    }
}

/// Outcome of one component in one run.
///
/// Produced once per component per run and never mutated after it leaves
/// the worker that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResult {
    pub component_id: String,
    pub kind: ComponentKind,
    pub status: ComponentStatus,
    #[serde(default)]
    pub payload: ComponentPayload,
    pub duration_ms: u64,
    #[serde(default)]
    pub cache_hit: bool,
    /// Pre-truncation count, when the count query succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    /// Rows actually returned.
    #[serde(default)]
    pub limited_rows: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentResult {
    /// Successful result carrying `payload`.
    pub fn success(
        component_id: impl Into<String>,
        kind: ComponentKind,
        payload: ComponentPayload,
        duration: Duration,
    ) -> Self {
        let limited_rows = payload.row_count();
        Self {
            component_id: component_id.into(),
            kind,
            status: ComponentStatus::Succeeded,
            payload,
            duration_ms: duration.as_millis() as u64,
            cache_hit: false,
            total_rows: None,
            limited_rows,
            metadata: BTreeMap::new(),
            error: None,
        }
    }

    /// Failed result describing `err`. No partial data is attached.
    pub fn failure(
        component_id: impl Into<String>,
        kind: ComponentKind,
        err: &MuninError,
        duration: Duration,
    ) -> Self {
        Self {
            component_id: component_id.into(),
            kind,
            status: err.status(),
            payload: ComponentPayload::Empty,
            duration_ms: duration.as_millis() as u64,
            cache_hit: false,
            total_rows: err.total_rows(),
            limited_rows: 0,
            metadata: BTreeMap::new(),
            error: Some(err.to_string()),
        }
    }

    pub fn with_total_rows(mut self, total: Option<u64>) -> Self {
        self.total_rows = total;
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ComponentStatus::Succeeded
    }

    /// Text content, for derived results.
    pub fn content(&self) -> Option<&str> {
        match &self.payload {
            ComponentPayload::Text { content } => Some(content),
            _ => None,
        }
    }

    /// Estimated in-memory footprint in bytes.
    ///
    /// Strings count their length, scalar cells count 8 bytes. Good enough
    /// for bounding the cache; not an exact allocation count.
    pub fn estimated_size(&self) -> usize {
        let mut size = self.component_id.len();
        match &self.payload {
            ComponentPayload::Empty => {}
            ComponentPayload::Text { content } => size += content.len(),
            ComponentPayload::Rows { columns, rows } => {
                size += columns.iter().map(String::len).sum::<usize>();
                size += rows
                    .iter()
                    .flat_map(|row| row.iter())
                    .map(value_size)
                    .sum::<usize>();
            }
        }
        size += self
            .metadata
            .iter()
            .map(|(k, v)| k.len() + value_size(v))
            .sum::<usize>();
        size
    }
}

fn value_size(value: &serde_json::Value) -> usize {
    use serde_json::Value;
    match value {
        Value::String(s) => 8 + s.len(),
        Value::Array(items) => 8 + items.iter().map(value_size).sum::<usize>(),
        Value::Object(map) => {
            8 + map
                .iter()
                .map(|(k, v)| k.len() + value_size(v))
                .sum::<usize>()
        }
        _ => 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn size_counts_strings_and_cells() {
        let result = ComponentResult::success(
            "c",
            ComponentKind::Query,
            ComponentPayload::Rows {
                columns: vec!["id".into(), "name".into()],
                rows: vec![vec![json!(1), json!("abcd")]],
            },
            Duration::ZERO,
        );
        // "c" + "id" + "name" + 8 + (8 + 4)
        assert_eq!(result.estimated_size(), 1 + 2 + 4 + 8 + 12);
    }

    #[test]
    fn failure_carries_guard_total() {
        let err = MuninError::RowLimitExceeded {
            total: 125_000,
            limit: 50_000,
            ceiling: 50_000,
        };
        let result = ComponentResult::failure("c", ComponentKind::Query, &err, Duration::ZERO);
        assert_eq!(result.status, ComponentStatus::Failed);
        assert_eq!(result.total_rows, Some(125_000));
        assert_eq!(result.limited_rows, 0);
        assert!(result.error.unwrap().contains("125000"));
    }

    #[test]
    fn timeout_maps_to_timed_out() {
        let err = MuninError::Timeout(Duration::from_secs(300));
        let result = ComponentResult::failure("c", ComponentKind::Derived, &err, Duration::ZERO);
        assert_eq!(result.status, ComponentStatus::TimedOut);
    }
}
