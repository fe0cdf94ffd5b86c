//! Report definitions and their components

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Named filter values supplied with a run. Order is irrelevant.
pub type FilterValues = HashMap<String, serde_json::Value>;

/// Rows limit applied when a component does not configure one.
pub const DEFAULT_ROW_LIMIT: usize = 1_000;

/// Absolute maximum row limit. No component may exceed it.
pub const HARD_ROW_CEILING: usize = 50_000;

/// What a component executes against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// SQL query against a connection, wrapped by the row-limit guard.
    Query,
    /// Derived/LLM step rendered from a prompt and prior results.
    Derived,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Query => "query",
            ComponentKind::Derived => "derived",
        }
    }
}

/// Query payload: SQL template and the connection it runs on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    pub connection_id: String,
    pub sql: String,
    /// Filter names whose `{{name}}` tokens are substituted into the SQL.
    #[serde(default)]
    pub top_level_filters: Vec<String>,
}

/// Derived/LLM payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedSpec {
    pub prompt_template: String,
    /// Components whose results are rendered into the prompt context.
    #[serde(default)]
    pub context_components: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Backend-specific payload of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentSource {
    Query(QuerySpec),
    Derived(DerivedSpec),
}

/// A unit of work within a report. Immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportComponent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub source: ComponentSource,
    /// Max rows the caller accepts. `None` (or 0) means [`DEFAULT_ROW_LIMIT`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Result TTL in seconds; 0 disables caching for this component.
    #[serde(default)]
    pub cache_seconds: u64,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ReportComponent {
    /// Create a query component.
    pub fn query(
        id: impl Into<String>,
        connection_id: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            ComponentSource::Query(QuerySpec {
                connection_id: connection_id.into(),
                sql: sql.into(),
                top_level_filters: Vec::new(),
            }),
        )
    }

    /// Create a derived component from a prompt template.
    pub fn derived(id: impl Into<String>, prompt_template: impl Into<String>) -> Self {
        Self::new(
            id,
            ComponentSource::Derived(DerivedSpec {
                prompt_template: prompt_template.into(),
                ..DerivedSpec::default()
            }),
        )
    }

    fn new(id: impl Into<String>, source: ComponentSource) -> Self {
        Self {
            id: id.into(),
            title: None,
            source,
            limit: None,
            cache_seconds: 0,
            depends_on: Vec::new(),
        }
    }

    /// Set the row limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the cache TTL in seconds.
    pub fn cache_seconds(mut self, secs: u64) -> Self {
        self.cache_seconds = secs;
        self
    }

    /// Declare a dependency on another component.
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }

    /// Declare a filter whose `{{name}}` token is substituted into the SQL.
    ///
    /// No-op for derived components; their prompts see every filter.
    pub fn top_level_filter(mut self, name: impl Into<String>) -> Self {
        if let ComponentSource::Query(ref mut spec) = self.source {
            spec.top_level_filters.push(name.into());
        }
        self
    }

    /// Add a component to a derived component's prompt context.
    ///
    /// No-op for query components.
    pub fn context_component(mut self, id: impl Into<String>) -> Self {
        if let ComponentSource::Derived(ref mut spec) = self.source {
            spec.context_components.push(id.into());
        }
        self
    }

    pub fn kind(&self) -> ComponentKind {
        match self.source {
            ComponentSource::Query(_) => ComponentKind::Query,
            ComponentSource::Derived(_) => ComponentKind::Derived,
        }
    }

    /// Components that must complete before this one starts.
    ///
    /// Derived components without an explicit `dependsOn` wait for their
    /// context components.
    pub fn dependencies(&self) -> &[String] {
        match &self.source {
            ComponentSource::Derived(spec) if self.depends_on.is_empty() => {
                &spec.context_components
            }
            _ => &self.depends_on,
        }
    }
}

/// A named collection of components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub components: Vec<ReportComponent>,
}

impl ReportDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Parse a definition from its stored JSON form.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn component(mut self, component: ReportComponent) -> Self {
        self.components.push(component);
        self
    }

    /// Look up a component by id. Duplicate ids resolve to the first
    /// definition.
    pub fn find(&self, id: &str) -> Option<&ReportComponent> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Select the components a run executes, in request order.
    ///
    /// An empty selection means every component in definition order.
    /// Unknown and repeated ids are skipped.
    pub fn select(&self, component_ids: &[String]) -> Vec<&ReportComponent> {
        let mut seen = HashSet::new();
        if component_ids.is_empty() {
            return self
                .components
                .iter()
                .filter(|c| seen.insert(c.id.as_str()))
                .collect();
        }
        component_ids
            .iter()
            .filter_map(|id| self.find(id))
            .filter(|c| seen.insert(c.id.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_dependencies_default_to_context_components() {
        let c = ReportComponent::derived("summary", "{{context}}").context_component("sales");
        assert_eq!(c.dependencies(), ["sales".to_string()]);

        let c = c.depends_on("other");
        assert_eq!(c.dependencies(), ["other".to_string()]);
    }

    #[test]
    fn select_follows_request_order_and_drops_duplicates() {
        let report = ReportDefinition::new("r")
            .component(ReportComponent::query("a", "db", "select 1"))
            .component(ReportComponent::query("b", "db", "select 2"))
            .component(ReportComponent::query("a", "db", "select 3"));

        let ids: Vec<_> = report
            .select(&["b".into(), "missing".into(), "a".into(), "b".into()])
            .into_iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, ["b", "a"]);

        assert_eq!(report.select(&[]).len(), 2);
    }

    #[test]
    fn component_deserializes_from_json() {
        let json = r#"{
            "id": "orders",
            "source": {"kind": "query", "connectionId": "pg", "sql": "select * from orders"},
            "limit": 500,
            "cacheSeconds": 60
        }"#;
        let c: ReportComponent = serde_json::from_str(json).unwrap();
        assert_eq!(c.kind(), ComponentKind::Query);
        assert_eq!(c.limit, Some(500));
        assert_eq!(c.cache_seconds, 60);
        assert!(c.depends_on.is_empty());
    }

    #[test]
    fn definition_parses_from_stored_json() {
        let report = ReportDefinition::from_json(
            r#"{
                "id": "sales",
                "name": "Sales overview",
                "components": [
                    {"id": "totals", "source": {"kind": "query", "connectionId": "pg", "sql": "select 1"}},
                    {"id": "summary", "source": {"kind": "derived", "promptTemplate": "{{context}}",
                        "contextComponents": ["totals"]}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(report.name, "Sales overview");
        assert_eq!(report.components.len(), 2);
        assert_eq!(report.find("summary").unwrap().dependencies(), ["totals".to_string()]);
    }
}
