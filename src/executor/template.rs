//! Placeholder substitution for SQL and prompt templates.
//!
//! Tokens have the form `{{name}}`. Replacement runs in sorted token order
//! so output is deterministic regardless of map iteration order.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::engine::DependencyResults;
use crate::types::{ComponentPayload, FilterValues};

/// Substitute declared filters into a query as SQL literals.
///
/// Only filters named in `top_level_filters` are substituted; other
/// `{{...}}` tokens are left untouched.
pub fn apply_filter_placeholders(
    sql: &str,
    top_level_filters: &[String],
    filters: &FilterValues,
) -> String {
    if filters.is_empty() || top_level_filters.is_empty() {
        return sql.to_owned();
    }
    let replacements: BTreeMap<String, String> = top_level_filters
        .iter()
        .filter_map(|name| {
            filters
                .get(name)
                .map(|value| (token(name), format_sql_value(value)))
        })
        .collect();
    replace_tokens(sql, &replacements)
}

/// Render a filter value as a SQL literal.
///
/// Strings are single-quoted with embedded quotes doubled. Arrays and
/// objects become quoted JSON text.
pub fn format_sql_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_owned(),
        Value::Bool(true) => "TRUE".to_owned(),
        Value::Bool(false) => "FALSE".to_owned(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        other => quote(&other.to_string()),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Build prompt context from completed dependency results.
///
/// Each listed component that has a result contributes
/// `component.<id>` (a JSON fragment); all fragments joined by newlines
/// form `context`. Components without a result are skipped.
pub fn build_context_payload(
    component_ids: &[String],
    dependencies: &DependencyResults,
) -> BTreeMap<String, String> {
    let mut payload = BTreeMap::new();
    let mut joined = String::new();

    for id in component_ids {
        let Some(result) = dependencies.get(id) else {
            continue;
        };
        let fragment = match &result.payload {
            ComponentPayload::Rows { columns, rows } => {
                json!({ "componentId": id, "columns": columns, "rows": rows })
            }
            ComponentPayload::Text { content } => {
                json!({ "componentId": id, "content": content })
            }
            ComponentPayload::Empty => {
                json!({ "componentId": id, "error": result.error })
            }
        };
        let blob = fragment.to_string();
        joined.push_str(&blob);
        joined.push('\n');
        payload.insert(format!("component.{id}"), blob);
    }

    if !joined.is_empty() {
        payload.insert("context".to_owned(), joined);
    }
    payload
}

/// Substitute filter values and context entries into a prompt template.
///
/// Filter strings are inserted verbatim (unquoted); other values as JSON.
/// Context entries win over filters with the same name.
pub fn inject_placeholders(
    template: &str,
    filters: &FilterValues,
    context: &BTreeMap<String, String>,
) -> String {
    let mut replacements = BTreeMap::new();
    for (name, value) in filters {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        replacements.insert(token(name), rendered);
    }
    for (name, value) in context {
        replacements.insert(token(name), value.clone());
    }
    replace_tokens(template, &replacements)
}

/// Replace every occurrence of each token, in sorted token order.
pub fn replace_tokens(input: &str, replacements: &BTreeMap<String, String>) -> String {
    replacements
        .iter()
        .fold(input.to_owned(), |acc, (token, value)| {
            acc.replace(token.as_str(), value)
        })
}

fn token(name: &str) -> String {
    format!("{{{{{name}}}}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_format() {
        assert_eq!(token("region"), "{{region}}");
    }
}
