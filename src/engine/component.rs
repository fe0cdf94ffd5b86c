//! Execution of a single component inside a worker.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};
use tracing::{debug, warn};

use super::DependencyResults;
use crate::executor::template;
use crate::executor::{
    DerivedExecutor, DerivedRequest, ExecutionContext, GuardedQuery, RowLimitGuard,
};
use crate::types::{
    ComponentPayload, ComponentResult, ComponentSource, DerivedSpec, FilterValues,
    QuerySpec, ReportComponent,
};
use crate::{MuninError, Result};

/// Connection id and payload signature used for a component's cache key.
///
/// Query components sign their SQL after filter substitution. Derived
/// components have no connection and sign provider, model and the prompt
/// as rendered from the filters and the results currently in
/// `dependencies`, so a key computed before the context components have
/// finished does not match the prompt the component would run with.
pub(crate) fn cache_identity(
    component: &ReportComponent,
    filters: &FilterValues,
    dependencies: &DependencyResults,
) -> (String, String) {
    match &component.source {
        ComponentSource::Query(spec) => (
            spec.connection_id.clone(),
            template::apply_filter_placeholders(&spec.sql, &spec.top_level_filters, filters),
        ),
        ComponentSource::Derived(spec) => {
            let (prompt, _) = render_prompt(component, spec, filters, dependencies);
            (
                String::new(),
                format!(
                    "{}\n{}\n{}",
                    spec.provider.as_deref().unwrap_or_default(),
                    spec.model.as_deref().unwrap_or_default(),
                    prompt
                ),
            )
        }
    }
}

/// Components whose results are rendered into a derived component's prompt.
///
/// `contextComponents` when set, otherwise `dependsOn`. Empty for queries.
pub(crate) fn prompt_context(component: &ReportComponent) -> &[String] {
    match &component.source {
        ComponentSource::Derived(spec) if !spec.context_components.is_empty() => {
            &spec.context_components
        }
        ComponentSource::Derived(_) => &component.depends_on,
        ComponentSource::Query(_) => &[],
    }
}

fn render_prompt(
    component: &ReportComponent,
    spec: &DerivedSpec,
    filters: &FilterValues,
    dependencies: &DependencyResults,
) -> (String, BTreeMap<String, String>) {
    let context = template::build_context_payload(prompt_context(component), dependencies);
    let prompt = template::inject_placeholders(&spec.prompt_template, filters, &context);
    (prompt, context)
}

/// Everything a worker needs to run one component.
pub(crate) struct ComponentJob {
    pub component: ReportComponent,
    pub report_id: Arc<str>,
    pub filters: Arc<FilterValues>,
    pub dependencies: Arc<DependencyResults>,
    pub guard: Option<Arc<RowLimitGuard>>,
    pub derived: Option<Arc<dyn DerivedExecutor>>,
}

impl ComponentJob {
    /// Run the component. Errors become failed results; this never fails.
    pub(crate) async fn run(self, ctx: ExecutionContext) -> ComponentResult {
        let start = Instant::now();
        let kind = self.component.kind();
        let outcome = match &self.component.source {
            ComponentSource::Query(spec) => self.run_query(&ctx, spec).await,
            ComponentSource::Derived(spec) => self.run_derived(&ctx, spec).await,
        };

        match outcome {
            Ok((payload, total_rows, metadata)) => {
                debug!(
                    component_id = %self.component.id,
                    rows = payload.row_count(),
                    "component succeeded"
                );
                ComponentResult::success(&self.component.id, kind, payload, start.elapsed())
                    .with_total_rows(total_rows)
                    .with_metadata(metadata)
            }
            Err(e) => {
                warn!(component_id = %self.component.id, error = %e, "component failed");
                ComponentResult::failure(&self.component.id, kind, &e, start.elapsed())
            }
        }
    }

    async fn run_query(
        &self,
        ctx: &ExecutionContext,
        spec: &QuerySpec,
    ) -> Result<(ComponentPayload, Option<u64>, BTreeMap<String, Value>)> {
        let guard = self.guard.as_ref().ok_or(MuninError::NoExecutor("query"))?;
        let sql = template::apply_filter_placeholders(&spec.sql, &spec.top_level_filters, &self.filters);

        let fetched = guard
            .run(
                ctx,
                &GuardedQuery {
                    component_id: &self.component.id,
                    connection_id: &spec.connection_id,
                    sql: &sql,
                    limit: self.component.limit,
                    filters: &self.filters,
                },
            )
            .await?;

        let mut metadata = BTreeMap::new();
        metadata.insert("connectionId".to_owned(), json!(spec.connection_id));
        metadata.insert("effectiveLimit".to_owned(), json!(fetched.effective_limit));

        Ok((
            ComponentPayload::Rows {
                columns: fetched.columns,
                rows: fetched.rows,
            },
            fetched.total_rows,
            metadata,
        ))
    }

    async fn run_derived(
        &self,
        ctx: &ExecutionContext,
        spec: &DerivedSpec,
    ) -> Result<(ComponentPayload, Option<u64>, BTreeMap<String, Value>)> {
        let executor = self
            .derived
            .as_ref()
            .ok_or(MuninError::NoExecutor("derived"))?;

        let (prompt, context) =
            render_prompt(&self.component, spec, &self.filters, &self.dependencies);
        if prompt.trim().is_empty() {
            return Err(MuninError::InvalidComponent(format!(
                "component {} has an empty prompt",
                self.component.id
            )));
        }

        let mut request_metadata = spec.metadata.clone();
        request_metadata.insert("report_id".to_owned(), self.report_id.to_string());
        request_metadata.insert("component_id".to_owned(), self.component.id.clone());

        let output = executor
            .execute(
                ctx,
                &DerivedRequest {
                    component_id: &self.component.id,
                    prompt: &prompt,
                    context: context.get("context").map(String::as_str),
                    spec,
                    metadata: &request_metadata,
                    dependencies: &self.dependencies,
                },
            )
            .await?;

        let mut metadata = output.metadata;
        if let Some(provider) = &spec.provider {
            metadata
                .entry("provider".to_owned())
                .or_insert_with(|| json!(provider));
        }
        if let Some(model) = &spec.model {
            metadata
                .entry("model".to_owned())
                .or_insert_with(|| json!(model));
        }

        Ok((
            ComponentPayload::Text {
                content: output.content,
            },
            None,
            metadata,
        ))
    }
}
