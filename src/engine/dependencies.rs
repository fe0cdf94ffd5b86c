//! Results visible to later dependency waves.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::types::ComponentResult;

/// Read-mostly lookup of completed component results, keyed by id.
///
/// Each key is written once: by a cache hit at the start of the run, or
/// by the orchestrator after the wave that produced it finishes. Tasks in
/// later waves only read.
#[derive(Debug, Default)]
pub struct DependencyResults {
    results: RwLock<HashMap<String, Arc<ComponentResult>>>,
}

impl DependencyResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Result of a completed component, if any.
    pub fn get(&self, component_id: &str) -> Option<Arc<ComponentResult>> {
        self.results.read().get(component_id).cloned()
    }

    pub fn contains(&self, component_id: &str) -> bool {
        self.results.read().contains_key(component_id)
    }

    pub fn len(&self) -> usize {
        self.results.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Publish a result. Returns `false` (and keeps the existing value) if
    /// one was already published for this id.
    pub fn publish(&self, result: ComponentResult) -> bool {
        let mut results = self.results.write();
        if results.contains_key(&result.component_id) {
            debug!(
                component_id = %result.component_id,
                "result already published, keeping first"
            );
            return false;
        }
        results.insert(result.component_id.clone(), Arc::new(result));
        true
    }
}
