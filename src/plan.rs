//! Dependency waves.
//!
//! Components that declare `depends_on` must not run in the same batch as
//! their dependencies. [`plan_waves`] partitions a set of components into
//! topological batches (Kahn's algorithm, one layer per wave): every
//! component in wave `n` depends only on components in waves `< n`.
//!
//! Only dependencies inside the planned set impose ordering. A dependency
//! that is not being executed (not selected, or already resolved from the
//! cache) is ignored here.

use std::collections::{HashMap, HashSet};

use crate::types::ReportComponent;

/// Execution plan over a slice of components. Entries are indices into
/// that slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WavePlan {
    /// Batches in execution order. Within a wave, indices keep input order.
    pub waves: Vec<Vec<usize>>,
    /// Components that sit on a dependency cycle or depend on one, in
    /// input order. They cannot be scheduled.
    pub blocked: Vec<usize>,
}

impl WavePlan {
    /// Ids of the blocked components.
    pub fn blocked_ids(&self, components: &[&ReportComponent]) -> Vec<String> {
        self.blocked
            .iter()
            .map(|&i| components[i].id.clone())
            .collect()
    }
}

/// Partition `components` into dependency-respecting waves.
pub fn plan_waves(components: &[&ReportComponent]) -> WavePlan {
    let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(components.len());
    for (i, component) in components.iter().enumerate() {
        index_of.entry(component.id.as_str()).or_insert(i);
    }

    let mut in_degree = vec![0usize; components.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); components.len()];
    for (i, component) in components.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in component.dependencies() {
            let Some(&d) = index_of.get(dep.as_str()) else {
                continue;
            };
            if seen.insert(d) {
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }
    }

    let mut plan = WavePlan::default();
    let mut scheduled = vec![false; components.len()];
    let mut ready: Vec<usize> = (0..components.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();

    while !ready.is_empty() {
        let mut next = Vec::new();
        for &i in &ready {
            scheduled[i] = true;
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    next.push(dependent);
                }
            }
        }
        next.sort_unstable();
        plan.waves.push(std::mem::replace(&mut ready, next));
    }

    plan.blocked = (0..components.len()).filter(|&i| !scheduled[i]).collect();
    plan
}
