//! Import sequencing
//!
//! A journey depends on every journey it invokes as a sub-flow. Journeys
//! are released in passes: a pass moves each journey whose dependencies are
//! all resolved or already present, in input order. Sequencing stops when
//! nothing is left or a pass makes no progress.

use indexmap::IndexMap;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::DiGraph;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::model::JourneyBundle;

/// Something that names the journeys it depends on
pub trait Dependent {
    fn dependencies(&self) -> Vec<String>;
}

impl Dependent for JourneyBundle {
    fn dependencies(&self) -> Vec<String> {
        self.subflow_dependencies()
    }
}

impl<T: Dependent + ?Sized> Dependent for &T {
    fn dependencies(&self) -> Vec<String> {
        (**self).dependencies()
    }
}

/// Outcome of sequencing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequencePlan {
    /// Import order
    pub order: Vec<String>,
    /// Journeys that could not be placed, with their dependencies
    pub unresolved: BTreeMap<String, Vec<String>>,
    /// Dependencies neither requested nor already present
    pub missing: BTreeSet<String>,
}

impl SequencePlan {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn unresolved_ids(&self) -> BTreeSet<String> {
        self.unresolved.keys().cloned().collect()
    }

    /// Groups of unresolved journeys that depend on each other, each sorted
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut graph = DiGraph::<&str, ()>::new();
        let index: HashMap<&str, _> = self
            .unresolved
            .keys()
            .map(|id| (id.as_str(), graph.add_node(id.as_str())))
            .collect();

        let mut self_loops = BTreeSet::new();
        for (id, deps) in &self.unresolved {
            for dep in deps {
                if let Some(&target) = index.get(dep.as_str()) {
                    graph.add_edge(index[id.as_str()], target, ());
                    if dep == id {
                        self_loops.insert(id.clone());
                    }
                }
            }
        }

        let mut cycles: Vec<Vec<String>> = kosaraju_scc(&graph)
            .into_iter()
            .filter_map(|component| {
                let mut ids: Vec<String> = component
                    .into_iter()
                    .filter_map(|idx| graph.node_weight(idx))
                    .map(|id| id.to_string())
                    .collect();
                if ids.len() > 1 || ids.iter().any(|id| self_loops.contains(id)) {
                    ids.sort();
                    Some(ids)
                } else {
                    None
                }
            })
            .collect();
        cycles.sort();
        cycles
    }
}

/// Order `requested` so every journey follows its sub-flows
pub fn sequence<J: Dependent>(
    requested: &IndexMap<String, J>,
    already_present: &HashSet<String>,
) -> SequencePlan {
    let mut pending: IndexMap<&str, Vec<String>> = requested
        .iter()
        .map(|(id, journey)| (id.as_str(), journey.dependencies()))
        .collect();
    let mut order: Vec<String> = Vec::new();
    let mut resolved: HashSet<String> = HashSet::new();

    let mut pass = 0;
    while !pending.is_empty() {
        pass += 1;
        let before = pending.len();

        pending.retain(|id, deps| {
            let ready = deps
                .iter()
                .all(|dep| resolved.contains(dep) || already_present.contains(dep));
            if ready {
                order.push(id.to_string());
                resolved.insert(id.to_string());
            }
            !ready
        });

        debug!("Sequencing pass {}: {} left", pass, pending.len());
        if pending.len() == before {
            break;
        }
    }

    let missing = pending
        .values()
        .flatten()
        .filter(|dep| !requested.contains_key(*dep) && !already_present.contains(*dep))
        .cloned()
        .collect();

    SequencePlan {
        order,
        unresolved: pending
            .into_iter()
            .map(|(id, deps)| (id.to_string(), deps))
            .collect(),
        missing,
    }
}
