//! Identity remapping
//!
//! Assigns fresh ids to a bundle's nodes and rewrites every field that
//! refers to a node: each node's own `_id`, container child entries, the
//! journey's `entryNodeId`, its node reference keys and connection targets.
//! Only those fields are touched; payload text is never searched.

use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use uuid::Uuid;

use crate::model::{JourneyBundle, NodeInstance};

/// Old id -> new id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemapTable {
    ids: HashMap<String, String>,
}

impl RemapTable {
    pub fn insert(&mut self, old: impl Into<String>, new: impl Into<String>) {
        self.ids.insert(old.into(), new.into());
    }

    pub fn get(&self, old: &str) -> Option<&str> {
        self.ids.get(old).map(String::as_str)
    }

    /// New id for `old`, or `old` itself when it was not remapped
    pub fn resolve(&self, old: &str) -> String {
        self.get(old).unwrap_or(old).to_string()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ids.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn random_id() -> String {
    Uuid::new_v4().to_string()
}

/// Produces re-identified copies of journey bundles
pub struct Remapper {
    generate: Box<dyn Fn() -> String + Send + Sync>,
}

impl Default for Remapper {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Remapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remapper").finish_non_exhaustive()
    }
}

impl Remapper {
    /// Remapper issuing random v4 UUIDs
    pub fn new() -> Self {
        Self::with_generator(random_id)
    }

    /// Remapper issuing ids from `generate`; each call must return a fresh id
    pub fn with_generator(generate: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self {
            generate: Box::new(generate),
        }
    }

    /// Copy of `bundle` with the journey named `target_id` and, unless
    /// `preserve_ids` is set, every node re-identified
    pub fn remap(&self, bundle: &JourneyBundle, target_id: &str, preserve_ids: bool) -> JourneyBundle {
        self.remap_with_table(bundle, target_id, preserve_ids).0
    }

    /// Like [`Remapper::remap`], also returning the id table used
    pub fn remap_with_table(
        &self,
        bundle: &JourneyBundle,
        target_id: &str,
        preserve_ids: bool,
    ) -> (JourneyBundle, RemapTable) {
        let mut out = bundle.clone();
        out.tree.id = target_id.to_string();

        let mut table = RemapTable::default();
        if preserve_ids {
            return (out, table);
        }

        // Inner nodes first: containers refer to them
        for id in bundle.inner_nodes.keys() {
            table.insert(id.clone(), (self.generate)());
        }
        for id in bundle.nodes.keys() {
            table.insert(id.clone(), (self.generate)());
        }

        out.inner_nodes = rekey(&bundle.inner_nodes, &table);
        out.nodes = rekey(&bundle.nodes, &table);

        let journey = &mut out.tree;
        journey.entry_node_id = table.resolve(&journey.entry_node_id);
        journey.node_refs = std::mem::take(&mut journey.node_refs)
            .into_iter()
            .map(|(id, mut node_ref)| {
                for target in node_ref.connections.values_mut() {
                    *target = table.resolve(target);
                }
                (table.resolve(&id), node_ref)
            })
            .collect();

        debug!("Remapped {} node ids for {}", table.len(), target_id);
        (out, table)
    }
}

fn rekey(
    nodes: &BTreeMap<String, NodeInstance>,
    table: &RemapTable,
) -> BTreeMap<String, NodeInstance> {
    nodes
        .values()
        .map(|node| {
            let mut node = node.clone();
            node.id = table.resolve(&node.id);
            if let Some(children) = node.children.as_mut() {
                for child in children {
                    child.id = table.resolve(&child.id);
                }
            }
            (node.id.clone(), node)
        })
        .collect()
}
