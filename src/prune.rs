//! Orphaned node detection and removal
//!
//! A node is active when some journey in the realm references it, either
//! directly or as a child of one of its containers. Every other node is an
//! orphan.

use futures::future::{join_all, try_join_all};
use std::collections::HashSet;
use tracing::{error, info};

use crate::error::Result;
use crate::model::NodeInstance;
use crate::store::ArtifactStore;

/// Node inventory of a realm
#[derive(Debug, Clone, Default)]
pub struct OrphanReport {
    pub all: Vec<NodeInstance>,
    pub orphaned: Vec<NodeInstance>,
}

/// Outcome of a prune
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneResult {
    pub deleted: usize,
    /// Ids whose delete failed
    pub failures: Vec<String>,
}

pub struct OrphanAuditor<'a, S: ArtifactStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ArtifactStore + ?Sized> OrphanAuditor<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Ids referenced by any journey, including children of containers
    pub async fn active_ids(&self) -> Result<HashSet<String>> {
        let journeys = self.store.list_all_journeys().await?;

        let mut active = HashSet::new();
        let mut containers = Vec::new();
        for journey in &journeys {
            active.extend(journey.node_refs.keys().cloned());
            containers.extend(journey.container_node_ids());
        }

        let container_nodes = try_join_all(
            containers
                .iter()
                .map(|(id, node_ref)| self.store.get_node(id, &node_ref.node_type)),
        )
        .await?;
        for container in &container_nodes {
            active.extend(container.children().iter().map(|child| child.id.clone()));
        }

        info!(
            "{} journeys reference {} nodes",
            journeys.len(),
            active.len()
        );
        Ok(active)
    }

    /// Every node in the realm and the ones no journey references
    pub async fn find_orphans(&self) -> Result<OrphanReport> {
        let active = self.active_ids().await?;
        let all = self.store.list_all_nodes().await?;
        let orphaned: Vec<NodeInstance> = all
            .iter()
            .filter(|node| !active.contains(&node.id))
            .cloned()
            .collect();
        info!("{} of {} nodes are orphaned", orphaned.len(), all.len());
        Ok(OrphanReport { all, orphaned })
    }

    /// Delete `orphaned` once `confirmed`; failures do not stop other deletes
    pub async fn prune(&self, orphaned: &[NodeInstance], confirmed: bool) -> PruneResult {
        if !confirmed {
            info!("Prune not confirmed, nothing deleted");
            return PruneResult::default();
        }

        let outcomes = join_all(
            orphaned
                .iter()
                .map(|node| self.store.delete_node(&node.id, node.type_name())),
        )
        .await;

        let mut result = PruneResult::default();
        for (node, outcome) in orphaned.iter().zip(outcomes) {
            match outcome {
                Ok(()) => result.deleted += 1,
                Err(e) => {
                    error!("Failed to delete node {} ({}): {}", node.id, node.type_name(), e);
                    result.failures.push(node.id.clone());
                }
            }
        }
        info!(
            "Deleted {} orphaned nodes, {} failures",
            result.deleted,
            result.failures.len()
        );
        result
    }
}
