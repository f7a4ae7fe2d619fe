//! Journey export
//!
//! Wraps collected journey bundles in a `meta` envelope stamped with the
//! source environment's fingerprint.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::bundle::{self, Bundle, BundleMeta};
use crate::collect::{CollectOptions, Collector};
use crate::config::{ConnectionConfig, OutputFormat};
use crate::error::Result;
use crate::naming;
use crate::store::ArtifactStore;

/// Exports journeys from one environment
pub struct Exporter<'a, S: ArtifactStore + ?Sized> {
    store: &'a S,
    connection: &'a ConnectionConfig,
    options: CollectOptions,
}

impl<'a, S: ArtifactStore + ?Sized> Exporter<'a, S> {
    pub fn new(store: &'a S, connection: &'a ConnectionConfig, include_dependencies: bool) -> Self {
        Self {
            store,
            connection,
            options: CollectOptions {
                include_dependencies,
                deployment: connection.deployment,
            },
        }
    }

    fn meta(&self) -> BundleMeta {
        BundleMeta::new(
            &self.connection.tenant,
            &self.connection.realm,
            self.connection.username.as_deref().unwrap_or_default(),
        )
    }

    fn collector(&self) -> Collector<'_, S> {
        Collector::new(self.store, self.options)
    }

    /// Export one journey by id
    pub async fn export_journey(&self, journey_id: &str) -> Result<Bundle> {
        let journey = self
            .store
            .get_journey(journey_id)
            .await
            .map_err(|e| e.in_collection(journey_id))?;
        let collected = self.collector().collect(&journey).await?;
        Ok(Bundle::single(self.meta(), collected))
    }

    /// Export every journey of the realm into one bundle
    pub async fn export_all(&self) -> Result<Bundle> {
        let journeys = self.store.list_all_journeys().await?;
        info!("Exporting {} journeys", journeys.len());

        let collector = self.collector();
        let mut trees = IndexMap::new();
        for journey in &journeys {
            let collected = collector.collect(journey).await?;
            trees.insert(journey.id.clone(), collected);
        }
        Ok(Bundle::multiple(self.meta(), trees))
    }

    /// Export every journey into its own `<slug>.journey.json` under `dir`
    pub async fn export_all_separate(&self, dir: &Path, format: OutputFormat) -> Result<Vec<PathBuf>> {
        let journeys = self.store.list_all_journeys().await?;
        info!("Exporting {} journeys to {}", journeys.len(), dir.display());

        let collector = self.collector();
        let mut written = Vec::with_capacity(journeys.len());
        for journey in &journeys {
            let collected = collector.collect(journey).await?;
            let path = dir.join(naming::journey_file_name(&journey.id));
            bundle::write_file(&path, &Bundle::single(self.meta(), collected), format)?;
            info!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleContent;
    use crate::model::{Journey, NodeInstance, NodeRef};
    use crate::store::MemoryStore;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        for id in ["Login", "Registration"] {
            let node = format!("{}-n1", id);
            store.insert_journey(Journey::new(id, &node).with_node(&node, NodeRef::new("MessageNode")));
            store.insert_node(NodeInstance::new(&node, "MessageNode"));
        }
        store
    }

    fn connection() -> ConnectionConfig {
        ConnectionConfig {
            tenant: "https://source.example.com/am".into(),
            username: Some("admin".into()),
            ..ConnectionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_meta_carries_fingerprint() {
        let store = store();
        let connection = connection();
        let bundle = Exporter::new(&store, &connection, true)
            .export_journey("Login")
            .await
            .unwrap();
        assert_eq!(bundle.meta.origin, "https://source.example.com/am");
        assert_eq!(bundle.meta.exported_by, "admin");
        assert_eq!(bundle.meta.origin_fingerprint, Some(connection.fingerprint()));
    }

    #[tokio::test]
    async fn test_missing_journey_names_it() {
        let store = store();
        let connection = connection();
        let err = Exporter::new(&store, &connection, true)
            .export_journey("Nope")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Nope"));
    }

    #[tokio::test]
    async fn test_export_all_keeps_order() {
        let store = store();
        let connection = connection();
        let bundle = Exporter::new(&store, &connection, true)
            .export_all()
            .await
            .unwrap();
        assert!(matches!(bundle.content, BundleContent::Multiple(_)));
        assert_eq!(bundle.journey_ids(), vec!["Login", "Registration"]);
    }

    #[tokio::test]
    async fn test_export_all_separate_writes_files() {
        let store = store();
        let connection = connection();
        let dir = tempfile::tempdir().unwrap();
        let written = Exporter::new(&store, &connection, true)
            .export_all_separate(dir.path(), OutputFormat::Pretty)
            .await
            .unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("Registration.journey.json").exists());
    }
}
