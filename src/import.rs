//! Journey import
//!
//! Writes a journey bundle into the target realm category by category:
//! scripts, email templates, themes, social identity providers, SAML2
//! entities, circles of trust, inner nodes, nodes and finally the journey.
//! Writes already made are not rolled back when a later one fails.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::bundle::{self, Bundle, BundleMeta};
use crate::config::{ConnectionConfig, ImportConfig};
use crate::error::{ArtifactKind, MigrateError, Result};
use crate::model::{JourneyBundle, NodeInstance, Script};
use crate::naming::NameCollisionPolicy;
use crate::remap::Remapper;
use crate::sequence::sequence;
use crate::store::ArtifactStore;

/// Suffix of single-journey bundle files
pub const JOURNEY_FILE_SUFFIX: &str = ".journey.json";

/// How journeys are written
#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Give every node a fresh id
    pub re_uuid: bool,
    /// Write scripts, templates, providers and themes
    pub include_dependencies: bool,
    /// Renames tried for a conflicting script
    pub max_rename_attempts: u32,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self::from(&ImportConfig::default())
    }
}

impl From<&ImportConfig> for ImportOptions {
    fn from(config: &ImportConfig) -> Self {
        Self {
            re_uuid: config.re_uuid,
            include_dependencies: config.include_dependencies,
            max_rename_attempts: config.max_rename_attempts,
        }
    }
}

/// Outcome of a multi-journey import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Journeys written, in order
    pub imported: Vec<String>,
    /// Journey id and error message of each failed import
    pub failed: Vec<(String, String)>,
    /// Journeys skipped for unresolved dependencies
    pub unresolved: BTreeMap<String, Vec<String>>,
}

impl ImportSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.unresolved.is_empty()
    }
}

/// Closest journey ids to `query`, best first
pub fn suggest<'s>(candidates: impl IntoIterator<Item = &'s str>, query: &str) -> Vec<String> {
    let matcher = SkimMatcherV2::default();
    let mut scored: Vec<(i64, &str)> = candidates
        .into_iter()
        .filter_map(|id| matcher.fuzzy_match(id, query).map(|score| (score, id)))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(b.1)));
    scored
        .into_iter()
        .take(3)
        .map(|(_, id)| id.to_string())
        .collect()
}

/// Imports journey bundles into one environment
pub struct Importer<'a, S: ArtifactStore + ?Sized> {
    store: &'a S,
    connection: &'a ConnectionConfig,
    options: ImportOptions,
    remapper: Remapper,
    collision: NameCollisionPolicy,
}

impl<'a, S: ArtifactStore + ?Sized> Importer<'a, S> {
    pub fn new(store: &'a S, connection: &'a ConnectionConfig, options: ImportOptions) -> Self {
        Self {
            store,
            connection,
            options,
            remapper: Remapper::new(),
            collision: NameCollisionPolicy::new(),
        }
    }

    pub fn with_remapper(mut self, remapper: Remapper) -> Self {
        self.remapper = remapper;
        self
    }

    /// Import one journey of `bundle`, refusing when a sub-flow it invokes
    /// is neither in the target realm nor the journey itself
    pub async fn import_journey(&self, bundle: &Bundle, journey_id: &str) -> Result<()> {
        self.log_origin(&bundle.meta);
        let journey = bundle
            .journey(journey_id)
            .ok_or_else(|| self.unknown_journey(bundle, journey_id))?;
        for warning in bundle::check_integrity(journey)? {
            warn!("{}: {}", journey_id, warning);
        }

        let mut present = self.present_journeys().await?;
        present.insert(journey_id.to_string());
        let mut requested = IndexMap::new();
        requested.insert(journey_id.to_string(), journey);
        let plan = sequence(&requested, &present);
        if let Some(deps) = plan.unresolved.get(journey_id) {
            let missing: Vec<&str> = deps
                .iter()
                .filter(|dep| !present.contains(*dep))
                .map(String::as_str)
                .collect();
            return Err(MigrateError::Validation(format!(
                "journey {} depends on journeys missing from the target: {}",
                journey_id,
                missing.join(", ")
            )));
        }

        self.import_tree(journey_id, journey).await
    }

    /// Import every journey of `bundle` in dependency order
    pub async fn import_all(&self, bundle: &Bundle) -> Result<ImportSummary> {
        self.log_origin(&bundle.meta);
        self.import_journeys(bundle.clone().into_journeys()).await
    }

    /// Import every `*.journey.json` file under `dir` in dependency order
    pub async fn import_all_from_dir(&self, dir: &Path) -> Result<ImportSummary> {
        let mut requested = IndexMap::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| MigrateError::Io(e.into()))?;
            let is_journey_file = entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_str()
                    .map_or(false, |name| name.ends_with(JOURNEY_FILE_SUFFIX));
            if !is_journey_file {
                continue;
            }

            debug!("Reading {}", entry.path().display());
            let bundle = bundle::read_file(entry.path())?;
            self.log_origin(&bundle.meta);
            for (id, journey) in bundle.into_journeys() {
                if requested.contains_key(&id) {
                    warn!("Journey {} appears in more than one file, keeping the first", id);
                    continue;
                }
                requested.insert(id, journey);
            }
        }
        info!("Found {} journeys under {}", requested.len(), dir.display());
        self.import_journeys(requested).await
    }

    async fn import_journeys(
        &self,
        requested: IndexMap<String, JourneyBundle>,
    ) -> Result<ImportSummary> {
        // Validate everything before the first write
        for (id, journey) in &requested {
            for warning in bundle::check_integrity(journey)? {
                warn!("{}: {}", id, warning);
            }
        }

        let present = self.present_journeys().await?;
        let plan = sequence(&requested, &present);
        for (id, deps) in &plan.unresolved {
            warn!("Skipping {}: unresolved dependencies {}", id, deps.join(", "));
        }
        for cycle in plan.cycles() {
            warn!("Sub-flow cycle: {}", cycle.join(" -> "));
        }

        let mut summary = ImportSummary {
            unresolved: plan.unresolved.clone(),
            ..ImportSummary::default()
        };
        for id in &plan.order {
            let Some(journey) = requested.get(id) else {
                continue;
            };
            match self.import_tree(id, journey).await {
                Ok(()) => summary.imported.push(id.clone()),
                Err(e) => {
                    error!("Failed to import {}: {}", id, e);
                    summary.failed.push((id.clone(), e.to_string()));
                }
            }
        }

        info!(
            "Imported {} journeys, {} failed, {} unresolved",
            summary.imported.len(),
            summary.failed.len(),
            summary.unresolved.len()
        );
        Ok(summary)
    }

    // =========================================================================
    // Single journey
    // =========================================================================

    async fn import_tree(&self, target_id: &str, source: &JourneyBundle) -> Result<()> {
        info!("Importing journey {}", target_id);
        let bundle = self
            .remapper
            .remap(source, target_id, !self.options.re_uuid);
        let source_resource = source.tree.identity_resource().map(String::from);

        if self.options.include_dependencies {
            self.import_dependencies(target_id, &bundle).await?;
        }

        for node in bundle.inner_nodes.values() {
            self.put_node(target_id, ArtifactKind::InnerNode, node, source_resource.as_deref())
                .await?;
        }
        for node in bundle.nodes.values() {
            self.put_node(target_id, ArtifactKind::Node, node, source_resource.as_deref())
                .await?;
        }

        let mut journey = bundle.tree;
        journey.strip_revision();
        if journey
            .identity_resource()
            .map_or(false, |resource| resource.ends_with("user"))
        {
            journey.set_identity_resource(self.connection.managed_user_resource());
        }
        self.store
            .put_journey(target_id, &journey)
            .await
            .map_err(|e| e.in_import(target_id, ArtifactKind::Journey, target_id))?;

        info!("Imported journey {}", target_id);
        Ok(())
    }

    async fn import_dependencies(&self, journey_id: &str, bundle: &JourneyBundle) -> Result<()> {
        for (id, script) in &bundle.scripts {
            let stored = self
                .put_script(id, script)
                .await
                .map_err(|e| e.in_import(journey_id, ArtifactKind::Script, id))?;
            debug!("Script {} ({})", id, stored.name);
        }

        for (name, template) in &bundle.email_templates {
            let result = self
                .store
                .put_email_template(name, &template.id, template)
                .await;
            self.tolerate_unsupported(result, journey_id, ArtifactKind::EmailTemplate, name)?;
        }

        for theme in &bundle.themes {
            let result = self.store.put_theme(theme).await;
            self.tolerate_unsupported(result, journey_id, ArtifactKind::Theme, &theme.id)?;
        }

        for (id, provider) in &bundle.social_identity_providers {
            let result = self.store.put_social_identity_provider(provider).await;
            self.tolerate_unsupported(result, journey_id, ArtifactKind::SocialIdentityProvider, id)?;
        }

        for (id, entity) in &bundle.saml2_entities {
            let mut entity = entity.clone();
            entity.strip_revision();
            let result = self.store.put_saml2_provider(&entity).await;
            self.tolerate_unsupported(result, journey_id, ArtifactKind::Saml2Entity, id)?;
        }

        for (id, circle) in &bundle.circles_of_trust {
            let mut circle = circle.clone();
            circle.strip_revision();
            let result = self.store.put_circle_of_trust(&circle).await;
            self.tolerate_unsupported(result, journey_id, ArtifactKind::CircleOfTrust, id)?;
        }

        Ok(())
    }

    fn tolerate_unsupported<T>(
        &self,
        result: Result<T>,
        journey_id: &str,
        kind: ArtifactKind,
        id: &str,
    ) -> Result<()> {
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_unsupported() => {
                warn!("Skipping {} {} in {}: {}", kind, id, journey_id, e);
                Ok(())
            }
            Err(e) => Err(e.in_import(journey_id, kind, id)),
        }
    }

    /// Write a script, renaming it while its name is taken
    async fn put_script(&self, id: &str, script: &Script) -> Result<Script> {
        let mut script = script.clone();
        script.strip_revision();

        let mut attempts = 0;
        loop {
            match self.store.put_script(id, &script).await {
                Ok(stored) => return Ok(stored),
                Err(e) if e.is_conflict() && attempts < self.options.max_rename_attempts => {
                    let renamed = self.collision.next_name(&script.name);
                    warn!(
                        "Script name '{}' is taken, saving {} as '{}'",
                        script.name, id, renamed
                    );
                    script.name = renamed;
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn put_node(
        &self,
        journey_id: &str,
        kind: ArtifactKind,
        node: &NodeInstance,
        journey_resource: Option<&str>,
    ) -> Result<()> {
        let mut node = node.clone();
        node.strip_revision();

        // Follow the journey onto the target realm's managed users
        let follows_journey = match (node.identity_resource(), journey_resource) {
            (Some(resource), Some(journey_resource)) => {
                resource.ends_with("user") && resource == journey_resource
            }
            _ => false,
        };
        if follows_journey {
            let managed = self.connection.managed_user_resource();
            debug!("{} {}: identityResource -> {}", kind, node.id, managed);
            node.set_identity_resource(managed);
        }

        let node_type = node.type_name().to_string();
        self.store
            .put_node(&node.id, &node_type, &node)
            .await
            .map_err(|e| e.in_import(journey_id, kind, &node.id))?;
        debug!("{} {} ({})", kind, node.id, node_type);
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn present_journeys(&self) -> Result<HashSet<String>> {
        Ok(self
            .store
            .list_all_journeys()
            .await?
            .into_iter()
            .map(|journey| journey.id)
            .collect())
    }

    fn unknown_journey(&self, bundle: &Bundle, journey_id: &str) -> MigrateError {
        let suggestions = suggest(bundle.journey_ids(), journey_id);
        if !suggestions.is_empty() {
            warn!(
                "Journey {} is not in the bundle. Did you mean: {}?",
                journey_id,
                suggestions.join(", ")
            );
        }
        MigrateError::not_found(ArtifactKind::Journey, journey_id)
    }

    /// Report whether the bundle comes from this environment
    fn log_origin(&self, meta: &BundleMeta) {
        match &meta.origin_fingerprint {
            Some(fingerprint)
                if fingerprint.matches(&self.connection.tenant, &self.connection.realm) =>
            {
                info!("Bundle was exported from this environment");
            }
            Some(_) => info!("Bundle was exported from {}", meta.origin),
            None => debug!("Bundle carries no origin fingerprint"),
        }
    }
}
