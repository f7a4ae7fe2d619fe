//! Dependency collection
//!
//! Walks a journey's node graph and gathers the full artifact closure in
//! three phases: top-level nodes, inner nodes of containers, then every
//! artifact those nodes reference. Fetches within a phase run concurrently.
//!
//! Nodes, inner nodes and scripts are required: a failed fetch aborts the
//! collection. Every other artifact is optional and a `NotFound` or
//! `Unsupported` answer leaves it out of the bundle.

use futures::future::{join_all, try_join_all};
use std::collections::BTreeSet;
use std::future::Future;
use tracing::{debug, info, warn};

use crate::config::Deployment;
use crate::error::{ArtifactKind, Result};
use crate::model::{
    CircleOfTrust, EmailTemplate, Journey, JourneyBundle, NodeInstance, Saml2Entity,
    SocialIdentityProvider, Theme,
};
use crate::node_types;
use crate::store::ArtifactStore;

/// What to collect besides the journey and its nodes
#[derive(Debug, Clone, Copy)]
pub struct CollectOptions {
    /// Collect scripts, templates, providers and themes
    pub include_dependencies: bool,
    /// Deployment variant of the source environment
    pub deployment: Deployment,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            include_dependencies: true,
            deployment: Deployment::Cloud,
        }
    }
}

/// Artifact references found on a set of nodes
#[derive(Debug, Default)]
struct References {
    scripts: BTreeSet<String>,
    email_templates: BTreeSet<String>,
    saml2_entity_ids: BTreeSet<String>,
    filtered_providers: BTreeSet<String>,
    provider_dispatch: bool,
    themes: BTreeSet<String>,
}

impl References {
    fn scan(&mut self, node: &NodeInstance) {
        let node_type = node.type_name();

        if node_types::is_scripted(node_type) {
            if let Some(script) = node.str_property("script") {
                self.scripts.insert(script.to_string());
            }
        }

        if node_types::is_email_template(node_type) {
            if let Some(template) = node.str_property("emailTemplateName") {
                self.email_templates.insert(template.to_string());
            }
        }

        if node_types::is_saml2(node_type) {
            // metaAlias looks like "/alpha/iSPAzure"
            if let Some(alias) = node.str_property("metaAlias") {
                if let Some(entity) = alias.rsplit('/').next().filter(|e| !e.is_empty()) {
                    self.saml2_entity_ids.insert(entity.to_string());
                }
            }
            if let Some(entity) = node.str_property("idpEntityId") {
                self.saml2_entity_ids.insert(entity.to_string());
            }
        }

        if node_types::is_select_idp(node_type) {
            self.filtered_providers
                .extend(node.string_list("filteredProviders"));
        }

        if node_types::is_provider_dispatch(node_type) {
            self.provider_dispatch = true;
        }

        if node.is_container() {
            if let Some(theme) = node.stage_theme() {
                self.themes.insert(theme);
            }
        }
    }
}

/// Treat `NotFound` and `Unsupported` as an absent artifact
async fn optional<T>(
    kind: ArtifactKind,
    id: &str,
    fetch: impl Future<Output = Result<T>>,
) -> Result<Option<T>> {
    match fetch.await {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() || e.is_unsupported() => {
            warn!("Skipping {} {}: {}", kind, id, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Collects a journey's dependency closure from one environment
pub struct Collector<'a, S: ArtifactStore + ?Sized> {
    store: &'a S,
    options: CollectOptions,
}

impl<'a, S: ArtifactStore + ?Sized> Collector<'a, S> {
    pub fn new(store: &'a S, options: CollectOptions) -> Self {
        Self { store, options }
    }

    /// Build the bundle for `journey`
    pub async fn collect(&self, journey: &Journey) -> Result<JourneyBundle> {
        self.collect_closure(journey)
            .await
            .map_err(|e| e.in_collection(&journey.id))
    }

    async fn collect_closure(&self, journey: &Journey) -> Result<JourneyBundle> {
        info!("Collecting journey {}", journey.id);
        let mut bundle = JourneyBundle::new(journey.clone());

        // Phase 1: top-level nodes
        let nodes = try_join_all(
            journey
                .node_refs
                .iter()
                .map(|(id, node_ref)| self.store.get_node(id, &node_ref.node_type)),
        )
        .await?;

        // Phase 2: inner nodes, one level deep
        let inner_nodes = try_join_all(
            nodes
                .iter()
                .filter(|node| node.is_container())
                .flat_map(|node| node.children())
                .map(|child| self.store.get_node(&child.id, &child.node_type)),
        )
        .await?;

        debug!(
            "{}: {} nodes, {} inner nodes",
            journey.id,
            nodes.len(),
            inner_nodes.len()
        );

        let mut refs = References::default();
        for node in nodes.iter().chain(inner_nodes.iter()) {
            refs.scan(node);
        }

        bundle.nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        bundle.inner_nodes = inner_nodes
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();

        if !self.options.include_dependencies {
            return Ok(bundle);
        }

        // Phase 3: artifacts
        let (email_templates, saml2, providers, themes) = futures::try_join!(
            self.collect_email_templates(&refs.email_templates),
            self.collect_saml2(&refs.saml2_entity_ids),
            self.collect_social_providers(&refs),
            self.collect_themes(&journey.id, &refs.themes),
        )?;

        let mut script_ids = refs.scripts;
        script_ids.extend(providers.iter().filter_map(|p| p.transform.clone()));
        let scripts = try_join_all(script_ids.iter().map(|id| self.store.get_script(id))).await?;

        bundle.scripts = scripts.into_iter().map(|s| (s.id.clone(), s)).collect();
        bundle.email_templates = email_templates
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();
        let (entities, circles) = saml2;
        bundle.saml2_entities = entities.into_iter().map(|e| (e.id.clone(), e)).collect();
        bundle.circles_of_trust = circles.into_iter().map(|c| (c.id.clone(), c)).collect();
        bundle.social_identity_providers =
            providers.into_iter().map(|p| (p.id.clone(), p)).collect();
        bundle.themes = themes;

        info!(
            "Collected {}: {} scripts, {} email templates, {} SAML2 entities, {} themes",
            journey.id,
            bundle.scripts.len(),
            bundle.email_templates.len(),
            bundle.saml2_entities.len(),
            bundle.themes.len()
        );
        Ok(bundle)
    }

    async fn collect_email_templates(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<Vec<EmailTemplate>> {
        if names.is_empty() || !self.options.deployment.supports_email_templates() {
            return Ok(Vec::new());
        }
        let templates = join_all(names.iter().map(|name| {
            optional(
                ArtifactKind::EmailTemplate,
                name,
                self.store.get_email_template(name),
            )
        }))
        .await;
        Ok(templates
            .into_iter()
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect())
    }

    async fn collect_saml2(
        &self,
        entity_ids: &BTreeSet<String>,
    ) -> Result<(Vec<Saml2Entity>, Vec<CircleOfTrust>)> {
        if entity_ids.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let (stubs, circles) = futures::try_join!(
            optional(
                ArtifactKind::Saml2Entity,
                "*",
                self.store.get_saml2_providers()
            ),
            optional(
                ArtifactKind::CircleOfTrust,
                "*",
                self.store.get_circles_of_trust()
            ),
        )?;
        let stubs = stubs.unwrap_or_default();

        let matched = stubs
            .iter()
            .filter(|stub| entity_ids.contains(&stub.entity_id));
        let entities: Vec<Saml2Entity> = try_join_all(matched.map(|stub| {
            optional(
                ArtifactKind::Saml2Entity,
                &stub.entity_id,
                self.store.get_saml2_provider(stub.location, &stub.id),
            )
        }))
        .await?
        .into_iter()
        .flatten()
        .collect();

        for entity_id in entity_ids {
            if !entities.iter().any(|e| &e.entity_id == entity_id) {
                warn!("SAML2 entity {} not found in provider list", entity_id);
            }
        }

        let circles = circles
            .unwrap_or_default()
            .into_iter()
            .filter(|circle| {
                entities
                    .iter()
                    .any(|entity| circle.includes_entity(&entity.entity_id))
            })
            .collect();

        Ok((entities, circles))
    }

    async fn collect_social_providers(
        &self,
        refs: &References,
    ) -> Result<Vec<SocialIdentityProvider>> {
        if !refs.provider_dispatch {
            return Ok(Vec::new());
        }
        let providers = optional(
            ArtifactKind::SocialIdentityProvider,
            "*",
            self.store.get_social_identity_providers(),
        )
        .await?
        .unwrap_or_default();

        // An empty filter keeps every provider
        Ok(providers
            .into_iter()
            .filter(|p| refs.filtered_providers.is_empty() || refs.filtered_providers.contains(&p.id))
            .collect())
    }

    async fn collect_themes(
        &self,
        journey_id: &str,
        referenced: &BTreeSet<String>,
    ) -> Result<Vec<Theme>> {
        if !self.options.deployment.supports_themes() {
            return Ok(Vec::new());
        }
        let themes = optional(ArtifactKind::Theme, "*", self.store.get_themes())
            .await?
            .unwrap_or_default();

        let selected: Vec<Theme> = themes
            .into_iter()
            .filter(|theme| {
                referenced.contains(&theme.id)
                    || referenced.contains(&theme.name)
                    || theme.linked_trees.iter().any(|tree| tree == journey_id)
            })
            .collect();

        for theme in referenced {
            if !selected.iter().any(|t| &t.id == theme || &t.name == theme) {
                warn!("Theme {} referenced by {} not found", theme, journey_id);
            }
        }
        Ok(selected)
    }
}
