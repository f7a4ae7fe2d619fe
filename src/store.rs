//! Artifact store seam
//!
//! Every migration component talks to an environment exclusively through
//! [`ArtifactStore`]. [`crate::http::HttpArtifactStore`] is the network
//! backend; [`MemoryStore`] is an in-process backend used by tests and dry
//! runs.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::error::{ArtifactKind, MigrateError, Result};
use crate::model::{
    CircleOfTrust, EmailTemplate, EntityLocation, Journey, NodeInstance, Saml2Entity,
    Saml2ProviderStub, Script, SocialIdentityProvider, Theme,
};

/// Typed get/put/delete access to one realm of an environment.
///
/// Each call returns the success payload or a typed failure
/// (`NotFound`, `Unsupported`, `Conflict`, `Transport`).
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    // ── Journeys ──

    async fn get_journey(&self, id: &str) -> Result<Journey>;
    async fn put_journey(&self, id: &str, journey: &Journey) -> Result<Journey>;
    async fn list_all_journeys(&self) -> Result<Vec<Journey>>;

    // ── Nodes ──

    async fn get_node(&self, id: &str, node_type: &str) -> Result<NodeInstance>;
    async fn put_node(&self, id: &str, node_type: &str, node: &NodeInstance)
        -> Result<NodeInstance>;
    async fn delete_node(&self, id: &str, node_type: &str) -> Result<()>;
    async fn list_all_nodes(&self) -> Result<Vec<NodeInstance>>;

    // ── Scripts ──

    async fn get_script(&self, id: &str) -> Result<Script>;
    /// Fails with `Conflict` when another script already uses the name
    async fn put_script(&self, id: &str, script: &Script) -> Result<Script>;

    // ── Email templates ──

    /// Fetch by short name (`welcome`, not `emailTemplate/welcome`)
    async fn get_email_template(&self, id: &str) -> Result<EmailTemplate>;
    async fn put_email_template(
        &self,
        id: &str,
        long_id: &str,
        template: &EmailTemplate,
    ) -> Result<EmailTemplate>;

    // ── SAML2 ──

    async fn get_saml2_providers(&self) -> Result<Vec<Saml2ProviderStub>>;
    async fn get_saml2_provider(&self, location: EntityLocation, id: &str) -> Result<Saml2Entity>;
    async fn put_saml2_provider(&self, entity: &Saml2Entity) -> Result<Saml2Entity>;
    async fn get_circles_of_trust(&self) -> Result<Vec<CircleOfTrust>>;
    async fn put_circle_of_trust(&self, circle: &CircleOfTrust) -> Result<CircleOfTrust>;

    // ── Social identity providers ──

    async fn get_social_identity_providers(&self) -> Result<Vec<SocialIdentityProvider>>;
    async fn put_social_identity_provider(
        &self,
        provider: &SocialIdentityProvider,
    ) -> Result<SocialIdentityProvider>;

    // ── Themes ──

    async fn get_themes(&self) -> Result<Vec<Theme>>;
    async fn put_theme(&self, theme: &Theme) -> Result<Theme>;
}

// =============================================================================
// In-memory backend
// =============================================================================

#[derive(Default)]
struct State {
    journeys: IndexMap<String, Journey>,
    nodes: IndexMap<String, NodeInstance>,
    scripts: IndexMap<String, Script>,
    email_templates: IndexMap<String, EmailTemplate>,
    saml2_entities: IndexMap<String, Saml2Entity>,
    circles_of_trust: IndexMap<String, CircleOfTrust>,
    social_providers: IndexMap<String, SocialIdentityProvider>,
    themes: IndexMap<String, Theme>,
    unsupported: HashSet<ArtifactKind>,
    failing: HashSet<ArtifactKind>,
    failing_deletes: HashSet<String>,
    writes: Vec<(ArtifactKind, String)>,
}

impl State {
    fn ensure_available(&self, kind: ArtifactKind) -> Result<()> {
        if self.unsupported.contains(&kind) {
            Err(MigrateError::unsupported(kind, "disabled in this store"))
        } else if self.failing.contains(&kind) {
            Err(MigrateError::transport(Some(500), format!("{} endpoint failed", kind)))
        } else {
            Ok(())
        }
    }
}

/// Realm held in memory.
///
/// Scripts enforce name uniqueness like a real realm does. Individual
/// artifact kinds can be switched to `Unsupported` or to failing with a
/// transport error, and individual node deletes can be made to fail.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Report every call for `kind` as unsupported
    pub fn mark_unsupported(&self, kind: ArtifactKind) {
        self.lock().unsupported.insert(kind);
    }

    /// Fail every call for `kind` with a server error
    pub fn fail_kind(&self, kind: ArtifactKind) {
        self.lock().failing.insert(kind);
    }

    /// Make `delete_node` fail for `id`
    pub fn fail_delete(&self, id: impl Into<String>) {
        self.lock().failing_deletes.insert(id.into());
    }

    // ── Seeding ──

    pub fn insert_journey(&self, journey: Journey) {
        self.lock().journeys.insert(journey.id.clone(), journey);
    }

    pub fn insert_node(&self, node: NodeInstance) {
        self.lock().nodes.insert(node.id.clone(), node);
    }

    pub fn insert_script(&self, script: Script) {
        self.lock().scripts.insert(script.id.clone(), script);
    }

    pub fn insert_email_template(&self, template: EmailTemplate) {
        self.lock()
            .email_templates
            .insert(template.name().to_string(), template);
    }

    pub fn insert_saml2_entity(&self, entity: Saml2Entity) {
        self.lock().saml2_entities.insert(entity.id.clone(), entity);
    }

    pub fn insert_circle_of_trust(&self, circle: CircleOfTrust) {
        self.lock().circles_of_trust.insert(circle.id.clone(), circle);
    }

    pub fn insert_social_provider(&self, provider: SocialIdentityProvider) {
        self.lock()
            .social_providers
            .insert(provider.id.clone(), provider);
    }

    pub fn insert_theme(&self, theme: Theme) {
        self.lock().themes.insert(theme.id.clone(), theme);
    }

    // ── Inspection ──

    pub fn journey(&self, id: &str) -> Option<Journey> {
        self.lock().journeys.get(id).cloned()
    }

    pub fn journey_ids(&self) -> Vec<String> {
        self.lock().journeys.keys().cloned().collect()
    }

    pub fn node(&self, id: &str) -> Option<NodeInstance> {
        self.lock().nodes.get(id).cloned()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.lock().nodes.keys().cloned().collect()
    }

    pub fn scripts(&self) -> Vec<Script> {
        self.lock().scripts.values().cloned().collect()
    }

    /// Every successful write, in order
    pub fn writes(&self) -> Vec<(ArtifactKind, String)> {
        self.lock().writes.clone()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn get_journey(&self, id: &str) -> Result<Journey> {
        self.lock()
            .journeys
            .get(id)
            .cloned()
            .ok_or_else(|| MigrateError::not_found(ArtifactKind::Journey, id))
    }

    async fn put_journey(&self, id: &str, journey: &Journey) -> Result<Journey> {
        let mut state = self.lock();
        let mut stored = journey.clone();
        stored.id = id.to_string();
        state.journeys.insert(id.to_string(), stored.clone());
        state.writes.push((ArtifactKind::Journey, id.to_string()));
        Ok(stored)
    }

    async fn list_all_journeys(&self) -> Result<Vec<Journey>> {
        Ok(self.lock().journeys.values().cloned().collect())
    }

    async fn get_node(&self, id: &str, node_type: &str) -> Result<NodeInstance> {
        self.lock()
            .nodes
            .get(id)
            .filter(|node| node.type_name() == node_type)
            .cloned()
            .ok_or_else(|| MigrateError::not_found(ArtifactKind::Node, id))
    }

    async fn put_node(
        &self,
        id: &str,
        node_type: &str,
        node: &NodeInstance,
    ) -> Result<NodeInstance> {
        let mut state = self.lock();
        let mut stored = node.clone();
        stored.id = id.to_string();
        stored.node_type.id = node_type.to_string();
        state.nodes.insert(id.to_string(), stored.clone());
        state.writes.push((ArtifactKind::Node, id.to_string()));
        Ok(stored)
    }

    async fn delete_node(&self, id: &str, node_type: &str) -> Result<()> {
        let mut state = self.lock();
        if state.failing_deletes.contains(id) {
            return Err(MigrateError::transport(Some(500), format!("cannot delete {}", id)));
        }
        match state.nodes.get(id) {
            Some(node) if node.type_name() == node_type => {
                state.nodes.shift_remove(id);
                Ok(())
            }
            _ => Err(MigrateError::not_found(ArtifactKind::Node, id)),
        }
    }

    async fn list_all_nodes(&self) -> Result<Vec<NodeInstance>> {
        Ok(self.lock().nodes.values().cloned().collect())
    }

    async fn get_script(&self, id: &str) -> Result<Script> {
        let state = self.lock();
        state.ensure_available(ArtifactKind::Script)?;
        state
            .scripts
            .get(id)
            .cloned()
            .ok_or_else(|| MigrateError::not_found(ArtifactKind::Script, id))
    }

    async fn put_script(&self, id: &str, script: &Script) -> Result<Script> {
        let mut state = self.lock();
        state.ensure_available(ArtifactKind::Script)?;
        let taken = state
            .scripts
            .values()
            .any(|existing| existing.id != id && existing.name == script.name);
        if taken {
            return Err(MigrateError::Conflict {
                kind: ArtifactKind::Script,
                id: id.to_string(),
                name: script.name.clone(),
            });
        }
        let mut stored = script.clone();
        stored.id = id.to_string();
        state.scripts.insert(id.to_string(), stored.clone());
        state.writes.push((ArtifactKind::Script, id.to_string()));
        Ok(stored)
    }

    async fn get_email_template(&self, id: &str) -> Result<EmailTemplate> {
        let state = self.lock();
        state.ensure_available(ArtifactKind::EmailTemplate)?;
        state
            .email_templates
            .get(id)
            .cloned()
            .ok_or_else(|| MigrateError::not_found(ArtifactKind::EmailTemplate, id))
    }

    async fn put_email_template(
        &self,
        id: &str,
        long_id: &str,
        template: &EmailTemplate,
    ) -> Result<EmailTemplate> {
        let mut state = self.lock();
        state.ensure_available(ArtifactKind::EmailTemplate)?;
        let mut stored = template.clone();
        stored.id = long_id.to_string();
        state.email_templates.insert(id.to_string(), stored.clone());
        state
            .writes
            .push((ArtifactKind::EmailTemplate, id.to_string()));
        Ok(stored)
    }

    async fn get_saml2_providers(&self) -> Result<Vec<Saml2ProviderStub>> {
        let state = self.lock();
        state.ensure_available(ArtifactKind::Saml2Entity)?;
        Ok(state
            .saml2_entities
            .values()
            .map(|entity| Saml2ProviderStub {
                id: entity.id.clone(),
                entity_id: entity.entity_id.clone(),
                location: entity.location,
            })
            .collect())
    }

    async fn get_saml2_provider(&self, location: EntityLocation, id: &str) -> Result<Saml2Entity> {
        let state = self.lock();
        state.ensure_available(ArtifactKind::Saml2Entity)?;
        state
            .saml2_entities
            .get(id)
            .filter(|entity| entity.location == location)
            .cloned()
            .ok_or_else(|| MigrateError::not_found(ArtifactKind::Saml2Entity, id))
    }

    async fn put_saml2_provider(&self, entity: &Saml2Entity) -> Result<Saml2Entity> {
        let mut state = self.lock();
        state.ensure_available(ArtifactKind::Saml2Entity)?;
        state
            .saml2_entities
            .insert(entity.id.clone(), entity.clone());
        state
            .writes
            .push((ArtifactKind::Saml2Entity, entity.id.clone()));
        Ok(entity.clone())
    }

    async fn get_circles_of_trust(&self) -> Result<Vec<CircleOfTrust>> {
        let state = self.lock();
        state.ensure_available(ArtifactKind::CircleOfTrust)?;
        Ok(state.circles_of_trust.values().cloned().collect())
    }

    async fn put_circle_of_trust(&self, circle: &CircleOfTrust) -> Result<CircleOfTrust> {
        let mut state = self.lock();
        state.ensure_available(ArtifactKind::CircleOfTrust)?;
        state
            .circles_of_trust
            .insert(circle.id.clone(), circle.clone());
        state
            .writes
            .push((ArtifactKind::CircleOfTrust, circle.id.clone()));
        Ok(circle.clone())
    }

    async fn get_social_identity_providers(&self) -> Result<Vec<SocialIdentityProvider>> {
        let state = self.lock();
        state.ensure_available(ArtifactKind::SocialIdentityProvider)?;
        Ok(state.social_providers.values().cloned().collect())
    }

    async fn put_social_identity_provider(
        &self,
        provider: &SocialIdentityProvider,
    ) -> Result<SocialIdentityProvider> {
        let mut state = self.lock();
        state.ensure_available(ArtifactKind::SocialIdentityProvider)?;
        state
            .social_providers
            .insert(provider.id.clone(), provider.clone());
        state
            .writes
            .push((ArtifactKind::SocialIdentityProvider, provider.id.clone()));
        Ok(provider.clone())
    }

    async fn get_themes(&self) -> Result<Vec<Theme>> {
        let state = self.lock();
        state.ensure_available(ArtifactKind::Theme)?;
        Ok(state.themes.values().cloned().collect())
    }

    async fn put_theme(&self, theme: &Theme) -> Result<Theme> {
        let mut state = self.lock();
        state.ensure_available(ArtifactKind::Theme)?;
        state.themes.insert(theme.id.clone(), theme.clone());
        state.writes.push((ArtifactKind::Theme, theme.id.clone()));
        Ok(theme.clone())
    }
}
