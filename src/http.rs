//! HTTP artifact store
//!
//! Talks to the access manager REST API under
//! `{tenant}/json/realms/root/realms/<realm>` and, for email templates and
//! themes, to the IDM config API under `{host}/openidm`.

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{ConnectionConfig, Deployment};
use crate::error::{ArtifactKind, MigrateError, Result};
use crate::model::{
    text_to_lines, CircleOfTrust, EmailTemplate, EntityLocation, Journey, NodeInstance,
    Saml2Entity, Saml2ProviderStub, Script, SocialIdentityProvider, Theme,
};
use crate::store::ArtifactStore;

const SCRIPT_API_VERSION: &str = "protocol=2.0,resource=1.0";
const DEFAULT_API_VERSION: &str = "protocol=2.1,resource=1.0";

const TREES_PATH: &str = "realm-config/authentication/authenticationtrees/trees";
const NODES_PATH: &str = "realm-config/authentication/authenticationtrees/nodes";
const SAML2_PATH: &str = "realm-config/saml2";
const CIRCLES_PATH: &str = "realm-config/federation/circlesoftrust";
const SOCIAL_PATH: &str = "realm-config/services/SocialIdentityProviders";
const THEMES_PATH: &str = "config/ui/themerealm";

#[derive(Debug, Deserialize)]
struct QueryResult<T> {
    result: Vec<T>,
}

/// [`ArtifactStore`] over the platform REST APIs
pub struct HttpArtifactStore {
    client: Client,
    tenant: String,
    realm: String,
    deployment: Deployment,
    cookie: Option<String>,
}

impl HttpArtifactStore {
    pub fn new(connection: &ConnectionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(connection.timeout_secs))
            .build()
            .map_err(|e| {
                MigrateError::transport(None, format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            tenant: connection.tenant.trim_end_matches('/').to_string(),
            realm: connection.realm_name().to_string(),
            deployment: connection.deployment,
            cookie: connection
                .session_token
                .as_ref()
                .map(|token| format!("{}={}", connection.cookie_name, token)),
        })
    }

    /// Platform version reported by the server, e.g. `7.2.0`
    pub async fn server_version(&self) -> Result<String> {
        let url = format!("{}/json/serverinfo/version", self.tenant);
        let info: Value = self
            .send(
                ArtifactKind::Bundle,
                "serverinfo",
                self.request(Method::GET, &url, DEFAULT_API_VERSION),
            )
            .await?;
        info.get("version")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| MigrateError::transport(None, "Server info carries no version"))
    }

    // =========================================================================
    // URLs
    // =========================================================================

    /// `/alpha` for top-level realms, `/parent/child` for nested ones
    fn realm_path(&self) -> String {
        if self.realm == "/" {
            "/".to_string()
        } else {
            format!("/{}", self.realm)
        }
    }

    fn realm_url(&self, path: &str) -> String {
        let mut url = format!("{}/json/realms/root", self.tenant);
        for segment in self.realm.split('/').filter(|s| !s.is_empty() && *s != "root") {
            url.push_str("/realms/");
            url.push_str(segment);
        }
        format!("{}/{}", url, path)
    }

    fn idm_url(&self, path: &str) -> String {
        let host = self.tenant.strip_suffix("/am").unwrap_or(&self.tenant);
        format!("{}/openidm/{}", host, path)
    }

    // =========================================================================
    // Requests
    // =========================================================================

    fn request(&self, method: Method, url: &str, api_version: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .header("Accept-API-Version", api_version);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(reqwest::header::COOKIE, cookie);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(
        &self,
        kind: ArtifactKind,
        id: &str,
        builder: RequestBuilder,
    ) -> Result<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| MigrateError::transport(None, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(kind, id, status, body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| MigrateError::transport(Some(status.as_u16()), e.to_string()))
    }

    async fn send_text(&self, kind: ArtifactKind, id: &str, builder: RequestBuilder) -> Result<String> {
        let response = builder
            .send()
            .await
            .map_err(|e| MigrateError::transport(None, e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MigrateError::transport(Some(status.as_u16()), e.to_string()))?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(status_error(kind, id, status, body))
        }
    }

    async fn theme_config(&self) -> Result<Value> {
        if !self.deployment.supports_themes() {
            return Err(MigrateError::unsupported(
                ArtifactKind::Theme,
                "themes require IDM",
            ));
        }
        let url = self.idm_url(THEMES_PATH);
        self.send(
            ArtifactKind::Theme,
            THEMES_PATH,
            self.request(Method::GET, &url, DEFAULT_API_VERSION),
        )
        .await
    }

    async fn remote_metadata(&self, entity_id: &str) -> Result<Vec<String>> {
        let url = format!("{}/saml2/jsp/exportmetadata.jsp", self.tenant);
        let realm = self.realm_path();
        let builder = self
            .request(Method::GET, &url, DEFAULT_API_VERSION)
            .query(&[("entityid", entity_id), ("realm", realm.as_str())]);
        let xml = self
            .send_text(ArtifactKind::Saml2Entity, entity_id, builder)
            .await?;
        Ok(text_to_lines(&xml))
    }
}

/// Map a failed response onto a typed error
fn status_error(kind: ArtifactKind, id: &str, status: StatusCode, body: String) -> MigrateError {
    match status {
        StatusCode::NOT_FOUND => MigrateError::not_found(kind, id),
        StatusCode::CONFLICT => MigrateError::Conflict {
            kind,
            id: id.to_string(),
            name: id.to_string(),
        },
        StatusCode::NOT_IMPLEMENTED => MigrateError::unsupported(kind, body),
        _ if body.to_lowercase().contains("not supported") => MigrateError::unsupported(kind, body),
        _ => MigrateError::transport(Some(status.as_u16()), body),
    }
}

/// Script as served: the body is one base64 string
fn decode_script(mut raw: Value) -> Result<Script> {
    let encoded = raw.get("script").and_then(Value::as_str).map(String::from);
    if let (Some(encoded), Some(fields)) = (encoded, raw.as_object_mut()) {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| MigrateError::Validation(format!("script body is not base64: {}", e)))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        fields.insert("script".to_string(), json!(text_to_lines(&text)));
    }
    Ok(serde_json::from_value(raw)?)
}

/// Tag a SAML2 entity payload with where it is hosted
fn with_location(mut raw: Value, location: EntityLocation) -> Value {
    if let Some(fields) = raw.as_object_mut() {
        fields.insert("entityLocation".to_string(), json!(location));
    }
    raw
}

fn encode_script(script: &Script) -> Result<Value> {
    let mut raw = serde_json::to_value(script)?;
    raw["script"] = json!(STANDARD.encode(script.text()));
    Ok(raw)
}

#[async_trait]
impl ArtifactStore for HttpArtifactStore {
    // ── Journeys ──

    async fn get_journey(&self, id: &str) -> Result<Journey> {
        let url = self.realm_url(&format!("{}/{}", TREES_PATH, id));
        self.send(
            ArtifactKind::Journey,
            id,
            self.request(Method::GET, &url, DEFAULT_API_VERSION),
        )
        .await
    }

    async fn put_journey(&self, id: &str, journey: &Journey) -> Result<Journey> {
        let url = self.realm_url(&format!("{}/{}", TREES_PATH, id));
        self.send(
            ArtifactKind::Journey,
            id,
            self.request(Method::PUT, &url, DEFAULT_API_VERSION).json(journey),
        )
        .await
    }

    async fn list_all_journeys(&self) -> Result<Vec<Journey>> {
        let url = self.realm_url(&format!("{}?_queryFilter=true", TREES_PATH));
        let result: QueryResult<Journey> = self
            .send(
                ArtifactKind::Journey,
                "*",
                self.request(Method::GET, &url, DEFAULT_API_VERSION),
            )
            .await?;
        Ok(result.result)
    }

    // ── Nodes ──

    async fn get_node(&self, id: &str, node_type: &str) -> Result<NodeInstance> {
        let url = self.realm_url(&format!("{}/{}/{}", NODES_PATH, node_type, id));
        self.send(
            ArtifactKind::Node,
            id,
            self.request(Method::GET, &url, DEFAULT_API_VERSION),
        )
        .await
    }

    async fn put_node(&self, id: &str, node_type: &str, node: &NodeInstance) -> Result<NodeInstance> {
        let url = self.realm_url(&format!("{}/{}/{}", NODES_PATH, node_type, id));
        self.send(
            ArtifactKind::Node,
            id,
            self.request(Method::PUT, &url, DEFAULT_API_VERSION).json(node),
        )
        .await
    }

    async fn delete_node(&self, id: &str, node_type: &str) -> Result<()> {
        let url = self.realm_url(&format!("{}/{}/{}", NODES_PATH, node_type, id));
        let _: Value = self
            .send(
                ArtifactKind::Node,
                id,
                self.request(Method::DELETE, &url, DEFAULT_API_VERSION),
            )
            .await?;
        Ok(())
    }

    async fn list_all_nodes(&self) -> Result<Vec<NodeInstance>> {
        let url = self.realm_url(&format!("{}?_action=nextdescendents", NODES_PATH));
        let result: QueryResult<NodeInstance> = self
            .send(
                ArtifactKind::Node,
                "*",
                self.request(Method::POST, &url, DEFAULT_API_VERSION),
            )
            .await?;
        Ok(result.result)
    }

    // ── Scripts ──

    async fn get_script(&self, id: &str) -> Result<Script> {
        let url = self.realm_url(&format!("scripts/{}", id));
        let raw: Value = self
            .send(
                ArtifactKind::Script,
                id,
                self.request(Method::GET, &url, SCRIPT_API_VERSION),
            )
            .await?;
        decode_script(raw)
    }

    async fn put_script(&self, id: &str, script: &Script) -> Result<Script> {
        let url = self.realm_url(&format!("scripts/{}", id));
        let body = encode_script(script)?;
        let result = self
            .send::<Value>(
                ArtifactKind::Script,
                id,
                self.request(Method::PUT, &url, SCRIPT_API_VERSION).json(&body),
            )
            .await;
        match result {
            Ok(raw) => decode_script(raw),
            Err(MigrateError::Conflict { kind, id, .. }) => Err(MigrateError::Conflict {
                kind,
                id,
                name: script.name.clone(),
            }),
            Err(e) => Err(e),
        }
    }

    // ── Email templates ──

    async fn get_email_template(&self, id: &str) -> Result<EmailTemplate> {
        if !self.deployment.supports_email_templates() {
            return Err(MigrateError::unsupported(
                ArtifactKind::EmailTemplate,
                "email templates require IDM",
            ));
        }
        let url = self.idm_url(&format!("config/{}", EmailTemplate::long_id(id)));
        self.send(
            ArtifactKind::EmailTemplate,
            id,
            self.request(Method::GET, &url, DEFAULT_API_VERSION),
        )
        .await
    }

    async fn put_email_template(
        &self,
        id: &str,
        long_id: &str,
        template: &EmailTemplate,
    ) -> Result<EmailTemplate> {
        if !self.deployment.supports_email_templates() {
            return Err(MigrateError::unsupported(
                ArtifactKind::EmailTemplate,
                "email templates require IDM",
            ));
        }
        let url = self.idm_url(&format!("config/{}", long_id));
        self.send(
            ArtifactKind::EmailTemplate,
            id,
            self.request(Method::PUT, &url, DEFAULT_API_VERSION).json(template),
        )
        .await
    }

    // ── SAML2 ──

    async fn get_saml2_providers(&self) -> Result<Vec<Saml2ProviderStub>> {
        let url = self.realm_url(&format!("{}?_queryFilter=true", SAML2_PATH));
        let result: QueryResult<Saml2ProviderStub> = self
            .send(
                ArtifactKind::Saml2Entity,
                "*",
                self.request(Method::GET, &url, DEFAULT_API_VERSION),
            )
            .await?;
        Ok(result.result)
    }

    async fn get_saml2_provider(&self, location: EntityLocation, id: &str) -> Result<Saml2Entity> {
        let url = self.realm_url(&format!("{}/{}/{}", SAML2_PATH, location.as_str(), id));
        let raw: Value = self
            .send(
                ArtifactKind::Saml2Entity,
                id,
                self.request(Method::GET, &url, DEFAULT_API_VERSION),
            )
            .await?;
        let mut entity: Saml2Entity = serde_json::from_value(with_location(raw, location))?;

        if location == EntityLocation::Remote {
            entity.metadata_xml = Some(self.remote_metadata(&entity.entity_id).await?);
        }
        Ok(entity)
    }

    async fn put_saml2_provider(&self, entity: &Saml2Entity) -> Result<Saml2Entity> {
        if let (EntityLocation::Remote, Some(lines)) = (entity.location, &entity.metadata_xml) {
            let url = self.realm_url(&format!("{}/remote?_action=importEntity", SAML2_PATH));
            let body = json!({ "standardMetadata": URL_SAFE_NO_PAD.encode(lines.join("\n")) });
            let created = self
                .send::<Value>(
                    ArtifactKind::Saml2Entity,
                    &entity.id,
                    self.request(Method::POST, &url, DEFAULT_API_VERSION).json(&body),
                )
                .await;
            match created {
                Ok(_) => return Ok(entity.clone()),
                Err(e) if e.is_conflict() => {
                    debug!("SAML2 entity {} exists, updating", entity.entity_id);
                }
                Err(e) => return Err(e),
            }
        }

        let url = self.realm_url(&format!(
            "{}/{}/{}",
            SAML2_PATH,
            entity.location.as_str(),
            entity.id
        ));
        let mut body = serde_json::to_value(entity)?;
        if let Some(fields) = body.as_object_mut() {
            fields.remove("metadataXml");
            fields.remove("entityLocation");
        }
        let raw: Value = self
            .send(
                ArtifactKind::Saml2Entity,
                &entity.id,
                self.request(Method::PUT, &url, DEFAULT_API_VERSION).json(&body),
            )
            .await?;
        let mut stored: Saml2Entity = serde_json::from_value(with_location(raw, entity.location))?;
        stored.metadata_xml = entity.metadata_xml.clone();
        Ok(stored)
    }

    async fn get_circles_of_trust(&self) -> Result<Vec<CircleOfTrust>> {
        let url = self.realm_url(&format!("{}?_queryFilter=true", CIRCLES_PATH));
        let result: QueryResult<CircleOfTrust> = self
            .send(
                ArtifactKind::CircleOfTrust,
                "*",
                self.request(Method::GET, &url, DEFAULT_API_VERSION),
            )
            .await?;
        Ok(result.result)
    }

    async fn put_circle_of_trust(&self, circle: &CircleOfTrust) -> Result<CircleOfTrust> {
        let url = self.realm_url(&format!("{}?_action=create", CIRCLES_PATH));
        let created = self
            .send(
                ArtifactKind::CircleOfTrust,
                &circle.id,
                self.request(Method::POST, &url, DEFAULT_API_VERSION).json(circle),
            )
            .await;
        match created {
            Ok(stored) => Ok(stored),
            // An existing circle answers 409, or 500 on older releases
            Err(e) if e.is_conflict() || matches!(e, MigrateError::Transport { status: Some(500), .. }) => {
                debug!("Circle of trust {} exists, updating", circle.id);
                let url = self.realm_url(&format!("{}/{}", CIRCLES_PATH, circle.id));
                self.send(
                    ArtifactKind::CircleOfTrust,
                    &circle.id,
                    self.request(Method::PUT, &url, DEFAULT_API_VERSION).json(circle),
                )
                .await
            }
            Err(e) => Err(e),
        }
    }

    // ── Social identity providers ──

    async fn get_social_identity_providers(&self) -> Result<Vec<SocialIdentityProvider>> {
        let url = self.realm_url(&format!("{}?_action=nextdescendents", SOCIAL_PATH));
        let result: QueryResult<SocialIdentityProvider> = self
            .send(
                ArtifactKind::SocialIdentityProvider,
                "*",
                self.request(Method::POST, &url, DEFAULT_API_VERSION),
            )
            .await?;
        Ok(result.result)
    }

    async fn put_social_identity_provider(
        &self,
        provider: &SocialIdentityProvider,
    ) -> Result<SocialIdentityProvider> {
        let provider_type = provider.type_name().ok_or_else(|| {
            MigrateError::Validation(format!(
                "social identity provider {} has no _type",
                provider.id
            ))
        })?;
        let url = self.realm_url(&format!("{}/{}/{}", SOCIAL_PATH, provider_type, provider.id));
        self.send(
            ArtifactKind::SocialIdentityProvider,
            &provider.id,
            self.request(Method::PUT, &url, DEFAULT_API_VERSION).json(provider),
        )
        .await
    }

    // ── Themes ──

    async fn get_themes(&self) -> Result<Vec<Theme>> {
        let config = self.theme_config().await?;
        let themes = config
            .get("realm")
            .and_then(|realms| realms.get(&self.realm))
            .cloned()
            .unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(themes)?)
    }

    async fn put_theme(&self, theme: &Theme) -> Result<Theme> {
        let mut config = self.theme_config().await?;

        let mut stored = serde_json::to_value(theme)?;
        stored["isDefault"] = json!(false);

        let realms = config
            .as_object_mut()
            .ok_or_else(|| MigrateError::transport(None, "theme config is not an object"))?
            .entry("realm")
            .or_insert_with(|| json!({}));
        let list = realms
            .as_object_mut()
            .ok_or_else(|| MigrateError::transport(None, "theme realms are not an object"))?
            .entry(self.realm.clone())
            .or_insert_with(|| json!([]));
        let themes = list
            .as_array_mut()
            .ok_or_else(|| MigrateError::transport(None, "realm themes are not a list"))?;

        match themes
            .iter_mut()
            .find(|existing| existing.get("_id").and_then(Value::as_str) == Some(theme.id.as_str()))
        {
            Some(existing) => *existing = stored.clone(),
            None => {
                warn!("Adding theme {} to realm {}", theme.name, self.realm);
                themes.push(stored.clone());
            }
        }

        let url = self.idm_url(THEMES_PATH);
        let _: Value = self
            .send(
                ArtifactKind::Theme,
                &theme.id,
                self.request(Method::PUT, &url, DEFAULT_API_VERSION).json(&config),
            )
            .await?;
        Ok(serde_json::from_value(stored)?)
    }
}
