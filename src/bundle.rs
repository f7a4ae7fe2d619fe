//! Bundle file codec
//!
//! A bundle file holds a `meta` envelope and either one journey with its
//! dependencies (`tree` plus artifact maps) or several of them under
//! `trees`. Script bodies are line lists so files diff cleanly.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::OutputFormat;
use crate::error::{MigrateError, Result};
use crate::fingerprint::OriginFingerprint;
use crate::model::JourneyBundle;
use crate::node_types;

/// Name written to `meta.exportTool`
pub const EXPORT_TOOL: &str = "journey-migrator";

/// Export envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMeta {
    /// Tenant URL of the source environment
    #[serde(default)]
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_fingerprint: Option<OriginFingerprint>,
    #[serde(default)]
    pub exported_by: String,
    pub export_date: DateTime<Utc>,
    #[serde(default)]
    pub export_tool: String,
    #[serde(default)]
    pub export_tool_version: String,
}

impl BundleMeta {
    /// Envelope for an export from `tenant`/`realm` made now
    pub fn new(tenant: &str, realm: &str, exported_by: &str) -> Self {
        Self {
            origin: tenant.to_string(),
            origin_fingerprint: Some(OriginFingerprint::new(tenant, realm)),
            exported_by: exported_by.to_string(),
            export_date: Utc::now(),
            export_tool: EXPORT_TOOL.to_string(),
            export_tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Journeys carried by a bundle file
#[derive(Debug, Clone, PartialEq)]
pub enum BundleContent {
    Single(JourneyBundle),
    /// Journey id -> bundle, in export order
    Multiple(IndexMap<String, JourneyBundle>),
}

/// A parsed bundle file
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub meta: BundleMeta,
    pub content: BundleContent,
}

#[derive(Serialize)]
struct SingleFile<'a> {
    meta: &'a BundleMeta,
    #[serde(flatten)]
    journey: &'a JourneyBundle,
}

#[derive(Serialize)]
struct MultipleFile<'a> {
    meta: &'a BundleMeta,
    trees: &'a IndexMap<String, JourneyBundle>,
}

impl Serialize for Bundle {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.content {
            BundleContent::Single(journey) => SingleFile {
                meta: &self.meta,
                journey,
            }
            .serialize(serializer),
            BundleContent::Multiple(trees) => MultipleFile {
                meta: &self.meta,
                trees,
            }
            .serialize(serializer),
        }
    }
}

impl Bundle {
    pub fn single(meta: BundleMeta, journey: JourneyBundle) -> Self {
        Self {
            meta,
            content: BundleContent::Single(journey),
        }
    }

    pub fn multiple(meta: BundleMeta, trees: IndexMap<String, JourneyBundle>) -> Self {
        Self {
            meta,
            content: BundleContent::Multiple(trees),
        }
    }

    /// Journey ids in file order
    pub fn journey_ids(&self) -> Vec<&str> {
        match &self.content {
            BundleContent::Single(journey) => vec![journey.id()],
            BundleContent::Multiple(trees) => trees.keys().map(String::as_str).collect(),
        }
    }

    /// Find one journey by id
    pub fn journey(&self, id: &str) -> Option<&JourneyBundle> {
        match &self.content {
            BundleContent::Single(journey) => (journey.id() == id).then_some(journey),
            BundleContent::Multiple(trees) => trees.get(id),
        }
    }

    /// Every journey keyed by id, in file order
    pub fn into_journeys(self) -> IndexMap<String, JourneyBundle> {
        match self.content {
            BundleContent::Single(journey) => {
                let mut map = IndexMap::new();
                map.insert(journey.id().to_string(), journey);
                map
            }
            BundleContent::Multiple(trees) => trees,
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a bundle as JSON
pub fn serialize(bundle: &Bundle, format: OutputFormat) -> Result<Vec<u8>> {
    let bytes = match format {
        OutputFormat::Pretty => serde_json::to_vec_pretty(bundle)?,
        OutputFormat::Compact => serde_json::to_vec(bundle)?,
    };
    Ok(bytes)
}

/// Decode a bundle file; a missing or malformed `meta` is a validation error
pub fn deserialize(bytes: &[u8]) -> Result<Bundle> {
    let value: Value = serde_json::from_slice(bytes)?;
    let Value::Object(mut object) = value else {
        return Err(MigrateError::Validation(
            "bundle is not a JSON object".to_string(),
        ));
    };

    let meta = object
        .remove("meta")
        .ok_or_else(|| MigrateError::Validation("missing meta envelope".to_string()))?;
    let meta: BundleMeta = serde_json::from_value(meta)
        .map_err(|e| MigrateError::Validation(format!("invalid meta envelope: {}", e)))?;

    let content = if let Some(trees) = object.remove("trees") {
        BundleContent::Multiple(serde_json::from_value(trees)?)
    } else if object.contains_key("tree") {
        BundleContent::Single(serde_json::from_value(Value::Object(object))?)
    } else {
        return Err(MigrateError::Validation(
            "bundle has neither 'tree' nor 'trees'".to_string(),
        ));
    };

    debug!(
        "Decoded bundle exported by {} {} on {}",
        meta.export_tool, meta.export_tool_version, meta.export_date
    );
    Ok(Bundle { meta, content })
}

/// Write a bundle file
pub fn write_file(path: &Path, bundle: &Bundle, format: OutputFormat) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serialize(bundle, format)?)?;
    Ok(())
}

/// Read a bundle file
pub fn read_file(path: &Path) -> Result<Bundle> {
    let bytes = std::fs::read(path)?;
    deserialize(&bytes)
}

// =============================================================================
// Integrity
// =============================================================================

/// Check a journey bundle's internal references.
///
/// Unresolved node or child references fail with `Validation`. Unresolved
/// artifact references are returned as warnings, since the source may not
/// support the artifact kind or the export may have skipped dependencies.
pub fn check_integrity(bundle: &JourneyBundle) -> Result<Vec<String>> {
    let journey = &bundle.tree;
    let mut errors = Vec::new();

    for (id, node_ref) in &journey.node_refs {
        match bundle.nodes.get(id) {
            None => errors.push(format!("node {} ({}) is not in the bundle", id, node_ref.node_type)),
            Some(node) if node.type_name() != node_ref.node_type => errors.push(format!(
                "node {} is {} in the journey but {} in the bundle",
                id,
                node_ref.node_type,
                node.type_name()
            )),
            Some(_) => {}
        }
    }

    for node in bundle.nodes.values() {
        for child in node.children() {
            if !bundle.inner_nodes.contains_key(&child.id) {
                errors.push(format!(
                    "child {} of container {} is not in the bundle",
                    child.id, node.id
                ));
            }
        }
    }

    if !errors.is_empty() {
        return Err(MigrateError::Validation(format!(
            "journey {}: {}",
            journey.id,
            errors.join("; ")
        )));
    }

    let mut warnings = Vec::new();
    for node in bundle.nodes.values().chain(bundle.inner_nodes.values()) {
        let node_type = node.type_name();
        if node_types::is_scripted(node_type) {
            if let Some(script) = node.str_property("script") {
                if !bundle.scripts.contains_key(script) {
                    warnings.push(format!("script {} used by node {} is not in the bundle", script, node.id));
                }
            }
        }
        if node_types::is_email_template(node_type) {
            if let Some(template) = node.str_property("emailTemplateName") {
                if !bundle.email_templates.contains_key(template) {
                    warnings.push(format!(
                        "email template {} used by node {} is not in the bundle",
                        template, node.id
                    ));
                }
            }
        }
    }
    for provider in bundle.social_identity_providers.values() {
        if let Some(transform) = &provider.transform {
            if !bundle.scripts.contains_key(transform) {
                warnings.push(format!(
                    "transform script {} of provider {} is not in the bundle",
                    transform, provider.id
                ));
            }
        }
    }

    for warning in &warnings {
        warn!("{}: {}", journey.id, warning);
    }
    Ok(warnings)
}
