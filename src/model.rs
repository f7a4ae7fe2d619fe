//! Journey, node and artifact types
//!
//! Every type keeps the fields the migrator reasons about as typed members
//! and carries the rest of the server representation through `extra`, so a
//! fetched object can be written back without losing configuration.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::node_types;

/// Revision field stripped before objects are written to a target
const REVISION_FIELD: &str = "_rev";

// =============================================================================
// Journey
// =============================================================================

/// Reference from a journey to one of its top-level nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    #[serde(rename = "nodeType")]
    pub node_type: String,
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Outcome name -> target node id
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub connections: IndexMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeRef {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            display_name: None,
            connections: IndexMap::new(),
            extra: Map::new(),
        }
    }

    pub fn connect(mut self, outcome: impl Into<String>, target: impl Into<String>) -> Self {
        self.connections.insert(outcome.into(), target.into());
        self
    }
}

/// A journey (authentication tree)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "entryNodeId", default)]
    pub entry_node_id: String,
    /// Node id -> reference, in server order
    #[serde(rename = "nodes", default)]
    pub node_refs: IndexMap<String, NodeRef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Journey {
    pub fn new(id: impl Into<String>, entry_node_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entry_node_id: entry_node_id.into(),
            node_refs: IndexMap::new(),
            extra: Map::new(),
        }
    }

    pub fn with_node(mut self, id: impl Into<String>, node_ref: NodeRef) -> Self {
        self.node_refs.insert(id.into(), node_ref);
        self
    }

    pub fn identity_resource(&self) -> Option<&str> {
        self.extra.get("identityResource").and_then(Value::as_str)
    }

    pub fn set_identity_resource(&mut self, resource: impl Into<String>) {
        self.extra
            .insert("identityResource".to_string(), Value::String(resource.into()));
    }

    pub fn strip_revision(&mut self) {
        self.extra.remove(REVISION_FIELD);
    }

    /// Ids of top-level container nodes
    pub fn container_node_ids(&self) -> impl Iterator<Item = (&String, &NodeRef)> {
        self.node_refs
            .iter()
            .filter(|(_, node)| node_types::is_container(&node.node_type))
    }
}

// =============================================================================
// Node instances
// =============================================================================

/// The `_type` envelope of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeType {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Child entry of a container node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRef {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "nodeType")]
    pub node_type: String,
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChildRef {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            display_name: None,
            extra: Map::new(),
        }
    }
}

/// A configured node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInstance {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_type")]
    pub node_type: NodeType,
    /// Present only on container nodes
    #[serde(rename = "nodes", default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ChildRef>>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl NodeInstance {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType {
                id: node_type.into(),
                extra: Map::new(),
            },
            children: None,
            payload: Map::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<ChildRef>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.node_type.id
    }

    pub fn is_container(&self) -> bool {
        node_types::is_container(self.type_name())
    }

    pub fn children(&self) -> &[ChildRef] {
        self.children.as_deref().unwrap_or_default()
    }

    /// A string-valued payload property
    pub fn str_property(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// A string-list payload property; non-string items are skipped
    pub fn string_list(&self, key: &str) -> Vec<String> {
        self.payload
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn identity_resource(&self) -> Option<&str> {
        self.str_property("identityResource")
    }

    pub fn set_identity_resource(&mut self, resource: impl Into<String>) {
        self.payload
            .insert("identityResource".to_string(), Value::String(resource.into()));
    }

    /// Sub-flow named by an inner tree evaluator node
    pub fn subflow(&self) -> Option<&str> {
        if node_types::is_subflow(self.type_name()) {
            self.str_property("tree")
        } else {
            None
        }
    }

    /// Theme declared by a container's `stage`, either `{"themeId": ..}` or `themeId=<id>`
    pub fn stage_theme(&self) -> Option<String> {
        let stage = self.str_property("stage")?;
        if let Ok(Value::Object(parsed)) = serde_json::from_str::<Value>(stage) {
            if let Some(theme) = parsed.get("themeId").and_then(Value::as_str) {
                if !theme.is_empty() {
                    return Some(theme.to_string());
                }
            }
        }
        stage
            .strip_prefix("themeId=")
            .filter(|theme| !theme.is_empty())
            .map(String::from)
    }

    pub fn strip_revision(&mut self) {
        self.payload.remove(REVISION_FIELD);
    }
}

// =============================================================================
// Artifacts
// =============================================================================

/// A script; the body is kept as lines so bundle files diff cleanly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "script", default, deserialize_with = "deserialize_lines")]
    pub body: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Script {
    pub fn new(id: impl Into<String>, name: impl Into<String>, text: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            body: text_to_lines(text),
            extra: Map::new(),
        }
    }

    pub fn text(&self) -> String {
        self.body.join("\n")
    }

    pub fn strip_revision(&mut self) {
        self.extra.remove(REVISION_FIELD);
    }
}

/// A hosted email template; `id` is the long form `emailTemplate/<name>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTemplate {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl EmailTemplate {
    pub const ID_PREFIX: &'static str = "emailTemplate/";

    pub fn new(name: &str) -> Self {
        Self {
            id: Self::long_id(name),
            display_name: None,
            body: Map::new(),
        }
    }

    pub fn long_id(name: &str) -> String {
        format!("{}{}", Self::ID_PREFIX, name)
    }

    /// Short name used as the bundle key
    pub fn name(&self) -> &str {
        self.id.strip_prefix(Self::ID_PREFIX).unwrap_or(&self.id)
    }
}

/// Where a SAML2 entity is hosted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityLocation {
    Hosted,
    Remote,
}

impl EntityLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityLocation::Hosted => "hosted",
            EntityLocation::Remote => "remote",
        }
    }
}

/// Summary row from the SAML2 provider listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Saml2ProviderStub {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "entityId")]
    pub entity_id: String,
    pub location: EntityLocation,
}

/// A SAML2 entity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Saml2Entity {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "entityId")]
    pub entity_id: String,
    #[serde(rename = "entityLocation")]
    pub location: EntityLocation,
    /// Metadata XML of a remote entity, as lines
    #[serde(
        rename = "metadataXml",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata_xml: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Saml2Entity {
    pub fn strip_revision(&mut self) {
        self.extra.remove(REVISION_FIELD);
    }
}

/// A SAML2 circle of trust
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleOfTrust {
    #[serde(rename = "_id")]
    pub id: String,
    /// Members as `<entityId>|saml2`
    #[serde(rename = "trustedProviders", default)]
    pub trusted_providers: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CircleOfTrust {
    pub fn member_key(entity_id: &str) -> String {
        format!("{}|saml2", entity_id)
    }

    pub fn includes_entity(&self, entity_id: &str) -> bool {
        let key = Self::member_key(entity_id);
        self.trusted_providers.iter().any(|member| *member == key)
    }

    pub fn strip_revision(&mut self) {
        self.extra.remove(REVISION_FIELD);
    }
}

/// An OAuth2/OIDC (social) identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialIdentityProvider {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<NodeType>,
    /// Transform script id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SocialIdentityProvider {
    pub fn type_name(&self) -> Option<&str> {
        self.provider_type.as_ref().map(|t| t.id.as_str())
    }
}

/// A hosted UI theme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "linkedTrees", default, skip_serializing_if = "Vec::is_empty")]
    pub linked_trees: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Journey bundle
// =============================================================================

/// One journey with its full dependency closure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyBundle {
    #[serde(default, alias = "innernodes")]
    pub inner_nodes: BTreeMap<String, NodeInstance>,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeInstance>,
    #[serde(default)]
    pub scripts: BTreeMap<String, Script>,
    #[serde(default)]
    pub email_templates: BTreeMap<String, EmailTemplate>,
    #[serde(default)]
    pub social_identity_providers: BTreeMap<String, SocialIdentityProvider>,
    #[serde(default)]
    pub themes: Vec<Theme>,
    #[serde(default)]
    pub saml2_entities: BTreeMap<String, Saml2Entity>,
    #[serde(default)]
    pub circles_of_trust: BTreeMap<String, CircleOfTrust>,
    pub tree: Journey,
}

impl JourneyBundle {
    pub fn new(tree: Journey) -> Self {
        Self {
            inner_nodes: BTreeMap::new(),
            nodes: BTreeMap::new(),
            scripts: BTreeMap::new(),
            email_templates: BTreeMap::new(),
            social_identity_providers: BTreeMap::new(),
            themes: Vec::new(),
            saml2_entities: BTreeMap::new(),
            circles_of_trust: BTreeMap::new(),
            tree,
        }
    }

    pub fn id(&self) -> &str {
        &self.tree.id
    }

    /// Journeys this one invokes as sub-flows, in node order, deduplicated
    pub fn subflow_dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        for node in self.nodes.values() {
            if let Some(tree) = node.subflow() {
                if !deps.iter().any(|d| d == tree) {
                    deps.push(tree.to_string());
                }
            }
        }
        deps
    }
}

// =============================================================================
// Script text helpers
// =============================================================================

/// Split script text into lines, expanding tabs to four spaces
pub fn text_to_lines(text: &str) -> Vec<String> {
    text.replace('\t', "    ")
        .split('\n')
        .map(String::from)
        .collect()
}

/// Accept a line list, or a legacy single-string body
fn deserialize_lines<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Body {
        Lines(Vec<String>),
        Text(String),
    }

    Ok(match Body::deserialize(deserializer)? {
        Body::Lines(lines) => lines,
        Body::Text(text) => text_to_lines(&text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_journey_keeps_unknown_fields() {
        let raw = json!({
            "_id": "Login",
            "_rev": "12",
            "entryNodeId": "n1",
            "identityResource": "managed/alpha_user",
            "nodes": {
                "n1": { "nodeType": "UsernameCollectorNode", "displayName": "User", "connections": { "outcome": "n2" }, "x": 10, "y": 20 }
            },
            "staticNodes": { "startNode": { "x": 0, "y": 0 } }
        });
        let mut journey: Journey = serde_json::from_value(raw).unwrap();
        assert_eq!(journey.node_refs["n1"].connections["outcome"], "n2");
        assert_eq!(journey.identity_resource(), Some("managed/alpha_user"));
        assert!(journey.extra.contains_key("staticNodes"));

        journey.strip_revision();
        let back = serde_json::to_value(&journey).unwrap();
        assert!(back.get("_rev").is_none());
        assert_eq!(back["nodes"]["n1"]["x"], 10);
    }

    #[test]
    fn test_node_children_only_on_containers() {
        let page: NodeInstance = serde_json::from_value(json!({
            "_id": "n3",
            "_type": { "_id": "PageNode", "name": "Page Node" },
            "nodes": [ { "_id": "p1", "nodeType": "UsernameCollectorNode", "displayName": "User" } ],
            "stage": "{\"themeId\":\"Starter Theme\"}"
        }))
        .unwrap();
        assert!(page.is_container());
        assert_eq!(page.children()[0].id, "p1");
        assert_eq!(page.stage_theme().as_deref(), Some("Starter Theme"));

        let leaf = NodeInstance::new("n1", "UsernameCollectorNode");
        let value = serde_json::to_value(&leaf).unwrap();
        assert!(value.get("nodes").is_none());
    }

    #[test]
    fn test_legacy_stage_theme() {
        let page = NodeInstance::new("n3", "PageNode")
            .with_property("stage", json!("themeId=a1b2"));
        assert_eq!(page.stage_theme().as_deref(), Some("a1b2"));

        let plain = NodeInstance::new("n4", "PageNode").with_property("stage", json!("login"));
        assert_eq!(plain.stage_theme(), None);
    }

    #[test]
    fn test_script_accepts_legacy_text_body() {
        let script: Script = serde_json::from_value(json!({
            "_id": "s1",
            "name": "Login Script",
            "script": "var a = 1;\n\tvar b = 2;"
        }))
        .unwrap();
        assert_eq!(script.body, vec!["var a = 1;", "    var b = 2;"]);

        let value = serde_json::to_value(&script).unwrap();
        assert!(value["script"].is_array());
    }

    #[test]
    fn test_email_template_name() {
        let template = EmailTemplate::new("welcome");
        assert_eq!(template.id, "emailTemplate/welcome");
        assert_eq!(template.name(), "welcome");
    }

    #[test]
    fn test_bundle_subflow_dependencies() {
        let mut bundle = JourneyBundle::new(Journey::new("A", "n1"));
        for (id, tree) in [("n1", "B"), ("n2", "C"), ("n3", "B")] {
            bundle.nodes.insert(
                id.to_string(),
                NodeInstance::new(id, "InnerTreeEvaluatorNode").with_property("tree", json!(tree)),
            );
        }
        bundle
            .nodes
            .insert("n4".into(), NodeInstance::new("n4", "UsernameCollectorNode"));
        assert_eq!(bundle.subflow_dependencies(), vec!["B", "C"]);
    }
}
