//! Human-readable journey summaries

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::model::JourneyBundle;

/// Summary of one exported journey
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JourneyDescription {
    pub name: String,
    /// Node type -> count, over nodes and inner nodes
    pub node_types: BTreeMap<String, usize>,
    /// Script name -> description
    pub scripts: BTreeMap<String, String>,
    /// Template name -> display name
    pub email_templates: BTreeMap<String, String>,
}

pub fn describe(bundle: &JourneyBundle) -> JourneyDescription {
    let mut node_types = BTreeMap::new();
    for node in bundle.nodes.values().chain(bundle.inner_nodes.values()) {
        *node_types.entry(node.type_name().to_string()).or_insert(0) += 1;
    }

    JourneyDescription {
        name: bundle.id().to_string(),
        node_types,
        scripts: bundle
            .scripts
            .values()
            .map(|s| (s.name.clone(), s.description.clone().unwrap_or_default()))
            .collect(),
        email_templates: bundle
            .email_templates
            .iter()
            .map(|(name, t)| (name.clone(), t.display_name.clone().unwrap_or_default()))
            .collect(),
    }
}

impl fmt::Display for JourneyDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Journey: {}", self.name)?;
        writeln!(f, "Nodes:")?;
        for (node_type, count) in &self.node_types {
            writeln!(f, "  {}: {}", node_type, count)?;
        }
        if !self.scripts.is_empty() {
            writeln!(f, "Scripts:")?;
            for (name, description) in &self.scripts {
                if description.is_empty() {
                    writeln!(f, "  {}", name)?;
                } else {
                    writeln!(f, "  {}: {}", name, description)?;
                }
            }
        }
        if !self.email_templates.is_empty() {
            writeln!(f, "Email templates:")?;
            for (name, display_name) in &self.email_templates {
                writeln!(f, "  {} ({})", name, display_name)?;
            }
        }
        Ok(())
    }
}
