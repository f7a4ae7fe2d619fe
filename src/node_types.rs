//! Node type families
//!
//! The collector, sequencer, auditor and classifier all branch on a node's
//! type name. The families are declared once here.

/// Nodes that host an ordered list of child nodes inline
pub const CONTAINER_NODES: &[&str] = &["PageNode", "CustomPageNode"];

/// Nodes whose `script` property names a script
pub const SCRIPTED_NODES: &[&str] = &[
    "ConfigProviderNode",
    "ScriptedDecisionNode",
    "ClientScriptNode",
    "SocialProviderHandlerNode",
    "CustomScriptNode",
];

/// Nodes whose `emailTemplateName` property names a hosted email template
pub const EMAIL_TEMPLATE_NODES: &[&str] = &["EmailSuspendNode", "EmailTemplateNode"];

/// SAML2 integration node (`metaAlias` + `idpEntityId`)
pub const SAML2_NODE: &str = "product-Saml2Node";

/// Select identity provider node (`filteredProviders`)
pub const SELECT_IDP_NODE: &str = "SelectIdPNode";

/// Provider dispatch node, pulls in every social identity provider
pub const SOCIAL_PROVIDER_HANDLER_NODE: &str = "SocialProviderHandlerNode";

/// Sub-flow invocation node (`tree` names another journey)
pub const INNER_TREE_EVALUATOR_NODE: &str = "InnerTreeEvaluatorNode";

pub fn is_container(node_type: &str) -> bool {
    CONTAINER_NODES.contains(&node_type)
}

pub fn is_scripted(node_type: &str) -> bool {
    SCRIPTED_NODES.contains(&node_type)
}

pub fn is_email_template(node_type: &str) -> bool {
    EMAIL_TEMPLATE_NODES.contains(&node_type)
}

pub fn is_saml2(node_type: &str) -> bool {
    node_type == SAML2_NODE
}

pub fn is_select_idp(node_type: &str) -> bool {
    node_type == SELECT_IDP_NODE
}

pub fn is_provider_dispatch(node_type: &str) -> bool {
    node_type == SOCIAL_PROVIDER_HANDLER_NODE
}

pub fn is_subflow(node_type: &str) -> bool {
    node_type == INNER_TREE_EVALUATOR_NODE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_handler_is_also_scripted() {
        assert!(is_provider_dispatch("SocialProviderHandlerNode"));
        assert!(is_scripted("SocialProviderHandlerNode"));
        assert!(!is_container("SocialProviderHandlerNode"));
    }
}
