//! Stock node catalog and custom-node classification
//!
//! Each platform release line declares the node types it ships and the
//! release it extends. Supporting a new release is one more entry in
//! [`RELEASES`].

use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::Journey;
use crate::node_types;
use crate::store::ArtifactStore;
use crate::version::PlatformVersion;

/// One platform release line
pub struct Release {
    pub name: &'static str,
    /// Exact version strings reported by servers of this line
    pub versions: &'static [&'static str],
    /// Release whose node types are inherited
    pub extends: Option<&'static str>,
    /// Node types added by this release
    pub node_types: &'static [&'static str],
}

const NODE_TYPES_6_0: &[&str] = &[
    "AbstractSocialAuthLoginNode",
    "AccountLockoutNode",
    "AgentDataStoreDecisionNode",
    "AnonymousUserNode",
    "AuthLevelDecisionNode",
    "ChoiceCollectorNode",
    "CookiePresenceDecisionNode",
    "CreatePasswordNode",
    "DataStoreDecisionNode",
    "InnerTreeEvaluatorNode",
    "LdapDecisionNode",
    "MessageNode",
    "MetadataNode",
    "MeterNode",
    "ModifyAuthLevelNode",
    "OneTimePasswordCollectorDecisionNode",
    "OneTimePasswordGeneratorNode",
    "OneTimePasswordSmsSenderNode",
    "OneTimePasswordSmtpSenderNode",
    "PageNode",
    "PasswordCollectorNode",
    "PersistentCookieDecisionNode",
    "PollingWaitNode",
    "ProvisionDynamicAccountNode",
    "ProvisionIdmAccountNode",
    "PushAuthenticationSenderNode",
    "PushResultVerifierNode",
    "RecoveryCodeCollectorDecisionNode",
    "RecoveryCodeDisplayNode",
    "RegisterLogoutWebhookNode",
    "RemoveSessionPropertiesNode",
    "RetryLimitDecisionNode",
    "ScriptedDecisionNode",
    "SessionDataNode",
    "SetFailureUrlNode",
    "SetPersistentCookieNode",
    "SetSessionPropertiesNode",
    "SetSuccessUrlNode",
    "SocialFacebookNode",
    "SocialGoogleNode",
    "SocialNode",
    "SocialOAuthIgnoreProfileNode",
    "SocialOpenIdConnectNode",
    "TimerStartNode",
    "TimerStopNode",
    "UsernameCollectorNode",
    "WebAuthnAuthenticationNode",
    "WebAuthnRegistrationNode",
    "ZeroPageLoginNode",
];

// 7.0 does not ship AbstractSocialAuthLoginNode, so it starts a new line.
const NODE_TYPES_7_0: &[&str] = &[
    "AcceptTermsAndConditionsNode",
    "AccountActiveDecisionNode",
    "AccountLockoutNode",
    "AgentDataStoreDecisionNode",
    "AnonymousSessionUpgradeNode",
    "AnonymousUserNode",
    "AttributeCollectorNode",
    "AttributePresentDecisionNode",
    "AttributeValueDecisionNode",
    "AuthLevelDecisionNode",
    "ChoiceCollectorNode",
    "ConsentNode",
    "CookiePresenceDecisionNode",
    "CreateObjectNode",
    "CreatePasswordNode",
    "DataStoreDecisionNode",
    "DeviceGeoFencingNode",
    "DeviceLocationMatchNode",
    "DeviceMatchNode",
    "DeviceProfileCollectorNode",
    "DeviceSaveNode",
    "DeviceTamperingVerificationNode",
    "DisplayUserNameNode",
    "EmailSuspendNode",
    "EmailTemplateNode",
    "IdentifyExistingUserNode",
    "IncrementLoginCountNode",
    "InnerTreeEvaluatorNode",
    "IotAuthenticationNode",
    "IotRegistrationNode",
    "KbaCreateNode",
    "KbaDecisionNode",
    "KbaVerifyNode",
    "LdapDecisionNode",
    "LoginCountDecisionNode",
    "MessageNode",
    "MetadataNode",
    "MeterNode",
    "ModifyAuthLevelNode",
    "OneTimePasswordCollectorDecisionNode",
    "OneTimePasswordGeneratorNode",
    "OneTimePasswordSmsSenderNode",
    "OneTimePasswordSmtpSenderNode",
    "PageNode",
    "PasswordCollectorNode",
    "PatchObjectNode",
    "PersistentCookieDecisionNode",
    "PollingWaitNode",
    "ProfileCompletenessDecisionNode",
    "ProvisionDynamicAccountNode",
    "ProvisionIdmAccountNode",
    "PushAuthenticationSenderNode",
    "PushResultVerifierNode",
    "QueryFilterDecisionNode",
    "RecoveryCodeCollectorDecisionNode",
    "RecoveryCodeDisplayNode",
    "RegisterLogoutWebhookNode",
    "RemoveSessionPropertiesNode",
    "RequiredAttributesDecisionNode",
    "RetryLimitDecisionNode",
    "ScriptedDecisionNode",
    "SelectIdPNode",
    "SessionDataNode",
    "SetFailureUrlNode",
    "SetPersistentCookieNode",
    "SetSessionPropertiesNode",
    "SetSuccessUrlNode",
    "SocialFacebookNode",
    "SocialGoogleNode",
    "SocialNode",
    "SocialOAuthIgnoreProfileNode",
    "SocialOpenIdConnectNode",
    "SocialProviderHandlerNode",
    "TermsAndConditionsDecisionNode",
    "TimeSinceDecisionNode",
    "TimerStartNode",
    "TimerStopNode",
    "UsernameCollectorNode",
    "ValidatedPasswordNode",
    "ValidatedUsernameNode",
    "WebAuthnAuthenticationNode",
    "WebAuthnDeviceStorageNode",
    "WebAuthnRegistrationNode",
    "ZeroPageLoginNode",
    "product-CertificateCollectorNode",
    "product-CertificateUserExtractorNode",
    "product-CertificateValidationNode",
    "product-KerberosNode",
    "product-ReCaptchaNode",
    "product-Saml2Node",
    "product-WriteFederationInformationNode",
];

/// Known release lines, oldest first
pub const RELEASES: &[Release] = &[
    Release {
        name: "6.0",
        versions: &[
            "6.0.0", "6.0.0.1", "6.0.0.2", "6.0.0.3", "6.0.0.4", "6.0.0.5", "6.0.0.6", "6.0.0.7",
        ],
        extends: None,
        node_types: NODE_TYPES_6_0,
    },
    Release {
        name: "6.5",
        versions: &[
            "6.5.0.1", "6.5.0.2", "6.5.1", "6.5.2", "6.5.2.1", "6.5.2.2", "6.5.2.3", "6.5.3",
        ],
        extends: Some("6.0"),
        node_types: &[],
    },
    Release {
        name: "7.0",
        versions: &["7.0.0", "7.0.1", "7.0.2"],
        extends: None,
        node_types: NODE_TYPES_7_0,
    },
    Release {
        name: "7.1",
        versions: &["7.1.0"],
        extends: Some("7.0"),
        node_types: &[
            "PushRegistrationNode",
            "GetAuthenticatorAppNode",
            "MultiFactorRegistrationOptionsNode",
            "OptOutMultiFactorAuthenticationNode",
        ],
    },
    Release {
        name: "7.2",
        versions: &["7.2.0"],
        extends: Some("7.1"),
        node_types: &[
            "OathRegistrationNode",
            "OathTokenVerifierNode",
            "PassthroughAuthenticationNode",
            "ConfigProviderNode",
            "DebugNode",
        ],
    },
];

// =============================================================================
// Catalog
// =============================================================================

/// Stock node types per platform version
#[derive(Debug, Clone, Default)]
pub struct NodeCatalog {
    /// Release name -> resolved node type set
    releases: HashMap<String, HashSet<String>>,
    /// Version string -> release name
    versions: HashMap<String, String>,
}

impl NodeCatalog {
    /// Catalog of every release in [`RELEASES`]
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        for release in RELEASES {
            catalog.add_release(
                release.name,
                release.versions,
                release.extends,
                release.node_types,
            );
        }
        catalog
    }

    /// Register a release line; `extends` must already be registered
    pub fn add_release(
        &mut self,
        name: &str,
        versions: &[&str],
        extends: Option<&str>,
        node_types: &[&str],
    ) {
        let mut types: HashSet<String> = match extends.and_then(|base| self.releases.get(base)) {
            Some(base) => base.clone(),
            None => {
                if let Some(base) = extends {
                    warn!("Release {} extends unknown release {}", name, base);
                }
                HashSet::new()
            }
        };
        types.extend(node_types.iter().map(|t| t.to_string()));
        self.releases.insert(name.to_string(), types);
        for version in versions {
            self.versions.insert(version.to_string(), name.to_string());
        }
    }

    /// Stock node types of `version`, or `None` for an unknown version
    pub fn stock_types(&self, version: &str) -> Option<&HashSet<String>> {
        let key = match PlatformVersion::parse(version) {
            Ok(parsed) => parsed.release,
            Err(_) => version.to_string(),
        };
        self.versions
            .get(&key)
            .and_then(|release| self.releases.get(release))
    }

    pub fn is_known(&self, version: &str) -> bool {
        self.stock_types(version).is_some()
    }
}

// =============================================================================
// Classifier
// =============================================================================

/// Flags journeys that use node types outside the stock catalog
pub struct CustomNodeClassifier<'a, S: ArtifactStore + ?Sized> {
    store: &'a S,
    catalog: &'a NodeCatalog,
}

impl<'a, S: ArtifactStore + ?Sized> CustomNodeClassifier<'a, S> {
    pub fn new(store: &'a S, catalog: &'a NodeCatalog) -> Self {
        Self { store, catalog }
    }

    /// Whether `journey` contains a custom node on `platform_version`.
    ///
    /// An unknown version counts as custom.
    pub async fn is_custom(&self, journey: &Journey, platform_version: &str) -> Result<bool> {
        let Some(stock) = self.catalog.stock_types(platform_version) else {
            debug!("Unknown platform version {}, treating {} as custom", platform_version, journey.id);
            return Ok(true);
        };

        for (id, node_ref) in &journey.node_refs {
            if !stock.contains(&node_ref.node_type) {
                debug!("{}: node {} has custom type {}", journey.id, id, node_ref.node_type);
                return Ok(true);
            }
        }

        let containers = try_join_all(
            journey
                .node_refs
                .iter()
                .filter(|(_, node_ref)| node_types::is_container(&node_ref.node_type))
                .map(|(id, node_ref)| self.store.get_node(id, &node_ref.node_type)),
        )
        .await
        .map_err(|e| e.in_collection(&journey.id))?;

        for container in &containers {
            if let Some(child) = container
                .children()
                .iter()
                .find(|child| !stock.contains(&child.node_type))
            {
                debug!(
                    "{}: child {} of {} has custom type {}",
                    journey.id, child.id, container.id, child.node_type
                );
                return Ok(true);
            }
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChildRef, NodeInstance, NodeRef};
    use crate::store::MemoryStore;

    #[test]
    fn test_later_releases_are_supersets() {
        let catalog = NodeCatalog::builtin();
        let v70 = catalog.stock_types("7.0.1").unwrap();
        let v71 = catalog.stock_types("7.1.0").unwrap();
        let v72 = catalog.stock_types("7.2.0").unwrap();
        assert!(v70.is_subset(v71));
        assert!(v71.is_subset(v72));
        assert!(v72.contains("DebugNode"));
        assert!(!v71.contains("DebugNode"));
        assert_eq!(
            catalog.stock_types("6.5.2.3"),
            catalog.stock_types("6.0.0.7")
        );
    }

    #[test]
    fn test_version_qualifier_is_ignored() {
        let catalog = NodeCatalog::builtin();
        assert!(catalog.is_known("7.2.0-2022-6-SNAPSHOT"));
        assert!(!catalog.is_known("7.3.0"));
    }

    #[tokio::test]
    async fn test_unknown_version_is_custom() {
        let store = MemoryStore::new();
        let catalog = NodeCatalog::builtin();
        let journey = Journey::new("Login", "n1")
            .with_node("n1", NodeRef::new("UsernameCollectorNode"));
        let classifier = CustomNodeClassifier::new(&store, &catalog);
        assert!(classifier.is_custom(&journey, "9.9.9").await.unwrap());
        assert!(!classifier.is_custom(&journey, "7.2.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_custom_child_in_container() {
        let store = MemoryStore::new();
        store.insert_node(NodeInstance::new("n3", "PageNode").with_children(vec![
            ChildRef::new("p1", "UsernameCollectorNode"),
            ChildRef::new("p2", "AcmeFingerprintNode"),
        ]));
        let catalog = NodeCatalog::builtin();
        let journey = Journey::new("Login", "n3").with_node("n3", NodeRef::new("PageNode"));

        let classifier = CustomNodeClassifier::new(&store, &catalog);
        assert!(classifier.is_custom(&journey, "7.1.0").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_specific_type() {
        let store = MemoryStore::new();
        let catalog = NodeCatalog::builtin();
        let journey = Journey::new("Mfa", "n1").with_node("n1", NodeRef::new("DebugNode"));

        let classifier = CustomNodeClassifier::new(&store, &catalog);
        assert!(classifier.is_custom(&journey, "7.1.0").await.unwrap());
        assert!(!classifier.is_custom(&journey, "7.2.0").await.unwrap());
    }
}
