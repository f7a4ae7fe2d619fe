//! Export and import against in-memory realms

use journey_migrator::bundle::{self, Bundle};
use journey_migrator::config::{ConnectionConfig, OutputFormat};
use journey_migrator::model::{
    ChildRef, CircleOfTrust, EmailTemplate, EntityLocation, Journey, NodeInstance, NodeRef,
    NodeType, Saml2Entity, Script, SocialIdentityProvider, Theme,
};
use journey_migrator::{
    ArtifactKind, Exporter, ImportOptions, Importer, MemoryStore, MigrateError, Remapper,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Map};
use std::collections::BTreeSet;

fn connection(tenant: &str) -> ConnectionConfig {
    ConnectionConfig {
        tenant: tenant.to_string(),
        username: Some("admin".into()),
        ..ConnectionConfig::default()
    }
}

fn preserving() -> ImportOptions {
    ImportOptions {
        re_uuid: false,
        ..ImportOptions::default()
    }
}

/// Login journey: n1 and n2 collectors, n3 a page holding p1
fn login_realm() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_journey(
        Journey::new("Login", "n1")
            .with_node("n1", NodeRef::new("UsernameCollectorNode").connect("outcome", "n2"))
            .with_node("n2", NodeRef::new("PasswordCollectorNode").connect("outcome", "n3"))
            .with_node("n3", NodeRef::new("PageNode")),
    );
    store.insert_node(NodeInstance::new("n1", "UsernameCollectorNode"));
    store.insert_node(NodeInstance::new("n2", "PasswordCollectorNode"));
    store.insert_node(
        NodeInstance::new("n3", "PageNode")
            .with_children(vec![ChildRef::new("p1", "ScriptedDecisionNode")]),
    );
    store.insert_node(
        NodeInstance::new("p1", "ScriptedDecisionNode").with_property("script", json!("s1")),
    );
    store.insert_script(Script::new("s1", "Login Script", "outcome = 'true';"));
    store
}

/// A journey that touches every artifact category
fn full_realm() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_journey(
        Journey::new("Federated", "page")
            .with_node("page", NodeRef::new("PageNode"))
            .with_node("email", NodeRef::new("EmailSuspendNode"))
            .with_node("saml", NodeRef::new("product-Saml2Node"))
            .with_node("select", NodeRef::new("SelectIdPNode"))
            .with_node("social", NodeRef::new("SocialProviderHandlerNode")),
    );
    store.insert_node(
        NodeInstance::new("page", "PageNode")
            .with_children(vec![ChildRef::new("decide", "ScriptedDecisionNode")])
            .with_property("stage", json!("themeId=theme-1")),
    );
    store.insert_node(
        NodeInstance::new("decide", "ScriptedDecisionNode").with_property("script", json!("s-decide")),
    );
    store.insert_node(
        NodeInstance::new("email", "EmailSuspendNode")
            .with_property("emailTemplateName", json!("welcome")),
    );
    store.insert_node(
        NodeInstance::new("saml", "product-Saml2Node")
            .with_property("metaAlias", json!("/alpha/sp-entity"))
            .with_property("idpEntityId", json!("idp-entity")),
    );
    store.insert_node(
        NodeInstance::new("select", "SelectIdPNode")
            .with_property("filteredProviders", json!(["google"])),
    );
    store.insert_node(
        NodeInstance::new("social", "SocialProviderHandlerNode")
            .with_property("script", json!("s-handler")),
    );

    store.insert_script(Script::new("s-decide", "Decide", "outcome = 'true';"));
    store.insert_script(Script::new("s-handler", "Handle", "outcome = 'true';"));
    store.insert_script(Script::new("s-transform", "Normalize", "return profile;"));
    store.insert_email_template(EmailTemplate::new("welcome"));
    store.insert_theme(Theme {
        id: "theme-1".into(),
        name: "Starter".into(),
        linked_trees: vec![],
        extra: Map::new(),
    });
    for (id, provider_type) in [("google", "googleConfig"), ("github", "githubConfig")] {
        store.insert_social_provider(SocialIdentityProvider {
            id: id.into(),
            provider_type: Some(NodeType {
                id: provider_type.into(),
                extra: Map::new(),
            }),
            transform: Some("s-transform".into()),
            extra: Map::new(),
        });
    }
    store.insert_saml2_entity(Saml2Entity {
        id: "sp-entity".into(),
        entity_id: "sp-entity".into(),
        location: EntityLocation::Hosted,
        metadata_xml: None,
        extra: Map::new(),
    });
    store.insert_saml2_entity(Saml2Entity {
        id: "idp".into(),
        entity_id: "idp-entity".into(),
        location: EntityLocation::Remote,
        metadata_xml: Some(vec!["<EntityDescriptor/>".into()]),
        extra: Map::new(),
    });
    store.insert_circle_of_trust(CircleOfTrust {
        id: "cot".into(),
        trusted_providers: vec![CircleOfTrust::member_key("idp-entity")],
        extra: Map::new(),
    });
    store
}

fn ids<'a>(keys: impl Iterator<Item = &'a String>) -> BTreeSet<&'a str> {
    keys.map(String::as_str).collect()
}

#[tokio::test]
async fn test_round_trip_preserves_identifiers() {
    let store = login_realm();
    let connection = connection("https://dev.example.com/am");
    let exporter = Exporter::new(&store, &connection, true);
    let exported = exporter.export_journey("Login").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Login.journey.json");
    bundle::write_file(&path, &exported, OutputFormat::Pretty).unwrap();
    let read_back = bundle::read_file(&path).unwrap();

    Importer::new(&store, &connection, preserving())
        .import_journey(&read_back, "Login")
        .await
        .unwrap();

    let reexported = exporter.export_journey("Login").await.unwrap();
    let journey = reexported.journey("Login").unwrap();
    assert_eq!(
        ids(journey.nodes.keys()),
        BTreeSet::from(["n1", "n2", "n3"])
    );
    assert_eq!(ids(journey.inner_nodes.keys()), BTreeSet::from(["p1"]));
    assert_eq!(journey, exported.journey("Login").unwrap());
}

#[tokio::test]
async fn test_remapped_bundle_keeps_no_source_ids() {
    let store = MemoryStore::new();
    store.insert_journey(
        Journey::new("Login", "orig-user")
            .with_node("orig-user", NodeRef::new("UsernameCollectorNode").connect("outcome", "orig-page"))
            .with_node("orig-page", NodeRef::new("PageNode").connect("outcome", "orig-user")),
    );
    store.insert_node(NodeInstance::new("orig-user", "UsernameCollectorNode"));
    store.insert_node(
        NodeInstance::new("orig-page", "PageNode")
            .with_children(vec![ChildRef::new("orig-inner", "PasswordCollectorNode")]),
    );
    store.insert_node(NodeInstance::new("orig-inner", "PasswordCollectorNode"));

    let connection = connection("https://dev.example.com/am");
    let exported = Exporter::new(&store, &connection, true)
        .export_journey("Login")
        .await
        .unwrap();
    let source = exported.journey("Login").unwrap();
    let remapped = Remapper::new().remap(source, "Login Copy", false);

    let rendered = serde_json::to_string(&(&remapped.tree, &remapped.nodes, &remapped.inner_nodes))
        .unwrap();
    for old in ["orig-user", "orig-page", "orig-inner"] {
        assert!(!rendered.contains(old), "{} survived remapping", old);
    }
    for node in remapped.nodes.values() {
        for child in node.children() {
            assert!(remapped.inner_nodes.contains_key(&child.id));
        }
    }
    assert!(remapped.nodes.contains_key(&remapped.tree.entry_node_id));
    assert_eq!(remapped.tree.id, "Login Copy");
}

#[tokio::test]
async fn test_clone_into_other_realm_rewrites_every_reference() {
    let source = login_realm();
    let target = MemoryStore::new();
    let exported = Exporter::new(&source, &connection("https://dev.example.com/am"), true)
        .export_journey("Login")
        .await
        .unwrap();

    let target_connection = connection("https://prod.example.com/am");
    Importer::new(&target, &target_connection, ImportOptions::default())
        .import_journey(&exported, "Login")
        .await
        .unwrap();

    let journey = target.journey("Login").unwrap();
    assert_eq!(journey.node_refs.len(), 3);
    assert!(!journey.node_refs.contains_key("n1"));
    assert!(journey.node_refs.contains_key(&journey.entry_node_id));
    for node_ref in journey.node_refs.values() {
        for next in node_ref.connections.values() {
            assert!(journey.node_refs.contains_key(next));
        }
    }
    assert_eq!(target.node_ids().len(), 4);
}

#[tokio::test]
async fn test_conflicting_script_names_are_numbered() {
    let target = MemoryStore::new();
    target.insert_script(Script::new("existing", "Login Script", ""));
    let connection = connection("https://prod.example.com/am");
    let importer = Importer::new(&target, &connection, preserving());

    for (journey_id, script_id) in [("First", "s1"), ("Second", "s2")] {
        let node_id = format!("{}-decide", journey_id);
        let mut journey = journey_migrator::JourneyBundle::new(
            Journey::new(journey_id, &node_id)
                .with_node(&node_id, NodeRef::new("ScriptedDecisionNode")),
        );
        journey.nodes.insert(
            node_id.clone(),
            NodeInstance::new(&node_id, "ScriptedDecisionNode")
                .with_property("script", json!(script_id)),
        );
        journey
            .scripts
            .insert(script_id.into(), Script::new(script_id, "Login Script", ""));
        let bundle = Bundle::single(
            journey_migrator::BundleMeta::new("https://dev.example.com/am", "alpha", "admin"),
            journey,
        );
        importer.import_journey(&bundle, journey_id).await.unwrap();
    }

    let names: BTreeSet<String> = target.scripts().into_iter().map(|s| s.name).collect();
    assert_eq!(
        names,
        BTreeSet::from([
            "Login Script".to_string(),
            "Login Script - imported (1)".to_string(),
            "Login Script - imported (2)".to_string(),
        ])
    );
}

#[tokio::test]
async fn test_export_is_deterministic_apart_from_date() {
    let store = full_realm();
    let connection = connection("https://dev.example.com/am");
    let exporter = Exporter::new(&store, &connection, true);

    let first = exporter.export_journey("Federated").await.unwrap();
    let mut second = exporter.export_journey("Federated").await.unwrap();
    second.meta.export_date = first.meta.export_date;

    assert_eq!(
        bundle::serialize(&first, OutputFormat::Pretty).unwrap(),
        bundle::serialize(&second, OutputFormat::Pretty).unwrap()
    );
}

#[tokio::test]
async fn test_full_closure_is_collected() {
    let store = full_realm();
    let connection = connection("https://dev.example.com/am");
    let exported = Exporter::new(&store, &connection, true)
        .export_journey("Federated")
        .await
        .unwrap();
    let journey = exported.journey("Federated").unwrap();

    assert_eq!(ids(journey.inner_nodes.keys()), BTreeSet::from(["decide"]));
    assert_eq!(
        ids(journey.scripts.keys()),
        BTreeSet::from(["s-decide", "s-handler", "s-transform"])
    );
    assert_eq!(ids(journey.email_templates.keys()), BTreeSet::from(["welcome"]));
    assert_eq!(
        ids(journey.social_identity_providers.keys()),
        BTreeSet::from(["google"])
    );
    assert_eq!(
        ids(journey.saml2_entities.keys()),
        BTreeSet::from(["idp", "sp-entity"])
    );
    assert_eq!(ids(journey.circles_of_trust.keys()), BTreeSet::from(["cot"]));
    assert_eq!(journey.themes.len(), 1);
    assert_eq!(
        journey.saml2_entities["idp"].metadata_xml,
        Some(vec!["<EntityDescriptor/>".to_string()])
    );
}

#[tokio::test]
async fn test_import_writes_categories_in_order() {
    let source = full_realm();
    let exported = Exporter::new(&source, &connection("https://dev.example.com/am"), true)
        .export_journey("Federated")
        .await
        .unwrap();

    let target = MemoryStore::new();
    let connection = connection("https://prod.example.com/am");
    Importer::new(&target, &connection, preserving())
        .import_journey(&exported, "Federated")
        .await
        .unwrap();

    let writes = target.writes();
    let mut kinds: Vec<ArtifactKind> = writes.iter().map(|(kind, _)| *kind).collect();
    kinds.dedup();
    assert_eq!(
        kinds,
        vec![
            ArtifactKind::Script,
            ArtifactKind::EmailTemplate,
            ArtifactKind::Theme,
            ArtifactKind::SocialIdentityProvider,
            ArtifactKind::Saml2Entity,
            ArtifactKind::CircleOfTrust,
            ArtifactKind::Node,
            ArtifactKind::Journey,
        ]
    );

    // the inner node goes first among nodes
    let first_node = writes
        .iter()
        .find(|(kind, _)| *kind == ArtifactKind::Node)
        .map(|(_, id)| id.as_str());
    assert_eq!(first_node, Some("decide"));
}

#[tokio::test]
async fn test_without_dependencies_only_nodes_are_written() {
    let source = full_realm();
    let exported = Exporter::new(&source, &connection("https://dev.example.com/am"), false)
        .export_journey("Federated")
        .await
        .unwrap();
    assert!(exported.journey("Federated").unwrap().scripts.is_empty());

    let target = MemoryStore::new();
    let connection = connection("https://prod.example.com/am");
    let options = ImportOptions {
        include_dependencies: false,
        ..preserving()
    };
    Importer::new(&target, &connection, options)
        .import_journey(&exported, "Federated")
        .await
        .unwrap();

    assert!(target
        .writes()
        .iter()
        .all(|(kind, _)| matches!(kind, ArtifactKind::Node | ArtifactKind::Journey)));
}

#[tokio::test]
async fn test_file_without_meta_is_rejected() {
    let err = bundle::deserialize(br#"{"tree": {"_id": "Login", "entryNodeId": "n1", "nodes": {}}}"#)
        .unwrap_err();
    assert!(matches!(err, MigrateError::Validation(_)));
}
