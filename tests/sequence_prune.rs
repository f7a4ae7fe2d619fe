//! Sequencing, import-all and orphan pruning

use indexmap::IndexMap;
use journey_migrator::bundle::{self, Bundle, BundleMeta};
use journey_migrator::config::{ConnectionConfig, OutputFormat};
use journey_migrator::model::{ChildRef, Journey, JourneyBundle, NodeInstance, NodeRef};
use journey_migrator::{
    sequence, ImportOptions, Importer, MemoryStore, MigrateError, OrphanAuditor,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Journey whose single node invokes `subflow`, or a plain message node
fn journey(id: &str, subflow: Option<&str>) -> JourneyBundle {
    let node_id = format!("{}-entry", id);
    let (node_type, node) = match subflow {
        Some(tree) => (
            "InnerTreeEvaluatorNode",
            NodeInstance::new(&node_id, "InnerTreeEvaluatorNode").with_property("tree", json!(tree)),
        ),
        None => ("MessageNode", NodeInstance::new(&node_id, "MessageNode")),
    };
    let mut bundle =
        JourneyBundle::new(Journey::new(id, &node_id).with_node(&node_id, NodeRef::new(node_type)));
    bundle.nodes.insert(node_id, node);
    bundle
}

fn requested(journeys: Vec<JourneyBundle>) -> IndexMap<String, JourneyBundle> {
    journeys
        .into_iter()
        .map(|j| (j.id().to_string(), j))
        .collect()
}

fn meta() -> BundleMeta {
    BundleMeta::new("https://dev.example.com/am", "alpha", "admin")
}

fn connection() -> ConnectionConfig {
    ConnectionConfig {
        tenant: "https://prod.example.com/am".into(),
        ..ConnectionConfig::default()
    }
}

#[test]
fn test_cycle_terminates_unresolved() {
    let plan = sequence(
        &requested(vec![journey("A", Some("B")), journey("B", Some("A"))]),
        &HashSet::new(),
    );
    assert!(plan.order.is_empty());
    assert_eq!(
        plan.unresolved_ids(),
        BTreeSet::from(["A".to_string(), "B".to_string()])
    );
    assert_eq!(plan.cycles(), vec![vec!["A".to_string(), "B".to_string()]]);
}

#[test]
fn test_chain_resolves_dependency_first() {
    let plan = sequence(
        &requested(vec![journey("A", Some("B")), journey("B", None)]),
        &HashSet::new(),
    );
    assert_eq!(plan.order, vec!["B", "A"]);
    assert!(plan.is_complete());
}

#[test]
fn test_missing_dependency_is_reported() {
    let plan = sequence(
        &requested(vec![journey("A", Some("Gone")), journey("B", None)]),
        &HashSet::new(),
    );
    assert_eq!(plan.order, vec!["B"]);
    assert_eq!(plan.missing, BTreeSet::from(["Gone".to_string()]));
    assert!(plan.cycles().is_empty());
}

#[tokio::test]
async fn test_import_all_follows_dependency_order() {
    let store = MemoryStore::new();
    let connection = connection();
    let bundle = Bundle::multiple(
        meta(),
        requested(vec![
            journey("Outer", Some("Middle")),
            journey("Middle", Some("Inner")),
            journey("Inner", None),
        ]),
    );

    let summary = Importer::new(&store, &connection, ImportOptions::default())
        .import_all(&bundle)
        .await
        .unwrap();

    assert!(summary.is_success());
    assert_eq!(summary.imported, vec!["Inner", "Middle", "Outer"]);
    assert_eq!(store.journey_ids(), vec!["Inner", "Middle", "Outer"]);
}

#[tokio::test]
async fn test_import_all_skips_unresolved() {
    let store = MemoryStore::new();
    let connection = connection();
    let bundle = Bundle::multiple(
        meta(),
        requested(vec![
            journey("A", Some("B")),
            journey("B", Some("A")),
            journey("Plain", None),
        ]),
    );

    let summary = Importer::new(&store, &connection, ImportOptions::default())
        .import_all(&bundle)
        .await
        .unwrap();

    assert_eq!(summary.imported, vec!["Plain"]);
    assert_eq!(
        summary.unresolved,
        BTreeMap::from([
            ("A".to_string(), vec!["B".to_string()]),
            ("B".to_string(), vec!["A".to_string()]),
        ])
    );
    assert!(!summary.is_success());
    assert_eq!(store.journey_ids(), vec!["Plain"]);
}

#[tokio::test]
async fn test_import_all_uses_present_journeys() {
    let store = MemoryStore::new();
    store.insert_journey(Journey::new("Shared", "x"));
    let connection = connection();
    let bundle = Bundle::multiple(meta(), requested(vec![journey("Uses", Some("Shared"))]));

    let summary = Importer::new(&store, &connection, ImportOptions::default())
        .import_all(&bundle)
        .await
        .unwrap();
    assert_eq!(summary.imported, vec!["Uses"]);
}

#[tokio::test]
async fn test_import_all_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    for journey in [journey("Outer", Some("Inner")), journey("Inner", None)] {
        let path = dir
            .path()
            .join(journey_migrator::naming::journey_file_name(journey.id()));
        bundle::write_file(&path, &Bundle::single(meta(), journey), OutputFormat::Compact).unwrap();
    }
    std::fs::write(dir.path().join("notes.txt"), "not a bundle").unwrap();

    let store = MemoryStore::new();
    let connection = connection();
    let summary = Importer::new(&store, &connection, ImportOptions::default())
        .import_all_from_dir(dir.path())
        .await
        .unwrap();
    assert_eq!(summary.imported, vec!["Inner", "Outer"]);
}

#[tokio::test]
async fn test_import_all_rejects_broken_bundle_before_writing() {
    let mut broken = JourneyBundle::new(
        Journey::new("Bad", "b1").with_node("b1", NodeRef::new("PageNode")),
    );
    broken.nodes.insert(
        "b1".into(),
        NodeInstance::new("b1", "PageNode")
            .with_children(vec![ChildRef::new("missing", "PasswordCollectorNode")]),
    );

    let store = MemoryStore::new();
    let connection = connection();
    let bundle = Bundle::multiple(meta(), requested(vec![journey("Good", None), broken]));

    let err = Importer::new(&store, &connection, ImportOptions::default())
        .import_all(&bundle)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::Validation(_)));
    assert!(store.writes().is_empty());
    assert!(store.journey_ids().is_empty());
}

#[tokio::test]
async fn test_orphans_exclude_inner_nodes_of_active_containers() {
    let store = MemoryStore::new();
    store.insert_journey(
        Journey::new("Login", "a")
            .with_node("a", NodeRef::new("UsernameCollectorNode"))
            .with_node("b", NodeRef::new("PageNode")),
    );
    store.insert_node(NodeInstance::new("a", "UsernameCollectorNode"));
    store.insert_node(
        NodeInstance::new("b", "PageNode")
            .with_children(vec![ChildRef::new("c", "PasswordCollectorNode")]),
    );
    store.insert_node(NodeInstance::new("c", "PasswordCollectorNode"));
    store.insert_node(NodeInstance::new("d", "MessageNode"));

    let auditor = OrphanAuditor::new(&store);
    let report = auditor.find_orphans().await.unwrap();
    let orphaned: Vec<&str> = report.orphaned.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(orphaned, vec!["d"]);

    let declined = auditor.prune(&report.orphaned, false).await;
    assert_eq!(declined.deleted, 0);
    assert_eq!(store.node_ids().len(), 4);

    let result = auditor.prune(&report.orphaned, true).await;
    assert_eq!(result.deleted, 1);
    assert_eq!(store.node_ids(), vec!["a", "b", "c"]);
}
