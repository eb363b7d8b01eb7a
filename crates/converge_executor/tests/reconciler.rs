//! Full reconcile cycles.

mod common;

use std::sync::Arc;

use common::{EKS_KINDS, Harness, eks_manifest, graph, rid, statuses};
use converge_core::EngineConfig;
use converge_executor::{OperationStatus, Reconciler, ReconcileError};
use converge_graph::GraphError;
use converge_plan::{OperationKind, Plan, PlanError};
use converge_provider::{MockOp, MockProvider, ProviderError, ProviderRegistry};
use converge_state::StateStore;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn reconciler_for(harness: &Harness, config: EngineConfig) -> Reconciler {
    Reconciler::new(harness.registry.clone(), harness.state.clone(), config).with_clock(harness.clock.clone())
}

#[tokio::test(start_paused = true)]
async fn reconcile_records_current_attributes_on_the_graph() {
    let harness = Harness::new(&EKS_KINDS);
    let mut graph = graph(eks_manifest());

    let report = reconciler_for(&harness, EngineConfig::default())
        .reconcile(&mut graph, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.count(OperationStatus::Applied), 3);
    let cluster = graph.get(&rid("eks_cluster.main")).unwrap();
    assert_eq!(
        cluster.current().unwrap()["role_arn"],
        json!("arn:mock:iam_role:iam_role-1")
    );
}

#[tokio::test(start_paused = true)]
async fn second_reconcile_changes_nothing() {
    let harness = Harness::new(&EKS_KINDS);
    let reconciler = reconciler_for(&harness, EngineConfig::default());
    let mut graph = graph(eks_manifest());
    reconciler.reconcile(&mut graph, &CancellationToken::new()).await.unwrap();

    let report = reconciler
        .reconcile(&mut graph, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.count(OperationStatus::NoOp), 3);
    assert_eq!(harness.mock("iam_role").call_count(MockOp::Create), 1);
}

#[tokio::test(start_paused = true)]
async fn unsupported_update_is_replanned_as_replacement() {
    let harness = Harness::new(&EKS_KINDS);
    harness.converge(&graph(eks_manifest())).await;
    let reconciler = reconciler_for(&harness, EngineConfig::default());
    let old = harness.record("eks_node_group.workers").unwrap().provider_id;
    harness.mock("eks_node_group").fail_next(
        MockOp::Update,
        ProviderError::UnsupportedUpdate {
            attributes: vec!["size".to_owned()],
        },
    );

    let mut manifest = eks_manifest();
    manifest["resources"][2]["attributes"]["size"] = json!(9);
    let report = reconciler
        .reconcile(&mut graph(manifest), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.succeeded(), "{report}");
    let outcomes: Vec<_> = report
        .for_resource(&rid("eks_node_group.workers"))
        .map(|outcome| (outcome.kind, outcome.status))
        .collect();
    assert_eq!(
        outcomes,
        [
            (OperationKind::Replace, OperationStatus::Applied),
            (OperationKind::Replace, OperationStatus::Applied),
        ]
    );
    let record = harness.record("eks_node_group.workers").unwrap();
    assert_ne!(record.provider_id, old);
    assert_eq!(record.attributes["size"], json!(9));
    assert_eq!(harness.mock("eks_node_group").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn replacement_policy_can_be_disabled() {
    let harness = Harness::new(&EKS_KINDS);
    let config = EngineConfig {
        replace_on_unsupported_update: false,
        ..EngineConfig::default()
    };
    let reconciler = reconciler_for(&harness, config);
    reconciler
        .reconcile(&mut graph(eks_manifest()), &CancellationToken::new())
        .await
        .unwrap();
    harness.mock("eks_node_group").fail_next(
        MockOp::Update,
        ProviderError::UnsupportedUpdate {
            attributes: vec!["size".to_owned()],
        },
    );

    let mut manifest = eks_manifest();
    manifest["resources"][2]["attributes"]["size"] = json!(9);
    let report = reconciler
        .reconcile(&mut graph(manifest), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.succeeded());
    assert_eq!(harness.mock("eks_node_group").call_count(MockOp::Create), 1);
}

#[tokio::test(start_paused = true)]
async fn drift_during_update_is_recreated() {
    let harness = Harness::new(&EKS_KINDS);
    let reconciler = reconciler_for(&harness, EngineConfig::default());
    reconciler
        .reconcile(&mut graph(eks_manifest()), &CancellationToken::new())
        .await
        .unwrap();
    let pid = harness.record("eks_node_group.workers").unwrap().provider_id;
    harness.mock("eks_node_group").remove(&pid);

    let mut manifest = eks_manifest();
    manifest["resources"][2]["attributes"]["size"] = json!(2);
    let report = reconciler
        .reconcile(&mut graph(manifest), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.succeeded(), "{report}");
    let outcome = report
        .for_resource(&rid("eks_node_group.workers"))
        .next()
        .unwrap();
    assert_eq!((outcome.kind, outcome.status), (OperationKind::Create, OperationStatus::Applied));
    assert_eq!(harness.record("eks_node_group.workers").unwrap().attributes["size"], json!(2));
}

#[tokio::test(start_paused = true)]
async fn failed_dependency_is_retried_in_the_follow_up() {
    let harness = Harness::new(&EKS_KINDS);
    let reconciler = reconciler_for(&harness, EngineConfig::default());
    reconciler
        .reconcile(&mut graph(eks_manifest()), &CancellationToken::new())
        .await
        .unwrap();
    harness.mock("eks_cluster").fail_next(
        MockOp::Update,
        ProviderError::UnsupportedUpdate {
            attributes: vec!["name".to_owned()],
        },
    );

    // Renaming the cluster changes what the node group references.
    let mut manifest = eks_manifest();
    manifest["resources"][1]["attributes"]["name"] = json!("primary");
    let report = reconciler
        .reconcile(&mut graph(manifest), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.succeeded(), "{report}");
    assert_eq!(
        statuses(&report),
        [
            ("iam_role.eks".to_owned(), "no-op".to_owned()),
            ("eks_cluster.main".to_owned(), "applied".to_owned()),
            ("eks_cluster.main".to_owned(), "applied".to_owned()),
            ("eks_node_group.workers".to_owned(), "applied".to_owned()),
        ]
    );
    assert_eq!(
        harness.record("eks_node_group.workers").unwrap().attributes["cluster"],
        json!("primary")
    );
}

#[tokio::test(start_paused = true)]
async fn each_applied_plan_is_observed() {
    let harness = Harness::new(&EKS_KINDS);
    let reconciler = reconciler_for(&harness, EngineConfig::default());
    let mut seen: Vec<Plan> = Vec::new();
    reconciler
        .reconcile_with(&mut graph(eks_manifest()), &CancellationToken::new(), |plan| {
            seen.push(plan.clone());
        })
        .await
        .unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].len(), 3);

    harness.mock("eks_node_group").fail_next(
        MockOp::Update,
        ProviderError::UnsupportedUpdate {
            attributes: vec!["size".to_owned()],
        },
    );
    let mut manifest = eks_manifest();
    manifest["resources"][2]["attributes"]["size"] = json!(9);
    seen.clear();
    reconciler
        .reconcile_with(&mut graph(manifest), &CancellationToken::new(), |plan| {
            seen.push(plan.clone());
        })
        .await
        .unwrap();

    assert_eq!(seen.len(), 2);
    let changed: Vec<_> = seen[1]
        .operations()
        .iter()
        .filter(|op| op.kind() != OperationKind::NoOp)
        .map(|op| op.resource().to_string())
        .collect();
    assert_eq!(changed, ["eks_node_group.workers", "eks_node_group.workers"]);
}

#[tokio::test(start_paused = true)]
async fn cyclic_graph_aborts_before_any_side_effect() {
    let harness = Harness::new(&["node"]);
    let mut graph = graph(json!({
        "resources": [
            { "kind": "node", "name": "a", "attributes": { "peer": "${node.b.id}" } },
            { "kind": "node", "name": "b", "attributes": { "peer": "${node.a.id}" } }
        ]
    }));

    let err = reconciler_for(&harness, EngineConfig::default())
        .reconcile(&mut graph, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Plan(PlanError::Graph(GraphError::Cycle(_)))
    ));
    assert!(harness.mock("node").calls().is_empty());
    assert!(harness.state.list().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn file_backed_state_survives_a_new_reconciler() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        state_path: Some(dir.path().join("state.json")),
        ..EngineConfig::default()
    };
    let role = Arc::new(MockProvider::new("iam_role"));
    let cluster = Arc::new(MockProvider::new("eks_cluster"));
    let groups = Arc::new(MockProvider::new("eks_node_group"));
    let registry = ProviderRegistry::new()
        .with("iam_role", Arc::clone(&role))
        .with("eks_cluster", Arc::clone(&cluster))
        .with("eks_node_group", Arc::clone(&groups));

    let first = Reconciler::from_config(registry.clone(), config.clone()).unwrap();
    let report = first
        .reconcile(&mut graph(eks_manifest()), &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.succeeded());
    drop(first);

    let second = Reconciler::from_config(registry, config).unwrap();
    assert_eq!(second.state().list().unwrap().len(), 3);
    let report = second
        .reconcile(&mut graph(eks_manifest()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.count(OperationStatus::NoOp), 3);
    assert_eq!(role.call_count(MockOp::Create), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_config_is_rejected() {
    let config = EngineConfig {
        concurrency: 0,
        ..EngineConfig::default()
    };

    let err = Reconciler::from_config(ProviderRegistry::new(), config).unwrap_err();

    assert!(matches!(err, ReconcileError::Config(_)));
}
