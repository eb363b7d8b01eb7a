//! Planner decision policy and operation ordering.

mod common;

use std::time::Duration;

use common::{Fixture, attrs, graph, rid, steps};
use converge_core::Clock;
use converge_graph::GraphError;
use converge_plan::{Action, OperationKind, PlanError, PlanOptions, RefreshMode};
use converge_provider::{MockOp, MockProvider, ProviderError, ProviderId};
use converge_state::StateStore;
use serde_json::json;

fn eks_manifest() -> serde_json::Value {
    json!({
        "resources": [
            { "kind": "iam_role", "name": "eks", "attributes": { "name": "eks-cluster-role" } },
            {
                "kind": "eks_cluster",
                "name": "main",
                "attributes": { "name": "main", "role_arn": "${iam_role.eks.arn}" }
            },
            {
                "kind": "eks_node_group",
                "name": "workers",
                "attributes": { "cluster": "${eks_cluster.main.name}", "size": 3 },
                "depends_on": ["eks_cluster.main"]
            }
        ]
    })
}

fn eks_fixture() -> Fixture {
    Fixture::new(&["iam_role", "eks_cluster", "eks_node_group"])
}

/// Seeds records exactly as a completed apply of `eks_manifest` leaves them.
fn seed_applied_eks(fixture: &Fixture) {
    fixture.seed(
        "iam_role.eks",
        attrs(json!({ "name": "eks-cluster-role", "arn": "arn:role/eks", "id": "r-1" })),
        &[],
    );
    fixture.seed(
        "eks_cluster.main",
        attrs(json!({ "name": "main", "role_arn": "arn:role/eks", "arn": "arn:cluster/main" })),
        &["iam_role.eks"],
    );
    fixture.seed(
        "eks_node_group.workers",
        attrs(json!({ "cluster": "main", "size": 3 })),
        &["eks_cluster.main"],
    );
}

fn subnets_manifest(vpc_lifecycle: serde_json::Value) -> serde_json::Value {
    json!({
        "resources": [
            { "kind": "vpc", "name": "main", "attributes": { "cidr": "10.1.0.0/16" }, "lifecycle": vpc_lifecycle },
            { "kind": "subnet", "name": "a", "attributes": { "vpc_id": "${vpc.main.id}", "zone": "a" } },
            { "kind": "subnet", "name": "b", "attributes": { "vpc_id": "${vpc.main.id}", "zone": "b" } }
        ]
    })
}

fn seed_subnets(fixture: &Fixture) -> ProviderId {
    let vpc = fixture.seed(
        "vpc.main",
        attrs(json!({ "cidr": "10.0.0.0/16", "id": "vpc-old" })),
        &[],
    );
    for zone in ["a", "b"] {
        fixture.seed(
            &format!("subnet.{zone}"),
            attrs(json!({ "vpc_id": "vpc-old", "zone": zone })),
            &["vpc.main"],
        );
    }
    vpc
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision policy
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_state_creates_in_dependency_order() {
    let fixture = eks_fixture();
    let plan = fixture
        .plan(&graph(eks_manifest()), &PlanOptions::new())
        .await
        .unwrap();

    assert_eq!(
        steps(&plan),
        [
            ("create".to_owned(), "iam_role.eks".to_owned()),
            ("create".to_owned(), "eks_cluster.main".to_owned()),
            ("create".to_owned(), "eks_node_group.workers".to_owned()),
        ]
    );
    let ops = plan.operations();
    assert!(ops[0].depends_on().is_empty());
    assert_eq!(ops[1].depends_on(), [ops[0].id()]);
    assert_eq!(ops[2].depends_on(), [ops[1].id()]);
    assert_eq!(ops[2].dependencies(), [rid("eks_cluster.main")]);
    assert_eq!(fixture.total_calls(), 0);
}

#[tokio::test]
async fn applied_state_plans_all_noop() {
    let fixture = eks_fixture();
    seed_applied_eks(&fixture);

    let plan = fixture
        .plan(&graph(eks_manifest()), &PlanOptions::new())
        .await
        .unwrap();

    assert!(plan.is_noop());
    assert_eq!(plan.len(), 3);
    assert!(plan.operations().iter().all(|op| *op.action() == Action::None));
    assert_eq!(plan.summary().noop, 3);
}

#[tokio::test]
async fn changed_attribute_updates_in_place() {
    let fixture = eks_fixture();
    seed_applied_eks(&fixture);
    let pid = fixture.state.load(&rid("eks_node_group.workers")).unwrap().unwrap().provider_id;

    let mut manifest = eks_manifest();
    manifest["resources"][2]["attributes"]["size"] = json!(5);
    let plan = fixture.plan(&graph(manifest), &PlanOptions::new()).await.unwrap();

    let op = plan.for_resource(&rid("eks_node_group.workers")).next().unwrap();
    assert_eq!(op.kind(), OperationKind::Update);
    assert!(matches!(op.action(), Action::Update { provider_id, .. } if *provider_id == pid));

    let change = op.diff().get("size").unwrap();
    assert_eq!(change.before, Some(json!(3)));
    assert_eq!(change.after, json!(5));
    assert!(!change.computed);
    assert_eq!(op.diff().len(), 1);

    let summary = plan.summary();
    assert_eq!((summary.update, summary.noop), (1, 2));
}

#[tokio::test]
async fn in_place_update_keeps_referencing_dependents_unchanged() {
    let fixture = eks_fixture();
    seed_applied_eks(&fixture);

    // The role's name changes but its arn (what the cluster uses) does not.
    let mut manifest = eks_manifest();
    manifest["resources"][0]["attributes"]["name"] = json!("renamed");
    let plan = fixture.plan(&graph(manifest), &PlanOptions::new()).await.unwrap();

    assert_eq!(
        steps(&plan),
        [
            ("update".to_owned(), "iam_role.eks".to_owned()),
            ("no-op".to_owned(), "eks_cluster.main".to_owned()),
            ("no-op".to_owned(), "eks_node_group.workers".to_owned()),
        ]
    );
}

#[tokio::test]
async fn referenced_update_value_is_known_at_plan_time() {
    let fixture = eks_fixture();
    seed_applied_eks(&fixture);

    let mut manifest = eks_manifest();
    manifest["resources"][1]["attributes"]["name"] = json!("primary");
    let plan = fixture.plan(&graph(manifest), &PlanOptions::new()).await.unwrap();

    let workers = plan.for_resource(&rid("eks_node_group.workers")).next().unwrap();
    assert_eq!(workers.kind(), OperationKind::Update);
    let change = workers.diff().get("cluster").unwrap();
    assert_eq!(change.after, json!("primary"));
    assert!(!change.computed);
}

// ─────────────────────────────────────────────────────────────────────────────
// Replacement
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn replace_rewires_both_dependents_between_create_and_delete() {
    let mut fixture = Fixture::new(&["subnet"]);
    fixture.add(MockProvider::new("vpc").with_replace_on(["cidr"]));
    let old = seed_subnets(&fixture);

    let plan = fixture
        .plan(&graph(subnets_manifest(json!({}))), &PlanOptions::new())
        .await
        .unwrap();

    assert_eq!(
        steps(&plan),
        [
            ("replace".to_owned(), "vpc.main".to_owned()),
            ("update".to_owned(), "subnet.a".to_owned()),
            ("update".to_owned(), "subnet.b".to_owned()),
            ("replace".to_owned(), "vpc.main".to_owned()),
        ]
    );

    let ops = plan.operations();
    assert!(matches!(ops[0].action(), Action::CreateReplacement { replaces, .. } if *replaces == old));
    assert!(matches!(ops[3].action(), Action::DestroyDeposed { provider_id } if *provider_id == old));

    for subnet in &ops[1..3] {
        assert_eq!(subnet.depends_on(), [ops[0].id()]);
        assert!(subnet.diff().get("vpc_id").unwrap().computed);
        assert!(ops[3].depends_on().contains(&subnet.id()));
    }
    assert!(ops[3].depends_on().contains(&ops[0].id()));

    let summary = plan.summary();
    assert_eq!((summary.replace, summary.update), (1, 2));
}

#[tokio::test]
async fn destroy_before_create_kinds_delete_first() {
    let mut fixture = Fixture::new(&["subnet"]);
    fixture.add(
        MockProvider::new("vpc")
            .with_replace_on(["cidr"])
            .with_create_before_destroy(false),
    );
    let old = seed_subnets(&fixture);

    let plan = fixture
        .plan(&graph(subnets_manifest(json!({}))), &PlanOptions::new())
        .await
        .unwrap();

    let ops = plan.operations();
    assert_eq!(ops[0].kind(), OperationKind::Replace);
    assert!(matches!(ops[0].action(), Action::Delete { provider_id } if *provider_id == old));
    assert_eq!(ops[1].kind(), OperationKind::Replace);
    assert!(matches!(ops[1].action(), Action::Create { .. }));
    assert_eq!(ops[1].depends_on(), [ops[0].id()]);
    assert_eq!(ops[2].depends_on(), [ops[1].id()]);
    assert_eq!(ops[3].depends_on(), [ops[1].id()]);
    assert_eq!(plan.len(), 4);
}

#[tokio::test]
async fn destroy_first_replacement_deletes_replaced_dependents_before_it() {
    let mut fixture = Fixture::new(&["iam_role"]);
    fixture.add(
        MockProvider::new("eks_cluster")
            .with_replace_on(["name"])
            .with_create_before_destroy(false),
    );
    fixture.add(MockProvider::new("eks_node_group").with_replace_on(["cluster"]));
    seed_applied_eks(&fixture);

    let mut manifest = eks_manifest();
    manifest["resources"][1]["attributes"]["name"] = json!("primary");
    let plan = fixture
        .plan(&graph(manifest), &PlanOptions::new())
        .await
        .unwrap();

    assert_eq!(
        steps(&plan),
        [
            ("no-op".to_owned(), "iam_role.eks".to_owned()),
            ("replace".to_owned(), "eks_node_group.workers".to_owned()),
            ("replace".to_owned(), "eks_cluster.main".to_owned()),
            ("replace".to_owned(), "eks_cluster.main".to_owned()),
            ("replace".to_owned(), "eks_node_group.workers".to_owned()),
        ]
    );
    let ops = plan.operations();
    assert!(matches!(ops[1].action(), Action::Delete { .. }));
    assert!(matches!(ops[2].action(), Action::Delete { .. }));
    assert!(ops[2].depends_on().contains(&ops[1].id()));
    assert!(matches!(ops[3].action(), Action::Create { .. }));
    assert!(matches!(ops[4].action(), Action::Create { .. }));
    assert!(ops[4].depends_on().contains(&ops[3].id()));
}

#[tokio::test]
async fn lifecycle_overrides_provider_replacement_order() {
    let mut fixture = Fixture::new(&["subnet"]);
    fixture.add(MockProvider::new("vpc").with_replace_on(["cidr"]));
    seed_subnets(&fixture);

    let plan = fixture
        .plan(
            &graph(subnets_manifest(json!({ "create_before_destroy": false }))),
            &PlanOptions::new(),
        )
        .await
        .unwrap();

    assert!(matches!(plan.operations()[0].action(), Action::Delete { .. }));
    assert!(matches!(plan.operations()[1].action(), Action::Create { .. }));
}

#[tokio::test]
async fn prevent_destroy_blocks_replacement() {
    let mut fixture = Fixture::new(&["subnet"]);
    fixture.add(MockProvider::new("vpc").with_replace_on(["cidr"]));
    seed_subnets(&fixture);

    let err = fixture
        .plan(
            &graph(subnets_manifest(json!({ "prevent_destroy": true }))),
            &PlanOptions::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PlanError::PreventDestroy(id) if id == rid("vpc.main")));
}

#[tokio::test]
async fn force_replace_replaces_unchanged_resource() {
    let fixture = eks_fixture();
    seed_applied_eks(&fixture);

    let options = PlanOptions::new().with_force_replace(rid("eks_cluster.main"));
    let plan = fixture.plan(&graph(eks_manifest()), &options).await.unwrap();

    assert_eq!(
        steps(&plan),
        [
            ("no-op".to_owned(), "iam_role.eks".to_owned()),
            ("replace".to_owned(), "eks_cluster.main".to_owned()),
            ("update".to_owned(), "eks_node_group.workers".to_owned()),
            ("replace".to_owned(), "eks_cluster.main".to_owned()),
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Deletes
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn orphans_are_deleted_dependents_first() {
    let fixture = Fixture::new(&["network", "subnet"]);
    fixture.seed("network.core", attrs(json!({ "cidr": "10.0.0.0/8" })), &[]);
    fixture.seed("subnet.a", attrs(json!({ "zone": "a" })), &["network.core"]);

    let plan = fixture
        .plan(&graph(json!({ "resources": [] })), &PlanOptions::new())
        .await
        .unwrap();

    assert_eq!(
        steps(&plan),
        [
            ("delete".to_owned(), "subnet.a".to_owned()),
            ("delete".to_owned(), "network.core".to_owned()),
        ]
    );
    assert_eq!(plan.operations()[1].depends_on(), [plan.operations()[0].id()]);
}

#[tokio::test]
async fn destroy_first_replacement_waits_for_orphaned_users() {
    let mut fixture = Fixture::new(&["subnet"]);
    fixture.add(
        MockProvider::new("vpc")
            .with_replace_on(["cidr"])
            .with_create_before_destroy(false),
    );
    seed_subnets(&fixture);
    fixture.seed(
        "subnet.gone",
        attrs(json!({ "vpc_id": "vpc-old", "zone": "c" })),
        &["vpc.main"],
    );

    let plan = fixture
        .plan(&graph(subnets_manifest(json!({}))), &PlanOptions::new())
        .await
        .unwrap();

    assert_eq!(
        steps(&plan),
        [
            ("delete".to_owned(), "subnet.gone".to_owned()),
            ("replace".to_owned(), "vpc.main".to_owned()),
            ("replace".to_owned(), "vpc.main".to_owned()),
            ("update".to_owned(), "subnet.a".to_owned()),
            ("update".to_owned(), "subnet.b".to_owned()),
        ]
    );
    let ops = plan.operations();
    assert!(matches!(ops[1].action(), Action::Delete { .. }));
    assert_eq!(ops[1].depends_on(), [ops[0].id()]);
}

#[tokio::test]
async fn leftover_deposed_instance_is_destroyed_first() {
    let fixture = eks_fixture();
    seed_applied_eks(&fixture);
    let id = rid("iam_role.eks");
    let record = fixture.state.load(&id).unwrap().unwrap();
    fixture
        .state
        .save(&record.with_deposed([ProviderId::new("iam_role-0")]))
        .unwrap();

    let plan = fixture
        .plan(&graph(eks_manifest()), &PlanOptions::new())
        .await
        .unwrap();

    let ops: Vec<_> = plan.for_resource(&id).collect();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0].kind(), OperationKind::Delete);
    assert!(matches!(ops[0].action(), Action::DestroyDeposed { provider_id } if provider_id.as_str() == "iam_role-0"));
    assert_eq!(ops[1].kind(), OperationKind::NoOp);
    assert_eq!(ops[1].depends_on(), [ops[0].id()]);
    assert!(!plan.is_noop());
}

// ─────────────────────────────────────────────────────────────────────────────
// Refresh
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_records_are_not_read() {
    let fixture = eks_fixture();
    seed_applied_eks(&fixture);
    fixture.clock.advance(Duration::from_secs(60));

    fixture
        .plan(&graph(eks_manifest()), &PlanOptions::new())
        .await
        .unwrap();

    assert_eq!(fixture.total_calls(), 0);
}

#[tokio::test]
async fn stale_record_deleted_out_of_band_plans_create() {
    let fixture = eks_fixture();
    seed_applied_eks(&fixture);
    let role = rid("iam_role.eks");
    let pid = fixture.state.load(&role).unwrap().unwrap().provider_id;
    fixture.mock("iam_role").remove(&pid);
    fixture.clock.advance(Duration::from_secs(301));

    let plan = fixture
        .plan(&graph(eks_manifest()), &PlanOptions::new())
        .await
        .unwrap();

    assert_eq!(
        steps(&plan),
        [
            ("create".to_owned(), "iam_role.eks".to_owned()),
            ("update".to_owned(), "eks_cluster.main".to_owned()),
            ("no-op".to_owned(), "eks_node_group.workers".to_owned()),
        ]
    );
    assert!(plan.operations()[1].diff().get("role_arn").unwrap().computed);
    assert!(fixture.state.load(&role).unwrap().is_none());
    assert_eq!(fixture.mock("iam_role").call_count(MockOp::Read), 1);
}

#[tokio::test]
async fn refresh_detects_drift_and_stamps_record() {
    let fixture = eks_fixture();
    seed_applied_eks(&fixture);
    let id = rid("eks_node_group.workers");
    let pid = fixture.state.load(&id).unwrap().unwrap().provider_id;
    fixture.mock("eks_node_group").set_attribute(&pid, "size", json!(1));
    fixture.clock.advance(Duration::from_secs(10));

    let options = PlanOptions::new().with_refresh(RefreshMode::Full);
    let plan = fixture.plan(&graph(eks_manifest()), &options).await.unwrap();

    let op = plan.for_resource(&id).next().unwrap();
    assert_eq!(op.kind(), OperationKind::Update);
    assert_eq!(op.diff().get("size").unwrap().before, Some(json!(1)));

    let record = fixture.state.load(&id).unwrap().unwrap();
    assert_eq!(record.refreshed_at, fixture.clock.now());
    assert_eq!(record.attributes["size"], json!(1));
}

#[tokio::test(start_paused = true)]
async fn refresh_reads_are_bounded_by_concurrency() {
    let mut fixture = Fixture::new(&[]);
    let bucket = fixture.add(MockProvider::new("bucket").with_latency(Duration::from_millis(50)));
    let mut resources = Vec::new();
    for n in 0..5 {
        let name = format!("b{n}");
        fixture.seed(&format!("bucket.{name}"), attrs(json!({ "name": &name })), &[]);
        resources.push(json!({ "kind": "bucket", "name": name, "attributes": { "name": name } }));
    }

    let options = PlanOptions::new()
        .with_refresh(RefreshMode::Full)
        .with_concurrency(2);
    let plan = fixture
        .plan(&graph(json!({ "resources": resources })), &options)
        .await
        .unwrap();

    assert!(plan.is_noop());
    assert_eq!(bucket.call_count(MockOp::Read), 5);
    assert_eq!(bucket.max_in_flight(), 2);
}

#[tokio::test]
async fn refresh_never_trusts_state() {
    let fixture = eks_fixture();
    seed_applied_eks(&fixture);
    fixture.clock.advance(Duration::from_secs(86_400));

    let options = PlanOptions::new().with_refresh(RefreshMode::Never);
    let plan = fixture.plan(&graph(eks_manifest()), &options).await.unwrap();

    assert!(plan.is_noop());
    assert_eq!(fixture.total_calls(), 0);
}

#[tokio::test]
async fn refresh_failure_aborts_planning() {
    let fixture = eks_fixture();
    seed_applied_eks(&fixture);
    fixture
        .mock("iam_role")
        .fail_next(MockOp::Read, ProviderError::permanent("access denied"));

    let options = PlanOptions::new().with_refresh(RefreshMode::Full);
    let err = fixture.plan(&graph(eks_manifest()), &options).await.unwrap_err();

    assert!(matches!(
        err,
        PlanError::Refresh { resource, source: ProviderError::Permanent(_) } if resource == rid("iam_role.eks")
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cycle_fails_before_any_provider_call() {
    let fixture = Fixture::new(&["node"]);
    fixture.seed("node.a", attrs(json!({ "peer": "x" })), &[]);
    let cyclic = graph(json!({
        "resources": [
            { "kind": "node", "name": "a", "attributes": { "peer": "${node.b.id}" } },
            { "kind": "node", "name": "b", "attributes": { "peer": "${node.a.id}" } }
        ]
    }));

    let options = PlanOptions::new().with_refresh(RefreshMode::Full);
    let err = fixture.plan(&cyclic, &options).await.unwrap_err();

    assert!(matches!(err, PlanError::Graph(GraphError::Cycle(_))));
    assert_eq!(fixture.total_calls(), 0);
}

#[tokio::test]
async fn unregistered_kind_fails_before_any_provider_call() {
    let fixture = Fixture::new(&["iam_role", "eks_cluster"]);
    seed_applied_eks_partial(&fixture);

    let options = PlanOptions::new().with_refresh(RefreshMode::Full);
    let err = fixture.plan(&graph(eks_manifest()), &options).await.unwrap_err();

    assert!(matches!(
        err,
        PlanError::UnknownKind { ref kind, .. } if kind == "eks_node_group"
    ));
    assert_eq!(fixture.total_calls(), 0);
}

fn seed_applied_eks_partial(fixture: &Fixture) {
    fixture.seed(
        "iam_role.eks",
        attrs(json!({ "name": "eks-cluster-role", "arn": "arn:role/eks" })),
        &[],
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn plan_lists_one_line_per_operation() {
    let mut fixture = Fixture::new(&["subnet"]);
    fixture.add(MockProvider::new("vpc").with_replace_on(["cidr"]));
    seed_subnets(&fixture);

    let plan = fixture
        .plan(&graph(subnets_manifest(json!({}))), &PlanOptions::new())
        .await
        .unwrap();

    let expected = "\
-/+ vpc.main (create replacement for vpc-1) [cidr]
  ~ subnet.a [vpc_id]
  ~ subnet.b [vpc_id]
-/+ vpc.main (destroy vpc-1)
Plan: 0 to create, 2 to update, 1 to replace, 0 to delete, 0 unchanged.";
    assert_eq!(plan.to_string(), expected);
}
