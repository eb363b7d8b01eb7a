//! Shared harness for executor and reconciler tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use converge_core::MockClock;
use converge_executor::{Executor, RunReport};
use converge_graph::{Manifest, ResourceGraph, ResourceId};
use converge_plan::{Plan, PlanOptions, Planner};
use converge_provider::{MockProvider, ProviderRegistry};
use converge_state::{MemoryStateStore, StateRecord, StateStore};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

// ═══════════════════════════════════════════════════════════════════════════════
// Harness
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Harness {
    pub registry: ProviderRegistry,
    pub mocks: BTreeMap<String, Arc<MockProvider>>,
    pub state: Arc<MemoryStateStore>,
    pub clock: Arc<MockClock>,
}

impl Harness {
    pub fn new(kinds: &[&str]) -> Self {
        let mut harness = Self {
            registry: ProviderRegistry::new(),
            mocks: BTreeMap::new(),
            state: Arc::new(MemoryStateStore::new()),
            clock: Arc::new(MockClock::default()),
        };
        for kind in kinds {
            harness.add(MockProvider::new(*kind));
        }
        harness
    }

    pub fn add(&mut self, provider: MockProvider) -> Arc<MockProvider> {
        let provider = Arc::new(provider);
        let kind = provider.kind().to_owned();
        self.registry.register(kind.clone(), Arc::clone(&provider));
        self.mocks.insert(kind, Arc::clone(&provider));
        provider
    }

    pub fn mock(&self, kind: &str) -> &Arc<MockProvider> {
        &self.mocks[kind]
    }

    pub fn record(&self, id: &str) -> Option<StateRecord> {
        self.state.load(&rid(id)).unwrap()
    }

    pub async fn plan(&self, graph: &ResourceGraph) -> Plan {
        Planner::new(&self.registry, self.state.as_ref(), self.clock.as_ref())
            .plan(graph, &PlanOptions::new())
            .await
            .unwrap()
    }

    pub fn executor(&self) -> Executor {
        Executor::new(self.registry.clone(), self.state.clone()).with_clock(self.clock.clone())
    }

    /// Plans `graph` and applies the result with the default executor.
    pub async fn converge(&self, graph: &ResourceGraph) -> RunReport {
        let plan = self.plan(graph).await;
        self.executor().apply(&plan, &CancellationToken::new()).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builders
// ═══════════════════════════════════════════════════════════════════════════════

pub fn rid(text: &str) -> ResourceId {
    text.parse().unwrap()
}

pub fn graph(manifest: Value) -> ResourceGraph {
    serde_json::from_value::<Manifest>(manifest)
        .unwrap()
        .into_graph()
        .unwrap()
}

pub fn eks_manifest() -> Value {
    serde_json::json!({
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

pub const EKS_KINDS: [&str; 3] = ["iam_role", "eks_cluster", "eks_node_group"];

/// `(resource, status)` per outcome.
pub fn statuses(report: &RunReport) -> Vec<(String, String)> {
    report
        .outcomes()
        .iter()
        .map(|outcome| (outcome.resource.to_string(), outcome.status.to_string()))
        .collect()
}
