//! Shared fixtures for planner tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use converge_core::{Clock, MockClock};
use converge_graph::{Attributes, Manifest, ResourceGraph, ResourceId};
use converge_plan::{Plan, PlanError, PlanOptions, Planner};
use converge_provider::{MockProvider, ProviderId, ProviderRegistry};
use converge_state::{MemoryStateStore, StateRecord, StateStore};
use serde_json::Value;

// ═══════════════════════════════════════════════════════════════════════════════
// Fixture
// ═══════════════════════════════════════════════════════════════════════════════

/// Registry of mock providers, an in-memory store and a controllable clock.
pub struct Fixture {
    pub registry: ProviderRegistry,
    pub mocks: BTreeMap<String, Arc<MockProvider>>,
    pub state: MemoryStateStore,
    pub clock: MockClock,
}

impl Fixture {
    /// One default mock provider per kind.
    pub fn new(kinds: &[&str]) -> Self {
        let mut fixture = Self {
            registry: ProviderRegistry::new(),
            mocks: BTreeMap::new(),
            state: MemoryStateStore::new(),
            clock: MockClock::default(),
        };
        for kind in kinds {
            fixture.add(MockProvider::new(*kind));
        }
        fixture
    }

    /// Registers a customised mock under the kind it was created with.
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

    /// Total provider calls across all mocks.
    pub fn total_calls(&self) -> usize {
        self.mocks.values().map(|mock| mock.calls().len()).sum()
    }

    /// Seeds a record refreshed "now" and a matching live resource.
    pub fn seed(&self, id: &str, attributes: Attributes, dependencies: &[&str]) -> ProviderId {
        let id = rid(id);
        let provider_id = self.mock(id.kind()).insert(attributes.clone());
        let record = StateRecord::new(id, provider_id.clone(), attributes, self.clock.now())
            .with_dependencies(dependencies.iter().map(|dep| rid(dep)));
        self.state.save(&record).unwrap();
        provider_id
    }

    pub async fn plan(&self, graph: &ResourceGraph, options: &PlanOptions) -> Result<Plan, PlanError> {
        Planner::new(&self.registry, &self.state, &self.clock)
            .plan(graph, options)
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builders
// ═══════════════════════════════════════════════════════════════════════════════

pub fn rid(text: &str) -> ResourceId {
    text.parse().unwrap()
}

pub fn attrs(value: Value) -> Attributes {
    serde_json::from_value(value).unwrap()
}

pub fn graph(manifest: Value) -> ResourceGraph {
    serde_json::from_value::<Manifest>(manifest)
        .unwrap()
        .into_graph()
        .unwrap()
}

/// `(marker, resource)` per operation, for compact order assertions.
pub fn steps(plan: &Plan) -> Vec<(String, String)> {
    plan.operations()
        .iter()
        .map(|op| (op.kind().to_string(), op.resource().to_string()))
        .collect()
}
