//! Diffing desired state against recorded state.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use converge_core::Clock;
use converge_graph::reference::{contains_references, resolve};
use converge_graph::{
    AttributeChange, AttributeDiff, Attributes, CycleError, GraphError, Reference, ResourceGraph,
    ResourceId, ResourceNode,
};
use converge_provider::{Provider, ProviderError, ProviderRegistry};
use converge_state::{StateRecord, StateStore};
use futures::{StreamExt, TryStreamExt, stream};
use hashbrown::{HashMap, HashSet};
use serde_json::Value;

use crate::error::PlanError;
use crate::operation::{Action, Operation, OperationId, OperationKind};
use crate::options::{PlanOptions, RefreshMode};
use crate::plan::Plan;

/// Computes [`Plan`]s.
///
/// The planner only reads from providers (refresh). It writes to the state
/// store only to record refreshed attributes or drop records of resources
/// found deleted out-of-band.
pub struct Planner<'a> {
    providers: &'a ProviderRegistry,
    state: &'a dyn StateStore,
    clock: &'a dyn Clock,
}

impl core::fmt::Debug for Planner<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Planner")
            .field("providers", self.providers)
            .finish_non_exhaustive()
    }
}

impl<'a> Planner<'a> {
    /// Creates a planner over the given collaborators.
    #[must_use]
    pub fn new(
        providers: &'a ProviderRegistry,
        state: &'a dyn StateStore,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            providers,
            state,
            clock,
        }
    }

    /// Plans the changes needed to converge on `graph`.
    ///
    /// The graph is validated and every kind checked against the registry
    /// before any provider is called.
    ///
    /// # Errors
    ///
    /// - [`PlanError::Graph`] if the graph is unlinked or cyclic.
    /// - [`PlanError::UnknownKind`] if a declared or recorded kind has no provider.
    /// - [`PlanError::Refresh`] if a provider read fails for a reason other
    ///   than the resource being gone.
    /// - [`PlanError::PreventDestroy`] if a protected resource would be replaced.
    /// - [`PlanError::State`] if the state store fails.
    pub async fn plan(
        &self,
        graph: &ResourceGraph,
        options: &PlanOptions,
    ) -> Result<Plan, PlanError> {
        let order: Vec<&ResourceNode> = graph.topological_order()?.collect();
        for node in &order {
            self.provider_for(node.id())?;
        }
        let records = self.state.list()?;
        for record in &records {
            self.provider_for(&record.id)?;
        }

        let records = self.refresh(records, options.refresh, options.concurrency.max(1)).await?;

        let mut builder = Builder::default();
        for node in order {
            let provider = self.provider_for(node.id())?;
            let forced = options.force_replace.contains(node.id());
            builder.plan_node(graph, node, records.get(node.id()), provider.as_ref(), forced)?;
        }

        let mut orphans: Vec<&StateRecord> = records
            .values()
            .filter(|record| !graph.contains(&record.id))
            .collect();
        orphans.sort_by(|a, b| a.id.cmp(&b.id));
        for record in orphans {
            tracing::debug!(resource = %record.id, "no longer declared; deleting");
            builder.plan_orphan(record);
        }

        builder.order_deletes(graph, &records);
        let plan = builder.finish()?;

        tracing::info!(operations = plan.len(), "{}", plan.summary());
        Ok(plan)
    }

    fn provider_for(&self, id: &ResourceId) -> Result<Arc<dyn Provider>, PlanError> {
        self.providers
            .get(id.kind())
            .ok_or_else(|| PlanError::UnknownKind {
                resource: id.clone(),
                kind: id.kind().to_owned(),
            })
    }

    async fn refresh(
        &self,
        records: Vec<StateRecord>,
        mode: RefreshMode,
        concurrency: usize,
    ) -> Result<HashMap<ResourceId, StateRecord>, PlanError> {
        let now = self.clock.now();
        let (stale, fresh): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|record| match mode {
                RefreshMode::Never => false,
                RefreshMode::Full => true,
                RefreshMode::Stale(threshold) => self.clock.elapsed_since(record.refreshed_at) >= threshold,
            });

        let reads = stale.into_iter().map(|record| async move {
            let provider = self.provider_for(&record.id)?;
            let attributes = match provider.read(&record.provider_id).await {
                Ok(attributes) => Some(attributes),
                Err(ProviderError::NotFound(_)) => None,
                Err(source) => {
                    return Err(PlanError::Refresh {
                        resource: record.id.clone(),
                        source,
                    });
                }
            };
            Ok::<_, PlanError>((record, attributes))
        });
        let refreshed: Vec<_> = stream::iter(reads)
            .buffer_unordered(concurrency)
            .try_collect()
            .await?;

        let mut records: HashMap<ResourceId, StateRecord> = fresh
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        for (mut record, attributes) in refreshed {
            match attributes {
                Some(attributes) => {
                    record.attributes = attributes;
                    record.refreshed_at = now;
                    self.state.save(&record)?;
                    records.insert(record.id.clone(), record);
                }
                None => {
                    tracing::warn!(
                        resource = %record.id,
                        provider_id = %record.provider_id,
                        "resource deleted out-of-band; it will be recreated"
                    );
                    self.state.remove(&record.id)?;
                }
            }
        }
        Ok(records)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plan Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Why an operation exists, for wiring delete ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Create, update, no-op, or the creating half of a replacement.
    Main,
    /// Deletes an instance deposed by an earlier, interrupted replacement.
    Cleanup,
    /// Destroy-before-create: deletes the old instance first.
    DestroyFirst,
    /// Create-before-destroy: deletes the old instance last.
    DestroyLast,
    /// Deletes a resource no longer declared.
    Orphan,
}

struct Draft {
    resource: ResourceId,
    kind: OperationKind,
    action: Action,
    diff: AttributeDiff,
    depends_on: Vec<usize>,
    dependencies: Vec<ResourceId>,
    role: Role,
}

#[derive(Default)]
struct Builder {
    drafts: Vec<Draft>,
    by_resource: HashMap<ResourceId, Vec<usize>>,
    main: HashMap<ResourceId, usize>,
    /// Resources whose outputs are only known after apply.
    unknown: HashSet<ResourceId>,
    /// Expected attributes after apply for updated and unchanged resources.
    expected: HashMap<ResourceId, Attributes>,
    /// Resources replaced by deleting the old instance first.
    destroy_first: HashSet<ResourceId>,
}

impl Builder {
    fn push(&mut self, draft: Draft) -> usize {
        let index = self.drafts.len();
        self.by_resource
            .entry(draft.resource.clone())
            .or_default()
            .push(index);
        if draft.role == Role::Main {
            self.main.insert(draft.resource.clone(), index);
        }
        self.drafts.push(draft);
        index
    }

    fn plan_node(
        &mut self,
        graph: &ResourceGraph,
        node: &ResourceNode,
        record: Option<&StateRecord>,
        provider: &dyn Provider,
        forced: bool,
    ) -> Result<(), PlanError> {
        let id = node.id().clone();
        let dependencies: Vec<ResourceId> = graph.dependencies(&id).cloned().collect();
        let cleanup = record.map_or_else(Vec::new, |record| self.plan_cleanup(record));

        // Dependencies precede this node in topological order.
        let mut after: Vec<usize> = dependencies
            .iter()
            .filter_map(|dep| self.main.get(dep).copied())
            .collect();
        after.extend(&cleanup);

        let Some(record) = record else {
            tracing::debug!(resource = %id, "no record; creating");
            self.unknown.insert(id.clone());
            self.push(Draft {
                resource: id,
                kind: OperationKind::Create,
                action: Action::Create {
                    desired: node.desired().clone(),
                },
                diff: AttributeDiff::new(),
                depends_on: after,
                dependencies,
                role: Role::Main,
            });
            return Ok(());
        };

        let diff = self.diff(node.desired(), &record.attributes);
        let replace = forced || diff.names().any(|name| provider.requires_replacement(name));

        if !replace {
            let (kind, action) = if diff.is_empty() {
                (OperationKind::NoOp, Action::None)
            } else {
                (
                    OperationKind::Update,
                    Action::Update {
                        provider_id: record.provider_id.clone(),
                        desired: node.desired().clone(),
                    },
                )
            };
            tracing::debug!(resource = %id, changed = diff.len(), "{kind}");

            let mut expected = record.attributes.clone();
            for change in &diff {
                if change.computed {
                    expected.remove(&change.name);
                } else {
                    expected.insert(change.name.clone(), change.after.clone());
                }
            }
            self.expected.insert(id.clone(), expected);
            self.push(Draft {
                resource: id,
                kind,
                action,
                diff,
                depends_on: after,
                dependencies,
                role: Role::Main,
            });
            return Ok(());
        }

        if node.lifecycle().prevent_destroy {
            return Err(PlanError::PreventDestroy(id));
        }
        self.unknown.insert(id.clone());

        // A dependency deleted first takes its replaced dependents with it:
        // their old instances must be gone before it is.
        let inherited = dependencies.iter().any(|dep| self.destroy_first.contains(dep));
        let create_first = !inherited
            && node
                .lifecycle()
                .create_before_destroy
                .unwrap_or_else(|| provider.create_before_destroy());
        tracing::debug!(resource = %id, forced, create_first, inherited, "replacing");

        let old = record.provider_id.clone();
        if create_first {
            let created = self.push(Draft {
                resource: id.clone(),
                kind: OperationKind::Replace,
                action: Action::CreateReplacement {
                    replaces: old.clone(),
                    desired: node.desired().clone(),
                },
                diff,
                depends_on: after,
                dependencies,
                role: Role::Main,
            });
            self.push(Draft {
                resource: id,
                kind: OperationKind::Replace,
                action: Action::DestroyDeposed { provider_id: old },
                diff: AttributeDiff::new(),
                depends_on: vec![created],
                dependencies: Vec::new(),
                role: Role::DestroyLast,
            });
        } else {
            self.destroy_first.insert(id.clone());
            let destroyed = self.push(Draft {
                resource: id.clone(),
                kind: OperationKind::Replace,
                action: Action::Delete { provider_id: old },
                diff: AttributeDiff::new(),
                depends_on: cleanup,
                dependencies: Vec::new(),
                role: Role::DestroyFirst,
            });
            after.push(destroyed);
            self.push(Draft {
                resource: id,
                kind: OperationKind::Replace,
                action: Action::Create {
                    desired: node.desired().clone(),
                },
                diff,
                depends_on: after,
                dependencies,
                role: Role::Main,
            });
        }
        Ok(())
    }

    fn plan_orphan(&mut self, record: &StateRecord) {
        let cleanup = self.plan_cleanup(record);
        self.push(Draft {
            resource: record.id.clone(),
            kind: OperationKind::Delete,
            action: Action::Delete {
                provider_id: record.provider_id.clone(),
            },
            diff: AttributeDiff::new(),
            depends_on: cleanup,
            dependencies: Vec::new(),
            role: Role::Orphan,
        });
    }

    /// Schedules deletion of instances left deposed by an interrupted run.
    fn plan_cleanup(&mut self, record: &StateRecord) -> Vec<usize> {
        record
            .deposed
            .iter()
            .map(|provider_id| {
                tracing::debug!(resource = %record.id, provider_id = %provider_id, "deposed instance left over");
                self.push(Draft {
                    resource: record.id.clone(),
                    kind: OperationKind::Delete,
                    action: Action::DestroyDeposed {
                        provider_id: provider_id.clone(),
                    },
                    diff: AttributeDiff::new(),
                    depends_on: Vec::new(),
                    dependencies: Vec::new(),
                    role: Role::Cleanup,
                })
            })
            .collect()
    }

    /// Diffs desired attributes against recorded ones, resolving references
    /// against what each referenced resource is expected to hold after apply.
    fn diff(&self, desired: &Attributes, recorded: &Attributes) -> AttributeDiff {
        let lookup = |reference: &Reference| self.lookup(reference);
        let mut diff = AttributeDiff::new();
        for (name, value) in desired {
            let before = recorded.get(name);
            if !contains_references(value) {
                if before != Some(value) {
                    diff.push(change(name, before, value.clone(), false));
                }
                continue;
            }
            match resolve(value, &lookup) {
                Ok(resolved) if before == Some(&resolved) => {}
                Ok(resolved) => diff.push(change(name, before, resolved, false)),
                Err(_) => diff.push(change(name, before, value.clone(), true)),
            }
        }
        diff
    }

    fn lookup(&self, reference: &Reference) -> Option<Value> {
        if self.unknown.contains(&reference.target) {
            return None;
        }
        self.expected
            .get(&reference.target)
            .and_then(|attributes| reference.lookup_in(attributes))
    }

    /// Orders deletions after every operation still using the deleted
    /// instance.
    fn order_deletes(&mut self, graph: &ResourceGraph, records: &HashMap<ResourceId, StateRecord>) {
        // Recorded dependency -> resources that recorded it.
        let mut recorded_users: HashMap<&ResourceId, Vec<&ResourceId>> = HashMap::new();
        for record in records.values() {
            for dependency in &record.dependencies {
                recorded_users.entry(dependency).or_default().push(&record.id);
            }
        }

        for index in 0..self.drafts.len() {
            let resource = self.drafts[index].resource.clone();
            let graph_users: Vec<&ResourceId> = if graph.contains(&resource) {
                graph.dependents(&resource).collect()
            } else {
                Vec::new()
            };
            let old_users: Vec<&ResourceId> = recorded_users
                .get(&resource)
                .map(|users| {
                    users
                        .iter()
                        .copied()
                        .filter(|user| !graph_users.contains(user))
                        .collect()
                })
                .unwrap_or_default();

            let mut extra: Vec<usize> = Vec::new();
            match self.drafts[index].role {
                Role::Main | Role::Cleanup => continue,
                Role::DestroyLast => {
                    for user in &graph_users {
                        extra.extend(self.ops_of(user, |_| true));
                    }
                    for user in &old_users {
                        extra.extend(self.ops_of(user, |role| role == Role::Main));
                    }
                }
                Role::DestroyFirst => {
                    for user in &graph_users {
                        extra.extend(self.ops_of(user, |role| role == Role::DestroyFirst));
                    }
                    for user in &old_users {
                        extra.extend(self.ops_of(user, |role| {
                            matches!(role, Role::DestroyFirst | Role::Orphan)
                        }));
                    }
                }
                Role::Orphan => {
                    for user in graph_users.iter().chain(&old_users) {
                        extra.extend(self.ops_of(user, |_| true));
                    }
                }
            }
            self.drafts[index].depends_on.extend(extra);
        }
    }

    fn ops_of(&self, resource: &ResourceId, keep: impl Fn(Role) -> bool) -> Vec<usize> {
        self.by_resource
            .get(resource)
            .map(|indices| {
                indices
                    .iter()
                    .copied()
                    .filter(|&index| keep(self.drafts[index].role))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sorts drafts so dependencies come first, earliest-planned first among
    /// ready operations, and renumbers them.
    fn finish(self) -> Result<Plan, PlanError> {
        let count = self.drafts.len();
        let mut depends_on: Vec<Vec<usize>> = Vec::with_capacity(count);
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut pending: Vec<usize> = Vec::with_capacity(count);
        for (index, draft) in self.drafts.iter().enumerate() {
            let mut deps = draft.depends_on.clone();
            deps.sort_unstable();
            deps.dedup();
            for &dep in &deps {
                dependents[dep].push(index);
            }
            pending.push(deps.len());
            depends_on.push(deps);
        }

        let mut ready: BinaryHeap<Reverse<usize>> = pending
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count == 0)
            .map(|(index, _)| Reverse(index))
            .collect();
        let mut order = Vec::with_capacity(count);
        while let Some(Reverse(index)) = ready.pop() {
            order.push(index);
            for &dependent in &dependents[index] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() != count {
            let mut nodes: Vec<ResourceId> = (0..count)
                .filter(|&index| pending[index] > 0)
                .map(|index| self.drafts[index].resource.clone())
                .collect();
            nodes.sort();
            nodes.dedup();
            return Err(PlanError::Graph(GraphError::Cycle(CycleError { nodes })));
        }

        let mut position = vec![0; count];
        for (new, &old) in order.iter().enumerate() {
            position[old] = new;
        }

        let mut drafts: Vec<Option<Draft>> = self.drafts.into_iter().map(Some).collect();
        let operations = order
            .iter()
            .enumerate()
            .filter_map(|(new, &old)| {
                let draft = drafts[old].take()?;
                let mut deps: Vec<OperationId> = depends_on[old]
                    .iter()
                    .map(|&dep| OperationId(position[dep]))
                    .collect();
                deps.sort_unstable();
                Some(Operation {
                    id: OperationId(new),
                    resource: draft.resource,
                    kind: draft.kind,
                    action: draft.action,
                    diff: draft.diff,
                    depends_on: deps,
                    dependencies: draft.dependencies,
                })
            })
            .collect();
        Ok(Plan::new(operations))
    }
}

fn change(name: &str, before: Option<&Value>, after: Value, computed: bool) -> AttributeChange {
    AttributeChange {
        name: name.to_owned(),
        before: before.cloned(),
        after,
        computed,
    }
}
