//! Plan → apply orchestration.

use std::collections::BTreeSet;
use std::sync::Arc;

use converge_core::{Clock, EngineConfig, SystemClock};
use converge_graph::{ResourceGraph, ResourceId};
use converge_plan::{Plan, PlanOptions, Planner, RefreshMode};
use converge_provider::ProviderRegistry;
use converge_state::{FileStateStore, MemoryStateStore, StateStore};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::ReconcileError;
use crate::executor::Executor;
use crate::report::{FailureKind, RunReport};

/// Runs the full reconcile cycle against one state store.
///
/// The providers, store and clock are passed in explicitly, so a reconciler
/// can be embedded several times in one process or tested entirely in
/// memory.
pub struct Reconciler {
    providers: ProviderRegistry,
    state: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl core::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reconciler")
            .field("providers", &self.providers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a reconciler using the system clock.
    #[must_use]
    pub fn new(providers: ProviderRegistry, state: Arc<dyn StateStore>, config: EngineConfig) -> Self {
        Self {
            providers,
            state,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Creates a reconciler whose store follows `config.state_path`: a
    /// [`FileStateStore`] when set, a [`MemoryStateStore`] otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Config`] if the configuration is invalid and
    /// [`ReconcileError::State`] if the state file cannot be opened.
    pub fn from_config(providers: ProviderRegistry, config: EngineConfig) -> Result<Self, ReconcileError> {
        config.validate()?;
        let state: Arc<dyn StateStore> = match &config.state_path {
            Some(path) => Arc::new(FileStateStore::open(path)?),
            None => Arc::new(MemoryStateStore::new()),
        };
        Ok(Self::new(providers, state, config))
    }

    /// Replaces the clock used for staleness and record stamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The state store this reconciler reads and writes.
    #[must_use]
    pub fn state(&self) -> &Arc<dyn StateStore> {
        &self.state
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Plan options derived from the configuration's refresh and
    /// concurrency settings.
    #[must_use]
    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions::new()
            .with_refresh(RefreshMode::from(&self.config.refresh))
            .with_concurrency(self.config.concurrency)
    }

    /// Plans without applying.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Plan`] if planning fails.
    pub async fn plan(&self, graph: &ResourceGraph, options: &PlanOptions) -> Result<Plan, ReconcileError> {
        let planner = Planner::new(&self.providers, self.state.as_ref(), self.clock.as_ref());
        Ok(planner.plan(graph, options).await?)
    }

    /// Applies a plan produced by [`plan`](Self::plan).
    pub async fn apply(&self, plan: &Plan, cancel: &CancellationToken) -> RunReport {
        self.executor().apply(plan, cancel).await
    }

    /// Plans and applies `graph`, then records each resource's resulting
    /// attributes on the graph.
    ///
    /// When an update fails because the provider needs a replacement, or
    /// because the resource vanished, the graph is re-planned once (forcing
    /// replacement where needed) and the follow-up is applied. The returned
    /// report merges both passes.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Plan`] if either plan fails; nothing from the
    /// failing pass is applied.
    pub async fn reconcile(
        &self,
        graph: &mut ResourceGraph,
        cancel: &CancellationToken,
    ) -> Result<RunReport, ReconcileError> {
        self.reconcile_with(graph, cancel, |_| {}).await
    }

    /// Same as [`reconcile`](Self::reconcile), handing each plan to
    /// `on_plan` before it is applied.
    ///
    /// # Errors
    ///
    /// Same as [`reconcile`](Self::reconcile).
    pub async fn reconcile_with<F>(
        &self,
        graph: &mut ResourceGraph,
        cancel: &CancellationToken,
        on_plan: F,
    ) -> Result<RunReport, ReconcileError>
    where
        F: FnMut(&Plan) + Send,
    {
        let span = tracing::info_span!("reconcile", resources = graph.len());
        self.run(graph, cancel, on_plan).instrument(span).await
    }

    async fn run<F>(
        &self,
        graph: &mut ResourceGraph,
        cancel: &CancellationToken,
        mut on_plan: F,
    ) -> Result<RunReport, ReconcileError>
    where
        F: FnMut(&Plan) + Send,
    {
        let plan = self.plan(graph, &self.plan_options()).await?;
        on_plan(&plan);
        let mut report = self.apply(&plan, cancel).await;

        if let Some(forced) = self.follow_up(graph, &report) {
            tracing::info!(forced = forced.len(), "re-planning after replacement or drift");
            let mut options = self.plan_options().with_refresh(RefreshMode::Never);
            options.force_replace = forced;
            let plan = self.plan(graph, &options).await?;
            on_plan(&plan);
            let second = self.apply(&plan, cancel).await;
            report = report.merge(second);
        }

        let ids: Vec<ResourceId> = graph.iter().map(|node| node.id().clone()).collect();
        for id in ids {
            let current = self.state.load(&id)?.map(|record| record.attributes);
            graph.set_current(&id, current)?;
        }

        tracing::info!(succeeded = report.succeeded(), "{report}");
        Ok(report)
    }

    /// Decides whether a follow-up pass is needed and which resources it
    /// must force-replace. Drifted resources have lost their record and
    /// re-plan as creates without forcing.
    fn follow_up(&self, graph: &ResourceGraph, report: &RunReport) -> Option<BTreeSet<ResourceId>> {
        if report.cancelled() {
            return None;
        }
        let mut needed = false;
        let mut forced = BTreeSet::new();
        for outcome in report.failures() {
            match outcome.failure {
                Some(FailureKind::ReplacementRequired) if self.config.replace_on_unsupported_update => {
                    let protected = graph
                        .get(&outcome.resource)
                        .is_some_and(|node| node.lifecycle().prevent_destroy);
                    if protected {
                        tracing::warn!(resource = %outcome.resource, "replacement required but prevent_destroy is set");
                    } else {
                        forced.insert(outcome.resource.clone());
                        needed = true;
                    }
                }
                Some(FailureKind::Drift) => needed = true,
                _ => {}
            }
        }
        needed.then_some(forced)
    }

    fn executor(&self) -> Executor {
        Executor::from_config(self.providers.clone(), Arc::clone(&self.state), &self.config)
            .with_clock(Arc::clone(&self.clock))
    }
}
