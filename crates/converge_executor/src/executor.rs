//! Dependency-aware, bounded-concurrency plan execution.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use converge_core::{Clock, EngineConfig, SystemClock};
use converge_graph::reference::resolve_attributes;
use converge_graph::{AttributeDiff, Attributes, Reference, ResourceId};
use converge_plan::{Action, Operation, Plan};
use converge_provider::{Provider, ProviderError, ProviderId, ProviderRegistry};
use converge_state::{StateRecord, StateStore};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::report::{FailureKind, OperationOutcome, OperationStatus, RunReport};
use crate::retry::RetryPolicy;

/// Default number of operations in flight at once.
const DEFAULT_CONCURRENCY: usize = 10;

/// Applies [`Plan`]s through providers, recording results in the state store.
///
/// An operation starts once every operation it depends on has finished
/// successfully. The state store is written before dependents are released,
/// so a crash never leaves dependents built on an unrecorded resource.
pub struct Executor {
    providers: ProviderRegistry,
    state: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    concurrency: usize,
    retry: RetryPolicy,
}

impl core::fmt::Debug for Executor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Executor")
            .field("providers", &self.providers)
            .field("concurrency", &self.concurrency)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// A failed operation before it becomes an outcome.
struct Failure {
    kind: FailureKind,
    detail: String,
}

impl Failure {
    fn new(kind: FailureKind, detail: impl ToString) -> Self {
        Self {
            kind,
            detail: detail.to_string(),
        }
    }
}

/// What running one operation produced.
struct Execution {
    status: Result<OperationStatus, Failure>,
    attempts: u32,
}

impl Executor {
    /// Creates an executor with default concurrency, retries and the system
    /// clock.
    #[must_use]
    pub fn new(providers: ProviderRegistry, state: Arc<dyn StateStore>) -> Self {
        Self {
            providers,
            state,
            clock: Arc::new(SystemClock),
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }

    /// Creates an executor using the concurrency and retry settings of
    /// `config`.
    #[must_use]
    pub fn from_config(
        providers: ProviderRegistry,
        state: Arc<dyn StateStore>,
        config: &EngineConfig,
    ) -> Self {
        Self::new(providers, state)
            .with_concurrency(config.concurrency)
            .with_retry(RetryPolicy::from(&config.retry))
    }

    /// Sets the maximum number of operations in flight. Clamped to at least one.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sets the retry policy for transient provider errors.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the clock used to stamp records.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Applies `plan`.
    ///
    /// Never fails as a whole: every operation ends Applied, Failed, Skipped
    /// or NoOp in the returned report. Once `cancel` fires no new operation
    /// starts; those already running finish and are recorded.
    pub async fn apply(&self, plan: &Plan, cancel: &CancellationToken) -> RunReport {
        let ops = plan.operations();
        let mut outcomes: Vec<Option<OperationOutcome>> = vec![None; ops.len()];
        let mut pending: Vec<usize> = ops.iter().map(|op| op.depends_on().len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); ops.len()];
        for op in ops {
            for dep in op.depends_on() {
                dependents[dep.index()].push(op.id().index());
            }
        }

        let mut ready: VecDeque<usize> = (0..ops.len()).filter(|&i| pending[i] == 0).collect();
        let mut running = FuturesUnordered::new();

        tracing::info!(operations = ops.len(), concurrency = self.concurrency, "applying plan");

        loop {
            while running.len() < self.concurrency && !cancel.is_cancelled() {
                let Some(index) = ready.pop_front() else {
                    break;
                };
                let op = &ops[index];
                let span = tracing::info_span!(
                    "operation",
                    resource = %op.resource(),
                    kind = %op.kind(),
                );
                running.push(
                    async move { (index, self.run(op).await) }.instrument(span),
                );
            }

            let Some((index, execution)) = running.next().await else {
                break;
            };

            let op = &ops[index];
            let released = execution.status.is_ok();
            outcomes[index] = Some(outcome(op, execution));

            if released {
                for &dependent in &dependents[index] {
                    pending[dependent] -= 1;
                    if pending[dependent] == 0 {
                        ready.push_back(dependent);
                    }
                }
            } else {
                skip_dependents(ops, index, &dependents, &mut outcomes);
            }
        }

        let cancelled = cancel.is_cancelled();
        let outcomes: Vec<OperationOutcome> = ops
            .iter()
            .zip(outcomes)
            .map(|(op, outcome)| {
                outcome.unwrap_or_else(|| skipped(op, if cancelled { "cancelled" } else { "not reached" }))
            })
            .collect();

        let report = RunReport::new(outcomes, cancelled);
        tracing::info!(
            applied = report.count(OperationStatus::Applied),
            failed = report.count(OperationStatus::Failed),
            skipped = report.count(OperationStatus::Skipped),
            cancelled,
            "plan applied"
        );
        report
    }

    async fn run(&self, op: &Operation) -> Execution {
        let Some(provider) = self.providers.get(op.resource().kind()) else {
            return Execution {
                status: Err(Failure::new(
                    FailureKind::Provider,
                    format!("no provider registered for kind '{}'", op.resource().kind()),
                )),
                attempts: 0,
            };
        };

        let mut attempts = 0;
        let status = match op.action() {
            Action::None => Ok(OperationStatus::NoOp),
            Action::Create { desired } => self.create(op, provider.as_ref(), desired, None, &mut attempts).await,
            Action::CreateReplacement { replaces, desired } => {
                self.create(op, provider.as_ref(), desired, Some(replaces), &mut attempts)
                    .await
            }
            Action::Update {
                provider_id,
                desired,
            } => {
                self.update(op, provider.as_ref(), provider_id, desired, &mut attempts)
                    .await
            }
            Action::Delete { provider_id } => {
                self.delete(op, provider.as_ref(), provider_id, false, &mut attempts)
                    .await
            }
            Action::DestroyDeposed { provider_id } => {
                self.delete(op, provider.as_ref(), provider_id, true, &mut attempts)
                    .await
            }
        };

        match &status {
            Ok(status) => tracing::debug!(attempts, "{status}"),
            Err(failure) => tracing::warn!(attempts, failure = ?failure.kind, "{}", failure.detail),
        }
        Execution { status, attempts }
    }

    async fn create(
        &self,
        op: &Operation,
        provider: &dyn Provider,
        desired: &Attributes,
        replaces: Option<&ProviderId>,
        attempts: &mut u32,
    ) -> Result<OperationStatus, Failure> {
        let resolved = self.resolve(desired)?;
        let created = self
            .call_with_retry(attempts, || provider.create(&resolved))
            .await
            .map_err(|err| classify(err, *attempts))?;

        let mut deposed = self
            .state
            .load(op.resource())
            .map_err(|err| Failure::new(FailureKind::State, err))?
            .map(|record| record.deposed)
            .unwrap_or_default();
        if let Some(old) = replaces {
            deposed.push(old.clone());
        }

        let record = StateRecord::new(
            op.resource().clone(),
            created.id,
            created.attributes,
            self.clock.now(),
        )
        .with_dependencies(op.dependencies().iter().cloned())
        .with_deposed(deposed);
        self.save(&record)?;
        Ok(OperationStatus::Applied)
    }

    async fn update(
        &self,
        op: &Operation,
        provider: &dyn Provider,
        provider_id: &ProviderId,
        desired: &Attributes,
        attempts: &mut u32,
    ) -> Result<OperationStatus, Failure> {
        let resolved = self.resolve(desired)?;
        let Some(mut record) = self
            .state
            .load(op.resource())
            .map_err(|err| Failure::new(FailureKind::State, err))?
        else {
            return Err(Failure::new(FailureKind::Drift, "state record disappeared before update"));
        };

        // Referenced values known only now may match what is recorded.
        let diff = AttributeDiff::between(&record.attributes, &resolved);
        if diff.is_empty() {
            record.dependencies = op.dependencies().to_vec();
            self.save(&record)?;
            return Ok(OperationStatus::NoOp);
        }

        let result = self
            .call_with_retry(attempts, || provider.update(provider_id, &diff))
            .await;
        match result {
            Ok(attributes) => {
                record.attributes = attributes;
                record.refreshed_at = self.clock.now();
                record.dependencies = op.dependencies().to_vec();
                self.save(&record)?;
                Ok(OperationStatus::Applied)
            }
            Err(ProviderError::NotFound(_)) => {
                self.state
                    .remove(op.resource())
                    .map_err(|err| Failure::new(FailureKind::State, err))?;
                Err(Failure::new(
                    FailureKind::Drift,
                    format!("{provider_id} was deleted out-of-band; it will be recreated"),
                ))
            }
            Err(err) => Err(classify(err, *attempts)),
        }
    }

    async fn delete(
        &self,
        op: &Operation,
        provider: &dyn Provider,
        provider_id: &ProviderId,
        deposed: bool,
        attempts: &mut u32,
    ) -> Result<OperationStatus, Failure> {
        let result = self
            .call_with_retry(attempts, || provider.delete(provider_id))
            .await;
        match result {
            Ok(()) | Err(ProviderError::NotFound(_)) => {}
            Err(err) => return Err(classify(err, *attempts)),
        }

        if !deposed {
            self.state
                .remove(op.resource())
                .map_err(|err| Failure::new(FailureKind::State, err))?;
            return Ok(OperationStatus::Applied);
        }

        let record = self
            .state
            .load(op.resource())
            .map_err(|err| Failure::new(FailureKind::State, err))?;
        if let Some(mut record) = record {
            record.deposed.retain(|id| id != provider_id);
            self.save(&record)?;
        }
        Ok(OperationStatus::Applied)
    }

    /// Calls `call` until it succeeds, fails non-transiently, or runs out of
    /// attempts, sleeping between attempts.
    async fn call_with_retry<T, F, Fut>(&self, attempts: &mut u32, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        loop {
            *attempts += 1;
            match call().await {
                Err(err) if err.is_transient() && *attempts < self.retry.max_attempts() => {
                    let wait = self.retry.backoff(*attempts);
                    tracing::warn!(attempt = *attempts, wait_ms = wait.as_millis(), error = %err, "retrying");
                    tokio::time::sleep(wait).await;
                }
                result => return result,
            }
        }
    }

    /// Substitutes references from the referenced resources' records.
    fn resolve(&self, desired: &Attributes) -> Result<Attributes, Failure> {
        let mut outputs: HashMap<ResourceId, Attributes> = HashMap::new();
        for (_, reference) in Reference::parse_attributes(desired) {
            if outputs.contains_key(&reference.target) {
                continue;
            }
            let record = self
                .state
                .load(&reference.target)
                .map_err(|err| Failure::new(FailureKind::State, err))?;
            if let Some(record) = record {
                outputs.insert(reference.target, record.attributes);
            }
        }
        let lookup = |reference: &Reference| {
            outputs
                .get(&reference.target)
                .and_then(|attributes| reference.lookup_in(attributes))
        };
        resolve_attributes(desired, &lookup).map_err(|err| Failure::new(FailureKind::Unresolved, err))
    }

    fn save(&self, record: &StateRecord) -> Result<(), Failure> {
        self.state
            .save(record)
            .map_err(|err| Failure::new(FailureKind::State, err))
    }
}

fn classify(err: ProviderError, attempts: u32) -> Failure {
    let kind = match &err {
        ProviderError::Transient(_) => FailureKind::RetriesExhausted,
        ProviderError::UnsupportedUpdate { .. } => FailureKind::ReplacementRequired,
        ProviderError::NotFound(_) => FailureKind::Drift,
        ProviderError::Permanent(_) => FailureKind::Provider,
    };
    let detail = match kind {
        FailureKind::RetriesExhausted => format!("{err} (after {attempts} attempts)"),
        _ => err.to_string(),
    };
    Failure { kind, detail }
}

fn outcome(op: &Operation, execution: Execution) -> OperationOutcome {
    let (status, failure, detail) = match execution.status {
        Ok(status) => (status, None, None),
        Err(failure) => (OperationStatus::Failed, Some(failure.kind), Some(failure.detail)),
    };
    OperationOutcome {
        operation: op.id(),
        resource: op.resource().clone(),
        kind: op.kind(),
        status,
        attempts: execution.attempts,
        failure,
        detail,
    }
}

fn skipped(op: &Operation, reason: impl Into<String>) -> OperationOutcome {
    OperationOutcome {
        operation: op.id(),
        resource: op.resource().clone(),
        kind: op.kind(),
        status: OperationStatus::Skipped,
        attempts: 0,
        failure: None,
        detail: Some(reason.into()),
    }
}

/// Marks every not-yet-finished transitive dependent of `failed` Skipped.
fn skip_dependents(
    ops: &[Operation],
    failed: usize,
    dependents: &[Vec<usize>],
    outcomes: &mut [Option<OperationOutcome>],
) {
    let reason = format!("dependency {} failed", ops[failed].resource());
    let mut stack: Vec<usize> = dependents[failed].clone();
    while let Some(index) = stack.pop() {
        if outcomes[index].is_some() {
            continue;
        }
        outcomes[index] = Some(skipped(&ops[index], reason.clone()));
        stack.extend(&dependents[index]);
    }
}
