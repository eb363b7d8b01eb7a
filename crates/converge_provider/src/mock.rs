//! In-memory provider for tests and demos.
//!
//! [`MockProvider`] keeps resources in a map, records every call, and can be
//! scripted to fail so retry, skip and replacement paths are exercisable
//! without a real backend.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use converge_graph::{AttributeDiff, Attributes};
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::ProviderError;
use crate::provider::{Created, Provider, ProviderId};

/// Provider operation, used to script failures and inspect calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    /// [`Provider::create`].
    Create,
    /// [`Provider::read`].
    Read,
    /// [`Provider::update`].
    Update,
    /// [`Provider::delete`].
    Delete,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    /// Which operation was called.
    pub op: MockOp,
    /// Target id; `None` for creates.
    pub id: Option<ProviderId>,
    /// Desired attributes for creates, new values for updates.
    pub attributes: Attributes,
}

/// In-memory [`Provider`] with scripted failures.
///
/// Created resources get ids `"{kind}-{n}"` and two computed outputs, `id`
/// and `arn`, alongside the desired attributes.
#[derive(Debug)]
pub struct MockProvider {
    kind: String,
    replace_on: HashSet<String>,
    create_before_destroy: bool,
    latency: Option<Duration>,
    next_id: AtomicU64,
    resources: Mutex<BTreeMap<ProviderId, Attributes>>,
    scripted: Mutex<HashMap<MockOp, VecDeque<ProviderError>>>,
    always: Mutex<HashMap<MockOp, ProviderError>>,
    calls: Mutex<Vec<MockCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    /// Creates an empty provider for `kind`.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            replace_on: HashSet::new(),
            create_before_destroy: true,
            latency: None,
            next_id: AtomicU64::new(1),
            resources: Mutex::new(BTreeMap::new()),
            scripted: Mutex::new(HashMap::new()),
            always: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Kind this provider was created for.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Attributes whose change requires a replacement.
    #[must_use]
    pub fn with_replace_on<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replace_on.extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Sets the value returned by [`Provider::create_before_destroy`].
    #[must_use]
    pub fn with_create_before_destroy(mut self, enabled: bool) -> Self {
        self.create_before_destroy = enabled;
        self
    }

    /// Delays every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fails the next call of `op` with `error`. Queued errors are used in
    /// order before any [`fail_always`](Self::fail_always) error.
    pub fn fail_next(&self, op: MockOp, error: ProviderError) {
        self.scripted.lock().entry(op).or_default().push_back(error);
    }

    /// Fails every call of `op` with `error`.
    pub fn fail_always(&self, op: MockOp, error: ProviderError) {
        self.always.lock().insert(op, error);
    }

    /// Stops failing `op`.
    pub fn clear_failures(&self, op: MockOp) {
        self.scripted.lock().remove(&op);
        self.always.lock().remove(&op);
    }

    /// Seeds an existing resource, as if created outside this run.
    pub fn insert(&self, attributes: Attributes) -> ProviderId {
        let id = self.allocate_id();
        self.resources.lock().insert(id.clone(), attributes);
        id
    }

    /// Deletes a resource out-of-band.
    pub fn remove(&self, id: &ProviderId) -> Option<Attributes> {
        self.resources.lock().remove(id)
    }

    /// Changes one attribute out-of-band.
    pub fn set_attribute(&self, id: &ProviderId, name: impl Into<String>, value: Value) {
        if let Some(attributes) = self.resources.lock().get_mut(id) {
            attributes.insert(name.into(), value);
        }
    }

    /// Returns a resource's current attributes.
    #[must_use]
    pub fn get(&self, id: &ProviderId) -> Option<Attributes> {
        self.resources.lock().get(id).cloned()
    }

    /// Ids of all live resources.
    #[must_use]
    pub fn ids(&self) -> Vec<ProviderId> {
        self.resources.lock().keys().cloned().collect()
    }

    /// Number of live resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.lock().len()
    }

    /// Returns true if no resource is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.lock().is_empty()
    }

    /// All recorded calls, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls of `op`.
    #[must_use]
    pub fn call_count(&self, op: MockOp) -> usize {
        self.calls.lock().iter().filter(|call| call.op == op).count()
    }

    /// Highest number of calls that were in progress at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> ProviderId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        ProviderId::new(format!("{}-{n}", self.kind))
    }

    fn scripted_failure(&self, op: MockOp) -> Option<ProviderError> {
        if let Some(error) = self.scripted.lock().get_mut(&op).and_then(VecDeque::pop_front) {
            return Some(error);
        }
        self.always.lock().get(&op).cloned()
    }

    /// Records the call, waits out the latency and returns any scripted error.
    async fn enter(
        &self,
        op: MockOp,
        id: Option<&ProviderId>,
        attributes: Attributes,
    ) -> Result<(), ProviderError> {
        self.calls.lock().push(MockCall {
            op,
            id: id.cloned(),
            attributes,
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.scripted_failure(op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn create(&self, desired: &Attributes) -> Result<Created, ProviderError> {
        self.enter(MockOp::Create, None, desired.clone()).await?;

        let id = self.allocate_id();
        let mut attributes = desired.clone();
        attributes.insert("id".to_owned(), Value::String(id.to_string()));
        attributes.insert(
            "arn".to_owned(),
            Value::String(format!("arn:mock:{}:{id}", self.kind)),
        );
        self.resources.lock().insert(id.clone(), attributes.clone());

        tracing::trace!(kind = %self.kind, id = %id, "mock resource created");
        Ok(Created { id, attributes })
    }

    async fn read(&self, id: &ProviderId) -> Result<Attributes, ProviderError> {
        self.enter(MockOp::Read, Some(id), Attributes::new()).await?;
        self.get(id).ok_or_else(|| ProviderError::NotFound(id.clone()))
    }

    async fn update(
        &self,
        id: &ProviderId,
        diff: &AttributeDiff,
    ) -> Result<Attributes, ProviderError> {
        self.enter(MockOp::Update, Some(id), diff.to_attributes())
            .await?;

        let blocked: Vec<String> = diff
            .names()
            .filter(|name| self.replace_on.contains(*name))
            .map(str::to_owned)
            .collect();
        if !blocked.is_empty() {
            return Err(ProviderError::UnsupportedUpdate {
                attributes: blocked,
            });
        }

        let mut resources = self.resources.lock();
        let attributes = resources
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(id.clone()))?;
        attributes.extend(diff.to_attributes());
        Ok(attributes.clone())
    }

    async fn delete(&self, id: &ProviderId) -> Result<(), ProviderError> {
        self.enter(MockOp::Delete, Some(id), Attributes::new()).await?;
        self.resources.lock().remove(id);
        Ok(())
    }

    fn requires_replacement(&self, attribute: &str) -> bool {
        self.replace_on.contains(attribute)
    }

    fn create_before_destroy(&self) -> bool {
        self.create_before_destroy
    }
}
