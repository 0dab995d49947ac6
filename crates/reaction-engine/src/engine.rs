//! The reaction engine.
//!
//! The [`Engine`] owns the three keyed collections: datasets, listeners and
//! live consumers. Hosts share it as `Arc<Engine>`.
//!
//! # Change Path (strict order)
//!
//! 1. Listener pushes a raw notification into its inbound channel
//! 2. The query's pump task locks the query slot
//! 3. Reconciler applies the event to the dataset
//! 4. If the dataset changed, the frame is rebuilt and pushed as `Done`
//!
//! # Reload Path
//!
//! 1. Lock the query slot (incremental events queue behind it)
//! 2. Ask the listener for the full row list
//! 3. Build a fresh dataset off to the side
//! 4. Swap it in, rebuild the frame, push it as `Done`
//!
//! A failure before step 4 leaves the dataset untouched.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dataset::{Dataset, DatasetStore, QuerySlot};
use crate::error::{ReactionError, ReactionResult};
use crate::listener::{ListenerFactory, NotificationReceiver, ReactionListener};
use crate::live::{Consumer, DetachHandle, LiveHub, QueryResponse};
use crate::projector::Frame;
use crate::reconciler::Reconciler;
use crate::types::{QueryId, Row};

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8002/hub";

/// Query ID of the throwaway listener built by health checks.
pub const HEALTH_CHECK_QUERY_ID: &str = "test";

/// Key of the error response sent when a request has no valid target.
pub const NO_TARGETS_KEY: &str = "error";

/// One target of a query request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetQuery {
    /// Label for the produced frame. Defaults to the query ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub query_id: QueryId,
    /// Reload the full snapshot before producing the first frame.
    #[serde(default)]
    pub snapshot_on_start: bool,
}

impl TargetQuery {
    pub fn new(query_id: impl Into<QueryId>) -> Self {
        Self {
            query_id: query_id.into(),
            ..Self::default()
        }
    }

    pub fn with_ref_id(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = Some(ref_id.into());
        self
    }

    pub fn with_snapshot_on_start(mut self, snapshot_on_start: bool) -> Self {
        self.snapshot_on_start = snapshot_on_start;
        self
    }

    fn effective_ref_id(&self) -> &str {
        self.ref_id
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(self.query_id.as_str())
    }
}

/// A batch of targets requested together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub targets: Vec<TargetQuery>,
}

impl QueryRequest {
    pub fn new(targets: Vec<TargetQuery>) -> Self {
        Self { targets }
    }
}

impl From<TargetQuery> for QueryRequest {
    fn from(target: TargetQuery) -> Self {
        Self::new(vec![target])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Success,
    Error,
}

/// Result of [`Engine::check_health`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub message: String,
}

impl HealthCheck {
    pub fn is_success(&self) -> bool {
        self.status == HealthStatus::Success
    }
}

struct ListenerEntry {
    listener: Arc<dyn ReactionListener>,
    pump: JoinHandle<()>,
}

/// The reaction engine.
pub struct Engine {
    endpoint: String,
    factory: Arc<dyn ListenerFactory>,
    reconciler: Reconciler,
    datasets: DatasetStore,
    listeners: Mutex<HashMap<QueryId, ListenerEntry>>,
    live: Arc<LiveHub>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("endpoint", &self.endpoint)
            .field("datasets", &self.datasets.len())
            .field("listeners", &self.listener_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Engine {
    /// Creates an engine that builds listeners for `endpoint` with `factory`.
    pub fn new(endpoint: impl Into<String>, factory: Arc<dyn ListenerFactory>) -> Arc<Self> {
        Self::with_reconciler(endpoint, factory, Reconciler::default())
    }

    /// Creates an engine with a custom reconciler (and so a custom row identity).
    pub fn with_reconciler(
        endpoint: impl Into<String>,
        factory: Arc<dyn ListenerFactory>,
        reconciler: Reconciler,
    ) -> Arc<Self> {
        let endpoint = endpoint.into();
        info!(endpoint = %endpoint, "Reaction engine created");
        Arc::new(Self {
            endpoint,
            factory,
            reconciler,
            datasets: DatasetStore::new(),
            listeners: Mutex::new(HashMap::new()),
            live: Arc::new(LiveHub::new()),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the template for a new target.
    pub fn default_query(&self) -> TargetQuery {
        TargetQuery::default()
    }

    /// Returns true if the target names a query.
    pub fn filter_query(&self, target: &TargetQuery) -> bool {
        !target.query_id.is_blank()
    }

    /// Opens a stream of responses for every valid target of `request`.
    ///
    /// Targets are set up in order. The first failure sends an `Error`
    /// response keyed by that target and stops; targets already set up stay
    /// attached. When every target succeeds a single `Streaming` response
    /// carrying all frames is sent, keyed by the comma-joined query IDs.
    pub async fn query(self: &Arc<Self>, request: QueryRequest) -> ReactionResult<QueryStream> {
        self.ensure_live()?;

        let (consumer, receiver) = Consumer::channel();
        let mut stream = QueryStream {
            receiver,
            handles: Vec::new(),
            live: self.live.clone(),
        };

        let active: Vec<&TargetQuery> = request
            .targets
            .iter()
            .filter(|t| self.filter_query(t))
            .collect();

        if active.is_empty() {
            debug!("Query request has no valid targets");
            consumer.send(QueryResponse::error(
                NO_TARGETS_KEY,
                ReactionError::NoValidTargets.to_string(),
            ));
            return Ok(stream);
        }

        let mut frames = Vec::with_capacity(active.len());
        for target in &active {
            let query_id = &target.query_id;
            stream.handles.push(self.live.attach(query_id, &consumer));

            match self.setup_target(target).await {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    let error = ReactionError::Setup {
                        query_id: query_id.clone(),
                        message: e.to_string(),
                    };
                    warn!(query_id = %query_id, error = %e, "Query setup failed");
                    consumer.send(QueryResponse::error(query_id.as_str(), error.to_string()));
                    return Ok(stream);
                }
            }
        }

        let key = active
            .iter()
            .map(|t| t.query_id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        info!(key = %key, targets = active.len(), "Query streaming");
        consumer.send(QueryResponse::streaming(frames, key));
        Ok(stream)
    }

    async fn setup_target(self: &Arc<Self>, target: &TargetQuery) -> ReactionResult<Frame> {
        let query_id = &target.query_id;
        let listener = self.listener(query_id)?;

        let slot = self.datasets.get_or_create(query_id);
        let mut slot = slot.lock().await;
        self.ensure_live()?;

        if target.snapshot_on_start {
            self.reload_locked(query_id, &mut slot, listener.as_ref())
                .await?;
        }
        Ok(slot.rebuild_frame(Some(target.effective_ref_id())))
    }

    /// Replaces the dataset of `query_id` with a fresh snapshot from its listener.
    ///
    /// On success every consumer of the query receives the new frame as `Done`.
    /// On failure the dataset is left as it was.
    pub async fn reload_snapshot(self: &Arc<Self>, query_id: &QueryId) -> ReactionResult<()> {
        self.ensure_live()?;
        let listener = self
            .listener(query_id)
            .map_err(|e| ReactionError::ReloadInitiate(e.to_string()))?;

        let slot = self.datasets.get_or_create(query_id);
        let mut slot = slot.lock().await;
        self.ensure_live()?;
        self.reload_locked(query_id, &mut slot, listener.as_ref())
            .await
    }

    async fn reload_locked(
        &self,
        query_id: &QueryId,
        slot: &mut QuerySlot,
        listener: &dyn ReactionListener,
    ) -> ReactionResult<()> {
        debug!(query_id = %query_id, "Reload requested");
        let rows = listener.reload().await.map_err(|e| {
            warn!(query_id = %query_id, error = %e, "Reload failed");
            ReactionError::ReloadInitiate(e.to_string())
        })?;

        let dataset = Dataset::from_json_rows(rows, self.reconciler.identity()).map_err(|e| {
            warn!(query_id = %query_id, error = %e, "Reload data rejected");
            ReactionError::ReloadProcessing(e.to_string())
        })?;
        self.ensure_live()?;

        let rows = dataset.len();
        slot.replace_dataset(dataset);
        let frame = slot.rebuild_frame(None);
        let delivered = self
            .live
            .notify(query_id, &QueryResponse::done(query_id, frame));
        info!(query_id = %query_id, rows, delivered, "Snapshot reloaded");
        Ok(())
    }

    /// Applies one raw notification to the dataset of `query_id`.
    ///
    /// Returns whether the dataset changed. Malformed notifications are
    /// ignored and report no change.
    pub async fn apply_notification(
        &self,
        query_id: &QueryId,
        raw: serde_json::Value,
    ) -> ReactionResult<bool> {
        self.ensure_live()?;
        let slot = self.datasets.get_or_create(query_id);
        let mut slot = slot.lock().await;
        self.ensure_live()?;

        let applied = self.reconciler.apply_notification(&mut slot.dataset, raw);
        if applied.changed {
            let frame = slot.rebuild_frame(None);
            let delivered = self
                .live
                .notify(query_id, &QueryResponse::done(query_id, frame));
            debug!(query_id = %query_id, rows = slot.dataset.len(), delivered, "Change applied");
        }
        Ok(applied.changed)
    }

    /// Probes the endpoint by building a throwaway listener.
    pub fn check_health(&self) -> HealthCheck {
        if self.is_disposed() {
            return HealthCheck {
                status: HealthStatus::Error,
                message: format!("Failed to connect: {}", ReactionError::Disposed),
            };
        }

        let (inbound, _discard) = mpsc::unbounded_channel();
        let query_id = QueryId::from(HEALTH_CHECK_QUERY_ID);
        match self.factory.create(&self.endpoint, &query_id, inbound) {
            Ok(_) => HealthCheck {
                status: HealthStatus::Success,
                message: "Successfully connected to reaction endpoint".to_string(),
            },
            Err(e) => HealthCheck {
                status: HealthStatus::Error,
                message: format!("Failed to connect: {e}"),
            },
        }
    }

    /// Tears everything down. Every later operation fails with
    /// [`ReactionError::Disposed`].
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let listeners: Vec<_> = self.listeners.lock().drain().collect();
        for (_, entry) in &listeners {
            entry.pump.abort();
        }
        self.datasets.clear();
        self.live.clear();
        info!(listeners = listeners.len(), "Reaction engine disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Returns the rows of `query_id` in dataset order.
    pub async fn rows(&self, query_id: &QueryId) -> Vec<Row> {
        match self.datasets.get(query_id) {
            Some(slot) => slot.lock().await.dataset.rows().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Returns the current frame of `query_id`, if it has a dataset.
    pub async fn frame(&self, query_id: &QueryId) -> Option<Frame> {
        let slot = self.datasets.get(query_id)?;
        let mut slot = slot.lock().await;
        Some(slot.frame())
    }

    /// Number of consumers attached to `query_id`.
    pub fn subscriber_count(&self, query_id: &QueryId) -> usize {
        self.live.consumer_count(query_id)
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Number of datasets.
    pub fn dataset_count(&self) -> usize {
        self.datasets.len()
    }

    fn ensure_live(&self) -> ReactionResult<()> {
        if self.is_disposed() {
            return Err(ReactionError::Disposed);
        }
        Ok(())
    }

    /// Returns the listener of `query_id`, creating it and its pump on first use.
    fn listener(self: &Arc<Self>, query_id: &QueryId) -> ReactionResult<Arc<dyn ReactionListener>> {
        let mut listeners = self.listeners.lock();
        if let Some(entry) = listeners.get(query_id) {
            return Ok(entry.listener.clone());
        }

        let (inbound, receiver) = mpsc::unbounded_channel();
        let listener = self.factory.create(&self.endpoint, query_id, inbound)?;
        let pump = spawn_pump(Arc::downgrade(self), query_id.clone(), receiver);
        listeners.insert(
            query_id.clone(),
            ListenerEntry {
                listener: listener.clone(),
                pump,
            },
        );
        info!(query_id = %query_id, "Listener created");
        Ok(listener)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        for entry in self.listeners.get_mut().values() {
            entry.pump.abort();
        }
    }
}

/// Drains one listener's notifications in arrival order.
fn spawn_pump(
    engine: Weak<Engine>,
    query_id: QueryId,
    mut inbound: NotificationReceiver,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(raw) = inbound.recv().await {
            let Some(engine) = engine.upgrade() else {
                break;
            };
            if engine.apply_notification(&query_id, raw).await.is_err() {
                break;
            }
        }
        debug!(query_id = %query_id, "Notification pump stopped");
    })
}

/// A consumer's view of one query request.
///
/// Dropping the stream detaches it from every query it was attached to.
#[derive(Debug)]
pub struct QueryStream {
    receiver: mpsc::UnboundedReceiver<QueryResponse>,
    handles: Vec<DetachHandle>,
    live: Arc<LiveHub>,
}

impl QueryStream {
    /// Waits for the next response. Returns `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<QueryResponse> {
        self.receiver.recv().await
    }

    /// Returns the next response if one is already queued.
    pub fn try_recv(&mut self) -> Option<QueryResponse> {
        self.receiver.try_recv().ok()
    }

    /// Query IDs this stream is attached to.
    pub fn query_ids(&self) -> impl Iterator<Item = &QueryId> + '_ {
        self.handles.iter().map(|h| h.query_id())
    }

    /// Detaches from every query. Queued responses can still be received.
    pub fn detach(&mut self) {
        for handle in self.handles.drain(..) {
            self.live.detach(&handle);
        }
    }
}

impl Drop for QueryStream {
    fn drop(&mut self) {
        self.detach();
    }
}
