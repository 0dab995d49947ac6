//! In-process transport.
//!
//! [`MemoryTransport`] stands in for a network hub: notifications are pushed
//! by the caller, snapshots are configured per query, and failures can be
//! injected. It backs the CLI replay command and the engine tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::listener::{ListenerFactory, NotificationSender, ReactionListener, TransportError};
use crate::types::QueryId;

#[derive(Default)]
struct HubState {
    channels: HashMap<QueryId, Vec<NotificationSender>>,
    snapshots: HashMap<QueryId, Vec<serde_json::Value>>,
    reload_failures: HashMap<QueryId, String>,
    reload_calls: HashMap<QueryId, usize>,
    connect_failure: Option<String>,
    reload_gate: Option<Arc<Semaphore>>,
    created: usize,
}

/// A listener factory whose hub lives in memory.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<HubState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a raw notification to every listener of `query_id`.
    ///
    /// Returns the number of listeners that received it.
    pub fn push(&self, query_id: &QueryId, notification: serde_json::Value) -> usize {
        let mut state = self.state.lock();
        let Some(channels) = state.channels.get_mut(query_id) else {
            return 0;
        };
        channels.retain(|tx| tx.send(notification.clone()).is_ok());
        channels.len()
    }

    /// Sets the rows returned by the next reloads of `query_id`.
    pub fn set_snapshot(&self, query_id: &QueryId, rows: Vec<serde_json::Value>) {
        self.state.lock().snapshots.insert(query_id.clone(), rows);
    }

    /// Makes reloads of `query_id` fail with `message`.
    pub fn fail_reload(&self, query_id: &QueryId, message: impl Into<String>) {
        self.state
            .lock()
            .reload_failures
            .insert(query_id.clone(), message.into());
    }

    /// Lets reloads of `query_id` succeed again.
    pub fn clear_reload_failure(&self, query_id: &QueryId) {
        self.state.lock().reload_failures.remove(query_id);
    }

    /// Makes listener construction fail with `message`.
    pub fn fail_connect(&self, message: impl Into<String>) {
        self.state.lock().connect_failure = Some(message.into());
    }

    /// Lets listener construction succeed again.
    pub fn restore_connect(&self) {
        self.state.lock().connect_failure = None;
    }

    /// Parks every reload until [`MemoryTransport::release_reloads`] is called.
    pub fn hold_reloads(&self) {
        self.state.lock().reload_gate = Some(Arc::new(Semaphore::new(0)));
    }

    /// Wakes every parked reload.
    pub fn release_reloads(&self) {
        if let Some(gate) = self.state.lock().reload_gate.take() {
            gate.close();
        }
    }

    /// Number of listeners constructed so far.
    pub fn listener_count(&self) -> usize {
        self.state.lock().created
    }

    /// Number of reloads requested for `query_id`.
    pub fn reload_count(&self, query_id: &QueryId) -> usize {
        self.state
            .lock()
            .reload_calls
            .get(query_id)
            .copied()
            .unwrap_or(0)
    }
}

impl ListenerFactory for MemoryTransport {
    fn create(
        &self,
        endpoint: &str,
        query_id: &QueryId,
        inbound: NotificationSender,
    ) -> Result<Arc<dyn ReactionListener>, TransportError> {
        let mut state = self.state.lock();
        if let Some(message) = &state.connect_failure {
            return Err(TransportError::Connect(message.clone()));
        }

        state
            .channels
            .entry(query_id.clone())
            .or_default()
            .push(inbound);
        state.created += 1;
        debug!(endpoint, query_id = %query_id, "Memory listener created");

        Ok(Arc::new(MemoryListener {
            query_id: query_id.clone(),
            state: self.state.clone(),
        }))
    }
}

struct MemoryListener {
    query_id: QueryId,
    state: Arc<Mutex<HubState>>,
}

#[async_trait]
impl ReactionListener for MemoryListener {
    async fn reload(&self) -> Result<Vec<serde_json::Value>, TransportError> {
        let gate = {
            let mut state = self.state.lock();
            *state.reload_calls.entry(self.query_id.clone()).or_default() += 1;
            state.reload_gate.clone()
        };
        if let Some(gate) = gate {
            // Closing the gate is the release signal.
            let _ = gate.acquire().await;
        }

        let state = self.state.lock();
        if let Some(message) = state.reload_failures.get(&self.query_id) {
            return Err(TransportError::Reload(message.clone()));
        }
        Ok(state
            .snapshots
            .get(&self.query_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn push_reaches_listeners_of_the_query() {
        let transport = MemoryTransport::new();
        let q1 = QueryId::from("q1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.create("mem://", &q1, tx).unwrap();

        assert_eq!(transport.push(&q1, json!({"op": "x"})), 1);
        assert_eq!(transport.push(&QueryId::from("q2"), json!({"op": "x"})), 0);
        assert_eq!(rx.recv().await.unwrap(), json!({"op": "x"}));
    }

    #[tokio::test]
    async fn reload_returns_snapshot_or_failure() {
        let transport = MemoryTransport::new();
        let q1 = QueryId::from("q1");
        let (tx, _rx) = mpsc::unbounded_channel();
        let listener = transport.create("mem://", &q1, tx).unwrap();

        assert!(listener.reload().await.unwrap().is_empty());

        transport.set_snapshot(&q1, vec![json!({"id": 1})]);
        assert_eq!(listener.reload().await.unwrap().len(), 1);

        transport.fail_reload(&q1, "hub offline");
        assert_eq!(
            listener.reload().await.unwrap_err(),
            TransportError::Reload("hub offline".to_string())
        );
        assert_eq!(transport.reload_count(&q1), 3);
    }

    #[test]
    fn connect_failure_is_reported() {
        let transport = MemoryTransport::new();
        transport.fail_connect("refused");
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = transport.create("mem://", &QueryId::from("q"), tx).err().unwrap();
        assert_eq!(err.to_string(), "refused");
        assert_eq!(transport.listener_count(), 0);

        transport.restore_connect();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(transport.create("mem://", &QueryId::from("q"), tx).is_ok());
        assert_eq!(transport.listener_count(), 1);
    }
}
