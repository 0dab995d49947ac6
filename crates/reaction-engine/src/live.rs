//! Live subscriptions for the reaction engine.
//!
//! The [`LiveHub`] fans committed frames out to every consumer attached to a
//! query.
//!
//! # Design Principles
//!
//! - Consumers are notified after the dataset change is committed
//! - One logical consumer may be attached to many queries
//! - Detaching never tears down a dataset or listener

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::projector::Frame;
use crate::types::QueryId;

/// State tag carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum LoadingState {
    /// A batch setup finished and live updates will follow.
    Streaming,
    /// A full replacement frame produced by a change or reload.
    Done,
    /// Setup failed.
    Error,
}

/// Error attached to an `Error` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseError {
    pub message: String,
}

/// One message delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub data: Vec<Frame>,
    pub state: LoadingState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    pub key: String,
}

impl QueryResponse {
    /// A replacement frame for one query.
    pub fn done(query_id: &QueryId, frame: Frame) -> Self {
        Self {
            data: vec![frame],
            state: LoadingState::Done,
            error: None,
            key: query_id.to_string(),
        }
    }

    /// The combined response of a successful batch setup.
    pub fn streaming(frames: Vec<Frame>, key: impl Into<String>) -> Self {
        Self {
            data: frames,
            state: LoadingState::Streaming,
            error: None,
            key: key.into(),
        }
    }

    /// An error response with no data.
    pub fn error(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            data: Vec::new(),
            state: LoadingState::Error,
            error: Some(ResponseError {
                message: message.into(),
            }),
            key: key.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.state == LoadingState::Error
    }
}

/// Identity of one logical consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(Uuid);

impl ConsumerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sending half of a consumer, cloned into every query list it joins.
#[derive(Debug, Clone)]
pub struct Consumer {
    id: ConsumerId,
    sender: mpsc::UnboundedSender<QueryResponse>,
}

impl Consumer {
    /// Creates a consumer and the receiver its responses arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<QueryResponse>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let consumer = Self {
            id: ConsumerId::new(),
            sender,
        };
        (consumer, receiver)
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Sends a response directly to this consumer.
    ///
    /// Returns false if the receiver is gone.
    pub fn send(&self, response: QueryResponse) -> bool {
        self.sender.send(response).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Token returned by [`LiveHub::attach`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachHandle {
    query_id: QueryId,
    consumer_id: ConsumerId,
}

impl DetachHandle {
    pub fn query_id(&self) -> &QueryId {
        &self.query_id
    }

    pub fn consumer_id(&self) -> ConsumerId {
        self.consumer_id
    }
}

/// A hub that manages live consumers for all queries.
#[derive(Debug, Default)]
pub struct LiveHub {
    /// Map of query ID to its ordered consumer list
    consumers: RwLock<HashMap<QueryId, Vec<Consumer>>>,
}

impl LiveHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `consumer` to the consumer list of `query_id`.
    pub fn attach(&self, query_id: &QueryId, consumer: &Consumer) -> DetachHandle {
        self.consumers
            .write()
            .entry(query_id.clone())
            .or_default()
            .push(consumer.clone());

        DetachHandle {
            query_id: query_id.clone(),
            consumer_id: consumer.id,
        }
    }

    /// Delivers `response` to every consumer of `query_id`.
    ///
    /// Consumers whose receiver has been dropped are pruned. Returns the
    /// number of consumers the response reached.
    pub fn notify(&self, query_id: &QueryId, response: &QueryResponse) -> usize {
        let mut consumers = self.consumers.write();
        let Some(list) = consumers.get_mut(query_id) else {
            return 0;
        };

        list.retain(|consumer| consumer.send(response.clone()));
        let delivered = list.len();
        if list.is_empty() {
            consumers.remove(query_id);
        }
        delivered
    }

    /// Removes the consumer named by `handle` from its query's list.
    ///
    /// An emptied list is removed. Detaching twice is a no-op.
    pub fn detach(&self, handle: &DetachHandle) {
        let mut consumers = self.consumers.write();
        if let Some(list) = consumers.get_mut(&handle.query_id) {
            list.retain(|consumer| consumer.id != handle.consumer_id);
            if list.is_empty() {
                consumers.remove(&handle.query_id);
            }
        }
    }

    /// Returns the number of consumers attached to `query_id`.
    ///
    /// May include dead consumers not yet pruned by a notify.
    pub fn consumer_count(&self, query_id: &QueryId) -> usize {
        self.consumers
            .read()
            .get(query_id)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    /// Returns the number of queries with at least one consumer.
    pub fn query_count(&self) -> usize {
        self.consumers.read().len()
    }

    /// Drops every consumer list, closing their channels.
    pub fn clear(&self) {
        self.consumers.write().clear();
    }
}
