//! Transport boundary.
//!
//! A [`ReactionListener`] is one connection to the reaction hub for one
//! query. It pushes raw change notifications into the inbound channel it was
//! created with and answers on-demand reload requests with the query's
//! complete current row list.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::QueryId;

/// Channel a listener pushes raw notifications into.
pub type NotificationSender = mpsc::UnboundedSender<serde_json::Value>;

/// Receiving end of a listener's notification channel.
pub type NotificationReceiver = mpsc::UnboundedReceiver<serde_json::Value>;

/// Transport failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The listener could not be constructed or connected.
    #[error("{0}")]
    Connect(String),

    /// The hub refused or failed a reload request.
    #[error("{0}")]
    Reload(String),

    #[error("listener closed")]
    Closed,
}

/// A live connection for one query.
#[async_trait]
pub trait ReactionListener: Send + Sync {
    /// Requests the full current result set of the query.
    async fn reload(&self) -> Result<Vec<serde_json::Value>, TransportError>;
}

/// Constructs listeners.
pub trait ListenerFactory: Send + Sync {
    /// Connects a listener for `query_id` that pushes notifications into `inbound`.
    fn create(
        &self,
        endpoint: &str,
        query_id: &QueryId,
        inbound: NotificationSender,
    ) -> Result<Arc<dyn ReactionListener>, TransportError>;
}
