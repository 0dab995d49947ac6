//! # Reaction Engine
//!
//! Maintains a materialized, de-duplicated tabular snapshot per query from a
//! stream of row-level change notifications, and fans it out to live
//! consumers.
//!
//! ## Principles
//!
//! - **Identity comes from content** - rows carry no primary key
//! - **Delivery may repeat** - every change is safe to re-apply
//! - **Frames are derived** - rebuilt wholesale from the dataset, never patched
//! - **Reload is non-destructive on failure** - the dataset is only swapped once the whole snapshot decodes
//!
//! ## Architecture
//!
//! ```text
//! CHANGE:
//!   listener → decode → reconciler → dataset → projector → live hub
//!
//! RELOAD:
//!   listener.reload → fresh dataset → swap → projector → live hub
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use reaction_engine::{Engine, MemoryTransport, QueryId, TargetQuery};
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! rt.block_on(async {
//!     let transport = MemoryTransport::new();
//!     let query_id = QueryId::from("orders");
//!     transport.set_snapshot(&query_id, vec![serde_json::json!({"id": 1, "status": "new"})]);
//!
//!     let engine = Engine::new("mem://hub", Arc::new(transport.clone()));
//!     let mut stream = engine
//!         .query(TargetQuery::new("orders").with_snapshot_on_start(true).into())
//!         .await
//!         .unwrap();
//!
//!     // The initial reload arrives first, then the combined setup response.
//!     let reloaded = stream.recv().await.unwrap();
//!     assert_eq!(reloaded.data[0].row_count(), 1);
//!     let ready = stream.recv().await.unwrap();
//!     assert_eq!(ready.key, "orders");
//! });
//! ```
//!
//! ## Crate Structure
//!
//! - [`engine`] - The engine and its host-facing operations
//! - [`identity`] - Content-derived row keys
//! - [`dataset`] - Per-query datasets
//! - [`reconciler`] - Incremental change application
//! - [`projector`] - Dataset to frame projection
//! - [`live`] - Live consumers
//! - [`listener`] - Transport boundary
//! - [`transport`] - In-memory transport
//! - [`event`] - Change notification decoding
//! - [`types`] - Core types

pub mod dataset;
pub mod engine;
mod error;
pub mod event;
pub mod identity;
pub mod listener;
pub mod live;
pub mod projector;
pub mod reconciler;
pub mod transport;
pub mod types;

#[cfg(test)]
mod tests;

pub use dataset::{Dataset, DatasetStore, QuerySlot};
pub use engine::{
    Engine, HealthCheck, HealthStatus, QueryRequest, QueryStream, TargetQuery, DEFAULT_ENDPOINT,
};
pub use error::{ReactionError, ReactionResult};
pub use event::{ChangeEvent, ChangeKind, DecodeError, Op};
pub use identity::{derive_key, Djb2Identity, RowIdentity};
pub use listener::{ListenerFactory, ReactionListener, TransportError};
pub use live::{LiveHub, LoadingState, QueryResponse, ResponseError};
pub use projector::{project, Field, FieldType, Frame};
pub use reconciler::{Applied, Reconciler};
pub use transport::MemoryTransport;
pub use types::{ChangeSource, QueryId, Row, RowKey, Value};
