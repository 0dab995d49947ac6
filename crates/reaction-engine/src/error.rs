//! Error types for the reaction engine.

use thiserror::Error;

use crate::listener::TransportError;
use crate::types::QueryId;

/// Reaction engine error type.
///
/// Every variant renders a human-readable message; callers surface the
/// message as-is and decide whether to retry.
#[derive(Error, Debug, Clone)]
pub enum ReactionError {
    /// A single target's listener or initial reload could not be set up.
    #[error("Failed to setup query \"{query_id}\": {message}")]
    Setup { query_id: QueryId, message: String },

    /// The transport refused or failed the reload call.
    #[error("Failed to initiate reload: {0}")]
    ReloadInitiate(String),

    /// The reload returned data that could not be turned into rows.
    #[error("Failed to process reload data: {0}")]
    ReloadProcessing(String),

    /// A query request carried no target with a non-blank query ID.
    #[error("No valid query IDs provided")]
    NoValidTargets,

    /// The engine has been disposed.
    #[error("Engine has been disposed")]
    Disposed,

    /// Listener construction failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result type for reaction engine operations.
pub type ReactionResult<T> = Result<T, ReactionError>;
