//! Incremental application of change events to a dataset.
//!
//! # Rules
//!
//! - Insert upserts `after` under its derived key
//! - Update removes the first row matching `before` (if any), then upserts `after`
//! - Delete removes the first row matching `before`; no match is a no-op
//! - Control and reload events never mutate
//!
//! Delivery may be duplicated, so every rule is safe to re-apply.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::dataset::Dataset;
use crate::event::{ChangeEvent, ChangeKind};
use crate::identity::{Djb2Identity, RowIdentity};

/// Outcome of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// True if the dataset was mutated and its frame must be rebuilt.
    pub changed: bool,
}

impl Applied {
    const CHANGED: Applied = Applied { changed: true };
    const UNCHANGED: Applied = Applied { changed: false };
}

/// Applies change events to datasets.
#[derive(Clone)]
pub struct Reconciler {
    identity: Arc<dyn RowIdentity>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Arc::new(Djb2Identity))
    }
}

impl Reconciler {
    /// Creates a reconciler with the given identity strategy.
    pub fn new(identity: Arc<dyn RowIdentity>) -> Self {
        Self { identity }
    }

    /// Returns the identity strategy used for keys and matching.
    pub fn identity(&self) -> &dyn RowIdentity {
        self.identity.as_ref()
    }

    /// Applies one decoded event to `dataset`.
    pub fn apply(&self, dataset: &mut Dataset, event: &ChangeEvent) -> Applied {
        match &event.kind {
            ChangeKind::Insert { after } => {
                let key = self.identity.derive_key(after);
                dataset.upsert(key, after.clone());
                Applied::CHANGED
            }
            ChangeKind::Update { before, after } => {
                if let Some(key) = dataset.find_matching(before, self.identity()).cloned() {
                    dataset.remove(&key);
                }
                let key = self.identity.derive_key(after);
                dataset.upsert(key, after.clone());
                Applied::CHANGED
            }
            ChangeKind::Delete { before } => {
                let matched = dataset.find_matching(before, self.identity()).cloned();
                match matched {
                    Some(key) => {
                        dataset.remove(&key);
                        Applied::CHANGED
                    }
                    None => Applied::UNCHANGED,
                }
            }
            ChangeKind::ControlSignal { .. }
            | ChangeKind::ReloadHeader
            | ChangeKind::ReloadItem { .. } => Applied::UNCHANGED,
        }
    }

    /// Decodes a raw notification and applies it.
    ///
    /// Notifications that fail to decode are dropped.
    pub fn apply_notification(&self, dataset: &mut Dataset, raw: serde_json::Value) -> Applied {
        match ChangeEvent::decode(raw) {
            Ok(event) => {
                let applied = self.apply(dataset, &event);
                trace!(
                    op = %event.op(),
                    source = ?event.source.as_ref().and_then(|s| s.query_id.as_ref()),
                    ts_ms = ?event.ts_ms,
                    changed = applied.changed,
                    "Notification applied"
                );
                applied
            }
            Err(e) => {
                debug!(error = %e, "Ignoring malformed notification");
                Applied::UNCHANGED
            }
        }
    }
}
