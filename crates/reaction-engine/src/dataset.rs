//! Per-query datasets.
//!
//! A [`Dataset`] is the authoritative row set of one query: at most one row
//! per [`RowKey`], iterated in insertion order. Re-inserting an existing key
//! replaces the row but keeps its position.
//!
//! The [`DatasetStore`] maps query IDs to [`QuerySlot`]s. Each slot sits
//! behind its own async mutex, so one handler (an incremental apply, a reload,
//! or a target setup) runs to completion before the next one for the same
//! query starts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::identity::RowIdentity;
use crate::projector::{project, Frame};
use crate::types::{QueryId, Row, RowDecodeError, RowKey};

/// Insertion-ordered mapping of row key to row.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    entries: BTreeMap<u64, (RowKey, Row)>,
    positions: HashMap<RowKey, u64>,
    next_position: u64,
}

impl Dataset {
    /// Creates an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a dataset from rows, keying each with `identity`.
    pub fn from_rows(rows: impl IntoIterator<Item = Row>, identity: &dyn RowIdentity) -> Self {
        let mut dataset = Self::new();
        for row in rows {
            let key = identity.derive_key(&row);
            dataset.upsert(key, row);
        }
        dataset
    }

    /// Builds a dataset from raw JSON rows, failing on the first non-object.
    pub fn from_json_rows(
        rows: impl IntoIterator<Item = serde_json::Value>,
        identity: &dyn RowIdentity,
    ) -> Result<Self, RowDecodeError> {
        let rows = rows
            .into_iter()
            .map(Row::from_json)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_rows(rows, identity))
    }

    /// Inserts or replaces the row stored under `key`.
    ///
    /// Returns the previous row if the key was already present.
    pub fn upsert(&mut self, key: RowKey, row: Row) -> Option<Row> {
        if let Some(position) = self.positions.get(&key) {
            if let Some(entry) = self.entries.get_mut(position) {
                return Some(std::mem::replace(&mut entry.1, row));
            }
        }
        let position = self.next_position;
        self.next_position += 1;
        self.positions.insert(key.clone(), position);
        self.entries.insert(position, (key, row));
        None
    }

    /// Removes the row stored under `key`.
    pub fn remove(&mut self, key: &RowKey) -> Option<Row> {
        let position = self.positions.remove(key)?;
        self.entries.remove(&position).map(|(_, row)| row)
    }

    pub fn contains_key(&self, key: &RowKey) -> bool {
        self.positions.contains_key(key)
    }

    /// Finds the first row (in iteration order) that `partial` matches.
    ///
    /// This is a linear scan.
    pub fn find_matching(&self, partial: &Row, identity: &dyn RowIdentity) -> Option<&RowKey> {
        self.iter()
            .find(|(_, row)| identity.matches(row, partial))
            .map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(key, row)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&RowKey, &Row)> + '_ {
        self.entries.values().map(|(key, row)| (key, row))
    }

    /// Iterates rows in insertion order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.entries.values().map(|(_, row)| row)
    }

    /// Iterates keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &RowKey> + '_ {
        self.entries.values().map(|(key, _)| key)
    }
}

/// State of one query: its dataset and the cached frame built from it.
#[derive(Debug)]
pub struct QuerySlot {
    query_id: QueryId,
    pub dataset: Dataset,
    frame: Option<Frame>,
    ref_id: Option<String>,
}

impl QuerySlot {
    fn new(query_id: QueryId) -> Self {
        Self {
            query_id,
            dataset: Dataset::new(),
            frame: None,
            ref_id: None,
        }
    }

    /// Returns the cached frame, building it first if needed.
    pub fn frame(&mut self) -> Frame {
        match &self.frame {
            Some(frame) => frame.clone(),
            None => self.rebuild_frame(None),
        }
    }

    /// Rebuilds the frame from the current dataset.
    ///
    /// `ref_id` replaces the remembered result identifier; `None` keeps the
    /// previous one, falling back to the query ID.
    pub fn rebuild_frame(&mut self, ref_id: Option<&str>) -> Frame {
        if let Some(ref_id) = ref_id {
            self.ref_id = Some(ref_id.to_string());
        }
        let ref_id = self.ref_id.as_deref().unwrap_or(self.query_id.as_str());
        let frame = project(&self.dataset, ref_id);
        self.frame = Some(frame.clone());
        frame
    }

    /// Replaces the dataset wholesale and drops the cached frame.
    pub fn replace_dataset(&mut self, dataset: Dataset) {
        self.dataset = dataset;
        self.frame = None;
    }
}

/// Shared handle to a query slot.
pub type SlotHandle = Arc<Mutex<QuerySlot>>;

/// Map of query ID to query slot.
#[derive(Debug, Default)]
pub struct DatasetStore {
    slots: RwLock<HashMap<QueryId, SlotHandle>>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `query_id`, creating an empty one on first use.
    pub fn get_or_create(&self, query_id: &QueryId) -> SlotHandle {
        if let Some(slot) = self.slots.read().get(query_id) {
            return slot.clone();
        }
        self.slots
            .write()
            .entry(query_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(QuerySlot::new(query_id.clone()))))
            .clone()
    }

    /// Returns the slot for `query_id` if it exists.
    pub fn get(&self, query_id: &QueryId) -> Option<SlotHandle> {
        self.slots.read().get(query_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Drops every slot.
    pub fn clear(&self) {
        self.slots.write().clear();
    }
}
