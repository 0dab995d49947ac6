//! Change notifications as delivered by a reaction transport.
//!
//! Notifications arrive as loosely-typed JSON. [`ChangeEvent::decode`] turns
//! one into a closed enum whose variants carry exactly the payload their
//! operation requires. Anything that does not decode is a malformed event,
//! which the engine ignores.
//!
//! Wire shape:
//!
//! ```text
//! { "op": "i" | "u" | "d" | "x" | "h" | "r",
//!   "ts_ms": 1700000000000,
//!   "payload": { "source": { "queryId": "...", "ts_ms": ... },
//!                "before": { ... }, "after": { ... }, "kind": "..." } }
//! ```
//!
//! Only `op` and the payload fields its operation needs can make a
//! notification malformed. Timestamps and the source descriptor are read
//! best-effort.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{millis, ChangeSource, Row, RowDecodeError};

/// Operation code of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Insert,
    Update,
    Delete,
    ControlSignal,
    ReloadHeader,
    ReloadItem,
}

impl Op {
    /// Parses the single-letter wire code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "i" => Some(Op::Insert),
            "u" => Some(Op::Update),
            "d" => Some(Op::Delete),
            "x" => Some(Op::ControlSignal),
            "h" => Some(Op::ReloadHeader),
            "r" => Some(Op::ReloadItem),
            _ => None,
        }
    }

    /// Returns the single-letter wire code.
    pub fn code(&self) -> &'static str {
        match self {
            Op::Insert => "i",
            Op::Update => "u",
            Op::Delete => "d",
            Op::ControlSignal => "x",
            Op::ReloadHeader => "h",
            Op::ReloadItem => "r",
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Why a notification was rejected.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("notification is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown op code {0:?}")]
    UnknownOp(String),

    #[error("op {op} requires payload.{field}")]
    MissingField { op: Op, field: &'static str },

    #[error("payload.{field} is not a row: {source}")]
    InvalidRow {
        field: &'static str,
        #[source]
        source: RowDecodeError,
    },
}

/// Operation-specific content of a change event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    Insert { after: Row },
    Update { before: Row, after: Row },
    Delete { before: Row },
    ControlSignal { kind: String },
    ReloadHeader,
    ReloadItem { after: Option<Row> },
}

/// A decoded change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub source: Option<ChangeSource>,
    pub ts_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawNotification {
    op: String,
    #[serde(default)]
    ts_ms: Option<serde_json::Value>,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

impl ChangeEvent {
    /// Creates an event with no source metadata.
    pub fn new(kind: ChangeKind) -> Self {
        Self {
            kind,
            source: None,
            ts_ms: None,
        }
    }

    pub fn insert(after: Row) -> Self {
        Self::new(ChangeKind::Insert { after })
    }

    pub fn update(before: Row, after: Row) -> Self {
        Self::new(ChangeKind::Update { before, after })
    }

    pub fn delete(before: Row) -> Self {
        Self::new(ChangeKind::Delete { before })
    }

    /// Returns the operation of this event.
    pub fn op(&self) -> Op {
        match self.kind {
            ChangeKind::Insert { .. } => Op::Insert,
            ChangeKind::Update { .. } => Op::Update,
            ChangeKind::Delete { .. } => Op::Delete,
            ChangeKind::ControlSignal { .. } => Op::ControlSignal,
            ChangeKind::ReloadHeader => Op::ReloadHeader,
            ChangeKind::ReloadItem { .. } => Op::ReloadItem,
        }
    }

    /// Decodes a raw notification.
    ///
    /// `null` before/after payloads count as missing, as does a `kind`
    /// that is not a string.
    pub fn decode(value: serde_json::Value) -> Result<Self, DecodeError> {
        let raw: RawNotification = serde_json::from_value(value)?;
        let op = Op::from_code(&raw.op).ok_or_else(|| DecodeError::UnknownOp(raw.op.clone()))?;
        let mut payload = match raw.payload {
            Some(serde_json::Value::Object(fields)) => fields,
            _ => serde_json::Map::new(),
        };

        let kind = match op {
            Op::Insert => ChangeKind::Insert {
                after: required_row(op, "after", payload.remove("after"))?,
            },
            Op::Update => ChangeKind::Update {
                before: required_row(op, "before", payload.remove("before"))?,
                after: required_row(op, "after", payload.remove("after"))?,
            },
            Op::Delete => ChangeKind::Delete {
                before: required_row(op, "before", payload.remove("before"))?,
            },
            Op::ControlSignal => ChangeKind::ControlSignal {
                kind: payload
                    .get("kind")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
                    .ok_or(DecodeError::MissingField { op, field: "kind" })?,
            },
            Op::ReloadHeader => ChangeKind::ReloadHeader,
            Op::ReloadItem => ChangeKind::ReloadItem {
                after: optional_row("after", payload.remove("after"))?,
            },
        };

        Ok(Self {
            kind,
            source: payload.get("source").and_then(ChangeSource::from_json),
            ts_ms: raw.ts_ms.as_ref().and_then(millis),
        })
    }

    /// Decodes a notification from JSON text.
    pub fn decode_str(text: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Self::decode(value)
    }
}

fn required_row(
    op: Op,
    field: &'static str,
    value: Option<serde_json::Value>,
) -> Result<Row, DecodeError> {
    optional_row(field, value)?.ok_or(DecodeError::MissingField { op, field })
}

fn optional_row(
    field: &'static str,
    value: Option<serde_json::Value>,
) -> Result<Option<Row>, DecodeError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => Row::from_json(v)
            .map(Some)
            .map_err(|source| DecodeError::InvalidRow { field, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_insert_with_source() {
        let event = ChangeEvent::decode(json!({
            "op": "i",
            "ts_ms": 10,
            "seq": 3,
            "payload": {
                "source": {"queryId": "q1", "ts_ms": 9},
                "after": {"id": 1, "name": "a"}
            }
        }))
        .unwrap();

        assert_eq!(event.op(), Op::Insert);
        assert_eq!(event.ts_ms, Some(10));
        let source = event.source.as_ref().unwrap();
        assert_eq!(source.query_id.as_ref().unwrap().as_str(), "q1");
        assert_eq!(source.ts_ms, Some(9));
        match event.kind {
            ChangeKind::Insert { after } => assert_eq!(after.len(), 2),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn update_requires_both_sides() {
        let err = ChangeEvent::decode(json!({
            "op": "u",
            "payload": {"after": {"id": 1}}
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::MissingField {
                op: Op::Update,
                field: "before"
            }
        ));
    }

    #[test]
    fn null_payload_counts_as_missing() {
        let err = ChangeEvent::decode(json!({"op": "d", "payload": {"before": null}})).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "before", .. }));
    }

    #[test]
    fn missing_payload_is_rejected_for_changes() {
        assert!(ChangeEvent::decode(json!({"op": "i"})).is_err());
    }

    #[test]
    fn unknown_op_is_rejected() {
        let err = ChangeEvent::decode(json!({"op": "z"})).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownOp(code) if code == "z"));
    }

    #[test]
    fn non_object_row_is_rejected() {
        let err = ChangeEvent::decode(json!({"op": "i", "payload": {"after": 5}})).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidRow { field: "after", .. }));
    }

    #[test]
    fn control_and_reload_ops_decode() {
        let control = ChangeEvent::decode(json!({
            "op": "x",
            "payload": {"kind": "running", "source": {"queryId": "q", "ts_ms": 1}}
        }))
        .unwrap();
        assert_eq!(control.op(), Op::ControlSignal);

        let header = ChangeEvent::decode(json!({"op": "h"})).unwrap();
        assert_eq!(header.op(), Op::ReloadHeader);

        let item = ChangeEvent::decode(json!({"op": "r", "payload": {"after": {"a": 1}}})).unwrap();
        assert!(matches!(item.kind, ChangeKind::ReloadItem { after: Some(_) }));
    }

    #[test]
    fn odd_metadata_does_not_reject_a_change() {
        for raw in [
            json!({"op": "i", "ts_ms": 1700000000000.0, "payload": {"after": {"id": 1}}}),
            json!({"op": "i", "seq": -1, "payload": {"after": {"id": 2}}}),
            json!({"op": "i", "payload": {"source": {"ts_ms": 5}, "after": {"id": 3}}}),
            json!({"op": "i", "payload": {"source": {"queryId": "q", "ts_ms": 5.5}, "after": {"id": 4}}}),
            json!({"op": "i", "ts_ms": "soon", "payload": {"source": "q", "after": {"id": 5}}}),
        ] {
            let event = ChangeEvent::decode(raw.clone()).unwrap_or_else(|e| panic!("{raw}: {e}"));
            assert_eq!(event.op(), Op::Insert);
        }
    }

    #[test]
    fn metadata_is_read_best_effort() {
        let event = ChangeEvent::decode(json!({
            "op": "i",
            "ts_ms": 1700000000000.9,
            "payload": {"source": {"ts_ms": 5.5}, "after": {"id": 1}}
        }))
        .unwrap();
        assert_eq!(event.ts_ms, Some(1700000000000));
        assert_eq!(
            event.source,
            Some(ChangeSource {
                query_id: None,
                ts_ms: Some(5)
            })
        );

        let event = ChangeEvent::decode(json!({
            "op": "i",
            "ts_ms": "soon",
            "payload": {"source": "q", "after": {"id": 1}}
        }))
        .unwrap();
        assert_eq!(event.ts_ms, None);
        assert_eq!(event.source, None);
    }

    #[test]
    fn non_string_control_kind_is_missing() {
        let err = ChangeEvent::decode(json!({"op": "x", "payload": {"kind": 3}})).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { field: "kind", .. }));
    }

    #[test]
    fn decodes_from_text() {
        let event = ChangeEvent::decode_str(r#"{"op":"d","payload":{"before":{"id":2}}}"#).unwrap();
        assert_eq!(event.op(), Op::Delete);
        assert!(ChangeEvent::decode_str("not json").is_err());
    }

    #[test]
    fn op_codes_round_trip() {
        for op in [
            Op::Insert,
            Op::Update,
            Op::Delete,
            Op::ControlSignal,
            Op::ReloadHeader,
            Op::ReloadItem,
        ] {
            assert_eq!(Op::from_code(op.code()), Some(op));
        }
    }
}
