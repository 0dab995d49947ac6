//! Content-derived row identity.
//!
//! Rows carry no primary key, so identity comes from the row's content:
//! field names are sorted, each field is rendered as `name:json(value)`, the
//! parts are joined with `|`, and the result is hashed with djb2 over UTF-16
//! code units (32-bit wraparound). The absolute hash in base-36 is the key.
//!
//! djb2 is not collision resistant. Two distinct rows can share a key, in
//! which case the later one replaces the earlier one in its dataset.

use chrono::SecondsFormat;

use crate::types::{Row, RowKey, Value};

const DJB2_SEED: i32 = 5381;
const FIELD_SEPARATOR: &str = "|";

/// Strategy for deriving row identity and matching partial rows.
pub trait RowIdentity: Send + Sync {
    /// Derives the key of a row. Must be pure and independent of field order.
    fn derive_key(&self, row: &Row) -> RowKey;

    /// Returns true if every field of `partial` is present in `existing`
    /// with an equal value. Extra fields in `existing` are ignored.
    fn matches(&self, existing: &Row, partial: &Row) -> bool {
        matches(existing, partial)
    }
}

/// The default canonicalize-then-djb2 identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct Djb2Identity;

impl RowIdentity for Djb2Identity {
    fn derive_key(&self, row: &Row) -> RowKey {
        derive_key(row)
    }
}

/// Derives a row key with [`Djb2Identity`].
pub fn derive_key(row: &Row) -> RowKey {
    let hash = djb2(&canonical_string(row));
    RowKey(to_base36(i64::from(hash).unsigned_abs()))
}

/// Subset match of `partial` against `existing`.
pub fn matches(existing: &Row, partial: &Row) -> bool {
    partial
        .iter()
        .all(|(name, value)| existing.get(name) == Some(value))
}

/// Renders the canonical `name:json|name:json` form with names sorted by
/// UTF-16 code unit, the order JavaScript's default sort uses.
pub fn canonical_string(row: &Row) -> String {
    let mut fields: Vec<(&str, &Value)> = row.iter().collect();
    fields.sort_by(|a, b| a.0.encode_utf16().cmp(b.0.encode_utf16()));
    fields
        .into_iter()
        .map(|(name, value)| format!("{}:{}", name, canonical_json(value)))
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

/// JSON rendering of a single value, matching JavaScript's `JSON.stringify`.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => canonical_number(*n),
        Value::String(s) => quote(s),
        Value::Timestamp(ts) => quote(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        Value::Json(v) => v.to_string(),
    }
}

fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn canonical_number(n: f64) -> String {
    if !n.is_finite() {
        return "null".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if magnitude >= 1e21 || magnitude < 1e-6 {
        // JavaScript switches to exponent form here and always signs the exponent.
        let rendered = format!("{:e}", n);
        return match rendered.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => rendered,
        };
    }
    if n.fract() == 0.0 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

fn djb2(input: &str) -> i32 {
    input.encode_utf16().fold(DJB2_SEED, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_add(hash)
            .wrapping_add(i32::from(unit))
    })
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
