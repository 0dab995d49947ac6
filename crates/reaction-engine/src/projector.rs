//! Column-oriented projection of a dataset.

use serde::Serialize;

use crate::dataset::Dataset;
use crate::types::Value;

/// Name of the placeholder column used for empty datasets.
pub const PLACEHOLDER_FIELD: &str = "id";

/// Inferred type of a frame column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Time,
}

/// One column of a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub values: Vec<Value>,
}

/// A renderer-ready, column-oriented view of a dataset.
///
/// Every field holds the same number of values, in the same row order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub ref_id: String,
    pub name: String,
    pub fields: Vec<Field>,
}

impl Frame {
    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Number of rows in the frame.
    pub fn row_count(&self) -> usize {
        self.fields.first().map(|f| f.values.len()).unwrap_or(0)
    }

    /// Field names in column order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Projects `dataset` into a frame labelled with `ref_id`.
///
/// The first row in iteration order defines the columns and their types;
/// later rows are not inspected for schema, and a missing field becomes null.
pub fn project(dataset: &Dataset, ref_id: &str) -> Frame {
    let Some(first) = dataset.rows().next() else {
        return Frame {
            ref_id: ref_id.to_string(),
            name: format!("Query {ref_id} (empty)"),
            fields: vec![Field {
                name: PLACEHOLDER_FIELD.to_string(),
                field_type: FieldType::String,
                values: Vec::new(),
            }],
        };
    };

    let fields = first
        .iter()
        .map(|(name, sample)| Field {
            name: name.to_string(),
            field_type: infer_field_type(name, sample),
            values: dataset
                .rows()
                .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
                .collect(),
        })
        .collect();

    Frame {
        ref_id: ref_id.to_string(),
        name: format!("Query {ref_id}"),
        fields,
    }
}

/// Infers a column type from its name and first sampled value.
pub fn infer_field_type(name: &str, sample: &Value) -> FieldType {
    match sample {
        Value::Timestamp(_) => FieldType::Time,
        Value::Number(_) => FieldType::Number,
        Value::Bool(_) => FieldType::Boolean,
        _ if looks_temporal(name) => FieldType::Time,
        _ => FieldType::String,
    }
}

fn looks_temporal(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("time") || lower.contains("date")
}
