//! Accessors for the DICOM JSON model.
//!
//! Records look like `{"00280010": {"vr": "US", "Value": [256]}}`. Numbers
//! may arrive as JSON numbers or, from lenient archives, as strings.

use serde_json::Value;

use super::tags::Tag;

/// The `Value` array of an element, if present.
pub fn values(record: &Value, tag: Tag) -> Option<&Vec<Value>> {
    record.get(tag.json_key())?.get("Value")?.as_array()
}

/// Whether the element is present, with or without a value.
pub fn has_element(record: &Value, tag: Tag) -> bool {
    record.get(tag.json_key()).is_some()
}

pub fn first_str(record: &Value, tag: Tag) -> Option<&str> {
    values(record, tag)?.first()?.as_str()
}

/// All string values of an element; non-strings are skipped.
pub fn strings(record: &Value, tag: Tag) -> Vec<&str> {
    values(record, tag)
        .map(|v| v.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn first_f64(record: &Value, tag: Tag) -> Option<f64> {
    as_f64(values(record, tag)?.first()?)
}

pub fn first_i64(record: &Value, tag: Tag) -> Option<i64> {
    let value = values(record, tag)?.first()?;
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn first_u64(record: &Value, tag: Tag) -> Option<u64> {
    first_i64(record, tag).and_then(|v| u64::try_from(v).ok())
}

/// All numeric values of an element.
pub fn f64s(record: &Value, tag: Tag) -> Vec<f64> {
    values(record, tag)
        .map(|v| v.iter().filter_map(as_f64).collect())
        .unwrap_or_default()
}

/// Sequence items of an element (empty when absent).
pub fn items(record: &Value, tag: Tag) -> &[Value] {
    values(record, tag).map(Vec::as_slice).unwrap_or(&[])
}
