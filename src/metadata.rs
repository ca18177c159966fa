//! Flattening of DICOM JSON records for metadata reporting.
//!
//! ```text
//! {"00100010": {"vr": "PN", "Value": [{"Alphabetic": "Doe^Jane"}]}}
//!     ──► {"PatientName": "Doe^Jane"}
//! ```
//!
//! Binary elements, bulk data references and empty elements are dropped.
//! Sequences become lists of flattened items.

use serde_json::{Map, Value};

use crate::dicom::tags::{self, Tag, Vr};

fn element_name(key: &str) -> String {
    Tag::from_json_key(key)
        .and_then(tags::keyword_for_tag)
        .map(str::to_string)
        .unwrap_or_else(|| key.to_string())
}

fn convert_values(vr: &str, values: &[Value]) -> Vec<Value> {
    match vr {
        "SQ" => values
            .iter()
            .map(|item| Value::Object(flatten(item)))
            .collect(),
        "PN" => values
            .iter()
            .map(|name| name.get("Alphabetic").cloned().unwrap_or_else(|| name.clone()))
            .collect(),
        _ => values.to_vec(),
    }
}

/// Flatten one DICOM JSON record into `keyword → value`.
///
/// Keys are keywords for registered tags and the raw `GGGGEEEE` tag
/// otherwise. Single values are unwrapped from their list.
pub fn flatten(record: &Value) -> Map<String, Value> {
    let mut flat = Map::new();
    let Some(elements) = record.as_object() else {
        return flat;
    };

    for (key, element) in elements {
        let Some(vr) = element.get("vr").and_then(Value::as_str) else {
            continue;
        };
        if Vr::from_code(vr).is_some_and(Vr::is_binary) {
            continue;
        }
        if element.get("BulkDataURI").is_some() || element.get("InlineBinary").is_some() {
            continue;
        }
        let Some(values) = element.get("Value").and_then(Value::as_array) else {
            continue;
        };
        if values.is_empty() {
            continue;
        }

        let mut converted = convert_values(vr, values);
        let value = if converted.len() == 1 {
            converted.remove(0)
        } else {
            Value::Array(converted)
        };
        flat.insert(element_name(key), value);
    }
    flat
}

/// Merge the records of several instances into one mapping.
///
/// The first record's keys are kept as-is. For the record at ordinal `i`,
/// a new key is added unchanged, a key whose value differs from the one
/// already reported is added as `"{key}:{i}"`, and repeated values are
/// dropped.
pub fn merge_records<'a, I>(records: I) -> Map<String, Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut merged = Map::new();
    for (ordinal, record) in records.into_iter().enumerate() {
        for (key, value) in flatten(record) {
            match merged.get(&key) {
                None => {
                    merged.insert(key, value);
                }
                Some(existing) if *existing != value => {
                    merged.insert(format!("{}:{}", key, ordinal), value);
                }
                Some(_) => {}
            }
        }
    }
    merged
}
