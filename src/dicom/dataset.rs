//! In-memory DICOM dataset.
//!
//! A [`Dataset`] holds the decoded elements of a Part 10 file (up to, but not
//! including, the pixel data). Binary payloads are never held in memory, only
//! their length. Datasets convert to the DICOM JSON model so that locally
//! parsed files and DICOMweb metadata flow through the same code.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value as JsonValue};

use super::tags::{Tag, Vr};

/// Decoded value of a data element.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Zero-length value
    Empty,
    /// String VRs, split on the `\` multi-value delimiter
    Strings(Vec<String>),
    /// Integer VRs (US, SS, UL, SL, UV, SV)
    Ints(Vec<i64>),
    /// Float VRs (FL, FD)
    Floats(Vec<f64>),
    /// Sequence items
    Sequence(Vec<Dataset>),
    /// Opaque binary payload that was skipped
    Binary { length: u64 },
}

/// A single data element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: Tag,
    pub vr: Vr,
    pub value: Value,
}

/// An ordered collection of data elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    elements: BTreeMap<Tag, Element>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an element, replacing any previous element with the same tag.
    pub fn insert(&mut self, element: Element) {
        self.elements.insert(element.tag, element);
    }

    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements.get(&tag)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterate elements in tag order.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// First string value of an element.
    pub fn string(&self, tag: Tag) -> Option<&str> {
        match &self.get(tag)?.value {
            Value::Strings(values) => values.first().map(String::as_str),
            _ => None,
        }
    }

    /// First value of an element as an unsigned integer.
    ///
    /// Accepts binary integer VRs as well as IS strings.
    pub fn uint(&self, tag: Tag) -> Option<u64> {
        match &self.get(tag)?.value {
            Value::Ints(values) => values.first().and_then(|v| u64::try_from(*v).ok()),
            Value::Strings(values) => values.first().and_then(|s| s.trim().parse().ok()),
            _ => None,
        }
    }

    /// Sequence items of an element.
    pub fn sequence(&self, tag: Tag) -> Option<&[Dataset]> {
        match &self.get(tag)?.value {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Convert to the DICOM JSON model (PS3.18 Annex F).
    ///
    /// DS and IS strings become JSON numbers, PN values become
    /// `{"Alphabetic": ...}` objects, and binary elements keep only their VR.
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        for element in self.iter() {
            map.insert(element.tag.json_key(), element_to_json(element));
        }
        JsonValue::Object(map)
    }
}

fn element_to_json(element: &Element) -> JsonValue {
    let vr = element.vr.as_str().to_string();
    let values: Vec<JsonValue> = match &element.value {
        Value::Empty | Value::Binary { .. } => return json!({ "vr": vr }),
        Value::Strings(strings) => strings
            .iter()
            .map(|s| string_to_json(element.vr, s))
            .collect(),
        Value::Ints(ints) => ints.iter().map(|v| json!(v)).collect(),
        Value::Floats(floats) => floats.iter().map(|v| json!(v)).collect(),
        Value::Sequence(items) => items.iter().map(Dataset::to_json).collect(),
    };
    json!({ "vr": vr, "Value": values })
}

fn string_to_json(vr: Vr, s: &str) -> JsonValue {
    match vr {
        Vr::PN => json!({ "Alphabetic": s }),
        Vr::IS => s
            .trim()
            .parse::<i64>()
            .map(|v| json!(v))
            .unwrap_or_else(|_| json!(s)),
        Vr::DS => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| json!(s)),
        _ => json!(s),
    }
}
