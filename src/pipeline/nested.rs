//! PII below the top level of a record.
//!
//! Values inside objects and arrays are addressed by a dotted path of object
//! keys starting at the top-level field. Array positions are not part of the
//! path, so every element of `contacts` shares `contacts.email`. Each path is
//! sampled and detected once per batch, like a top-level field, and its leaf
//! values are tokenized in place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::security::pii::{DetectorChain, FieldSample};
use crate::security::redaction::RedactionStore;

use super::values::{redactable_text, sample_text};

/// A nested path tagged with a PII type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedPiiField {
    pub path: String,
    pub pii_type: String,
}

/// Leaf values under the object- and array-valued fields of `record`, with
/// their paths.
pub fn nested_leaves(record: &Map<String, Value>) -> Vec<(String, &Value)> {
    let mut leaves = Vec::new();
    for (name, value) in record {
        if is_container(value) {
            collect_leaves(name, value, &mut leaves);
        }
    }
    leaves
}

fn collect_leaves<'a>(path: &str, value: &'a Value, out: &mut Vec<(String, &'a Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                collect_leaves(&format!("{}.{}", path, key), child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_leaves(path, item, out);
            }
        }
        leaf => out.push((path.to_string(), leaf)),
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// First usable sample per nested path, in first-seen order.
#[derive(Debug, Default)]
pub struct NestedObservations {
    order: Vec<String>,
    samples: HashMap<String, Option<String>>,
}

impl NestedObservations {
    pub fn observe_record(&mut self, record: &Map<String, Value>) {
        for (path, leaf) in nested_leaves(record) {
            if !self.samples.contains_key(&path) {
                self.order.push(path.clone());
            }
            let slot = self.samples.entry(path).or_default();
            if slot.is_none() {
                *slot = sample_text(leaf).map(str::to_string);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Run the detector chain once per path.
    ///
    /// Paths under a top-level field that is already tagged are skipped: the
    /// whole field value is tokenized there. Keywords match against the last
    /// path segment so `email_prefs.frequency` is not read as an email.
    pub fn detect<F>(&self, detectors: &DetectorChain, top_level_tagged: F) -> Vec<NestedPiiField>
    where
        F: Fn(&str) -> bool,
    {
        let mut tagged = Vec::new();
        for path in &self.order {
            let top = path.split('.').next().unwrap_or(path);
            if top_level_tagged(top) {
                continue;
            }
            let leaf_name = path.rsplit('.').next().unwrap_or(path);
            let sample = self.samples.get(path).and_then(|s| s.as_deref());
            if let Some(pii_type) = detectors.detect(&FieldSample::new(leaf_name, sample)) {
                tagged.push(NestedPiiField {
                    path: path.clone(),
                    pii_type: pii_type.to_string(),
                });
            }
        }
        tagged
    }
}

/// Tokenize every non-null leaf of `record` that sits on a tagged path.
/// Returns how many values were replaced.
pub fn redact_nested(
    record: &mut Map<String, Value>,
    tagged: &[NestedPiiField],
    store: &RedactionStore,
) -> usize {
    if tagged.is_empty() {
        return 0;
    }
    let by_path: HashMap<&str, &str> = tagged
        .iter()
        .map(|f| (f.path.as_str(), f.pii_type.as_str()))
        .collect();

    let mut redacted = 0;
    for (name, value) in record.iter_mut() {
        if is_container(value) {
            redact_walk(name, value, &by_path, store, &mut redacted);
        }
    }
    redacted
}

fn redact_walk(
    path: &str,
    value: &mut Value,
    tagged: &HashMap<&str, &str>,
    store: &RedactionStore,
    redacted: &mut usize,
) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                redact_walk(&format!("{}.{}", path, key), child, tagged, store, redacted);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_walk(path, item, tagged, store, redacted);
            }
        }
        leaf => {
            if let Some(pii_type) = tagged.get(path) {
                if let Some(text) = redactable_text(leaf) {
                    *leaf = Value::String(store.redact(&text, pii_type));
                    *redacted += 1;
                }
            }
        }
    }
}
