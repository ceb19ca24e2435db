//! Batch schema inference.
//!
//! Every field that appears in any record of a batch gets exactly one entry,
//! in first-seen order. The first observed type holds until a later value
//! contradicts it, at which point the field degrades to `unknown`. Declared
//! hints override the inferred type.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::logging::structured::LogContext;

use super::values::{classify_value, sample_text};

/// Caller-declared field types, keyed by field name.
pub type SchemaHints = HashMap<String, String>;

/// Logical type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Date,
    Boolean,
    Unknown,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Boolean => "boolean",
            FieldType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" | "text" => Ok(FieldType::String),
            "number" | "integer" | "int" | "float" | "decimal" => Ok(FieldType::Number),
            "date" | "datetime" | "timestamp" => Ok(FieldType::Date),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "unknown" => Ok(FieldType::Unknown),
            other => Err(format!("unsupported field type: {}", other)),
        }
    }
}

/// One entry of an inferred schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pii_type: Option<String>,
}

/// Ordered field list for one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InferredSchema {
    pub fields: Vec<SchemaField>,
}

impl InferredSchema {
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn pii_fields(&self) -> impl Iterator<Item = &SchemaField> {
        self.fields.iter().filter(|f| f.pii_type.is_some())
    }

    pub fn has_pii(&self) -> bool {
        self.pii_fields().next().is_some()
    }
}

/// Per-field observations gathered while scanning a batch.
#[derive(Debug, Default)]
pub(crate) struct FieldObservation {
    pub observed: Option<FieldType>,
    pub conflicted: bool,
    pub sample: Option<String>,
}

impl FieldObservation {
    fn observe(&mut self, value: &Value) {
        if let Some(kind) = classify_value(value) {
            match self.observed {
                None => self.observed = Some(kind),
                Some(seen) if seen != kind => self.conflicted = true,
                Some(_) => {}
            }
        }
        if self.sample.is_none() {
            self.sample = sample_text(value).map(str::to_string);
        }
    }

    fn resolved_type(&self) -> FieldType {
        match self.observed {
            Some(kind) if !self.conflicted => kind,
            _ => FieldType::Unknown,
        }
    }
}

/// Field observations in first-seen order.
#[derive(Debug, Default)]
pub(crate) struct BatchObservations {
    order: Vec<String>,
    fields: HashMap<String, FieldObservation>,
}

impl BatchObservations {
    pub fn observe_record(&mut self, record: &Map<String, Value>) {
        for (name, value) in record {
            if !self.fields.contains_key(name) {
                self.order.push(name.clone());
            }
            self.fields.entry(name.clone()).or_default().observe(value);
        }
    }

    /// Iterate `(name, observation)` in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldObservation)> {
        self.order
            .iter()
            .filter_map(|name| self.fields.get(name).map(|obs| (name.as_str(), obs)))
    }
}

/// Resolve field types for a batch, applying hints.
///
/// Returns the schema (without PII tags) and the number of hints rejected
/// because their declared type is not recognised.
pub(crate) fn resolve_schema(
    observations: &BatchObservations,
    hints: Option<&SchemaHints>,
    ctx: &LogContext,
) -> (InferredSchema, usize) {
    let mut parsed_hints: HashMap<&str, FieldType> = HashMap::new();
    let mut rejected = 0;

    if let Some(hints) = hints {
        for (field, declared) in hints {
            match declared.parse::<FieldType>() {
                Ok(kind) => {
                    parsed_hints.insert(field.as_str(), kind);
                }
                Err(reason) => {
                    rejected += 1;
                    log::warn!(
                        "{} SCHEMA_HINT_REJECTED field={} declared={:?} reason={}",
                        ctx,
                        field,
                        declared,
                        reason
                    );
                }
            }
        }
    }

    let fields = observations
        .iter()
        .map(|(name, obs)| {
            let inferred = obs.resolved_type();
            let field_type = match parsed_hints.get(name) {
                Some(hinted) => {
                    if *hinted != inferred {
                        log::debug!(
                            "{} SCHEMA_HINT_APPLIED field={} inferred={} declared={}",
                            ctx,
                            name,
                            inferred,
                            hinted
                        );
                    }
                    *hinted
                }
                None => inferred,
            };
            SchemaField {
                name: name.to_string(),
                field_type,
                pii_type: None,
            }
        })
        .collect();

    (InferredSchema { fields }, rejected)
}
