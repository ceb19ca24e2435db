//! Ingestion engine.
//!
//! Turns a batch of raw records into sanitized records:
//! 1. Schema inference (first-seen type, conflicts degrade to unknown, hints win)
//! 2. PII detection, once per field against the detector chain, and once per
//!    nested path inside object and array values
//! 3. Redaction of every value in a PII-tagged field or on a tagged nested
//!    path through the redaction store
//! 4. Result assembly
//!
//! Records that are not JSON objects are skipped and counted; the batch as a
//! whole never fails.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::security::pii::{DetectorChain, FieldSample};
use crate::security::redaction::RedactionStore;

use super::context::IngestContext;
use super::nested::{redact_nested, NestedObservations, NestedPiiField};
use super::schema::{resolve_schema, BatchObservations, InferredSchema, SchemaHints};
use super::values::redactable_text;

/// Outcome of one ingestion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionResult {
    pub processed_data: Vec<Value>,
    pub inferred_schema: InferredSchema,
    pub pii_detected: bool,
    /// Input entries dropped because they were not key/value records.
    pub skipped_records: usize,
    /// Schema hints ignored because the declared type is not recognised.
    pub rejected_hints: usize,
    /// PII found inside object or array values, by dotted path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_pii_fields: Vec<NestedPiiField>,
}

/// Schema inference + PII detection + tokenization.
pub struct IngestionEngine {
    detectors: DetectorChain,
}

impl Default for IngestionEngine {
    fn default() -> Self {
        Self::new(DetectorChain::builtin())
    }
}

impl IngestionEngine {
    pub fn new(detectors: DetectorChain) -> Self {
        Self { detectors }
    }

    pub fn detectors(&self) -> &DetectorChain {
        &self.detectors
    }

    /// Process a batch with a fresh job context.
    pub fn process(
        &self,
        store: &RedactionStore,
        records: &[Value],
        hints: Option<&SchemaHints>,
    ) -> IngestionResult {
        self.process_with_context(&IngestContext::new(), store, records, hints)
    }

    /// Process a batch under an existing job context.
    pub fn process_with_context(
        &self,
        ctx: &IngestContext,
        store: &RedactionStore,
        records: &[Value],
        hints: Option<&SchemaHints>,
    ) -> IngestionResult {
        let log_ctx = ctx.log_context();
        log::info!("{} INGEST_START records={}", log_ctx, records.len());

        // [1] Split well-formed records from malformed input
        let mut accepted: Vec<&Map<String, Value>> = Vec::with_capacity(records.len());
        let mut skipped = 0;
        for (index, record) in records.iter().enumerate() {
            match record.as_object() {
                Some(obj) => accepted.push(obj),
                None => {
                    skipped += 1;
                    log::warn!(
                        "{} RECORD_SKIPPED index={} reason=not_an_object kind={}",
                        log_ctx,
                        index,
                        json_kind(record)
                    );
                }
            }
        }

        // [2] Schema inference
        let mut observations = BatchObservations::default();
        let mut nested_observations = NestedObservations::default();
        for record in &accepted {
            observations.observe_record(record);
            nested_observations.observe_record(record);
        }
        let (mut schema, rejected_hints) = resolve_schema(&observations, hints, &log_ctx);

        // [3] PII detection, once per field
        for (field, (name, obs)) in schema.fields.iter_mut().zip(observations.iter()) {
            let sample = FieldSample::new(name, obs.sample.as_deref());
            if let Some(pii_type) = self.detectors.detect(&sample) {
                log::info!(
                    "{} PII_FIELD_DETECTED pii_type={}",
                    ctx.field_context(name),
                    pii_type
                );
                field.pii_type = Some(pii_type.to_string());
            }
        }

        let nested_pii_fields = if nested_observations.is_empty() {
            Vec::new()
        } else {
            nested_observations.detect(&self.detectors, |name| {
                schema.field(name).is_some_and(|f| f.pii_type.is_some())
            })
        };
        for nested in &nested_pii_fields {
            log::info!(
                "{} PII_NESTED_DETECTED path={} pii_type={}",
                log_ctx,
                nested.path,
                nested.pii_type
            );
        }

        // [4] Redaction
        let pii_fields: Vec<(&str, &str)> = schema
            .pii_fields()
            .filter_map(|f| f.pii_type.as_deref().map(|t| (f.name.as_str(), t)))
            .collect();

        let mut redacted_values = 0usize;
        let processed_data: Vec<Value> = accepted
            .iter()
            .map(|record| {
                let mut sanitized = (*record).clone();
                for (name, pii_type) in &pii_fields {
                    if let Some(value) = sanitized.get_mut(*name) {
                        if let Some(text) = redactable_text(value) {
                            *value = Value::String(store.redact(&text, pii_type));
                            redacted_values += 1;
                        }
                    }
                }
                redacted_values += redact_nested(&mut sanitized, &nested_pii_fields, store);
                Value::Object(sanitized)
            })
            .collect();

        let pii_detected = !pii_fields.is_empty() || !nested_pii_fields.is_empty();

        log::info!(
            "{} INGEST_COMPLETE accepted={} skipped={} fields={} pii_fields={} nested_pii_paths={} redacted_values={} rejected_hints={}",
            log_ctx,
            processed_data.len(),
            skipped,
            schema.fields.len(),
            pii_fields.len(),
            nested_pii_fields.len(),
            redacted_values,
            rejected_hints
        );

        IngestionResult {
            processed_data,
            inferred_schema: schema,
            pii_detected,
            skipped_records: skipped,
            rejected_hints,
            nested_pii_fields,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
