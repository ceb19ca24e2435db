//! Ingestion pipeline module.
//!
//! Local ingestion of raw tenant records:
//! - Schema inference with optional declared hints
//! - PII detection per field and per nested path
//! - Tokenization through the session's redaction store

pub mod context;
pub mod ingestion;
pub mod nested;
pub mod schema;
pub mod values;

pub use context::*;
pub use ingestion::*;
pub use nested::NestedPiiField;
pub use schema::{FieldType, InferredSchema, SchemaField, SchemaHints};
