//! Per-value helpers for schema inference and redaction.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::schema::FieldType;

lazy_static! {
    /// ISO date prefix (2024-01-15, 2024-01-15T10:00:00Z)
    static ref ISO_DATE_PATTERN: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap();

    /// US-style date (01/15/2024)
    static ref SLASH_DATE_PATTERN: Regex = Regex::new(r"^\d{2}/\d{2}/\d{4}").unwrap();
}

/// Check whether a string looks like a date.
pub fn looks_like_date(s: &str) -> bool {
    ISO_DATE_PATTERN.is_match(s) || SLASH_DATE_PATTERN.is_match(s)
}

/// Classify a single JSON value.
///
/// Returns `None` for null, which carries no type information.
pub fn classify_value(value: &Value) -> Option<FieldType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(FieldType::Boolean),
        Value::Number(_) => Some(FieldType::Number),
        Value::String(s) if looks_like_date(s) => Some(FieldType::Date),
        Value::String(_) => Some(FieldType::String),
        Value::Array(_) | Value::Object(_) => Some(FieldType::Unknown),
    }
}

/// Text handed to the detectors for a field, if the value is a usable string.
pub fn sample_text(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// Text that gets tokenized when a value sits in a PII-tagged field.
///
/// Strings are used as-is; numbers, booleans and nested values use their
/// JSON rendering. Null has nothing to redact.
pub fn redactable_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
