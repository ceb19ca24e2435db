//! Pre-enqueue leak check for sanitized records.
//!
//! Walks ingestion output and confirms that every non-null value of a
//! PII-tagged field, or of a tagged nested path, is a well-formed redaction
//! token. Anything else means a raw value would leave the device, and the
//! batch must not be queued.

use std::collections::HashSet;

use serde_json::Value;

use crate::error::LeakError;
use crate::logging::structured::LogContext;
use crate::pipeline::ingestion::IngestionResult;
use crate::pipeline::nested::{nested_leaves, NestedPiiField};
use crate::pipeline::schema::InferredSchema;

use super::redaction::is_redaction_token;

/// Leak scan summary.
#[derive(Debug, Default, PartialEq)]
pub struct LeakScanResult {
    pub records_scanned: usize,
    pub values_checked: usize,
}

/// Verify that tagged fields of `records` only hold tokens.
pub fn verify_redacted(
    records: &[Value],
    schema: &InferredSchema,
    ctx: &LogContext,
) -> Result<LeakScanResult, LeakError> {
    log::debug!("{} LEAK_SCAN_START records={}", ctx, records.len());

    let mut result = LeakScanResult::default();

    for (record_index, record) in records.iter().enumerate() {
        result.records_scanned += 1;

        let obj = match record.as_object() {
            Some(obj) => obj,
            None => continue,
        };

        for field in schema.pii_fields() {
            match obj.get(&field.name) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) if is_redaction_token(s) => {
                    result.values_checked += 1;
                }
                Some(_) => {
                    log::error!(
                        "{} LEAK_DETECTED field={} record_index={}",
                        ctx,
                        field.name,
                        record_index
                    );
                    return Err(LeakError::RawValue {
                        field: field.name.clone(),
                        record_index,
                    });
                }
            }
        }
    }

    log::debug!(
        "{} LEAK_SCAN_COMPLETE records={} values_checked={}",
        ctx,
        result.records_scanned,
        result.values_checked
    );

    Ok(result)
}

/// Verify that every leaf on a tagged nested path only holds a token.
pub fn verify_nested_redacted(
    records: &[Value],
    nested: &[NestedPiiField],
    ctx: &LogContext,
) -> Result<LeakScanResult, LeakError> {
    let mut result = LeakScanResult::default();
    if nested.is_empty() {
        return Ok(result);
    }
    let tagged: HashSet<&str> = nested.iter().map(|f| f.path.as_str()).collect();

    for (record_index, record) in records.iter().enumerate() {
        result.records_scanned += 1;
        let Some(obj) = record.as_object() else {
            continue;
        };

        for (path, leaf) in nested_leaves(obj) {
            if !tagged.contains(path.as_str()) {
                continue;
            }
            match leaf {
                Value::Null => {}
                Value::String(s) if is_redaction_token(s) => result.values_checked += 1,
                _ => {
                    log::error!(
                        "{} LEAK_DETECTED path={} record_index={}",
                        ctx,
                        path,
                        record_index
                    );
                    return Err(LeakError::RawValue {
                        field: path,
                        record_index,
                    });
                }
            }
        }
    }

    Ok(result)
}

/// Full pre-enqueue check of an ingestion result: tagged fields and tagged
/// nested paths.
pub fn verify_ingestion(
    result: &IngestionResult,
    ctx: &LogContext,
) -> Result<LeakScanResult, LeakError> {
    let top = verify_redacted(&result.processed_data, &result.inferred_schema, ctx)?;
    let nested = verify_nested_redacted(&result.processed_data, &result.nested_pii_fields, ctx)?;
    Ok(LeakScanResult {
        records_scanned: top.records_scanned,
        values_checked: top.values_checked + nested.values_checked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::schema::{FieldType, SchemaField};
    use serde_json::json;

    fn email_schema() -> InferredSchema {
        InferredSchema {
            fields: vec![
                SchemaField {
                    name: "email".to_string(),
                    field_type: FieldType::String,
                    pii_type: Some("email".to_string()),
                },
                SchemaField {
                    name: "amount".to_string(),
                    field_type: FieldType::Number,
                    pii_type: None,
                },
            ],
        }
    }

    #[test]
    fn test_tokens_pass() {
        let ctx = LogContext::new("test");
        let records = vec![
            json!({"email": "[REDACTED_EMAIL_0123456789abcdef]", "amount": 1}),
            json!({"email": null, "amount": 2}),
            json!({"amount": 3}),
        ];

        let result = verify_redacted(&records, &email_schema(), &ctx).unwrap();
        assert_eq!(result.records_scanned, 3);
        assert_eq!(result.values_checked, 1);
    }

    #[test]
    fn test_raw_value_rejected() {
        let ctx = LogContext::new("test");
        let records = vec![
            json!({"email": "[REDACTED_EMAIL_0123456789abcdef]"}),
            json!({"email": "a@b.com"}),
        ];

        let err = verify_redacted(&records, &email_schema(), &ctx).unwrap_err();
        assert_eq!(
            err,
            LeakError::RawValue {
                field: "email".to_string(),
                record_index: 1
            }
        );
    }

    #[test]
    fn test_raw_nested_value_rejected() {
        let ctx = LogContext::new("test");
        let nested = vec![NestedPiiField {
            path: "customer.email".to_string(),
            pii_type: "email".to_string(),
        }];
        let records = vec![
            json!({"customer": {"email": "[REDACTED_EMAIL_0123456789abcdef]"}}),
            json!({"customer": [{"email": null}, {"email": "a@b.com"}]}),
        ];

        let err = verify_nested_redacted(&records, &nested, &ctx).unwrap_err();
        assert_eq!(
            err,
            LeakError::RawValue {
                field: "customer.email".to_string(),
                record_index: 1
            }
        );

        let clean = &records[..1];
        assert_eq!(verify_nested_redacted(clean, &nested, &ctx).unwrap().values_checked, 1);
    }

    #[test]
    fn test_untagged_fields_ignored() {
        let ctx = LogContext::new("test");
        let records = vec![json!({"amount": "a@b.com"})];
        assert!(verify_redacted(&records, &email_schema(), &ctx).is_ok());
    }
}
