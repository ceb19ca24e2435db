//! Error types.
//!
//! Ingestion never fails as a whole (bad records are counted and skipped),
//! so there is no ingestion error here. Queue and node errors are returned
//! to callers; transport errors stop at the sync cycle boundary.

use thiserror::Error;

use crate::config::ConfigError;
use crate::storage::models::{EntryId, EntryStatus};

/// Durable queue and job ledger failures.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("queue entry {0} not found")]
    NotFound(EntryId),

    #[error("queue entry {id} is {status}, expected {expected}")]
    InvalidState {
        id: EntryId,
        status: EntryStatus,
        expected: EntryStatus,
    },

    #[error("corrupt queue row: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to the cloud endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned status {0}")]
    Status(u16),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

/// A sanitized record still holds a raw value in a PII-tagged field.
#[derive(Debug, Error, PartialEq)]
pub enum LeakError {
    #[error("record {record_index} field {field} holds an unredacted value")]
    RawValue { field: String, record_index: usize },
}

/// Failures surfaced by the edge node orchestrator.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Leak(#[from] LeakError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cloud request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("failed to write node key file: {0}")]
    KeyFile(#[source] std::io::Error),

    #[error("enrollment response rejected: {0}")]
    InvalidEnrollment(&'static str),
}
