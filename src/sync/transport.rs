//! Wire transport to the cloud endpoint.
//!
//! `Transport` is the seam between the sync service and the network. The
//! service only ever hands it sanitized queue entries.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;
use crate::storage::models::{EntryId, SyncQueueEntry};

pub const HEALTH_PATH: &str = "/api/edge-ai/health";
pub const SYNC_BATCH_PATH: &str = "/api/edge-ai/sync-batch";
pub const HEARTBEAT_PATH: &str = "/api/edge-ai/heartbeat";
pub const ENROLL_PATH: &str = "/api/edge-ai/nodes/enroll";

/// One queue entry as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEntry {
    pub entry_id: EntryId,
    pub entity_type: String,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
}

impl From<&SyncQueueEntry> for OutboundEntry {
    fn from(entry: &SyncQueueEntry) -> Self {
        Self {
            entry_id: entry.id,
            entity_type: entry.entity_type.clone(),
            payload: entry.payload.clone(),
            enqueued_at: entry.enqueued_at,
        }
    }
}

/// Request body for `POST /api/edge-ai/sync-batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundBatch {
    pub node_key: String,
    pub batch_id: String,
    pub entries: Vec<OutboundEntry>,
}

impl OutboundBatch {
    pub fn new(node_key: &str, entries: &[SyncQueueEntry]) -> Self {
        Self {
            node_key: node_key.to_string(),
            batch_id: uuid::Uuid::new_v4().to_string(),
            entries: entries.iter().map(OutboundEntry::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Request body for `POST /api/edge-ai/heartbeat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub node_key: String,
    pub status: String,
    pub version: String,
}

impl Heartbeat {
    pub fn healthy(node_key: &str) -> Self {
        Self {
            node_key: node_key.to_string(),
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Request body for `POST /api/edge-ai/nodes/enroll`.
///
/// The enrollment key is a one-time credential issued by the cloud console;
/// it is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub enrollment_key: String,
    pub name: String,
    pub device_type: String,
    pub device_os: String,
    pub device_arch: String,
    pub capabilities: BTreeMap<String, bool>,
    pub version: String,
}

impl EnrollmentRequest {
    /// Describe this device: OS and architecture of the running build, CPU
    /// inference only.
    pub fn for_this_device(enrollment_key: &str, name: &str, device_type: &str) -> Self {
        let capabilities = [
            ("cpu", true),
            ("gpu", false),
            ("npu", false),
            ("onnx_runtime", false),
            ("tensorrt", false),
            ("executorch", false),
            ("webgpu", false),
            ("wasm", false),
        ]
        .into_iter()
        .map(|(name, on)| (name.to_string(), on))
        .collect();

        Self {
            enrollment_key: enrollment_key.to_string(),
            name: name.to_string(),
            device_type: device_type.to_string(),
            device_os: std::env::consts::OS.to_string(),
            device_arch: std::env::consts::ARCH.to_string(),
            capabilities,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Credentials the cloud issues for an enrolled node.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub node_id: String,
    pub node_key: String,
}

impl std::fmt::Debug for Enrollment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enrollment")
            .field("node_id", &self.node_id)
            .field("node_key", &"<redacted>")
            .finish()
    }
}

/// Network operations the sync service depends on.
///
/// Every call must be bounded by a timeout. An `Ok` from `send_batch` means
/// the endpoint acknowledged durable receipt of every entry in the batch.
pub trait Transport: Send + Sync {
    /// Check that the endpoint is reachable.
    fn probe(&self) -> Result<(), TransportError>;

    fn send_batch(&self, batch: &OutboundBatch) -> Result<(), TransportError>;

    fn heartbeat(&self, beat: &Heartbeat) -> Result<(), TransportError>;

    /// Exchange an enrollment key for node credentials.
    fn enroll(&self, request: &EnrollmentRequest) -> Result<Enrollment, TransportError>;
}

/// `Transport` over HTTP(S) with a blocking reqwest client.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("edgenode-core/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<(), TransportError> {
        self.send_post(path, body).map(|_| ())
    }

    fn post_for<T: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, TransportError> {
        let bytes = self.send_post(path, body)?.bytes()?;
        serde_json::from_slice(&bytes).map_err(TransportError::Decode)
    }

    fn send_post<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::blocking::Response, TransportError> {
        let body = serde_json::to_vec(body)?;
        let response = self
            .client
            .post(self.url(path))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

impl Transport for HttpTransport {
    /// Any response below 500 counts as reachable: a 404 or 401 still proves
    /// the network path works.
    fn probe(&self) -> Result<(), TransportError> {
        let response = self.client.get(self.url(HEALTH_PATH)).send()?;
        let status = response.status();
        if status.is_server_error() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(())
    }

    fn send_batch(&self, batch: &OutboundBatch) -> Result<(), TransportError> {
        self.post(SYNC_BATCH_PATH, batch)
    }

    fn heartbeat(&self, beat: &Heartbeat) -> Result<(), TransportError> {
        self.post(HEARTBEAT_PATH, beat)
    }

    fn enroll(&self, request: &EnrollmentRequest) -> Result<Enrollment, TransportError> {
        self.post_for(ENROLL_PATH, request)
    }
}
