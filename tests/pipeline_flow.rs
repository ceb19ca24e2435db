//! End-to-end flow: ingest -> queue -> sync, against a fake cloud endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use edgenode_core::config::EdgeConfig;
use edgenode_core::error::TransportError;
use edgenode_core::node::{EdgeNode, BATCH_INGESTION_ENTITY};
use edgenode_core::pipeline::{FieldType, IngestionEngine, SchemaHints};
use edgenode_core::security::{
    is_redaction_token, DetectorChain, FieldSample, FnDetector, RedactionStore,
};
use edgenode_core::storage::{EntryStatus, QueueOptions, SyncQueue};
use edgenode_core::sync::{
    Enrollment, EnrollmentRequest, Heartbeat, OutboundBatch, SyncOutcome, Transport,
};

/// Cloud stand-in. Flip `online` / `accepting` to simulate partitions and
/// server errors.
#[derive(Default)]
struct FakeCloud {
    online: AtomicBool,
    accepting: AtomicBool,
    received: Mutex<Vec<OutboundBatch>>,
}

impl FakeCloud {
    fn up() -> Arc<Self> {
        let cloud = Self::default();
        cloud.online.store(true, Ordering::SeqCst);
        cloud.accepting.store(true, Ordering::SeqCst);
        Arc::new(cloud)
    }

    fn down() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn wire_dump(&self) -> String {
        serde_json::to_string(&*self.received.lock()).unwrap()
    }
}

impl Transport for FakeCloud {
    fn probe(&self) -> Result<(), TransportError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Status(503))
        }
    }

    fn send_batch(&self, batch: &OutboundBatch) -> Result<(), TransportError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(TransportError::Status(500));
        }
        self.received.lock().push(batch.clone());
        Ok(())
    }

    fn heartbeat(&self, _beat: &Heartbeat) -> Result<(), TransportError> {
        self.probe()
    }

    fn enroll(&self, _request: &EnrollmentRequest) -> Result<Enrollment, TransportError> {
        self.probe()?;
        Ok(Enrollment {
            node_id: "edge-node-1".to_string(),
            node_key: "edge-node-1-key".to_string(),
        })
    }
}

fn config(dir: &tempfile::TempDir) -> EdgeConfig {
    EdgeConfig {
        data_dir: dir.path().to_path_buf(),
        node_key: "edge-node-1".to_string(),
        batch_size: 2,
        ..EdgeConfig::default()
    }
}

fn customers() -> Vec<Value> {
    vec![
        json!({"customer_name": "Jane Doe", "email": "jane@example.com", "phone": "+1 (555) 123-4567", "amount": 10}),
        json!({"customer_name": "John Roe", "email": "john@example.com", "phone": "555-987-6543", "amount": 20}),
        json!({"customer_name": "Jane Doe", "email": "jane@example.com", "ssn": "123-45-6789", "amount": 30,
               "billing": {"contact_email": "billing@example.com", "country": "NO"}}),
    ]
}

const RAW_VALUES: &[&str] = &[
    "Jane Doe",
    "John Roe",
    "jane@example.com",
    "john@example.com",
    "billing@example.com",
    "+1 (555) 123-4567",
    "555-987-6543",
    "123-45-6789",
];

/// Every byte SQLite holds for `database`: the main file after a checkpoint,
/// plus whatever is left in the WAL and shared-memory files.
fn on_disk_bytes(database: &std::path::Path) -> String {
    let conn = rusqlite::Connection::open(database).unwrap();
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
        .unwrap();
    drop(conn);

    let mut dump = Vec::new();
    for suffix in ["", "-wal", "-shm"] {
        let mut path = database.as_os_str().to_owned();
        path.push(suffix);
        if let Ok(bytes) = std::fs::read(&path) {
            dump.extend_from_slice(&bytes);
        }
    }
    String::from_utf8_lossy(&dump).into_owned()
}

#[test]
fn test_concrete_ingestion_scenario() {
    let engine = IngestionEngine::default();
    let store = RedactionStore::new();
    let records = vec![
        json!({"email": "a@b.com", "amount": 10}),
        json!({"email": "a@b.com", "amount": 20}),
    ];

    let result = engine.process(&store, &records, None);

    let email = result.inferred_schema.field("email").unwrap();
    assert_eq!(email.field_type, FieldType::String);
    assert_eq!(email.pii_type.as_deref(), Some("email"));
    let amount = result.inferred_schema.field("amount").unwrap();
    assert_eq!(amount.field_type, FieldType::Number);
    assert!(amount.pii_type.is_none());

    assert_eq!(
        result.processed_data[0]["email"],
        result.processed_data[1]["email"]
    );
    assert!(is_redaction_token(
        result.processed_data[0]["email"].as_str().unwrap()
    ));
    assert_eq!(result.processed_data[1]["amount"], json!(20));
    assert!(result.pii_detected);
}

#[test]
fn test_nothing_raw_reaches_queue_or_wire() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = FakeCloud::up();
    let node = EdgeNode::open_with_transport(config(&dir), cloud.clone()).unwrap();

    let outcome = node.ingest(&customers(), None).unwrap();
    let queued = node
        .sync_service()
        .queue()
        .get(outcome.entry_id)
        .unwrap()
        .unwrap();
    let job = node.job_ledger().get(&outcome.job_id).unwrap().unwrap();

    let report = node.sync();
    assert_eq!(report.outcome, SyncOutcome::Drained);

    let queued_dump = queued.payload.to_string();
    let job_dump = job.output_data.unwrap().to_string();
    let wire_dump = cloud.wire_dump();
    for raw in RAW_VALUES {
        assert!(!queued_dump.contains(raw), "queue holds {}", raw);
        assert!(!job_dump.contains(raw), "ledger holds {}", raw);
        assert!(!wire_dump.contains(raw), "wire carried {}", raw);
    }

    let on_disk = on_disk_bytes(&node.config().database_path());
    for raw in RAW_VALUES {
        assert!(!on_disk.contains(raw), "database files hold {}", raw);
    }
}

#[test]
fn test_unenrolled_node_enrolls_then_delivers() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = FakeCloud::up();
    let node = EdgeNode::open_with_transport(
        EdgeConfig {
            node_key: String::new(),
            ..config(&dir)
        },
        cloud.clone(),
    )
    .unwrap();
    node.ingest(&customers(), None).unwrap();
    assert_eq!(node.sync().outcome, SyncOutcome::NotEnrolled);

    node.enroll("console-issued", "till-4", "pos").unwrap();
    let report = node.sync();

    assert_eq!(report.outcome, SyncOutcome::Drained);
    assert_eq!(report.delivered, 1);
    assert_eq!(cloud.received.lock()[0].node_key, "edge-node-1-key");

    let data_dir = dir.path().to_string_lossy().to_string();
    let from_disk = EdgeConfig::from_lookup(|name: &str| {
        (name == "EDGENODE_DATA_DIR").then(|| data_dir.clone())
    })
    .unwrap();
    assert_eq!(from_disk.node_key, "edge-node-1-key");
}

#[test]
fn test_unreachable_endpoint_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = FakeCloud::down();
    let node = EdgeNode::open_with_transport(config(&dir), cloud.clone()).unwrap();
    node.ingest(&customers(), None).unwrap();
    node.ingest(&customers(), None).unwrap();

    let report = node.sync();

    assert_eq!(report.outcome, SyncOutcome::Offline);
    let status = node.status().unwrap();
    assert_eq!(status.queue.pending, 2);
    assert_eq!(status.queue.in_flight, 0);
    assert_eq!(status.queue.failed, 0);
}

#[test]
fn test_partition_then_recovery_delivers_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = FakeCloud::down();
    let node = EdgeNode::open_with_transport(config(&dir), cloud.clone()).unwrap();

    let ids: Vec<_> = (0..5)
        .map(|_| node.ingest(&customers(), None).unwrap().entry_id)
        .collect();
    assert_eq!(node.sync().outcome, SyncOutcome::Offline);

    cloud.online.store(true, Ordering::SeqCst);
    cloud.accepting.store(true, Ordering::SeqCst);
    let report = node.sync();

    assert_eq!(report.delivered, 5);
    assert_eq!(report.batches_sent, 3);
    let delivered: Vec<_> = cloud
        .received
        .lock()
        .iter()
        .flat_map(|b| b.entries.iter().map(|e| e.entry_id))
        .collect();
    assert_eq!(delivered, ids);
    assert!(cloud
        .received
        .lock()
        .iter()
        .all(|b| b.node_key == "edge-node-1"));
}

#[test]
fn test_server_errors_dead_letter_after_max_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let cloud = FakeCloud::up();
    cloud.accepting.store(false, Ordering::SeqCst);
    let node = EdgeNode::open_with_transport(
        EdgeConfig {
            max_attempts: 2,
            ..config(&dir)
        },
        cloud.clone(),
    )
    .unwrap();
    let entry_id = node.ingest(&customers(), None).unwrap().entry_id;

    assert_eq!(node.sync().outcome, SyncOutcome::BatchFailed);
    let last = node.sync();
    assert_eq!(last.dead_lettered, 1);

    let queue = node.sync_service().queue();
    assert_eq!(queue.get(entry_id).unwrap().unwrap().status, EntryStatus::Failed);
    assert!(queue.dequeue_batch(10).unwrap().is_empty());

    cloud.accepting.store(true, Ordering::SeqCst);
    queue.requeue_dead_letter(entry_id).unwrap();
    assert_eq!(node.sync().delivered, 1);
}

#[test]
fn test_separate_producer_and_drainer_processes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");

    let drainer = SyncQueue::open(&path, QueueOptions::default()).unwrap();
    let producer = SyncQueue::open(
        &path,
        QueueOptions {
            recover_on_open: false,
            ..QueueOptions::default()
        },
    )
    .unwrap();

    let first = producer.enqueue(BATCH_INGESTION_ENTITY, &json!({"n": 1})).unwrap();
    let claimed = drainer.dequeue_batch(10).unwrap();
    let second = producer.enqueue(BATCH_INGESTION_ENTITY, &json!({"n": 2})).unwrap();

    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, first);
    let rest = producer.dequeue_batch(10).unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].id, second);
    assert_eq!(drainer.counts().unwrap().in_flight, 2);
}

#[test]
fn test_schema_hints_and_custom_detector() {
    let engine = IngestionEngine::new(
        DetectorChain::builtin().with(FnDetector::new(
            "account_number",
            |s: &FieldSample<'_>| s.lower_name == "acct",
        )),
    );
    let store = RedactionStore::new();
    let mut hints = SchemaHints::new();
    hints.insert("zip".to_string(), "string".to_string());
    hints.insert("weird".to_string(), "not-a-type".to_string());

    let records = vec![
        json!({"acct": "00123", "zip": 55401, "weird": true}),
        json!("not a record"),
    ];
    let result = engine.process(&store, &records, Some(&hints));

    assert_eq!(result.skipped_records, 1);
    assert_eq!(result.rejected_hints, 1);
    assert_eq!(result.processed_data.len(), 1);
    assert_eq!(
        result.inferred_schema.field("zip").unwrap().field_type,
        FieldType::String
    );
    assert_eq!(
        result.inferred_schema.field("acct").unwrap().pii_type.as_deref(),
        Some("account_number")
    );
    let token = result.processed_data[0]["acct"].as_str().unwrap();
    assert!(token.starts_with("[REDACTED_ACCOUNT_NUMBER_"));
    assert_eq!(store.restore(token, "integration test").as_deref(), Some("00123"));
}
