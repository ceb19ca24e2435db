//! Edge node orchestrator.
//!
//! Owns the redaction store for the current session and wires ingestion to
//! the job ledger and the durable queue. Also handles enrollment and runs the
//! heartbeat/sync loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{write_node_key_file, ConfigError, EdgeConfig};
use crate::error::{NodeError, QueueError};
use crate::logging::structured::LogContext;
use crate::pipeline::context::IngestContext;
use crate::pipeline::ingestion::{IngestionEngine, IngestionResult};
use crate::pipeline::schema::SchemaHints;
use crate::security::leak_guard::verify_ingestion;
use crate::security::redaction::RedactionStore;
use crate::storage::database::DEFAULT_BUSY_TIMEOUT;
use crate::storage::jobs::JobLedger;
use crate::storage::models::{EntryId, QueueCounts};
use crate::storage::queue::{QueueOptions, SyncQueue};
use crate::sync::service::{SyncReport, SyncService, SyncSettings, SyncStats};
use crate::sync::transport::{Enrollment, EnrollmentRequest, Heartbeat, HttpTransport, Transport};

/// Queue entity type for ingested batches.
pub const BATCH_INGESTION_ENTITY: &str = "batch_ingestion";
/// Job ledger type for ingestion jobs.
pub const INGESTION_JOB_TYPE: &str = "ingestion";

/// Longest the run loop sleeps before re-checking the shutdown flag.
const RUN_LOOP_TICK: Duration = Duration::from_millis(250);

/// What one `ingest` call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub job_id: String,
    pub entry_id: EntryId,
    pub result: IngestionResult,
}

/// Point-in-time view of the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub running: bool,
    pub offline_mode: bool,
    pub enrolled: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Ingestion jobs ever completed against this data directory.
    pub jobs_processed: u64,
    pub database_size_bytes: u64,
    pub redaction_entries: usize,
    pub queue: QueueCounts,
    pub sync: SyncStats,
}

pub struct EdgeNode {
    config: EdgeConfig,
    engine: IngestionEngine,
    store: RedactionStore,
    ledger: JobLedger,
    sync: Arc<SyncService>,
    transport: Arc<dyn Transport>,
    node_key: RwLock<String>,
    running: AtomicBool,
    last_heartbeat: RwLock<Option<DateTime<Utc>>>,
}

impl EdgeNode {
    /// Open the node with an HTTP transport to `config.cloud_api_url`.
    pub fn open(config: EdgeConfig) -> Result<Self, NodeError> {
        let transport = HttpTransport::new(&config.cloud_api_url, config.request_timeout)?;
        Self::open_with_transport(config, Arc::new(transport))
    }

    /// Open the node over any transport.
    ///
    /// A node without a key can still ingest and queue; it has to `enroll`
    /// before it can sync or `run`.
    pub fn open_with_transport(
        config: EdgeConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, NodeError> {
        if !config.offline_mode && config.node_key.is_empty() {
            log::warn!("NODE_NOT_ENROLLED data_dir={}", config.data_dir.display());
        }

        let db_path = config.database_path();
        let queue = SyncQueue::open(
            &db_path,
            QueueOptions {
                max_attempts: config.max_attempts,
                ..QueueOptions::default()
            },
        )?;
        let ledger = JobLedger::open(&db_path, DEFAULT_BUSY_TIMEOUT)?;
        let sync = SyncService::new(
            Arc::new(queue),
            transport.clone(),
            SyncSettings::from_config(&config),
        );

        log::info!(
            "NODE_OPENED data_dir={} offline_mode={} batch_size={}",
            config.data_dir.display(),
            config.offline_mode,
            config.batch_size
        );

        let node_key = RwLock::new(config.node_key.clone());
        Ok(Self {
            config,
            engine: IngestionEngine::default(),
            store: RedactionStore::new(),
            ledger,
            sync: Arc::new(sync),
            transport,
            node_key,
            running: AtomicBool::new(false),
            last_heartbeat: RwLock::new(None),
        })
    }

    /// Swap the ingestion engine, e.g. to add custom detectors.
    pub fn with_engine(mut self, engine: IngestionEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    pub fn sync_service(&self) -> &Arc<SyncService> {
        &self.sync
    }

    pub fn job_ledger(&self) -> &JobLedger {
        &self.ledger
    }

    /// The session's token map. Restoring values from it is a privileged,
    /// audited operation; nothing on the sync path touches it.
    pub fn redaction_store(&self) -> &RedactionStore {
        &self.store
    }

    /// Ingest a batch: sanitize, verify, queue it, then record the job as
    /// completed.
    ///
    /// Nothing is queued if the leak check fails. A job is only marked
    /// completed once its entry is durably queued; any failure before that
    /// marks it failed.
    pub fn ingest(
        &self,
        records: &[Value],
        hints: Option<&SchemaHints>,
    ) -> Result<IngestOutcome, NodeError> {
        let ctx = IngestContext::new();
        let log_ctx = ctx.log_context();
        self.ledger.start(&ctx.job_id, INGESTION_JOB_TYPE)?;

        let result = self
            .engine
            .process_with_context(&ctx, &self.store, records, hints);

        let entry_id = match self.queue_result(&ctx.job_id, &result, &log_ctx) {
            Ok(entry_id) => entry_id,
            Err(e) => {
                log::warn!("{} INGEST_FAILED error={}", log_ctx, e);
                if let Err(ledger_err) = self.ledger.fail(&ctx.job_id, &e.to_string()) {
                    log::error!("{} JOB_FAILURE_NOT_RECORDED error={}", log_ctx, ledger_err);
                }
                return Err(e);
            }
        };

        // The entry is already durable; a ledger write error must not make
        // the caller think the batch was lost.
        let recorded = serde_json::to_value(&result)
            .map_err(QueueError::from)
            .and_then(|output| self.ledger.complete(&ctx.job_id, &output));
        if let Err(e) = recorded {
            log::error!(
                "{} JOB_COMPLETION_NOT_RECORDED entry_id={} error={}",
                log_ctx,
                entry_id,
                e
            );
        }

        log::info!(
            "{} INGEST_QUEUED entry_id={} records={} pii_detected={}",
            log_ctx,
            entry_id,
            result.processed_data.len(),
            result.pii_detected
        );

        Ok(IngestOutcome {
            job_id: ctx.job_id,
            entry_id,
            result,
        })
    }

    fn queue_result(
        &self,
        job_id: &str,
        result: &IngestionResult,
        log_ctx: &LogContext,
    ) -> Result<EntryId, NodeError> {
        verify_ingestion(result, log_ctx)?;

        let payload = json!({
            "job_id": job_id,
            "data": result.processed_data,
            "schema": result.inferred_schema,
            "nested_pii_fields": result.nested_pii_fields,
            "skipped_records": result.skipped_records,
        });
        Ok(self.sync.queue_sync(BATCH_INGESTION_ENTITY, &payload)?)
    }

    /// Exchange a one-time enrollment key for a node key.
    ///
    /// The issued key is written to `<data_dir>/.node-key` (owner-only on
    /// unix), where the next `EdgeConfig` load finds it, and is used by this
    /// node for heartbeats and sync right away.
    pub fn enroll(
        &self,
        enrollment_key: &str,
        name: &str,
        device_type: &str,
    ) -> Result<Enrollment, NodeError> {
        let request = EnrollmentRequest::for_this_device(enrollment_key, name, device_type);
        let enrollment = self.transport.enroll(&request)?;
        let node_key = enrollment.node_key.trim();
        if node_key.is_empty() {
            return Err(NodeError::InvalidEnrollment("empty node key"));
        }

        let key_file =
            write_node_key_file(&self.config.data_dir, node_key).map_err(NodeError::KeyFile)?;
        *self.node_key.write() = node_key.to_string();
        self.sync.set_node_key(node_key);

        log::info!(
            "NODE_ENROLLED node_id={} device_type={} key_file={}",
            enrollment.node_id,
            device_type,
            key_file.display()
        );
        Ok(enrollment)
    }

    pub fn is_enrolled(&self) -> bool {
        !self.node_key.read().is_empty()
    }

    /// Run one sync cycle now.
    pub fn sync(&self) -> SyncReport {
        self.sync.sync()
    }

    /// Send a heartbeat. Returns whether the endpoint accepted it.
    pub fn heartbeat(&self) -> bool {
        if self.config.offline_mode {
            return false;
        }
        if !self.is_enrolled() {
            log::debug!("HEARTBEAT_SKIPPED reason=not_enrolled");
            return false;
        }

        let beat = Heartbeat::healthy(&self.node_key.read());
        match self.transport.heartbeat(&beat) {
            Ok(()) => {
                *self.last_heartbeat.write() = Some(Utc::now());
                log::debug!("HEARTBEAT_SENT");
                true
            }
            Err(e) => {
                log::warn!("HEARTBEAT_FAILED error={}", e);
                false
            }
        }
    }

    pub fn status(&self) -> Result<NodeStatus, NodeError> {
        let database_size_bytes = std::fs::metadata(self.config.database_path())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(NodeStatus {
            running: self.running.load(Ordering::SeqCst),
            offline_mode: self.config.offline_mode,
            enrolled: self.is_enrolled(),
            last_heartbeat: *self.last_heartbeat.read(),
            jobs_processed: self.ledger.completed_total()?,
            database_size_bytes,
            redaction_entries: self.store.len(),
            queue: self.sync.queue().counts()?,
            sync: self.sync.stats(),
        })
    }

    /// Drop every token mapping of the current session.
    pub fn end_session(&self) {
        self.store.clear();
    }

    /// Heartbeat and sync on their intervals until `shutdown` is set, then
    /// flush the queue. Finished ledger jobs past `job_retention` are pruned
    /// on every sync tick.
    ///
    /// To cut a running sync cycle short from another thread, set `shutdown`
    /// and call `sync_service().interrupt()`.
    pub fn run(&self, shutdown: &AtomicBool) -> anyhow::Result<()> {
        if !self.config.offline_mode && !self.is_enrolled() {
            return Err(ConfigError::Missing("EDGENODE_NODE_KEY"))
                .context("node must be enrolled before it can run");
        }

        self.running.store(true, Ordering::SeqCst);
        log::info!(
            "NODE_RUNNING heartbeat_ms={} sync_ms={}",
            self.config.heartbeat_interval.as_millis(),
            self.config.sync_interval.as_millis()
        );

        let mut next_heartbeat = Instant::now();
        let mut next_sync = Instant::now();

        while !shutdown.load(Ordering::SeqCst) {
            let now = Instant::now();

            if now >= next_heartbeat {
                self.heartbeat();
                next_heartbeat = now + self.config.heartbeat_interval;
            }

            if now >= next_sync {
                self.sync.sync();
                if let Err(e) = self.ledger.prune_older_than(self.config.job_retention) {
                    log::warn!("JOB_PRUNE_FAILED error={}", e);
                }
                next_sync = Instant::now() + self.config.sync_interval;
            }

            if let Some(retention) = self.config.pii_retention {
                self.store.clear_if_expired(retention);
            }

            let wake = next_heartbeat.min(next_sync);
            let nap = wake
                .saturating_duration_since(Instant::now())
                .min(RUN_LOOP_TICK);
            if !nap.is_zero() {
                thread::sleep(nap);
            }
        }

        let report = self.shutdown();
        let counts = self
            .sync
            .queue()
            .counts()
            .context("failed to read queue counts after flush")?;
        log::info!(
            "NODE_STOPPED flush_outcome={:?} delivered={} left_pending={} dead_letters={}",
            report.outcome,
            report.delivered,
            counts.outstanding(),
            counts.failed
        );
        Ok(())
    }

    /// Stop the node: flush what can be delivered within `flush_timeout`.
    pub fn shutdown(&self) -> SyncReport {
        self.running.store(false, Ordering::SeqCst);
        self.sync.flush(self.config.flush_timeout)
    }
}
