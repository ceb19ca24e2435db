//! Sync service: drains the durable queue to the cloud endpoint.
//!
//! One cycle is `CheckConnectivity -> (Offline | DrainQueue) -> Idle`. A
//! failed batch is marked failed and ends the cycle; the next scheduled cycle
//! is the retry. Nothing here returns an error past the cycle boundary: the
//! outcome is reported in a `SyncReport` and in the entries' queue state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EdgeConfig;
use crate::error::QueueError;
use crate::logging::structured::LogContext;
use crate::storage::models::{EntryId, EntryStatus};
use crate::storage::queue::SyncQueue;
use crate::{log_debug, log_error, log_info, log_warn};

use super::transport::{OutboundBatch, Transport};

/// Upper bound on dead letters counted during a reconcile sweep.
const DEAD_LETTER_SCAN_LIMIT: usize = 1_000;

/// How a sync cycle (or flush) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Offline mode is configured; no network was attempted.
    OfflineMode,
    /// No node key yet; the node has to enroll first.
    NotEnrolled,
    /// The endpoint was unreachable.
    Offline,
    /// Another cycle holds the drain lock.
    AlreadyRunning,
    /// The queue had no more pending entries.
    Drained,
    /// `interrupt()` was observed at a batch boundary.
    Interrupted,
    /// A batch was rejected; its entries were marked failed.
    BatchFailed,
    /// A flush ran out of time.
    TimedOut,
    /// Local storage failed; remaining entries stay queued.
    StorageError,
}

/// Summary of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub batches_sent: u32,
    pub delivered: u64,
    /// Entries marked failed (retryable or dead-lettered).
    pub failed: u64,
    pub dead_lettered: u64,
    /// Stale in-flight entries returned to pending by the reconcile sweep.
    pub reclaimed: u64,
    pub duration_ms: u64,
}

impl SyncReport {
    fn new(outcome: SyncOutcome) -> Self {
        Self {
            outcome,
            batches_sent: 0,
            delivered: 0,
            failed: 0,
            dead_lettered: 0,
            reclaimed: 0,
            duration_ms: 0,
        }
    }
}

/// Result of a reconcile sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub reclaimed: u64,
    pub dead_letters: u64,
}

/// Cumulative counters since the service was created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    pub cycles: u64,
    pub offline_cycles: u64,
    pub batches_sent: u64,
    pub batches_failed: u64,
    pub entries_delivered: u64,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<SyncOutcome>,
}

#[derive(Default)]
struct Counters {
    cycles: AtomicU64,
    offline_cycles: AtomicU64,
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    entries_delivered: AtomicU64,
}

/// Sync tuning, usually derived from `EdgeConfig`.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub node_key: String,
    pub batch_size: usize,
    pub offline_mode: bool,
    pub in_flight_lease: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &EdgeConfig) -> Self {
        Self {
            node_key: config.node_key.clone(),
            batch_size: config.batch_size,
            offline_mode: config.offline_mode,
            in_flight_lease: config.in_flight_lease,
        }
    }
}

/// Where a drain stopped and what it moved.
struct DrainTally {
    outcome: SyncOutcome,
    batches_sent: u32,
    delivered: u64,
    failed: u64,
    dead_lettered: u64,
}

pub struct SyncService {
    queue: Arc<SyncQueue>,
    transport: Arc<dyn Transport>,
    settings: SyncSettings,
    node_key: RwLock<String>,
    /// Held for the whole of a cycle or flush. One drainer per process.
    cycle: Mutex<()>,
    interrupted: AtomicBool,
    counters: Counters,
    last_synced_at: RwLock<Option<DateTime<Utc>>>,
    last_outcome: RwLock<Option<SyncOutcome>>,
}

impl SyncService {
    pub fn new(
        queue: Arc<SyncQueue>,
        transport: Arc<dyn Transport>,
        mut settings: SyncSettings,
    ) -> Self {
        let node_key = std::mem::take(&mut settings.node_key);
        Self {
            queue,
            transport,
            settings: SyncSettings {
                batch_size: settings.batch_size.max(1),
                ..settings
            },
            node_key: RwLock::new(node_key),
            cycle: Mutex::new(()),
            interrupted: AtomicBool::new(false),
            counters: Counters::default(),
            last_synced_at: RwLock::new(None),
            last_outcome: RwLock::new(None),
        }
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    /// Hand a sanitized payload to the durable queue.
    pub fn queue_sync(&self, entity_type: &str, payload: &Value) -> Result<EntryId, QueueError> {
        self.queue.enqueue(entity_type, payload)
    }

    /// Replace the key batches are sent under, e.g. after enrollment.
    pub fn set_node_key(&self, node_key: &str) {
        *self.node_key.write() = node_key.to_string();
    }

    pub fn is_enrolled(&self) -> bool {
        !self.node_key.read().is_empty()
    }

    /// Ask a running cycle to stop at its next batch boundary.
    ///
    /// Only the cycle in progress observes it; the next cycle starts clear.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Run one sync cycle.
    pub fn sync(&self) -> SyncReport {
        let started = Instant::now();
        let ctx = LogContext::generate("sync");

        let Some(_guard) = self.cycle.try_lock() else {
            log_debug!(ctx, "SYNC_SKIPPED", reason = "cycle already running");
            return self.finish(SyncReport::new(SyncOutcome::AlreadyRunning), started);
        };
        self.interrupted.store(false, Ordering::SeqCst);
        self.counters.cycles.fetch_add(1, Ordering::Relaxed);

        if self.settings.offline_mode {
            log_debug!(ctx, "SYNC_SKIPPED", reason = "offline mode");
            return self.finish(SyncReport::new(SyncOutcome::OfflineMode), started);
        }

        if !self.is_enrolled() {
            log_warn!(ctx, "SYNC_SKIPPED", reason = "node not enrolled");
            return self.finish(SyncReport::new(SyncOutcome::NotEnrolled), started);
        }

        if let Err(e) = self.transport.probe() {
            self.counters.offline_cycles.fetch_add(1, Ordering::Relaxed);
            log_warn!(ctx, "SYNC_OFFLINE", error = e.to_string());
            return self.finish(SyncReport::new(SyncOutcome::Offline), started);
        }

        let mut reclaimed = 0;
        match self.reconcile_with(&ctx) {
            Ok(sweep) => reclaimed = sweep.reclaimed,
            Err(e) => {
                log_error!(ctx, "SYNC_RECONCILE_FAILED", error = e.to_string());
            }
        }

        let tally = self.drain(&ctx, None);
        self.interrupted.store(false, Ordering::SeqCst);

        let mut report = Self::report_from(tally);
        report.reclaimed = reclaimed;
        log_info!(
            ctx,
            "SYNC_CYCLE_COMPLETE",
            outcome = report.outcome,
            batches = report.batches_sent,
            delivered = report.delivered,
            failed = report.failed,
            dead_lettered = report.dead_lettered,
        );
        self.finish(report, started)
    }

    /// Best-effort drain to completion, bounded by `timeout`. Used at shutdown.
    ///
    /// Entries still queued when the deadline passes stay on disk for the next
    /// startup's recovery.
    pub fn flush(&self, timeout: Duration) -> SyncReport {
        let started = Instant::now();
        let deadline = started + timeout;
        let ctx = LogContext::generate("flush");

        let Some(_guard) = self.cycle.try_lock_for(timeout) else {
            log_warn!(ctx, "FLUSH_TIMEOUT", waited_ms = timeout.as_millis());
            return self.finish(SyncReport::new(SyncOutcome::AlreadyRunning), started);
        };
        self.interrupted.store(false, Ordering::SeqCst);

        if self.settings.offline_mode {
            return self.finish(SyncReport::new(SyncOutcome::OfflineMode), started);
        }

        if !self.is_enrolled() {
            log_warn!(ctx, "FLUSH_SKIPPED", reason = "node not enrolled");
            return self.finish(SyncReport::new(SyncOutcome::NotEnrolled), started);
        }

        if let Err(e) = self.transport.probe() {
            log_warn!(ctx, "FLUSH_OFFLINE", error = e.to_string());
            return self.finish(SyncReport::new(SyncOutcome::Offline), started);
        }

        let tally = self.drain(&ctx, Some(deadline));
        let report = Self::report_from(tally);

        let remaining = self.queue.counts().map(|c| c.outstanding()).unwrap_or(0);
        log_info!(
            ctx,
            "FLUSH_COMPLETE",
            outcome = report.outcome,
            delivered = report.delivered,
            remaining = remaining,
        );
        self.finish(report, started)
    }

    /// Reclaim stale in-flight entries and count dead letters.
    pub fn reconcile(&self) -> Result<ReconcileReport, QueueError> {
        self.reconcile_with(&LogContext::generate("reconcile"))
    }

    fn reconcile_with(&self, ctx: &LogContext) -> Result<ReconcileReport, QueueError> {
        let reclaimed = self.queue.reclaim_stale(self.settings.in_flight_lease)? as u64;
        let dead_letters = self.queue.dead_letters(DEAD_LETTER_SCAN_LIMIT)?.len() as u64;

        if dead_letters > 0 {
            log_warn!(
                ctx,
                "SYNC_DEAD_LETTERS_PRESENT",
                count = dead_letters,
                reclaimed = reclaimed,
            );
        } else if reclaimed > 0 {
            log_info!(ctx, "SYNC_RECONCILED", reclaimed = reclaimed);
        }

        Ok(ReconcileReport {
            reclaimed,
            dead_letters,
        })
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            cycles: self.counters.cycles.load(Ordering::Relaxed),
            offline_cycles: self.counters.offline_cycles.load(Ordering::Relaxed),
            batches_sent: self.counters.batches_sent.load(Ordering::Relaxed),
            batches_failed: self.counters.batches_failed.load(Ordering::Relaxed),
            entries_delivered: self.counters.entries_delivered.load(Ordering::Relaxed),
            last_synced_at: *self.last_synced_at.read(),
            last_outcome: *self.last_outcome.read(),
        }
    }

    /// Send batches until the queue is empty, a batch fails, the service is
    /// interrupted, or the deadline passes. Checks only at batch boundaries.
    fn drain(&self, ctx: &LogContext, deadline: Option<Instant>) -> DrainTally {
        let mut tally = DrainTally {
            outcome: SyncOutcome::Drained,
            batches_sent: 0,
            delivered: 0,
            failed: 0,
            dead_lettered: 0,
        };

        loop {
            if self.is_interrupted() {
                tally.outcome = SyncOutcome::Interrupted;
                log_info!(ctx, "SYNC_INTERRUPTED", batches = tally.batches_sent);
                break;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tally.outcome = SyncOutcome::TimedOut;
                break;
            }

            let entries = match self.queue.dequeue_batch(self.settings.batch_size) {
                Ok(entries) => entries,
                Err(e) => {
                    log_error!(ctx, "SYNC_DEQUEUE_FAILED", error = e.to_string());
                    tally.outcome = SyncOutcome::StorageError;
                    break;
                }
            };
            if entries.is_empty() {
                break;
            }

            let batch = OutboundBatch::new(&self.node_key.read(), &entries);
            match self.transport.send_batch(&batch) {
                Ok(()) => {
                    tally.batches_sent += 1;
                    self.counters.batches_sent.fetch_add(1, Ordering::Relaxed);
                    let mut acked = 0;
                    for entry in &entries {
                        match self.queue.mark_delivered(entry.id) {
                            Ok(()) => acked += 1,
                            // Left in-flight; recovery resends it (at-least-once).
                            Err(e) => {
                                log_error!(
                                    ctx,
                                    "SYNC_ACK_NOT_RECORDED",
                                    entry_id = entry.id.0,
                                    error = e.to_string(),
                                );
                            }
                        }
                    }
                    tally.delivered += acked;
                    self.counters
                        .entries_delivered
                        .fetch_add(acked, Ordering::Relaxed);
                    log_debug!(
                        ctx,
                        "SYNC_BATCH_DELIVERED",
                        batch_id = batch.batch_id,
                        size = batch.len(),
                    );
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.counters.batches_failed.fetch_add(1, Ordering::Relaxed);
                    log_warn!(
                        ctx,
                        "SYNC_BATCH_FAILED",
                        batch_id = batch.batch_id,
                        size = batch.len(),
                        error = reason,
                    );
                    for entry in &entries {
                        match self.queue.mark_failed(entry.id, &reason) {
                            Ok(status) => {
                                tally.failed += 1;
                                if status == EntryStatus::Failed {
                                    tally.dead_lettered += 1;
                                }
                            }
                            Err(e) => {
                                log_error!(
                                    ctx,
                                    "SYNC_FAILURE_NOT_RECORDED",
                                    entry_id = entry.id.0,
                                    error = e.to_string(),
                                );
                            }
                        }
                    }
                    tally.outcome = SyncOutcome::BatchFailed;
                    break;
                }
            }
        }

        tally
    }

    fn report_from(tally: DrainTally) -> SyncReport {
        SyncReport {
            outcome: tally.outcome,
            batches_sent: tally.batches_sent,
            delivered: tally.delivered,
            failed: tally.failed,
            dead_lettered: tally.dead_lettered,
            reclaimed: 0,
            duration_ms: 0,
        }
    }

    fn finish(&self, mut report: SyncReport, started: Instant) -> SyncReport {
        report.duration_ms = started.elapsed().as_millis() as u64;
        if matches!(report.outcome, SyncOutcome::Drained) {
            *self.last_synced_at.write() = Some(Utc::now());
        }
        if report.outcome != SyncOutcome::AlreadyRunning {
            *self.last_outcome.write() = Some(report.outcome);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::storage::queue::QueueOptions;
    use crate::sync::transport::{Enrollment, EnrollmentRequest, Heartbeat};
    use serde_json::json;
    use std::sync::mpsc;

    /// Fake endpoint: records every batch it accepts.
    #[derive(Default)]
    struct FakeTransport {
        reachable: AtomicBool,
        reject: AtomicBool,
        sent: parking_lot::Mutex<Vec<OutboundBatch>>,
    }

    impl FakeTransport {
        fn online() -> Self {
            let t = Self::default();
            t.reachable.store(true, Ordering::SeqCst);
            t
        }

        fn delivered_ids(&self) -> Vec<EntryId> {
            self.sent
                .lock()
                .iter()
                .flat_map(|b| b.entries.iter().map(|e| e.entry_id))
                .collect()
        }
    }

    impl Transport for FakeTransport {
        fn probe(&self) -> Result<(), TransportError> {
            if self.reachable.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(TransportError::Status(503))
            }
        }

        fn send_batch(&self, batch: &OutboundBatch) -> Result<(), TransportError> {
            if self.reject.load(Ordering::SeqCst) {
                return Err(TransportError::Status(500));
            }
            self.sent.lock().push(batch.clone());
            Ok(())
        }

        fn heartbeat(&self, _beat: &Heartbeat) -> Result<(), TransportError> {
            Ok(())
        }

        fn enroll(&self, _request: &EnrollmentRequest) -> Result<Enrollment, TransportError> {
            Err(TransportError::Status(404))
        }
    }

    /// Accepts batches, but holds each `send_batch` until the test releases it.
    struct GatedTransport {
        entered: parking_lot::Mutex<mpsc::Sender<()>>,
        release: parking_lot::Mutex<mpsc::Receiver<()>>,
        sent: parking_lot::Mutex<Vec<OutboundBatch>>,
    }

    impl Transport for GatedTransport {
        fn probe(&self) -> Result<(), TransportError> {
            Ok(())
        }

        fn send_batch(&self, batch: &OutboundBatch) -> Result<(), TransportError> {
            let _ = self.entered.lock().send(());
            let _ = self.release.lock().recv();
            self.sent.lock().push(batch.clone());
            Ok(())
        }

        fn heartbeat(&self, _beat: &Heartbeat) -> Result<(), TransportError> {
            Ok(())
        }

        fn enroll(&self, _request: &EnrollmentRequest) -> Result<Enrollment, TransportError> {
            Err(TransportError::Status(404))
        }
    }

    fn settings(batch_size: usize) -> SyncSettings {
        SyncSettings {
            node_key: "node-test".to_string(),
            batch_size,
            offline_mode: false,
            in_flight_lease: Duration::from_secs(300),
        }
    }

    fn service(
        dir: &tempfile::TempDir,
        transport: Arc<FakeTransport>,
        batch_size: usize,
    ) -> SyncService {
        let queue = SyncQueue::open(dir.path().join("edge.db"), QueueOptions::default()).unwrap();
        SyncService::new(Arc::new(queue), transport, settings(batch_size))
    }

    #[test]
    fn test_offline_leaves_entries_pending() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::default());
        let sync = service(&dir, transport.clone(), 10);
        sync.queue_sync("t", &json!(1)).unwrap();
        sync.queue_sync("t", &json!(2)).unwrap();

        let report = sync.sync();

        assert_eq!(report.outcome, SyncOutcome::Offline);
        let counts = sync.queue().counts().unwrap();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.in_flight, 0);
        assert_eq!(sync.stats().offline_cycles, 1);
        assert!(transport.sent.lock().is_empty());
    }

    #[test]
    fn test_drains_in_batches_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::online());
        let sync = service(&dir, transport.clone(), 2);
        let ids: Vec<_> = (0..5)
            .map(|n| sync.queue_sync("t", &json!(n)).unwrap())
            .collect();

        let report = sync.sync();

        assert_eq!(report.outcome, SyncOutcome::Drained);
        assert_eq!(report.batches_sent, 3);
        assert_eq!(report.delivered, 5);
        assert_eq!(transport.delivered_ids(), ids);
        assert_eq!(sync.queue().counts().unwrap().outstanding(), 0);
        assert!(sync.stats().last_synced_at.is_some());
    }

    #[test]
    fn test_failed_batch_stops_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::online());
        transport.reject.store(true, Ordering::SeqCst);
        let sync = service(&dir, transport.clone(), 2);
        for n in 0..3 {
            sync.queue_sync("t", &json!(n)).unwrap();
        }

        let report = sync.sync();

        assert_eq!(report.outcome, SyncOutcome::BatchFailed);
        assert_eq!(report.failed, 2);
        let counts = sync.queue().counts().unwrap();
        assert_eq!(counts.pending, 3);
        assert_eq!(counts.in_flight, 0);
    }

    #[test]
    fn test_retries_on_next_cycle_then_dead_letters() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::online());
        transport.reject.store(true, Ordering::SeqCst);
        let sync = service(&dir, transport.clone(), 10);
        let id = sync.queue_sync("t", &json!("x")).unwrap();

        sync.sync();
        sync.sync();
        let last = sync.sync();

        assert_eq!(last.dead_lettered, 1);
        let entry = sync.queue().get(id).unwrap().unwrap();
        assert_eq!(entry.status, EntryStatus::Failed);
        assert_eq!(entry.attempts, 3);

        transport.reject.store(false, Ordering::SeqCst);
        let after = sync.sync();
        assert_eq!(after.delivered, 0);
        assert_eq!(sync.reconcile().unwrap().dead_letters, 1);
    }

    #[test]
    fn test_offline_mode_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::online());
        let queue = SyncQueue::open(dir.path().join("edge.db"), QueueOptions::default()).unwrap();
        let sync = SyncService::new(
            Arc::new(queue),
            transport.clone(),
            SyncSettings {
                offline_mode: true,
                ..settings(10)
            },
        );
        sync.queue_sync("t", &json!(1)).unwrap();

        assert_eq!(sync.sync().outcome, SyncOutcome::OfflineMode);
        assert!(transport.sent.lock().is_empty());
    }

    #[test]
    fn test_interrupt_stops_running_cycle_at_batch_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let transport = Arc::new(GatedTransport {
            entered: parking_lot::Mutex::new(entered_tx),
            release: parking_lot::Mutex::new(release_rx),
            sent: parking_lot::Mutex::new(Vec::new()),
        });
        let queue = SyncQueue::open(dir.path().join("edge.db"), QueueOptions::default()).unwrap();
        let sync = Arc::new(SyncService::new(
            Arc::new(queue),
            transport.clone(),
            settings(1),
        ));
        for n in 0..3 {
            sync.queue_sync("t", &json!(n)).unwrap();
        }

        let handle = {
            let sync = sync.clone();
            std::thread::spawn(move || sync.sync())
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        sync.interrupt();
        release_tx.send(()).unwrap();
        let report = handle.join().unwrap();

        assert_eq!(report.outcome, SyncOutcome::Interrupted);
        assert_eq!(report.delivered, 1);
        assert_eq!(transport.sent.lock().len(), 1);
        assert_eq!(sync.queue().counts().unwrap().pending, 2);
        assert!(!sync.is_interrupted());
    }

    #[test]
    fn test_interrupt_while_idle_does_not_abort_later_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::default());
        let sync = service(&dir, transport.clone(), 1);
        sync.queue_sync("t", &json!(1)).unwrap();
        sync.queue_sync("t", &json!(2)).unwrap();

        sync.interrupt();
        assert_eq!(sync.sync().outcome, SyncOutcome::Offline);

        transport.reachable.store(true, Ordering::SeqCst);
        let report = sync.sync();

        assert_eq!(report.outcome, SyncOutcome::Drained);
        assert_eq!(report.delivered, 2);
    }

    #[test]
    fn test_not_enrolled_until_key_set() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::online());
        let queue = SyncQueue::open(dir.path().join("edge.db"), QueueOptions::default()).unwrap();
        let sync = SyncService::new(
            Arc::new(queue),
            transport.clone(),
            SyncSettings {
                node_key: String::new(),
                ..settings(10)
            },
        );
        sync.queue_sync("t", &json!(1)).unwrap();

        assert_eq!(sync.sync().outcome, SyncOutcome::NotEnrolled);
        assert!(transport.sent.lock().is_empty());

        sync.set_node_key("node-enrolled");
        assert_eq!(sync.sync().delivered, 1);
        assert_eq!(transport.sent.lock()[0].node_key, "node-enrolled");
    }

    #[test]
    fn test_flush_drains_everything() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::online());
        let sync = service(&dir, transport.clone(), 3);
        for n in 0..7 {
            sync.queue_sync("t", &json!(n)).unwrap();
        }

        sync.interrupt();
        let report = sync.flush(Duration::from_secs(5));

        assert_eq!(report.outcome, SyncOutcome::Drained);
        assert_eq!(report.delivered, 7);
    }

    #[test]
    fn test_flush_with_zero_timeout_leaves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::online());
        let sync = service(&dir, transport.clone(), 3);
        sync.queue_sync("t", &json!(1)).unwrap();

        let report = sync.flush(Duration::ZERO);

        assert_eq!(report.outcome, SyncOutcome::TimedOut);
        assert_eq!(sync.queue().counts().unwrap().pending, 1);
    }

    #[test]
    fn test_reconcile_reclaims_stale_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::online());
        let queue = SyncQueue::open(dir.path().join("edge.db"), QueueOptions::default()).unwrap();
        let sync = SyncService::new(
            Arc::new(queue),
            transport.clone(),
            SyncSettings {
                in_flight_lease: Duration::ZERO,
                ..settings(10)
            },
        );
        sync.queue_sync("t", &json!(1)).unwrap();
        sync.queue().dequeue_batch(1).unwrap();

        let report = sync.sync();

        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.delivered, 1);
    }
}
