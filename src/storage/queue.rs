//! Durable at-least-once sync queue.
//!
//! Entries live in the `sync_queue` table of the edge database. Each queue
//! operation runs in its own `BEGIN IMMEDIATE` transaction, so operations are
//! atomic with respect to each other even across processes sharing the file.
//!
//! Lifecycle: `pending` -> `in-flight` (dequeue) -> deleted (delivered), or
//! back to `pending` on failure until `max_attempts`, then `failed`
//! (dead-letter, kept for inspection). Entries found `in-flight` at open are
//! returned to `pending`: delivery is at-least-once, never exactly-once.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde_json::Value;

use crate::error::QueueError;

use super::database::{from_ms, now_ms, open_database, DEFAULT_BUSY_TIMEOUT};
use super::models::{EntryId, EntryStatus, QueueCounts, SyncQueueEntry};
use super::queries;

/// Default delivery attempts before an entry is dead-lettered.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Queue behaviour knobs.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub max_attempts: u32,
    pub busy_timeout: Duration,
    /// Return leftover `in-flight` entries to `pending` on open. Disable for
    /// processes that only enqueue while another process drains.
    pub recover_on_open: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            recover_on_open: true,
        }
    }
}

/// Raw column values of one `sync_queue` row.
struct QueueRow {
    seq: i64,
    entity_type: String,
    payload: String,
    enqueued_at_ms: i64,
    attempts: i64,
    status: String,
    dispatched_at_ms: Option<i64>,
    last_error: Option<String>,
}

impl QueueRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            entity_type: row.get(1)?,
            payload: row.get(2)?,
            enqueued_at_ms: row.get(3)?,
            attempts: row.get(4)?,
            status: row.get(5)?,
            dispatched_at_ms: row.get(6)?,
            last_error: row.get(7)?,
        })
    }

    fn status(&self) -> Result<EntryStatus, QueueError> {
        EntryStatus::from_db(&self.status).ok_or_else(|| {
            QueueError::Corrupt(format!("entry {} has status {:?}", self.seq, self.status))
        })
    }

    fn into_entry(self) -> Result<SyncQueueEntry, QueueError> {
        let status = self.status()?;
        let payload: Value = serde_json::from_str(&self.payload)?;
        Ok(SyncQueueEntry {
            id: EntryId(self.seq),
            entity_type: self.entity_type,
            payload,
            enqueued_at: from_ms(self.enqueued_at_ms)?,
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            status,
            dispatched_at: self.dispatched_at_ms.map(from_ms).transpose()?,
            last_error: self.last_error,
        })
    }
}

/// SQLite-backed FIFO of sanitized payloads.
pub struct SyncQueue {
    conn: Mutex<Connection>,
    path: PathBuf,
    max_attempts: u32,
}

impl SyncQueue {
    /// Open the queue stored in the database at `path`.
    pub fn open(path: impl AsRef<Path>, options: QueueOptions) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();
        let conn = open_database(&path, options.busy_timeout)?;

        let queue = Self {
            conn: Mutex::new(conn),
            path,
            max_attempts: options.max_attempts.max(1),
        };

        if options.recover_on_open {
            queue.recover_in_flight()?;
        }

        let counts = queue.counts()?;
        log::info!(
            "QUEUE_OPENED path={} pending={} in_flight={} failed={} max_attempts={}",
            queue.path.display(),
            counts.pending,
            counts.in_flight,
            counts.failed,
            queue.max_attempts
        );

        Ok(queue)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Append a pending entry. The entry is committed to disk on return.
    pub fn enqueue(&self, entity_type: &str, payload: &Value) -> Result<EntryId, QueueError> {
        let body = serde_json::to_string(payload)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(queries::INSERT_ENTRY, params![entity_type, body, now_ms()])?;
        let id = EntryId(tx.last_insert_rowid());
        tx.commit()?;

        log::debug!(
            "QUEUE_ENQUEUED id={} entity_type={} bytes={}",
            id,
            entity_type,
            body.len()
        );
        Ok(id)
    }

    /// Claim up to `max_count` of the oldest pending entries.
    ///
    /// The returned entries are `in-flight` and will not be handed out again
    /// until they are marked failed, reclaimed, or recovered on reopen.
    pub fn dequeue_batch(&self, max_count: usize) -> Result<Vec<SyncQueueEntry>, QueueError> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let rows = {
            let mut stmt = tx.prepare(&queries::select_oldest_pending())?;
            let limit = i64::try_from(max_count).unwrap_or(i64::MAX);
            let rows = stmt
                .query_map(params![limit], QueueRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let dispatched_at = now_ms();
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            tx.execute(queries::MARK_IN_FLIGHT, params![row.seq, dispatched_at])?;
            let mut entry = row.into_entry()?;
            entry.status = EntryStatus::InFlight;
            entry.dispatched_at = Some(from_ms(dispatched_at)?);
            entries.push(entry);
        }
        tx.commit()?;

        if !entries.is_empty() {
            log::debug!(
                "QUEUE_DEQUEUED count={} first={} last={}",
                entries.len(),
                entries[0].id,
                entries[entries.len() - 1].id
            );
        }
        Ok(entries)
    }

    /// Remove an acknowledged entry.
    pub fn mark_delivered(&self, id: EntryId) -> Result<(), QueueError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute(queries::DELETE_ENTRY, params![id.0])?;
        if removed == 0 {
            return Err(QueueError::NotFound(id));
        }
        tx.commit()?;

        log::debug!("QUEUE_DELIVERED id={}", id);
        Ok(())
    }

    /// Record a failed delivery attempt for an in-flight entry.
    ///
    /// Returns the entry's new status: `pending` while attempts remain,
    /// `failed` once `max_attempts` is reached.
    pub fn mark_failed(&self, id: EntryId, reason: &str) -> Result<EntryStatus, QueueError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row = tx
            .query_row(&queries::select_entry(), params![id.0], QueueRow::from_row)
            .optional()?
            .ok_or(QueueError::NotFound(id))?;

        let status = row.status()?;
        if status != EntryStatus::InFlight {
            return Err(QueueError::InvalidState {
                id,
                status,
                expected: EntryStatus::InFlight,
            });
        }

        let attempts = row.attempts + 1;
        let next = if attempts >= i64::from(self.max_attempts) {
            EntryStatus::Failed
        } else {
            EntryStatus::Pending
        };

        tx.execute(
            queries::RECORD_FAILURE,
            params![id.0, attempts, next.as_str(), reason, now_ms()],
        )?;
        tx.commit()?;

        if next == EntryStatus::Failed {
            log::warn!(
                "QUEUE_DEAD_LETTER id={} entity_type={} attempts={} reason={}",
                id,
                row.entity_type,
                attempts,
                reason
            );
        } else {
            log::debug!("QUEUE_RETRY_SCHEDULED id={} attempts={}", id, attempts);
        }
        Ok(next)
    }

    /// Return every `in-flight` entry to `pending`. Runs on open.
    pub fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let recovered = tx.execute(queries::RECOVER_IN_FLIGHT, params![now_ms()])?;
        tx.commit()?;

        if recovered > 0 {
            log::warn!("QUEUE_IN_FLIGHT_RECOVERED count={}", recovered);
        }
        Ok(recovered)
    }

    /// Return entries that have been `in-flight` for at least `lease` to
    /// `pending`. Covers a drainer in another process that died mid-batch.
    pub fn reclaim_stale(&self, lease: Duration) -> Result<usize, QueueError> {
        let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
        let now = now_ms();
        let cutoff = now.saturating_sub(lease_ms);

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let reclaimed = tx.execute(queries::RECLAIM_STALE, params![cutoff, now])?;
        tx.commit()?;

        if reclaimed > 0 {
            log::warn!(
                "QUEUE_STALE_RECLAIMED count={} lease_ms={}",
                reclaimed,
                lease_ms
            );
        }
        Ok(reclaimed)
    }

    pub fn get(&self, id: EntryId) -> Result<Option<SyncQueueEntry>, QueueError> {
        let conn = self.conn.lock();
        conn.query_row(&queries::select_entry(), params![id.0], QueueRow::from_row)
            .optional()?
            .map(QueueRow::into_entry)
            .transpose()
    }

    /// Oldest dead-lettered entries, for operator inspection.
    pub fn dead_letters(&self, limit: usize) -> Result<Vec<SyncQueueEntry>, QueueError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&queries::select_dead_letters())?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], QueueRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(QueueRow::into_entry).collect()
    }

    /// Give a dead-lettered entry a fresh set of attempts.
    pub fn requeue_dead_letter(&self, id: EntryId) -> Result<(), QueueError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = tx.execute(queries::REQUEUE_DEAD_LETTER, params![id.0, now_ms()])?;
        if updated == 0 {
            let status = tx
                .query_row(&queries::select_entry(), params![id.0], QueueRow::from_row)
                .optional()?
                .map(|row| row.status())
                .transpose()?;
            return Err(match status {
                None => QueueError::NotFound(id),
                Some(status) => QueueError::InvalidState {
                    id,
                    status,
                    expected: EntryStatus::Failed,
                },
            });
        }
        tx.commit()?;

        log::info!("QUEUE_DEAD_LETTER_REQUEUED id={}", id);
        Ok(())
    }

    pub fn counts(&self) -> Result<QueueCounts, QueueError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(queries::COUNT_BY_STATUS)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = QueueCounts::default();
        for (status, count) in rows {
            let count = u64::try_from(count).unwrap_or(0);
            match EntryStatus::from_db(&status) {
                Some(EntryStatus::Pending) => counts.pending = count,
                Some(EntryStatus::InFlight) => counts.in_flight = count,
                Some(EntryStatus::Failed) => counts.failed = count,
                Some(EntryStatus::Delivered) | None => {}
            }
        }
        Ok(counts)
    }
}
