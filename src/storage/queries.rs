//! SQL for the embedded edge database.
//!
//! The queue and the job ledger share one SQLite file. Timestamps are Unix
//! milliseconds. `seq` is AUTOINCREMENT so ids are never reused, even after
//! the newest rows are deleted.

/// Connection pragmas. WAL lets readers proceed during a write; FULL sync
/// makes a committed enqueue survive power loss.
pub const PRAGMAS: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = FULL;
    PRAGMA foreign_keys = ON;
"#;

pub const CREATE_TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS sync_queue (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        entity_type TEXT NOT NULL,
        payload TEXT NOT NULL,
        enqueued_at_ms INTEGER NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'pending',
        dispatched_at_ms INTEGER,
        last_error TEXT,
        updated_at_ms INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sync_queue_status_seq ON sync_queue(status, seq);

    CREATE TABLE IF NOT EXISTS local_jobs (
        id TEXT PRIMARY KEY,
        job_type TEXT NOT NULL,
        status TEXT NOT NULL,
        output_data TEXT,
        error TEXT,
        created_at_ms INTEGER NOT NULL,
        updated_at_ms INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_local_jobs_status ON local_jobs(status);
    CREATE INDEX IF NOT EXISTS idx_local_jobs_updated ON local_jobs(updated_at_ms);

    CREATE TABLE IF NOT EXISTS ledger_totals (
        name TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );
"#;

/// Columns read back for a queue entry, in `QueueRow` order.
pub const ENTRY_COLUMNS: &str =
    "seq, entity_type, payload, enqueued_at_ms, attempts, status, dispatched_at_ms, last_error";

pub const INSERT_ENTRY: &str = r#"
    INSERT INTO sync_queue (entity_type, payload, enqueued_at_ms, attempts, status, updated_at_ms)
    VALUES (?1, ?2, ?3, 0, 'pending', ?3)
"#;

pub fn select_oldest_pending() -> String {
    format!(
        "SELECT {} FROM sync_queue WHERE status = 'pending' ORDER BY seq ASC LIMIT ?1",
        ENTRY_COLUMNS
    )
}

pub fn select_entry() -> String {
    format!("SELECT {} FROM sync_queue WHERE seq = ?1", ENTRY_COLUMNS)
}

pub fn select_dead_letters() -> String {
    format!(
        "SELECT {} FROM sync_queue WHERE status = 'failed' ORDER BY seq ASC LIMIT ?1",
        ENTRY_COLUMNS
    )
}

pub const MARK_IN_FLIGHT: &str = r#"
    UPDATE sync_queue
    SET status = 'in-flight', dispatched_at_ms = ?2, updated_at_ms = ?2
    WHERE seq = ?1
"#;

pub const DELETE_ENTRY: &str = "DELETE FROM sync_queue WHERE seq = ?1";

pub const RECORD_FAILURE: &str = r#"
    UPDATE sync_queue
    SET attempts = ?2, status = ?3, last_error = ?4, dispatched_at_ms = NULL, updated_at_ms = ?5
    WHERE seq = ?1
"#;

pub const REQUEUE_DEAD_LETTER: &str = r#"
    UPDATE sync_queue
    SET attempts = 0, status = 'pending', updated_at_ms = ?2
    WHERE seq = ?1 AND status = 'failed'
"#;

/// Every in-flight entry back to pending (startup recovery).
pub const RECOVER_IN_FLIGHT: &str = r#"
    UPDATE sync_queue
    SET status = 'pending', dispatched_at_ms = NULL, updated_at_ms = ?1
    WHERE status = 'in-flight'
"#;

/// In-flight entries dispatched at or before ?1 back to pending.
pub const RECLAIM_STALE: &str = r#"
    UPDATE sync_queue
    SET status = 'pending', dispatched_at_ms = NULL, updated_at_ms = ?2
    WHERE status = 'in-flight' AND dispatched_at_ms <= ?1
"#;

pub const COUNT_BY_STATUS: &str =
    "SELECT status, COUNT(*) FROM sync_queue GROUP BY status";

pub const INSERT_JOB: &str = r#"
    INSERT INTO local_jobs (id, job_type, status, created_at_ms, updated_at_ms)
    VALUES (?1, ?2, 'running', ?3, ?3)
"#;

pub const FINISH_JOB: &str = r#"
    UPDATE local_jobs
    SET status = ?2, output_data = ?3, error = ?4, updated_at_ms = ?5
    WHERE id = ?1
"#;

pub const SELECT_JOB: &str = r#"
    SELECT id, job_type, status, output_data, created_at_ms, updated_at_ms
    FROM local_jobs WHERE id = ?1
"#;

pub const COUNT_JOBS: &str = "SELECT COUNT(*) FROM local_jobs";

/// Finished jobs last touched before `?1`. Running jobs are never pruned.
pub const PRUNE_FINISHED_JOBS: &str = r#"
    DELETE FROM local_jobs
    WHERE status != 'running' AND updated_at_ms < ?1
"#;

/// Name of the all-time completed jobs counter in `ledger_totals`.
pub const JOBS_COMPLETED_TOTAL: &str = "jobs_completed";

pub const BUMP_TOTAL: &str = r#"
    INSERT INTO ledger_totals (name, value) VALUES (?1, 1)
    ON CONFLICT(name) DO UPDATE SET value = value + 1
"#;

pub const SELECT_TOTAL: &str = "SELECT value FROM ledger_totals WHERE name = ?1";
