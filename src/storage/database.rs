//! Embedded database setup.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;

use crate::error::QueueError;

use super::queries::{CREATE_TABLES, PRAGMAS};

/// Default time a writer waits on a lock held by another connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) the edge database at `path`.
pub fn open_database(path: &Path, busy_timeout: Duration) -> Result<Connection, QueueError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(PRAGMAS)?;
    conn.execute_batch(CREATE_TABLES)?;

    log::debug!("DATABASE_OPENED path={}", path.display());
    Ok(conn)
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn from_ms(ms: i64) -> Result<DateTime<Utc>, QueueError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| QueueError::Corrupt(format!("timestamp out of range: {}", ms)))
}
