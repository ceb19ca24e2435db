//! Local ledger of ingestion jobs.
//!
//! Only sanitized output is ever written here. Raw input never reaches disk.
//! Finished rows are pruned after a retention window; the number of jobs ever
//! completed is kept separately so it survives both pruning and restarts.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;

use crate::error::QueueError;

use super::database::{from_ms, now_ms, open_database};
use super::models::{JobRecord, JobStatus};
use super::queries;

pub struct JobLedger {
    conn: Mutex<Connection>,
}

impl JobLedger {
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, QueueError> {
        let conn = open_database(path.as_ref(), busy_timeout)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record a job as running.
    pub fn start(&self, job_id: &str, job_type: &str) -> Result<(), QueueError> {
        let conn = self.conn.lock();
        conn.execute(queries::INSERT_JOB, params![job_id, job_type, now_ms()])?;
        log::debug!("JOB_STARTED job_id={} job_type={}", job_id, job_type);
        Ok(())
    }

    /// Mark a job completed with its sanitized output.
    pub fn complete(&self, job_id: &str, output: &Value) -> Result<(), QueueError> {
        let body = serde_json::to_string(output)?;
        self.finish(job_id, JobStatus::Completed, Some(body), None)
    }

    pub fn fail(&self, job_id: &str, reason: &str) -> Result<(), QueueError> {
        self.finish(job_id, JobStatus::Failed, None, Some(reason))
    }

    fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        output: Option<String>,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = tx.execute(
            queries::FINISH_JOB,
            params![job_id, status.as_str(), output, error, now_ms()],
        )?;
        if updated == 0 {
            return Err(QueueError::Corrupt(format!("job {} was never started", job_id)));
        }
        if status == JobStatus::Completed {
            tx.execute(queries::BUMP_TOTAL, params![queries::JOBS_COMPLETED_TOTAL])?;
        }
        tx.commit()?;
        log::debug!("JOB_FINISHED job_id={} status={}", job_id, status.as_str());
        Ok(())
    }

    pub fn get(&self, job_id: &str) -> Result<Option<JobRecord>, QueueError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(queries::SELECT_JOB, params![job_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })
            .optional()?;

        let Some((id, job_type, status, output, created_at, updated_at)) = row else {
            return Ok(None);
        };

        let status = JobStatus::from_db(&status)
            .ok_or_else(|| QueueError::Corrupt(format!("job {} has status {:?}", id, status)))?;
        let output_data = output
            .map(|body| serde_json::from_str::<Value>(&body))
            .transpose()?;

        Ok(Some(JobRecord {
            id,
            job_type,
            status,
            output_data,
            created_at: from_ms(created_at)?,
            updated_at: from_ms(updated_at)?,
        }))
    }

    /// Jobs currently held in the ledger, of any status.
    pub fn count(&self) -> Result<u64, QueueError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(queries::COUNT_JOBS, [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Jobs ever completed against this database, pruned ones included.
    pub fn completed_total(&self) -> Result<u64, QueueError> {
        let conn = self.conn.lock();
        let total: Option<i64> = conn
            .query_row(
                queries::SELECT_TOTAL,
                params![queries::JOBS_COMPLETED_TOTAL],
                |row| row.get(0),
            )
            .optional()?;
        Ok(total.and_then(|t| u64::try_from(t).ok()).unwrap_or(0))
    }

    /// Delete completed and failed jobs not updated within `retention`.
    pub fn prune_older_than(&self, retention: Duration) -> Result<usize, QueueError> {
        let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_ms().saturating_sub(retention_ms);

        let conn = self.conn.lock();
        let pruned = conn.execute(queries::PRUNE_FINISHED_JOBS, params![cutoff])?;
        if pruned > 0 {
            log::info!("JOBS_PRUNED count={} retention_ms={}", pruned, retention.as_millis());
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::DEFAULT_BUSY_TIMEOUT;
    use serde_json::json;

    fn ledger(dir: &tempfile::TempDir) -> JobLedger {
        JobLedger::open(dir.path().join("edge.db"), DEFAULT_BUSY_TIMEOUT).unwrap()
    }

    #[test]
    fn test_job_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = ledger(&dir);

        jobs.start("job-1", "data_ingestion").unwrap();
        let running = jobs.get("job-1").unwrap().unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert!(running.output_data.is_none());

        jobs.complete("job-1", &json!({"piiDetected": true})).unwrap();
        let done = jobs.get("job-1").unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.output_data, Some(json!({"piiDetected": true})));
        assert_eq!(jobs.count().unwrap(), 1);
    }

    #[test]
    fn test_failed_job() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = ledger(&dir);

        jobs.start("job-2", "data_ingestion").unwrap();
        jobs.fail("job-2", "leak detected").unwrap();
        assert_eq!(jobs.get("job-2").unwrap().unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn test_prune_keeps_running_and_recent_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = ledger(&dir);

        jobs.start("old-done", "data_ingestion").unwrap();
        jobs.complete("old-done", &json!({})).unwrap();
        jobs.start("old-failed", "data_ingestion").unwrap();
        jobs.fail("old-failed", "leak detected").unwrap();
        jobs.start("still-running", "data_ingestion").unwrap();
        std::thread::sleep(Duration::from_millis(300));
        jobs.start("fresh", "data_ingestion").unwrap();
        jobs.complete("fresh", &json!({})).unwrap();

        assert_eq!(jobs.prune_older_than(Duration::from_secs(3600)).unwrap(), 0);
        assert_eq!(jobs.prune_older_than(Duration::from_millis(150)).unwrap(), 2);

        assert!(jobs.get("old-done").unwrap().is_none());
        assert!(jobs.get("old-failed").unwrap().is_none());
        assert!(jobs.get("still-running").unwrap().is_some());
        assert!(jobs.get("fresh").unwrap().is_some());
        assert_eq!(jobs.count().unwrap(), 2);
        assert_eq!(jobs.completed_total().unwrap(), 2);
    }

    #[test]
    fn test_completed_total_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let jobs = ledger(&dir);
            jobs.start("a", "data_ingestion").unwrap();
            jobs.complete("a", &json!({})).unwrap();
            jobs.start("b", "data_ingestion").unwrap();
            jobs.fail("b", "boom").unwrap();
        }

        let jobs = ledger(&dir);
        assert_eq!(jobs.completed_total().unwrap(), 1);
    }

    #[test]
    fn test_finish_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = ledger(&dir);
        assert!(jobs.complete("missing", &json!({})).is_err());
        assert!(jobs.get("missing").unwrap().is_none());
    }
}
