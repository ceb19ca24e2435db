//! Ingestion job context.
//!
//! Carries the job id and timing used for log correlation and the job ledger.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::logging::structured::LogContext;

/// Context for one ingestion call.
#[derive(Debug, Clone)]
pub struct IngestContext {
    pub job_id: String,
    pub started_at: DateTime<Utc>,
}

impl IngestContext {
    pub fn new() -> Self {
        Self::with_job_id(&Uuid::new_v4().to_string())
    }

    pub fn with_job_id(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn log_context(&self) -> LogContext {
        LogContext::new(&format!("ingest-{}", short_id(&self.job_id)))
    }

    /// Log context for a single field of this job.
    pub fn field_context(&self, field: &str) -> LogContext {
        self.log_context().with_entity(field)
    }
}

impl Default for IngestContext {
    fn default() -> Self {
        Self::new()
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
