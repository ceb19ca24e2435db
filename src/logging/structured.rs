//! Structured logging utilities.
//!
//! Every log line carries the id of the run it belongs to (an ingestion job
//! or a sync cycle) and, where relevant, the entity being handled.

use std::fmt;

/// Logging context for one ingestion job or sync cycle.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub entity: Option<String>,
}

impl LogContext {
    pub fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            entity: None,
        }
    }

    /// Generate a short run id with the given prefix, e.g. `sync-1a2b3c4d`.
    pub fn generate(prefix: &str) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self::new(&format!("{}-{}", prefix, &id[..8]))
    }

    pub fn with_entity(&self, entity: &str) -> Self {
        Self {
            run_id: self.run_id.clone(),
            entity: Some(entity.to_string()),
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.entity {
            Some(entity) => write!(f, "[run={}] [entity={}]", self.run_id, entity),
            None => write!(f, "[run={}]", self.run_id),
        }
    }
}

/// Log an info message with context.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::info!(
            concat!("{} {}", $(" ", stringify!($key), "={:?}"),*),
            $ctx,
            $event,
            $($value),*
        );
    };
}

/// Log a warning message with context.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::warn!(
            concat!("{} {}", $(" ", stringify!($key), "={:?}"),*),
            $ctx,
            $event,
            $($value),*
        );
    };
}

/// Log an error message with context.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::error!(
            concat!("{} {}", $(" ", stringify!($key), "={:?}"),*),
            $ctx,
            $event,
            $($value),*
        );
    };
}

/// Log a debug message with context.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $event:expr, $($key:ident = $value:expr),* $(,)?) => {
        log::debug!(
            concat!("{} {}", $(" ", stringify!($key), "={:?}"),*),
            $ctx,
            $event,
            $($value),*
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_display() {
        let ctx = LogContext::new("sync-123");
        assert_eq!(format!("{}", ctx), "[run=sync-123]");

        let with_entity = ctx.with_entity("batch_ingestion");
        assert_eq!(
            format!("{}", with_entity),
            "[run=sync-123] [entity=batch_ingestion]"
        );
    }

    #[test]
    fn test_macros_accept_several_fields() {
        let ctx = LogContext::new("sync-1").with_entity("batch_ingestion");
        crate::log_info!(ctx, "SYNC_BATCH_DELIVERED", batch_id = "b-1", size = 3usize);
        crate::log_warn!(ctx, "SYNC_OFFLINE", error = "timeout");
        crate::log_error!(ctx, "SYNC_ACK_NOT_RECORDED", entry_id = 7i64, error = "busy");
        crate::log_debug!(ctx, "SYNC_SKIPPED", reason = "offline mode");
    }

    #[test]
    fn test_generated_run_id_has_prefix() {
        let ctx = LogContext::generate("ingest");
        assert!(ctx.run_id.starts_with("ingest-"));
        assert_eq!(ctx.run_id.len(), "ingest-".len() + 8);
    }
}
