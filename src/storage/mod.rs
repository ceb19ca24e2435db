//! Storage module.
//!
//! Embedded SQLite database holding the durable sync queue and the local
//! job ledger.

pub mod database;
pub mod jobs;
pub mod models;
pub mod queries;
pub mod queue;

pub use database::{open_database, DEFAULT_BUSY_TIMEOUT};
pub use jobs::JobLedger;
pub use models::*;
pub use queue::{QueueOptions, SyncQueue, DEFAULT_MAX_ATTEMPTS};
