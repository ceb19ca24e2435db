//! Edge node: ingestion, job ledger, queue and sync wired together.

pub mod edge;

pub use edge::{EdgeNode, IngestOutcome, NodeStatus, BATCH_INGESTION_ENTITY, INGESTION_JOB_TYPE};
