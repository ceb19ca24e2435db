//! Edge Node Core - local ingestion, PII redaction and durable cloud sync
//!
//! This crate is the data pipeline of an edge node. Raw tenant records are
//! ingested on the device, their schema is inferred, PII is tokenized, and
//! the sanitized result is queued on local disk and synced to the cloud when
//! connectivity allows. The implementation prioritizes:
//!
//! 1. **Privacy** - No cleartext PII leaves the device or reaches disk
//! 2. **Durability** - Queued entries survive crashes; delivery is at-least-once
//! 3. **Offline tolerance** - An unreachable endpoint is a normal state
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `security` - Redaction store, PII detector chain, leak check
//! - `pipeline` - Schema inference and the ingestion engine
//! - `storage` - SQLite-backed sync queue and job ledger
//! - `sync` - Cloud transport and the sync service
//! - `node` - Edge node orchestrator and run loop
//! - `config` - Environment-driven settings
//! - `logging` - Structured logging with run context
//! - `error` - Error types
//!
//! ## Example
//!
//! ```no_run
//! use edgenode_core::config::EdgeConfig;
//! use edgenode_core::node::EdgeNode;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EdgeConfig::load_with_dotenv()?;
//! edgenode_core::logging::init_logger(&config.log_level);
//!
//! let node = EdgeNode::open(config)?;
//! if !node.is_enrolled() {
//!     node.enroll("enrollment-key-from-console", "dock-3", "gateway")?;
//! }
//! let outcome = node.ingest(&[json!({"email": "a@b.com", "amount": 10})], None)?;
//! assert!(outcome.result.pii_detected);
//!
//! let report = node.sync();
//! println!("sync finished: {:?}", report.outcome);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod pipeline;
pub mod security;
pub mod storage;
pub mod sync;

pub use config::EdgeConfig;
pub use error::{LeakError, NodeError, QueueError, TransportError};
pub use node::EdgeNode;
pub use pipeline::{IngestionEngine, IngestionResult};
pub use security::{DetectorChain, RedactionStore};
pub use storage::SyncQueue;
pub use sync::{SyncService, Transport};
