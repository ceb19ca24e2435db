//! Security module.
//!
//! Provides PII detection, deterministic tokenization and the pre-enqueue
//! leak check for sanitized records.

pub mod leak_guard;
pub mod pii;
pub mod redaction;

pub use leak_guard::*;
pub use pii::*;
pub use redaction::*;
