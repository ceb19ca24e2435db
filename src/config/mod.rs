//! Configuration module.
//!
//! Environment-driven settings: cloud endpoint, node identity, intervals,
//! batch size, offline mode and log verbosity.

pub mod settings;

pub use settings::*;
