//! Structured logging with run context.
//!
//! Provides logging macros and utilities that include the ingestion job or
//! sync cycle id in every log message for easy correlation.

pub mod structured;

pub use structured::*;

/// Initialize the process-wide logger at the given level.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logger(level: &str) {
    let filter = level
        .parse::<log::LevelFilter>()
        .unwrap_or(log::LevelFilter::Info);

    let _ = env_logger::builder()
        .filter_level(filter)
        .format_timestamp_millis()
        .try_init();
}
