//! Queue draining and cloud transport.

pub mod service;
pub mod transport;

pub use service::{ReconcileReport, SyncOutcome, SyncReport, SyncService, SyncSettings, SyncStats};
pub use transport::{
    Enrollment, EnrollmentRequest, Heartbeat, HttpTransport, OutboundBatch, OutboundEntry, Transport,
};
