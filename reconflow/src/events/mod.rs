//! Write-only activity history.
//!
//! The pipeline, the notification gateway and the approval workflow record
//! what they did through an [`AuditSink`]. Nothing in the crate reads the
//! history back; it exists for operators and external tooling.

mod sink;

pub use sink::{
    AuditSink, CollectingAuditSink, JsonlAuditSink, LoggingAuditSink, NoOpAuditSink,
};

/// History file name inside the session root.
pub const HISTORY_FILE: &str = "history.jsonl";

/// Activity names recorded in the history.
pub mod activity {
    /// A target run started.
    pub const SCAN_STARTED: &str = "scan.started";
    /// A target run reached `Done`.
    pub const SCAN_COMPLETED: &str = "scan.completed";
    /// A target run reached `Aborted`.
    pub const SCAN_ABORTED: &str = "scan.aborted";
    /// A notification went out through the sink.
    pub const NOTIFICATION_SENT: &str = "notification.sent";
    /// A notification fell back to a local copy.
    pub const NOTIFICATION_SAVED_LOCALLY: &str = "notification.saved_locally";
    /// An approval request was persisted.
    pub const APPROVAL_REQUESTED: &str = "approval.requested";
    /// An approval request reached a terminal state.
    pub const APPROVAL_DECIDED: &str = "approval.decided";
}
