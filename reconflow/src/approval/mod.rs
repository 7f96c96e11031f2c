//! Human approval gate for the developer notification.
//!
//! Lifecycle of a request:
//!
//! ```text
//! pending ──approve──▶ approved ──▶ developer notification (or local copy)
//!    │ ────deny─────▶ denied
//!    └────withdraw──▶ withdrawn   (explicit action or idle timeout)
//! ```
//!
//! A request exists only for sessions with a non-zero vulnerability count.
//! It is persisted under `approval/request.json` before the unit starts
//! waiting, so a crashed unit can be resumed from disk.

mod channel;
mod request;
mod terminal;
mod workflow;

pub use channel::{DecisionChannel, FileDecisionChannel, InMemoryChannel, DECISION_FILE};
pub use request::{ApprovalRequest, ApprovalStatus, Decision, REQUEST_FILE};
pub use terminal::TerminalChannel;
pub use workflow::{ApprovalHandle, ApprovalWorkflow, DEVELOPER_REPORT_FILE};

use crate::config::{ApprovalChannelKind, ApprovalConfig};
use std::sync::Arc;

/// Builds the configured decision channel.
#[must_use]
pub fn channel_for(config: &ApprovalConfig) -> Arc<dyn DecisionChannel> {
    match config.channel {
        ApprovalChannelKind::Terminal => Arc::new(TerminalChannel::new()),
        ApprovalChannelKind::File => Arc::new(FileDecisionChannel::new(config.poll_interval())),
    }
}
