//! Error types for reconflow.
//!
//! Two layers live here. [`ReconflowError`] is what library calls return
//! when something cannot be absorbed (missing tools, filesystem failures,
//! misconfiguration). [`FailureKind`] is the run-time taxonomy attached to
//! outcomes and log lines: most kinds are recoverable and never surface as
//! an `Err`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for reconflow operations.
#[derive(Debug, Error)]
pub enum ReconflowError {
    /// Required external tools are not installed.
    #[error("{0}")]
    ToolMissing(#[from] ToolMissingError),

    /// A session could not be created or loaded.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// A component tried to write outside its write set.
    #[error("{0}")]
    WriteSet(#[from] WriteSetViolation),

    /// A component tried to read an artifact outside its read set.
    #[error("Read-set violation: {role} may not read '{path}'")]
    ReadSet {
        /// The role that attempted the read.
        role: String,
        /// Area-relative path of the artifact.
        path: String,
    },

    /// The approval workflow could not proceed.
    #[error("{0}")]
    Approval(#[from] ApprovalError),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ReconflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl ReconflowError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns true if the error ends the run it was raised in.
    ///
    /// Approval problems are the exception: the request stays pending and
    /// can be resumed later.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Approval(_))
    }

    /// Returns the taxonomy kind, when one applies.
    #[must_use]
    pub const fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::ToolMissing(_) => Some(FailureKind::ToolMissing),
            Self::Approval(ApprovalError::ChannelUnavailable(_)) => {
                Some(FailureKind::ApprovalChannelUnavailable)
            }
            _ => None,
        }
    }

    /// Converts to a dictionary representation for audit payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert(
            "message".to_string(),
            serde_json::Value::String(self.to_string()),
        );
        map.insert("fatal".to_string(), serde_json::Value::Bool(self.is_fatal()));
        if let Some(kind) = self.kind() {
            map.insert(
                "kind".to_string(),
                serde_json::Value::String(kind.to_string()),
            );
        }
        map
    }
}

/// Failure taxonomy shared by outcomes, logs and audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A required tool is not installed. Fatal, checked before any session exists.
    ToolMissing,
    /// A tool exceeded its wall-clock budget and was killed.
    StageTimeout,
    /// A tool could not be spawned, exited non-zero, or broke its output contract.
    StageCrash,
    /// Aggregation found nothing to report.
    AggregationEmpty,
    /// The notification sink rejected or could not deliver a message.
    NotificationFailure,
    /// No decision channel could be reached; the request stays pending.
    ApprovalChannelUnavailable,
}

impl FailureKind {
    /// Returns true if this kind terminates the run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ToolMissing)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolMissing => write!(f, "tool_missing"),
            Self::StageTimeout => write!(f, "stage_timeout"),
            Self::StageCrash => write!(f, "stage_crash"),
            Self::AggregationEmpty => write!(f, "aggregation_empty"),
            Self::NotificationFailure => write!(f, "notification_failure"),
            Self::ApprovalChannelUnavailable => write!(f, "approval_channel_unavailable"),
        }
    }
}

/// Required tools that could not be found on `PATH`.
#[derive(Debug, Clone, Error)]
#[error("Required tools not found on PATH: {}", tools.join(", "))]
pub struct ToolMissingError {
    /// Names of the missing tools.
    pub tools: Vec<String>,
}

impl ToolMissingError {
    /// Creates a new error for the given tools.
    #[must_use]
    pub fn new(tools: Vec<String>) -> Self {
        Self { tools }
    }
}

/// Session creation and lookup errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session directory already exists and the policy forbids suffixing.
    #[error("Session directory already exists: {}", path.display())]
    Collision {
        /// The colliding directory.
        path: PathBuf,
    },

    /// The target cannot be turned into a directory name.
    #[error("Invalid target: '{0}'")]
    InvalidTarget(String),

    /// A session directory has no readable manifest.
    #[error("No session manifest in {}", path.display())]
    MissingManifest {
        /// The session directory.
        path: PathBuf,
    },
}

/// Raised when a component writes into an area it does not own.
#[derive(Debug, Clone, Error)]
#[error("Write-set violation: {role} may not write to '{area}'")]
pub struct WriteSetViolation {
    /// The artifact area.
    pub area: String,
    /// The role that attempted the write.
    pub role: String,
}

impl WriteSetViolation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(area: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            area: area.into(),
            role: role.into(),
        }
    }
}

/// Errors raised by notification sinks.
#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    /// No transport is configured for this audience.
    #[error("Notification sink not configured for {0}")]
    NotConfigured(String),

    /// The transport ran but reported failure.
    #[error("Notification transport failed: {0}")]
    Transport(String),
}

impl NotificationError {
    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Approval workflow errors.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// The decision channel cannot be reached.
    #[error("Approval channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// No persisted request exists for the session.
    #[error("No approval request in {}", path.display())]
    NotFound {
        /// Expected request path.
        path: PathBuf,
    },

    /// The request already reached a terminal state.
    #[error("Approval request already {status}")]
    AlreadyDecided {
        /// The recorded terminal status.
        status: String,
    },
}

impl ApprovalError {
    /// Creates a channel-unavailable error.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::ChannelUnavailable(reason.into())
    }
}

/// Result alias used across the crate.
pub type Result<T, E = ReconflowError> = std::result::Result<T, E>;
