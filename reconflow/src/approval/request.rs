//! The persisted approval request.

use crate::core::Finding;
use crate::errors::{ApprovalError, Result};
use crate::notify::Delivery;
use crate::session::{Area, ArtifactStore, Session};
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Request file inside [`Area::Approval`].
pub const REQUEST_FILE: &str = "request.json";

/// Lifecycle of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for a human decision.
    Pending,
    /// Second notification authorised.
    Approved,
    /// Second notification refused.
    Denied,
    /// Request withdrawn before a decision.
    Withdrawn,
}

impl ApprovalStatus {
    /// Returns true once the request can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Denied => write!(f, "denied"),
            Self::Withdrawn => write!(f, "withdrawn"),
        }
    }
}

/// A human decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Send the developer notification.
    Approve,
    /// Send nothing.
    Deny,
    /// Cancel the request.
    Withdraw,
}

impl Decision {
    /// Parses a decision word (`approve`, `deny`, `withdraw` and short forms).
    ///
    /// # Examples
    ///
    /// ```
    /// use reconflow::approval::Decision;
    ///
    /// assert_eq!(Decision::parse("Y"), Some(Decision::Approve));
    /// assert_eq!(Decision::parse(" deny\n"), Some(Decision::Deny));
    /// assert_eq!(Decision::parse("maybe"), None);
    /// ```
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" | "approve" | "approved" => Some(Self::Approve),
            "n" | "no" | "deny" | "denied" => Some(Self::Deny),
            "w" | "withdraw" | "withdrawn" => Some(Self::Withdraw),
            _ => None,
        }
    }

    /// The status this decision leads to.
    #[must_use]
    pub const fn status(&self) -> ApprovalStatus {
        match self {
            Self::Approve => ApprovalStatus::Approved,
            Self::Deny => ApprovalStatus::Denied,
            Self::Withdraw => ApprovalStatus::Withdrawn,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Deny => write!(f, "deny"),
            Self::Withdraw => write!(f, "withdraw"),
        }
    }
}

/// Durable record gating the developer notification.
///
/// Correlates to its session by id only. The findings handed over by the
/// pipeline are kept so that a resumed unit can still render the developer
/// report without reading scanner output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique request id.
    pub request_id: Uuid,
    /// Session the request belongs to.
    pub session_id: String,
    /// Scanned target.
    pub target: String,
    /// Vulnerability count read from the session.
    pub vulnerability_count: u64,
    /// Current status.
    pub status: ApprovalStatus,
    /// Creation time.
    pub created_at: Timestamp,
    /// Decision time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<Timestamp>,
    /// Why the request was withdrawn, or who decided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Outcome of the developer notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
    /// Findings to render in the developer report.
    #[serde(default)]
    pub findings: Vec<Finding>,
}

impl ApprovalRequest {
    /// Creates a pending request.
    #[must_use]
    pub fn new(session: &Session, vulnerability_count: u64, findings: Vec<Finding>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            session_id: session.id.clone(),
            target: session.target.clone(),
            vulnerability_count,
            status: ApprovalStatus::Pending,
            created_at: now_utc(),
            decided_at: None,
            reason: None,
            delivery: None,
            findings,
        }
    }

    /// Applies a decision exactly once.
    pub fn decide(&mut self, decision: Decision, reason: Option<String>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(ApprovalError::AlreadyDecided {
                status: self.status.to_string(),
            }
            .into());
        }
        self.status = decision.status();
        self.decided_at = Some(now_utc());
        self.reason = reason;
        Ok(())
    }

    /// Persists the request into the approval area.
    pub fn save(&self, store: &ArtifactStore) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(self)?;
        let path = store.writable_path(Area::Approval, REQUEST_FILE)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(path)
    }

    /// Loads the persisted request of a session.
    pub fn load(store: &ArtifactStore) -> Result<Self> {
        match store.read(Area::Approval, REQUEST_FILE)? {
            Some(text) => Ok(serde_json::from_str(&text)?),
            None => Err(ApprovalError::NotFound {
                path: store.area_dir(Area::Approval).join(REQUEST_FILE),
            }
            .into()),
        }
    }

    /// Returns true if a request file exists for the session.
    #[must_use]
    pub fn exists(store: &ArtifactStore) -> bool {
        store.area_dir(Area::Approval).join(REQUEST_FILE).is_file()
    }
}
