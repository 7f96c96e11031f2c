//! Operator and developer notifications.
//!
//! Delivery goes through a [`NotificationSink`]. Whatever the sink does,
//! [`NotificationGateway`] never fails the caller because of it: a failed
//! send leaves a timestamped local copy of the report instead.

mod gateway;
mod sink;

pub use gateway::{Delivery, NotificationGateway};
pub use sink::{CommandNotificationSink, NotificationSink, UnconfiguredSink};

#[cfg(test)]
pub use sink::MockNotificationSink;

use crate::report::Priority;
use crate::session::Area;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// The operator running the scan.
    Operator,
    /// The target's developers, contacted only after approval.
    Developer,
}

impl Audience {
    /// Area that holds this audience's local copies and sink captures.
    #[must_use]
    pub const fn area(&self) -> Area {
        match self {
            Self::Operator => Area::Reports,
            Self::Developer => Area::Approval,
        }
    }

    /// Prefix of the local fallback copy.
    #[must_use]
    pub const fn fallback_prefix(&self) -> &'static str {
        match self {
            Self::Operator => "operator_report",
            Self::Developer => "developer_report",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operator => write!(f, "operator"),
            Self::Developer => write!(f, "developer"),
        }
    }
}

/// Builds the subject line for a notification.
///
/// # Examples
///
/// ```
/// use reconflow::notify::{subject_for, Audience};
///
/// assert_eq!(
///     subject_for(Audience::Operator, "example.com", 0),
///     "Scan complete - example.com (Clean)"
/// );
/// assert_eq!(
///     subject_for(Audience::Operator, "example.com", 7),
///     "URGENT: Recon alert - example.com (7 vulnerabilities)"
/// );
/// ```
#[must_use]
pub fn subject_for(audience: Audience, target: &str, vuln_count: u64) -> String {
    match (audience, Priority::from_count(vuln_count)) {
        (Audience::Operator, Priority::Clean) => format!("Scan complete - {target} (Clean)"),
        (Audience::Operator, Priority::Medium) => {
            format!("Recon alert - {target} ({vuln_count} findings)")
        }
        (Audience::Operator, Priority::High) => {
            format!("URGENT: Recon alert - {target} ({vuln_count} vulnerabilities)")
        }
        (Audience::Developer, Priority::High) => {
            format!("URGENT: Security assessment report - {target} ({vuln_count} vulnerabilities)")
        }
        (Audience::Developer, _) => {
            format!("Security assessment report - {target} ({vuln_count} findings)")
        }
    }
}

/// One message handed to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Addressee.
    pub audience: Audience,
    /// Subject line.
    pub subject: String,
    /// Scanned target.
    pub target: String,
    /// Vulnerability count of the session.
    pub vuln_count: u64,
    /// Report attached to the message.
    pub report_path: PathBuf,
    /// Session directory.
    pub session_path: PathBuf,
}

impl Notification {
    /// Creates a notification with the standard subject.
    #[must_use]
    pub fn new(
        audience: Audience,
        target: impl Into<String>,
        vuln_count: u64,
        report_path: impl Into<PathBuf>,
        session_path: impl Into<PathBuf>,
    ) -> Self {
        let target = target.into();
        Self {
            audience,
            subject: subject_for(audience, &target, vuln_count),
            target,
            vuln_count,
            report_path: report_path.into(),
            session_path: session_path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_rules() {
        assert_eq!(
            subject_for(Audience::Operator, "t", 2),
            "Recon alert - t (2 findings)"
        );
        assert_eq!(
            subject_for(Audience::Developer, "t", 3),
            "Security assessment report - t (3 findings)"
        );
        assert!(subject_for(Audience::Developer, "t", 4).starts_with("URGENT: "));
    }

    #[test]
    fn test_audience_areas() {
        assert_eq!(Audience::Operator.area(), Area::Reports);
        assert_eq!(Audience::Developer.area(), Area::Approval);
        assert_eq!(Audience::Developer.to_string(), "developer");
    }
}
