//! Outcome status and pipeline state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The result classification of a tool run or a stage.
///
/// Tool runs only ever produce `Success`, `Failed` or `TimedOut`. Stages
/// fold their tool outcomes into `Success`, `Degraded` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Produced a usable, non-empty artifact.
    Success,
    /// Nothing usable was produced, but a fallback artifact stands in.
    Degraded,
    /// Nothing usable was produced.
    Failed,
    /// Killed after exceeding its wall-clock budget.
    TimedOut,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Degraded => write!(f, "degraded"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

impl OutcomeStatus {
    /// Returns true if the status indicates success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if downstream stages may consume this stage's output.
    #[must_use]
    pub const fn allows_progress(&self) -> bool {
        matches!(self, Self::Success | Self::Degraded)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }
}

/// States of the stage pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Subdomain discovery.
    Recon,
    /// Liveness probing of discovered hosts.
    AliveCheck,
    /// URL collection from live hosts.
    Crawl,
    /// Vulnerability scanning.
    VulnScan,
    /// Counting and optional analysis of findings.
    Analyze,
    /// Report rendering.
    Report,
    /// Operator notification and approval hand-off.
    Notify,
    /// Completed.
    Done,
    /// Ended early; absorbing.
    Aborted,
}

impl PipelineState {
    /// Stable name used for directories, logs and outcome records.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Recon => "recon",
            Self::AliveCheck => "alive_check",
            Self::Crawl => "crawl",
            Self::VulnScan => "vuln_scan",
            Self::Analyze => "analyze",
            Self::Report => "report",
            Self::Notify => "notify",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }

    /// Returns true for `Done` and `Aborted`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
