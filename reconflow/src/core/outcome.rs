//! The outcome record produced once per tool run and once per stage.

use super::OutcomeStatus;
use crate::errors::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Immutable record of one tool run or one stage execution.
///
/// Tool-level outcomes carry `tool_name`; stage-level outcomes carry the
/// tool outcomes they were folded from in `tools`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Stage name (see [`crate::core::PipelineState::name`]).
    pub stage_name: String,
    /// Tool name for tool-level outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Result classification.
    pub status: OutcomeStatus,
    /// Artifacts written by this run.
    #[serde(default)]
    pub artifact_paths: Vec<PathBuf>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub ended_at: DateTime<Utc>,
    /// Exit code, reason or other failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Failure taxonomy, when the run did not succeed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    /// Tool outcomes folded into a stage outcome.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<StageOutcome>,
}

impl StageOutcome {
    /// Creates a new outcome ending now.
    #[must_use]
    pub fn new(
        stage_name: impl Into<String>,
        status: OutcomeStatus,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            tool_name: None,
            status,
            artifact_paths: Vec::new(),
            started_at,
            ended_at: Utc::now(),
            error_detail: None,
            failure_kind: None,
            tools: Vec::new(),
        }
    }

    /// Creates a successful outcome.
    #[must_use]
    pub fn success(stage_name: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self::new(stage_name, OutcomeStatus::Success, started_at)
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(
        stage_name: impl Into<String>,
        started_at: DateTime<Utc>,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(stage_name, OutcomeStatus::Failed, started_at).with_error(detail)
    }

    /// Creates a timed-out outcome.
    #[must_use]
    pub fn timed_out(
        stage_name: impl Into<String>,
        started_at: DateTime<Utc>,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(stage_name, OutcomeStatus::TimedOut, started_at)
            .with_error(detail)
            .with_failure_kind(FailureKind::StageTimeout)
    }

    /// Sets the tool name.
    #[must_use]
    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    /// Adds an artifact path.
    #[must_use]
    pub fn with_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_paths.push(path.into());
        self
    }

    /// Sets the error detail. Failed outcomes default to [`FailureKind::StageCrash`].
    #[must_use]
    pub fn with_error(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        if self.failure_kind.is_none() && self.status == OutcomeStatus::Failed {
            self.failure_kind = Some(FailureKind::StageCrash);
        }
        self
    }

    /// Sets the failure kind.
    #[must_use]
    pub const fn with_failure_kind(mut self, kind: FailureKind) -> Self {
        self.failure_kind = Some(kind);
        self
    }

    /// Attaches the tool outcomes a stage outcome was folded from.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<Self>) -> Self {
        self.tools = tools;
        self
    }

    /// Returns true if the run was killed for exceeding its budget.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.status == OutcomeStatus::TimedOut
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }

    /// Short label for logs: `stage` or `stage/tool`.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.tool_name {
            Some(tool) => format!("{}/{tool}", self.stage_name),
            None => self.stage_name.clone(),
        }
    }

    /// Renders the outcome as one log line.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{} {} in {}ms",
            self.label(),
            self.status,
            self.duration_ms()
        );
        if let Some(detail) = &self.error_detail {
            line.push_str(": ");
            line.push_str(detail);
        }
        line
    }
}
