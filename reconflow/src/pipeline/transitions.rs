//! Stage transition table and tool-outcome folding.

use crate::core::{OutcomeStatus, PipelineState, StageOutcome};
use crate::errors::FailureKind;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Returns the state following `state` given its stage status.
///
/// | Stage       | success / degraded | failed / timed out |
/// |-------------|--------------------|--------------------|
/// | recon       | alive_check        | aborted            |
/// | alive_check | crawl              | aborted            |
/// | crawl       | vuln_scan          | aborted            |
/// | vuln_scan   | analyze            | analyze            |
/// | analyze     | report             | report             |
/// | report      | notify             | aborted            |
/// | notify      | done               | done               |
///
/// # Examples
///
/// ```
/// use reconflow::core::{OutcomeStatus, PipelineState};
/// use reconflow::pipeline::next_state;
///
/// assert_eq!(next_state(PipelineState::AliveCheck, OutcomeStatus::Failed), PipelineState::Aborted);
/// assert_eq!(next_state(PipelineState::VulnScan, OutcomeStatus::Failed), PipelineState::Analyze);
/// ```
#[must_use]
pub const fn next_state(state: PipelineState, status: OutcomeStatus) -> PipelineState {
    use PipelineState as S;
    let progress = status.allows_progress();
    match state {
        S::Recon if progress => S::AliveCheck,
        S::AliveCheck if progress => S::Crawl,
        S::Crawl if progress => S::VulnScan,
        S::Report if progress => S::Notify,
        S::Recon | S::AliveCheck | S::Crawl | S::Report | S::Aborted => S::Aborted,
        S::VulnScan => S::Analyze,
        S::Analyze => S::Report,
        S::Notify | S::Done => S::Done,
    }
}

/// Returns true if a file has content or a directory has entries.
#[must_use]
pub fn has_content(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {
            std::fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_some())
        }
        Ok(meta) => meta.len() > 0,
        Err(_) => false,
    }
}

/// Returns true if any tool left a non-empty artifact, including partial
/// output of a failed tool.
#[must_use]
pub fn any_content(tools: &[StageOutcome]) -> bool {
    tools
        .iter()
        .flat_map(|t| &t.artifact_paths)
        .any(|p| has_content(p))
}

/// Folds tool outcomes into one stage outcome.
///
/// The stage succeeds if it `produced` usable output. Otherwise it is
/// degraded when a `fallback` description is given and failed when not.
#[must_use]
pub fn fold_stage(
    stage: &str,
    started_at: DateTime<Utc>,
    tools: Vec<StageOutcome>,
    produced: bool,
    fallback: Option<&str>,
) -> StageOutcome {
    let outcome = if produced {
        StageOutcome::success(stage, started_at)
    } else if let Some(fallback) = fallback {
        StageOutcome::new(stage, OutcomeStatus::Degraded, started_at)
            .with_error(format!("no tool output, using {fallback}"))
    } else {
        let kind = if !tools.is_empty() && tools.iter().all(StageOutcome::is_timeout) {
            FailureKind::StageTimeout
        } else {
            FailureKind::StageCrash
        };
        StageOutcome::failed(stage, started_at, "no tool produced output").with_failure_kind(kind)
    };

    let outcome = match (outcome.status, tools.iter().find_map(|t| t.failure_kind)) {
        (OutcomeStatus::Degraded, Some(kind)) => outcome.with_failure_kind(kind),
        _ => outcome,
    };
    outcome.with_tools(tools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PipelineState as S;

    #[test]
    fn test_hard_dependencies_abort() {
        for state in [S::Recon, S::AliveCheck, S::Crawl] {
            assert_eq!(next_state(state, OutcomeStatus::Failed), S::Aborted);
            assert_eq!(next_state(state, OutcomeStatus::TimedOut), S::Aborted);
        }
        assert_eq!(next_state(S::Recon, OutcomeStatus::Degraded), S::AliveCheck);
        assert_eq!(next_state(S::Crawl, OutcomeStatus::Success), S::VulnScan);
    }

    #[test]
    fn test_report_always_reached_after_vuln_scan() {
        for status in [
            OutcomeStatus::Success,
            OutcomeStatus::Degraded,
            OutcomeStatus::Failed,
            OutcomeStatus::TimedOut,
        ] {
            assert_eq!(next_state(S::VulnScan, status), S::Analyze);
            assert_eq!(next_state(S::Analyze, status), S::Report);
            assert_eq!(next_state(S::Notify, status), S::Done);
        }
    }

    #[test]
    fn test_terminal_states_absorb() {
        assert_eq!(next_state(S::Done, OutcomeStatus::Failed), S::Done);
        assert_eq!(next_state(S::Aborted, OutcomeStatus::Success), S::Aborted);
    }

    #[test]
    fn test_fold_success_on_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let partial = dir.path().join("gau.txt");
        std::fs::write(&partial, "https://a/\n").unwrap();
        let tools = vec![
            StageOutcome::failed("crawl", Utc::now(), "exit code 1")
                .with_tool("gau")
                .with_artifact(&partial),
            StageOutcome::failed("crawl", Utc::now(), "exit code 2").with_tool("katana"),
        ];

        assert!(any_content(&tools));
        let stage = fold_stage("crawl", Utc::now(), tools, true, None);
        assert_eq!(stage.status, OutcomeStatus::Success);
        assert_eq!(stage.tools.len(), 2);
    }

    #[test]
    fn test_fold_degraded_and_failed() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("subfinder.txt");
        std::fs::write(&empty, "").unwrap();
        let tools = vec![StageOutcome::success("recon", Utc::now())
            .with_tool("subfinder")
            .with_artifact(&empty)];

        assert!(!any_content(&tools));
        let degraded = fold_stage("recon", Utc::now(), tools.clone(), false, Some("the bare target"));
        assert_eq!(degraded.status, OutcomeStatus::Degraded);
        assert_eq!(
            degraded.error_detail.as_deref(),
            Some("no tool output, using the bare target")
        );

        let failed = fold_stage("alive_check", Utc::now(), tools, false, None);
        assert_eq!(failed.status, OutcomeStatus::Failed);
        assert_eq!(failed.failure_kind, Some(FailureKind::StageCrash));
    }

    #[test]
    fn test_fold_all_timeouts() {
        let tools = vec![
            StageOutcome::timed_out("alive_check", Utc::now(), "timed out").with_tool("httpx"),
        ];
        let failed = fold_stage("alive_check", Utc::now(), tools, false, None);
        assert_eq!(failed.failure_kind, Some(FailureKind::StageTimeout));
    }

    #[test]
    fn test_has_content_for_directories() {
        let dir = tempfile::tempdir().unwrap();
        let sqlmap = dir.path().join("sqlmap");
        std::fs::create_dir(&sqlmap).unwrap();
        assert!(!has_content(&sqlmap));
        std::fs::write(sqlmap.join("log"), "").unwrap();
        assert!(has_content(&sqlmap));
        assert!(!has_content(&dir.path().join("missing")));
    }
}
