//! Timeout-bounded execution of one external tool.

use super::ToolInvocation;
use crate::config::OutputMode;
use crate::core::{OutcomeStatus, StageOutcome};
use crate::observability::RunLog;
use crate::session::ArtifactStore;
use chrono::Utc;
use std::fs::File;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{debug, warn, Level};

/// Runs external tools and turns every result into a [`StageOutcome`].
///
/// `run` never returns an error: spawn failures, non-zero exits, broken
/// output contracts and timeouts are all outcome data. A timed-out tool is
/// killed together with its process group and reaped before `run` returns.
#[derive(Debug, Clone)]
pub struct ExternalToolRunner {
    log: RunLog,
}

impl ExternalToolRunner {
    /// Creates a runner writing one line per run to `log`.
    #[must_use]
    pub const fn new(log: RunLog) -> Self {
        Self { log }
    }

    /// The run log this runner writes to.
    #[must_use]
    pub const fn log(&self) -> &RunLog {
        &self.log
    }

    /// Runs one invocation to completion or timeout.
    pub async fn run(&self, invocation: &ToolInvocation) -> StageOutcome {
        let started_at = Utc::now();
        debug!(tool = %invocation.label(), cmd = %invocation.command_line(), "spawning tool");

        let outcome = match self.spawn(invocation) {
            Ok(child) => self.supervise(invocation, child, started_at).await,
            Err(detail) => StageOutcome::failed(&invocation.stage, started_at, detail),
        };
        let outcome = attach_artifact(outcome.with_tool(&invocation.tool), invocation);

        let level = if outcome.status.is_success() {
            Level::INFO
        } else {
            Level::WARN
        };
        self.log.record(level, format!("tool {}", outcome.summary_line()));
        outcome
    }

    fn spawn(&self, invocation: &ToolInvocation) -> Result<Child, String> {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args).kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        match &invocation.stdin {
            Some(path) => {
                let file = File::open(path)
                    .map_err(|e| format!("cannot open input {}: {e}", path.display()))?;
                command.stdin(Stdio::from(file));
            }
            None => {
                command.stdin(Stdio::null());
            }
        }

        match invocation.output_mode {
            OutputMode::Stdout => {
                let file = create_file(&invocation.output)?;
                command.stdout(Stdio::from(file));
            }
            OutputMode::File => {
                create_parent(&invocation.output)?;
                command.stdout(Stdio::null());
            }
            OutputMode::Directory => {
                std::fs::create_dir_all(&invocation.output).map_err(|e| {
                    format!("cannot create {}: {e}", invocation.output.display())
                })?;
                command.stdout(Stdio::null());
            }
        }

        let stderr = create_file(&invocation.stderr)?;
        command.stderr(Stdio::from(stderr));

        command
            .spawn()
            .map_err(|e| format!("failed to spawn '{}': {e}", invocation.program))
    }

    async fn supervise(
        &self,
        invocation: &ToolInvocation,
        mut child: Child,
        started_at: chrono::DateTime<Utc>,
    ) -> StageOutcome {
        let stage = &invocation.stage;
        match tokio::time::timeout(invocation.timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => check_contract(invocation, started_at),
            Ok(Ok(status)) => StageOutcome::failed(stage, started_at, describe_exit(status)),
            Ok(Err(e)) => StageOutcome::failed(stage, started_at, format!("wait failed: {e}")),
            Err(_) => {
                terminate(&mut child).await;
                warn!(
                    tool = %invocation.label(),
                    timeout_secs = invocation.timeout.as_secs_f64(),
                    "tool timed out and was killed"
                );
                StageOutcome::timed_out(
                    stage,
                    started_at,
                    format!("timed out after {:?}", invocation.timeout),
                )
            }
        }
    }
}

fn create_parent(path: &std::path::Path) -> Result<(), String> {
    match path.parent() {
        Some(parent) => std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {e}", parent.display())),
        None => Ok(()),
    }
}

fn create_file(path: &std::path::Path) -> Result<File, String> {
    create_parent(path)?;
    File::create(path).map_err(|e| format!("cannot create {}: {e}", path.display()))
}

fn check_contract(invocation: &ToolInvocation, started_at: chrono::DateTime<Utc>) -> StageOutcome {
    let present = match invocation.output_mode {
        OutputMode::Stdout | OutputMode::File => invocation.output.is_file(),
        OutputMode::Directory => invocation.output.is_dir(),
    };
    if present {
        StageOutcome::success(&invocation.stage, started_at)
    } else {
        StageOutcome::failed(
            &invocation.stage,
            started_at,
            format!("expected output {} was not produced", invocation.output.display()),
        )
    }
}

/// Records the artifact on the outcome when it holds anything.
///
/// Failed and timed-out tools keep partial output as evidence.
fn attach_artifact(outcome: StageOutcome, invocation: &ToolInvocation) -> StageOutcome {
    let has_content = match invocation.output_mode {
        OutputMode::Stdout | OutputMode::File => ArtifactStore::is_non_empty(&invocation.output),
        OutputMode::Directory => std::fs::read_dir(&invocation.output)
            .is_ok_and(|mut entries| entries.next().is_some()),
    };
    if has_content || outcome.status == OutcomeStatus::Success {
        outcome.with_artifact(&invocation.output)
    } else {
        outcome
    }
}

fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("killed by signal {signal}");
        }
    }
    "terminated without exit code".to_string()
}

/// Kills the child and everything in its process group, then reaps it.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let group = format!("-{pid}");
        let result = Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = result {
            warn!(error = %e, pid, "failed to signal process group");
        }
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "child already exited");
    }
}
