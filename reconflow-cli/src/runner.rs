use crate::cli::{Cli, Commands};
use anyhow::{bail, Context};
use futures::stream::{FuturesUnordered, StreamExt};
use reconflow::events::HISTORY_FILE;
use reconflow::prelude::*;
use std::path::Path;
use tracing::{error, info, warn};

const INTERRUPT: &str = "operator interrupt";

pub async fn run_from_cli(cli: Cli) -> anyhow::Result<()> {
    let level = if cli.verbose { "debug" } else { "info" };
    let format = if cli.json { LogFormat::Json } else { LogFormat::Pretty };
    init_logging(level, format);

    let config = ReconConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Some(Commands::Resume { session }) => resume(config, &session).await,
        Some(Commands::Decide { session, decision }) => decide(&session, decision),
        Some(Commands::Latest) => latest(&config),
        None => match cli.targets {
            Some(targets) => scan(config, &targets).await,
            None => bail!("no targets file given; see --help"),
        },
    }
}

/// Reads targets: one per line, blank lines and `#` comments skipped.
fn read_targets(path: &Path) -> std::io::Result<Vec<String>> {
    Ok(reconflow::utils::read_lines(path)?
        .into_iter()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect())
}

/// The activity history; falls back to log lines when the file cannot be opened.
fn open_history(config: &ReconConfig) -> Arc<dyn AuditSink> {
    let path = config.session_root.join(HISTORY_FILE);
    match JsonlAuditSink::open(&path) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "activity history unavailable, logging it instead");
            Arc::new(LoggingAuditSink)
        }
    }
}

/// Cancels `token` on the first Ctrl-C.
fn cancel_on_interrupt(token: Arc<CancellationToken>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            token.cancel(INTERRUPT);
        }
    })
}

async fn scan(config: ReconConfig, targets_file: &Path) -> anyhow::Result<()> {
    let targets = read_targets(targets_file)
        .with_context(|| format!("cannot read targets file {}", targets_file.display()))?;
    if targets.is_empty() {
        bail!("no targets in {}", targets_file.display());
    }

    let availability = ToolRegistry::from_config(&config)
        .preflight()
        .context("tool preflight failed")?;
    let sessions = SessionManager::from_config(&config);
    let audit = open_history(&config);

    let token = Arc::new(CancellationToken::new());
    let watcher = cancel_on_interrupt(token.clone());
    let mut approvals = Vec::new();

    for target in &targets {
        if token.is_cancelled() {
            warn!(target = %target, "skipped after interrupt");
            continue;
        }
        let result = scan_target(&config, &sessions, &availability, &audit, &token, target).await;
        match result {
            Ok(run) => {
                print_summary(&run);
                approvals.extend(run.approval);
            }
            Err(e) if e.is_fatal() => {
                watcher.abort();
                if !approvals.is_empty() {
                    warn!(
                        pending = approvals.len(),
                        "stopping with approval requests pending; continue with `reconflow resume`"
                    );
                }
                return Err(e).with_context(|| format!("scan of {target} failed"));
            }
            Err(e) => error!(target = %target, error = %e, "target failed"),
        }
    }
    watcher.abort();

    wait_for_approvals(approvals).await;
    Ok(())
}

async fn scan_target(
    config: &ReconConfig,
    sessions: &SessionManager,
    availability: &ToolAvailability,
    audit: &Arc<dyn AuditSink>,
    token: &Arc<CancellationToken>,
    target: &str,
) -> reconflow::errors::Result<PipelineRun> {
    let session = sessions.create(target)?;
    info!(target = %target, session = %session.root.display(), "session created");
    let log = RunLog::open(session.area_dir(Area::Logs).join(RUN_LOG_FILE))?;
    StagePipeline::from_config(config.clone(), log, audit.clone())
        .with_availability(availability.clone())
        .with_cancellation(token.clone())
        .run(&session)
        .await
}

fn print_summary(run: &PipelineRun) {
    let session = &run.session;
    match run.final_state {
        PipelineState::Done => {
            println!(
                "{}: done, {} vulnerabilities",
                session.target,
                run.vuln_count.unwrap_or(0)
            );
            if let Some(report) = &run.report_path {
                println!("  report: {}", report.display());
            }
            if let Some(Delivery::LocallySaved { path }) = &run.delivery {
                println!("  notification not sent, saved to {}", path.display());
            }
            if let Some(approval) = &run.approval {
                println!("  approval pending: {}", approval.request_path().display());
            }
        }
        state => {
            let reason = run
                .outcomes
                .last()
                .filter(|o| o.status.is_failure())
                .and_then(|o| o.error_detail.as_deref())
                .unwrap_or(INTERRUPT);
            println!("{}: {state} ({reason})", session.target);
            println!("  session: {}", session.root.display());
        }
    }
}

/// Waits for detached approval units, reporting each as it settles.
/// Ctrl-C withdraws every pending one.
async fn wait_for_approvals(approvals: Vec<ApprovalHandle>) {
    if approvals.is_empty() {
        return;
    }
    info!(pending = approvals.len(), "waiting for approval decisions");

    let tokens: Vec<_> = approvals.iter().map(ApprovalHandle::cancellation_token).collect();
    let interrupt = Arc::new(CancellationToken::new());
    let watcher = cancel_on_interrupt(interrupt.clone());
    let withdrawer = tokio::spawn(async move {
        interrupt.cancelled().await;
        for token in tokens {
            token.cancel(INTERRUPT);
        }
    });

    let mut pending: FuturesUnordered<_> = approvals
        .into_iter()
        .map(|handle| async move {
            let session_id = handle.session_id().to_string();
            (session_id, handle.join().await)
        })
        .collect();
    while let Some((session_id, result)) = pending.next().await {
        match result {
            Ok(request) if request.status.is_terminal() => {
                println!("{session_id}: approval {}", request.status);
            }
            Ok(request) => println!(
                "{session_id}: approval {} still pending; continue with `reconflow resume`",
                request.request_id
            ),
            Err(e) => error!(session = %session_id, error = %e, "approval unit failed"),
        }
    }
    watcher.abort();
    withdrawer.abort();
}

async fn resume(config: ReconConfig, session_dir: &Path) -> anyhow::Result<()> {
    let session = Session::load(session_dir)
        .with_context(|| format!("cannot load session {}", session_dir.display()))?;
    let log = RunLog::open(session.area_dir(Area::Logs).join(RUN_LOG_FILE))
        .context("cannot open run log")?;
    let audit = open_history(&config);

    let pipeline = StagePipeline::from_config(config, log, audit);
    match pipeline.approval().resume(&session) {
        Ok(handle) => wait_for_approvals(vec![handle]).await,
        // Approval errors leave the persisted request as it is.
        Err(e) if !e.is_fatal() => println!("{}: {e}", session.id),
        Err(e) => {
            return Err(e).with_context(|| format!("cannot resume approval for {}", session.id))
        }
    }
    Ok(())
}

fn decide(session_dir: &Path, decision: Decision) -> anyhow::Result<()> {
    let session = Session::load(session_dir)
        .with_context(|| format!("cannot load session {}", session_dir.display()))?;
    let store = ArtifactStore::for_approval(&session);
    let request = ApprovalRequest::load(&store)?;
    if request.status.is_terminal() {
        bail!("request {} is already {}", request.request_id, request.status);
    }
    let path = FileDecisionChannel::post(&store, decision)?;
    println!("{decision} written to {}", path.display());
    Ok(())
}

fn latest(config: &ReconConfig) -> anyhow::Result<()> {
    let sessions = SessionManager::from_config(config);
    match sessions.latest()? {
        Some(session) => println!("session: {} ({})", session.root.display(), session.target),
        None => println!("session: none"),
    }
    match sessions.latest_report()? {
        Some(report) => println!("report: {}", report.display()),
        None => println!("report: none"),
    }
    Ok(())
}
