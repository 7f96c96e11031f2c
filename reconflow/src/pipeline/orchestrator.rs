//! Drives one session through the stage state machine.

use super::transitions::{any_content, fold_stage, next_state};
use crate::aggregate::{self, VulnerabilityCount};
use crate::approval::{self, ApprovalHandle, ApprovalWorkflow};
use crate::cancellation::CancellationToken;
use crate::config::{OutputMode, ReconConfig, ToolSpec};
use crate::core::{Finding, OutcomeStatus, PipelineState, StageOutcome};
use crate::errors::{FailureKind, ReconflowError, Result};
use crate::events::{activity, AuditSink, NoOpAuditSink};
use crate::notify::{Delivery, NotificationGateway};
use crate::observability::{RunLog, SpanTimer};
use crate::report::{artifacts, ReportGenerator, ReportInput, SessionStats};
use crate::runner::{ExternalToolRunner, Placeholders, ToolAvailability, ToolInvocation};
use crate::session::{Area, ArtifactStore, Session, SessionManager};
use crate::utils::now_utc;
use chrono::Utc;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

/// Seed file holding the bare target, fed to recon tools as `{input}`.
const TARGET_FILE: &str = "target.txt";
/// Flattened findings handed to the analyzer.
const FINDINGS_FILE: &str = "findings.txt";

/// Result of running one session through the pipeline.
#[derive(Debug)]
pub struct PipelineRun {
    /// The session that was run.
    pub session: Session,
    /// Terminal state: `Done` or `Aborted`.
    pub final_state: PipelineState,
    /// One outcome per executed stage, in order.
    pub outcomes: Vec<StageOutcome>,
    /// Vulnerability count, once the analyze stage ran.
    pub vuln_count: Option<u64>,
    /// Operator report, once the report stage ran.
    pub report_path: Option<PathBuf>,
    /// Operator notification result.
    pub delivery: Option<Delivery>,
    /// Detached approval unit, for sessions with findings.
    pub approval: Option<ApprovalHandle>,
}

impl PipelineRun {
    /// Returns true if the session completed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.final_state == PipelineState::Done
    }

    /// Outcome of a stage, if it ran.
    #[must_use]
    pub fn stage(&self, state: PipelineState) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage_name == state.name())
    }
}

/// Artifacts carried from one stage to the next within a run.
#[derive(Default)]
struct RunState {
    findings: Vec<Finding>,
    count: VulnerabilityCount,
    analysis: Option<String>,
    report_path: Option<PathBuf>,
    delivery: Option<Delivery>,
    approval: Option<ApprovalHandle>,
}

/// The recon-to-disclosure pipeline.
///
/// ```text
/// recon ─▶ alive_check ─▶ crawl ─▶ vuln_scan ─▶ analyze ─▶ report ─▶ notify ─▶ done
///   └──────────┴────────────┴──▶ aborted
/// ```
///
/// Stages and the tools within a stage run strictly in order.
/// Cancellation is honored between stages only.
pub struct StagePipeline {
    config: ReconConfig,
    runner: ExternalToolRunner,
    availability: ToolAvailability,
    gateway: NotificationGateway,
    approval: ApprovalWorkflow,
    sessions: SessionManager,
    reports: ReportGenerator,
    audit: Arc<dyn AuditSink>,
    cancel: Arc<CancellationToken>,
}

impl std::fmt::Debug for StagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagePipeline")
            .field("session_root", &self.config.session_root)
            .field("skipped_tools", self.availability.skipped())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl StagePipeline {
    /// Creates a pipeline from explicit collaborators.
    #[must_use]
    pub fn new(
        config: ReconConfig,
        runner: ExternalToolRunner,
        gateway: NotificationGateway,
        approval: ApprovalWorkflow,
    ) -> Self {
        Self {
            sessions: SessionManager::from_config(&config),
            reports: ReportGenerator::new(&config.report),
            config,
            runner,
            availability: ToolAvailability::assume_all(),
            gateway,
            approval,
            audit: Arc::new(NoOpAuditSink),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Wires the configured notification commands and decision channel.
    ///
    /// `audit` receives the pipeline, notification and approval records.
    #[must_use]
    pub fn from_config(config: ReconConfig, log: RunLog, audit: Arc<dyn AuditSink>) -> Self {
        let runner = ExternalToolRunner::new(log.clone());
        let gateway =
            NotificationGateway::from_config(&config.notification, &runner).with_audit(audit.clone());
        let approval = ApprovalWorkflow::new(
            approval::channel_for(&config.approval),
            gateway.clone(),
            log,
        )
        .with_audit(audit.clone())
        .with_idle_timeout(config.approval.idle_timeout());
        Self::new(config, runner, gateway, approval).with_audit(audit)
    }

    /// Sets which optional tools are skipped, as found by preflight.
    #[must_use]
    pub fn with_availability(mut self, availability: ToolAvailability) -> Self {
        self.availability = availability;
        self
    }

    /// Sets the audit sink for scan records.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Shares a cancellation token with the caller.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// The token that aborts the pipeline at the next stage boundary.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        self.cancel.clone()
    }

    /// The workflow used to resume pending approval requests.
    #[must_use]
    pub const fn approval(&self) -> &ApprovalWorkflow {
        &self.approval
    }

    /// Runs `session` until `Done` or `Aborted`.
    ///
    /// Tool and stage failures are outcome data. An error is returned only
    /// when the session directory itself cannot be written.
    pub async fn run(&self, session: &Session) -> Result<PipelineRun> {
        let store = ArtifactStore::for_pipeline(session);
        let log = self.runner.log();
        let timer = SpanTimer::start(format!("session {}", session.id));
        log.info(format!("session {} started for {}", session.id, session.target));
        self.audit
            .record(
                activity::SCAN_STARTED,
                Some(json!({ "session_id": session.id, "target": session.target })),
            )
            .await;

        let mut state = PipelineState::Recon;
        let mut run = RunState::default();
        let mut outcomes = Vec::new();

        while !state.is_terminal() {
            if self.cancel.is_cancelled() {
                let reason = self
                    .cancel
                    .reason()
                    .unwrap_or_else(|| "cancelled".to_string());
                self.abort(session, state, &reason).await;
                state = PipelineState::Aborted;
                break;
            }

            let stage_timer = SpanTimer::start(state.name());
            let outcome = match self.execute(state, &store, &mut run).await {
                Ok(outcome) => outcome,
                Err(e) => return Err(self.fail(session, state, e).await),
            };
            stage_timer.finish();
            if let Err(e) = store.append_outcome(&outcome) {
                return Err(self.fail(session, state, e).await);
            }

            let level = match outcome.status {
                OutcomeStatus::Success => Level::INFO,
                OutcomeStatus::Degraded => Level::WARN,
                OutcomeStatus::Failed | OutcomeStatus::TimedOut => Level::ERROR,
            };
            log.record(level, format!("stage {}", outcome.summary_line()));

            let next = next_state(state, outcome.status);
            if next == PipelineState::Aborted {
                let reason = outcome.error_detail.as_deref().unwrap_or("stage failed");
                self.abort(session, state, reason).await;
            }
            outcomes.push(outcome);
            state = next;
        }

        let elapsed = timer.finish();
        let vuln_count = outcomes
            .iter()
            .any(|o| o.stage_name == PipelineState::Analyze.name())
            .then(|| run.count.total());
        if state == PipelineState::Done {
            log.info(format!(
                "session {} done in {elapsed:?}: {} vulnerabilities",
                session.id,
                run.count.total()
            ));
            self.audit
                .record(
                    activity::SCAN_COMPLETED,
                    Some(json!({
                        "session_id": session.id,
                        "vuln_count": run.count.total(),
                        "report": run.report_path,
                        "approval_request": run.approval.as_ref().map(ApprovalHandle::request_id),
                    })),
                )
                .await;
        }

        Ok(PipelineRun {
            session: session.clone(),
            final_state: state,
            outcomes,
            vuln_count,
            report_path: run.report_path,
            delivery: run.delivery,
            approval: run.approval,
        })
    }

    async fn execute(
        &self,
        state: PipelineState,
        store: &ArtifactStore,
        run: &mut RunState,
    ) -> Result<StageOutcome> {
        match state {
            PipelineState::Recon => self.recon(store).await,
            PipelineState::AliveCheck => self.alive_check(store).await,
            PipelineState::Crawl => self.crawl(store).await,
            PipelineState::VulnScan => self.vuln_scan(store).await,
            PipelineState::Analyze => self.analyze(store, run).await,
            PipelineState::Report => self.report(store, run),
            PipelineState::Notify => self.notify(store, run).await,
            PipelineState::Done | PipelineState::Aborted => {
                unreachable!("terminal state {state} has no stage")
            }
        }
    }

    async fn abort(&self, session: &Session, state: PipelineState, reason: &str) {
        self.runner
            .log()
            .error(format!("session {} aborted at {state}: {reason}", session.id));
        self.audit
            .record(
                activity::SCAN_ABORTED,
                Some(json!({
                    "session_id": session.id,
                    "stage": state.name(),
                    "reason": reason,
                })),
            )
            .await;
    }

    /// Logs and audits an error that ends the session, then hands it back.
    async fn fail(&self, session: &Session, state: PipelineState, err: ReconflowError) -> ReconflowError {
        self.runner
            .log()
            .error(format!("session {} aborted at {state}: {err}", session.id));
        let mut details = err.to_dict();
        details.insert("session_id".to_string(), json!(session.id));
        details.insert("stage".to_string(), json!(state.name()));
        self.audit
            .record(activity::SCAN_ABORTED, Some(json!(details)))
            .await;
        err
    }

    async fn recon(&self, store: &ArtifactStore) -> Result<StageOutcome> {
        let started = Utc::now();
        let target = store.session().target.clone();
        let seed = store.write(Area::Recon, TARGET_FILE, format!("{target}\n"))?;

        let tools = self
            .run_tools(store, PipelineState::Recon, &self.config.tools.recon, &seed, None)
            .await?;
        let subdomains = consolidate(store, &tools, Area::Recon, artifacts::SUBDOMAINS)?;
        if subdomains.is_empty() {
            store.write_lines(Area::Recon, artifacts::SUBDOMAINS, &[target.as_str()])?;
        }

        let outcome = fold_stage(
            PipelineState::Recon.name(),
            started,
            tools,
            !subdomains.is_empty(),
            Some("the bare target"),
        );
        Ok(outcome.with_artifact(store.path(Area::Recon, artifacts::SUBDOMAINS)?))
    }

    async fn alive_check(&self, store: &ArtifactStore) -> Result<StageOutcome> {
        let started = Utc::now();
        let input = store.path(Area::Recon, artifacts::SUBDOMAINS)?;

        let tools = self
            .run_tools(store, PipelineState::AliveCheck, &self.config.tools.alive, &input, None)
            .await?;
        let hosts = consolidate(store, &tools, Area::Alive, artifacts::ALIVE)?;

        let outcome = fold_stage(
            PipelineState::AliveCheck.name(),
            started,
            tools,
            !hosts.is_empty(),
            None,
        );
        Ok(outcome.with_artifact(store.path(Area::Alive, artifacts::ALIVE)?))
    }

    async fn crawl(&self, store: &ArtifactStore) -> Result<StageOutcome> {
        let started = Utc::now();
        let input = store.path(Area::Alive, artifacts::ALIVE)?;

        let tools = self
            .run_tools(store, PipelineState::Crawl, &self.config.tools.crawl, &input, None)
            .await?;
        let mut urls = consolidate(store, &tools, Area::Urls, artifacts::URLS)?;
        let produced = !urls.is_empty();
        if !produced {
            urls = store.read_lines(Area::Alive, artifacts::ALIVE)?;
            store.write_lines(Area::Urls, artifacts::URLS, &urls)?;
        }

        let mut params = aggregate::extract_parametrized(&urls);
        params.truncate(self.config.max_parametrized_urls);
        let params_path = store.write_lines(Area::Urls, artifacts::PARAMS, &params)?;

        let outcome = fold_stage(
            PipelineState::Crawl.name(),
            started,
            tools,
            produced,
            Some("the live hosts"),
        );
        Ok(outcome
            .with_artifact(store.path(Area::Urls, artifacts::URLS)?)
            .with_artifact(params_path))
    }

    async fn vuln_scan(&self, store: &ArtifactStore) -> Result<StageOutcome> {
        let started = Utc::now();
        let input = store.path(Area::Urls, artifacts::URLS)?;
        let params = store.path(Area::Urls, artifacts::PARAMS)?;
        let params = ArtifactStore::is_non_empty(&params).then_some(params);
        for spec in &self.config.tools.vulnscan {
            if aggregate::category_for_tool(&spec.name).is_none() {
                self.runner.log().warn(format!(
                    "vuln_scan/{} has no counting rule; its output is kept but not counted",
                    spec.name
                ));
            }
        }

        let tools = self
            .run_tools(
                store,
                PipelineState::VulnScan,
                &self.config.tools.vulnscan,
                &input,
                params.as_deref(),
            )
            .await?;
        let produced = any_content(&tools);
        Ok(fold_stage(
            PipelineState::VulnScan.name(),
            started,
            tools,
            produced,
            Some("an empty finding set"),
        ))
    }

    async fn analyze(&self, store: &ArtifactStore, run: &mut RunState) -> Result<StageOutcome> {
        let started = Utc::now();
        let stage = PipelineState::Analyze.name();
        let session = store.session();
        let log = self.runner.log();

        let findings = aggregate::collect_findings(&store.area_dir(Area::Vulnerabilities))?;
        let count = VulnerabilityCount::from_findings(&findings);
        let count_path = store.write_vuln_count(count.total())?;
        if count.is_empty() {
            log.info(format!(
                "{}: no findings for {}",
                FailureKind::AggregationEmpty,
                session.target
            ));
        } else {
            log.info(format!("{} findings for {}", count.total(), session.target));
        }

        let mut outcome = StageOutcome::success(stage, started).with_artifact(&count_path);
        if let Some(spec) = self.analyzer() {
            let lines: Vec<String> = findings
                .iter()
                .map(|f| format!("[{}] {} {}", f.source_tool, f.target_locator, f.raw_excerpt))
                .collect();
            let input = store.write_lines(Area::Vulnerabilities, FINDINGS_FILE, &lines)?;
            let output = store.writable_path(Area::Vulnerabilities, artifacts::ANALYSIS)?;
            let stderr = store.writable_path(Area::Logs, &format!("{stage}_{}.stderr", spec.name))?;
            let placeholders = Placeholders::new()
                .with("target", session.target.as_str())
                .with_path("input", &input);
            let invocation =
                ToolInvocation::from_spec(stage, spec, &placeholders, Some(&input), output.clone(), stderr);

            let tool = self.runner.run(&invocation).await;
            if tool.status.is_success() {
                run.analysis = std::fs::read_to_string(&output).ok();
                outcome = outcome.with_artifact(output);
            } else {
                let detail = tool.error_detail.clone().unwrap_or_default();
                outcome = StageOutcome::new(stage, OutcomeStatus::Degraded, started)
                    .with_error(format!("analyzer {}: {detail}", spec.name))
                    .with_failure_kind(tool.failure_kind.unwrap_or(FailureKind::StageCrash))
                    .with_artifact(&count_path);
            }
            outcome = outcome.with_tools(vec![tool]);
        }

        run.findings = findings;
        run.count = count;
        Ok(outcome)
    }

    fn report(&self, store: &ArtifactStore, run: &mut RunState) -> Result<StageOutcome> {
        let started = Utc::now();
        let input = ReportInput {
            session: store.session(),
            count: &run.count,
            findings: &run.findings,
            stats: SessionStats::collect(store)?,
            analysis: run.analysis.as_deref(),
            generated_at: now_utc(),
        };
        let path = self.reports.write(store, &input)?;
        self.sessions.record_latest_report(&path)?;
        run.report_path = Some(path.clone());
        Ok(StageOutcome::success(PipelineState::Report.name(), started).with_artifact(path))
    }

    async fn notify(&self, store: &ArtifactStore, run: &mut RunState) -> Result<StageOutcome> {
        let started = Utc::now();
        let stage = PipelineState::Notify.name();
        let Some(report) = run.report_path.clone() else {
            return Ok(StageOutcome::failed(stage, started, "no report to send"));
        };

        let delivery = self
            .gateway
            .notify_operator(store, run.count.total(), &report)
            .await?;
        let mut outcome = match &delivery {
            Delivery::Sent => StageOutcome::success(stage, started),
            Delivery::LocallySaved { path } => StageOutcome::new(stage, OutcomeStatus::Degraded, started)
                .with_error(format!("operator notification saved to {}", path.display()))
                .with_failure_kind(FailureKind::NotificationFailure)
                .with_artifact(path),
        };

        run.approval = self
            .approval
            .spawn(store.session(), run.findings.clone())
            .await?;
        if let Some(handle) = &run.approval {
            outcome = outcome.with_artifact(handle.request_path());
        }
        run.delivery = Some(delivery);
        Ok(outcome)
    }

    fn analyzer(&self) -> Option<&ToolSpec> {
        self.config.analyzer.as_ref().filter(|spec| {
            let available = self.availability.is_available(&spec.name);
            if !available {
                self.runner
                    .log()
                    .info(format!("analyzer {} not installed, skipping", spec.name));
            }
            available
        })
    }

    /// Runs every runnable tool of a stage, one after another.
    ///
    /// Tools missing from `PATH` (optional ones only; required ones fail
    /// preflight) and tools needing `{params}` when there are none are
    /// skipped without an outcome.
    async fn run_tools(
        &self,
        store: &ArtifactStore,
        stage: PipelineState,
        tools: &[ToolSpec],
        input: &Path,
        params: Option<&Path>,
    ) -> Result<Vec<StageOutcome>> {
        let log = self.runner.log();
        let mut placeholders = Placeholders::new()
            .with("target", store.session().target.as_str())
            .with_path("input", input);
        if let Some(params) = params {
            placeholders = placeholders.with_path("params", params);
        }

        let mut outcomes = Vec::with_capacity(tools.len());
        for spec in tools {
            if !self.availability.is_available(&spec.name) {
                log.info(format!("{stage}/{} skipped: not installed", spec.name));
                continue;
            }
            if spec.uses_params() && params.is_none() {
                log.info(format!("{stage}/{} skipped: no parametrized URLs", spec.name));
                continue;
            }
            let output = store.writable_path(stage_area(stage), &artifact_name(stage, spec))?;
            let stderr = store.writable_path(Area::Logs, &format!("{stage}_{}.stderr", spec.name))?;
            let invocation = ToolInvocation::from_spec(
                stage.name(),
                spec,
                &placeholders,
                Some(input),
                output,
                stderr,
            );
            outcomes.push(self.runner.run(&invocation).await);
        }
        Ok(outcomes)
    }
}

/// Area a tool stage writes its artifacts to.
const fn stage_area(stage: PipelineState) -> Area {
    match stage {
        PipelineState::Recon => Area::Recon,
        PipelineState::AliveCheck => Area::Alive,
        PipelineState::Crawl => Area::Urls,
        PipelineState::VulnScan | PipelineState::Analyze => Area::Vulnerabilities,
        PipelineState::Report | PipelineState::Notify | PipelineState::Done | PipelineState::Aborted => {
            Area::Reports
        }
    }
}

/// Artifact name of one tool: `<tool>.txt`, `<tool>_results.txt` for
/// scanners, or a `<tool>/` directory.
fn artifact_name(stage: PipelineState, spec: &ToolSpec) -> String {
    match spec.output {
        OutputMode::Directory => spec.name.clone(),
        _ if stage == PipelineState::VulnScan => format!("{}_results.txt", spec.name),
        _ => format!("{}.txt", spec.name),
    }
}

/// Merges the line artifacts of a stage's tools into one deduplicated file.
fn consolidate(
    store: &ArtifactStore,
    tools: &[StageOutcome],
    area: Area,
    name: &str,
) -> Result<Vec<String>> {
    let files: Vec<&PathBuf> = tools
        .iter()
        .flat_map(|t| &t.artifact_paths)
        .filter(|p| p.is_file())
        .collect();
    let lines = aggregate::combine(&files)?;
    store.write_lines(area, name, &lines)?;
    Ok(lines)
}
