//! End-to-end pipeline scenarios.
//!
//! Every external tool is a POSIX shell script written into a temporary
//! directory and run through `sh`, so these tests need no scanner installed.

#![cfg(unix)]

use super::{PipelineRun, StagePipeline};
use crate::approval::{ApprovalRequest, ApprovalStatus, ApprovalWorkflow, Decision, InMemoryChannel};
use crate::config::{InputMode, OutputMode, ReconConfig, StageTools, ToolSpec};
use crate::core::{OutcomeStatus, PipelineState};
use crate::errors::{FailureKind, NotificationError};
use crate::events::{activity, CollectingAuditSink};
use crate::notify::{Audience, Delivery, MockNotificationSink, NotificationGateway, UnconfiguredSink};
use crate::observability::{RunLog, RUN_LOG_FILE};
use crate::report::artifacts;
use crate::runner::{ExternalToolRunner, ToolRegistry};
use crate::session::{Area, ArtifactStore, Session, SessionManager};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A tool implemented as a shell script run through `sh`.
fn sh_tool(dir: &Path, name: &str, body: &str, args: &[&str]) -> ToolSpec {
    let bin = dir.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let path = bin.join(format!("{name}.sh"));
    std::fs::write(&path, body).unwrap();
    let mut all = vec![path.display().to_string()];
    all.extend(args.iter().map(ToString::to_string));
    ToolSpec::new(name).with_program("sh").with_args(all)
}

/// The example.com fixture: 3 subdomains, 1 live host, 6 URLs of which one
/// is parametrized, 2 template findings and 1 XSS finding.
fn example_tools(dir: &Path) -> StageTools {
    StageTools {
        recon: vec![sh_tool(
            dir,
            "subfinder",
            "printf 'a.example.com\\nb.example.com\\nexample.com\\n'\n",
            &["{target}"],
        )],
        alive: vec![sh_tool(
            dir,
            "httpx",
            "test -s \"$1\" && printf 'https://a.example.com\\n'\n",
            &["{input}"],
        )],
        crawl: vec![sh_tool(
            dir,
            "gau",
            "cat >/dev/null\nfor p in / /login /admin /about /static/app.js '/search?q=test'; do\n  printf 'https://a.example.com%s\\n' \"$p\"\ndone\n",
            &[],
        )
        .with_input(InputMode::Stdin)],
        vulnscan: vec![
            sh_tool(
                dir,
                "nuclei",
                "printf '[cve-2021-1234] [http] [high] https://a.example.com/login\\n[exposed-panel] [http] [info] https://a.example.com/admin\\n' > \"$2\"\n",
                &["{input}", "{output}"],
            )
            .with_output(OutputMode::File),
            sh_tool(
                dir,
                "dalfox",
                "read -r url < \"$1\"\nprintf '[POC][G][GET] %s<script>\\n' \"$url\" > \"$2\"\n",
                &["{params}", "{output}"],
            )
            .with_output(OutputMode::File),
            sh_tool(dir, "sqlmap", "mkdir -p \"$2\"\n", &["{params}", "{output_dir}"])
                .with_output(OutputMode::Directory),
        ],
    }
}

struct Harness {
    _dir: TempDir,
    config: ReconConfig,
    session: Session,
    pipeline: StagePipeline,
    channel: Arc<InMemoryChannel>,
    audit: Arc<CollectingAuditSink>,
}

fn harness(dir: TempDir, tools: StageTools, operator: MockNotificationSink) -> Harness {
    harness_with(dir, ReconConfig::new().with_tools(tools), operator)
}

fn harness_with(dir: TempDir, config: ReconConfig, operator: MockNotificationSink) -> Harness {
    let config = config.with_session_root(dir.path().join("results"));
    let session = SessionManager::from_config(&config).create("example.com").unwrap();
    let log = RunLog::open(session.area_dir(Area::Logs).join(RUN_LOG_FILE)).unwrap();
    let audit = Arc::new(CollectingAuditSink::new());
    let channel = Arc::new(InMemoryChannel::new());

    let runner = ExternalToolRunner::new(log.clone());
    let gateway = NotificationGateway::new(
        Arc::new(operator),
        Arc::new(UnconfiguredSink::new(Audience::Developer)),
        log.clone(),
    )
    .with_audit(audit.clone());
    let approval =
        ApprovalWorkflow::new(channel.clone(), gateway.clone(), log).with_audit(audit.clone());
    let availability = ToolRegistry::from_config(&config).preflight().unwrap();
    let pipeline = StagePipeline::new(config.clone(), runner, gateway, approval)
        .with_availability(availability)
        .with_audit(audit.clone());

    Harness {
        _dir: dir,
        config,
        session,
        pipeline,
        channel,
        audit,
    }
}

fn operator_accepting(times: usize) -> MockNotificationSink {
    let mut operator = MockNotificationSink::new();
    operator
        .expect_send()
        .withf(|n| n.audience == Audience::Operator)
        .times(times)
        .returning(|_| Ok(()));
    operator
}

fn statuses(run: &PipelineRun) -> Vec<(String, OutcomeStatus)> {
    run.outcomes
        .iter()
        .map(|o| (o.stage_name.clone(), o.status))
        .collect()
}

fn area_entries(session: &Session, area: Area) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(session.area_dir(area))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn run_log(session: &Session) -> String {
    std::fs::read_to_string(session.area_dir(Area::Logs).join(RUN_LOG_FILE)).unwrap()
}

#[tokio::test]
async fn test_example_session_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let tools = example_tools(dir.path());
    let analyzer = sh_tool(
        dir.path(),
        "analyzer",
        "printf 'Reviewed %s findings; the login CVE looks exploitable.\\n' \"$(wc -l < \"$1\" | tr -d ' ')\"\n",
        &["{input}"],
    );
    let mut operator = MockNotificationSink::new();
    operator
        .expect_send()
        .withf(|n| {
            n.audience == Audience::Operator
                && n.vuln_count == 3
                && n.subject == "Recon alert - example.com (3 findings)"
        })
        .times(1)
        .returning(|_| Ok(()));
    let h = harness_with(
        dir,
        ReconConfig::new().with_tools(tools).with_analyzer(analyzer),
        operator,
    );

    let run = h.pipeline.run(&h.session).await.unwrap();

    assert!(run.is_done());
    assert_eq!(run.vuln_count, Some(3));
    assert_eq!(run.delivery, Some(Delivery::Sent));
    assert_eq!(
        statuses(&run),
        [
            "recon",
            "alive_check",
            "crawl",
            "vuln_scan",
            "analyze",
            "report",
            "notify"
        ]
        .iter()
        .map(|s| (s.to_string(), OutcomeStatus::Success))
        .collect::<Vec<_>>()
    );

    let store = ArtifactStore::for_pipeline(&h.session);
    assert_eq!(store.read_lines(Area::Recon, artifacts::SUBDOMAINS).unwrap().len(), 3);
    assert_eq!(
        store.read_lines(Area::Alive, artifacts::ALIVE).unwrap(),
        vec!["https://a.example.com"]
    );
    assert_eq!(store.read_lines(Area::Urls, artifacts::URLS).unwrap().len(), 6);
    assert_eq!(
        store.read_lines(Area::Urls, artifacts::PARAMS).unwrap(),
        vec!["https://a.example.com/search?q=test"]
    );
    assert_eq!(store.read_vuln_count().unwrap(), Some(3));

    let report_path = run.report_path.clone().unwrap();
    assert_eq!(report_path, h.session.area_dir(Area::Reports).join("report.md"));
    let report = std::fs::read_to_string(&report_path).unwrap();
    assert!(report.contains("# Reconnaissance report: example.com"));
    assert!(report.contains("- Priority: MEDIUM"));
    assert!(report.contains("- Vulnerability count: 3"));
    assert_eq!(report.matches("### Finding ").count(), 3);
    assert!(report.contains("## Analysis notes"));
    assert!(report.contains("Reviewed 3 findings"));
    assert_eq!(
        SessionManager::from_config(&h.config).latest_report().unwrap(),
        Some(report_path)
    );

    let ledger: Vec<_> = store
        .outcomes()
        .unwrap()
        .into_iter()
        .map(|o| (o.stage_name, o.status))
        .collect();
    assert_eq!(ledger, statuses(&run));

    let handle = run.approval.unwrap();
    let request = ApprovalRequest::load(&ArtifactStore::for_approval(&h.session)).unwrap();
    assert_eq!(request.status, ApprovalStatus::Pending);
    assert_eq!(request.vulnerability_count, 3);
    assert_eq!(request.findings.len(), 3);
    assert_eq!(request.request_id, handle.request_id());
    assert_eq!(
        h.audit.activities(),
        vec![
            activity::SCAN_STARTED,
            activity::NOTIFICATION_SENT,
            activity::APPROVAL_REQUESTED,
            activity::SCAN_COMPLETED,
        ]
    );

    while h.channel.pending_count() == 0 {
        tokio::task::yield_now().await;
    }
    assert!(h.channel.decide(handle.request_id(), Decision::Deny));
    let decided = handle.join().await.unwrap();
    assert_eq!(decided.status, ApprovalStatus::Denied);
}

#[tokio::test]
async fn test_zero_alive_hosts_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let mut tools = example_tools(dir.path());
    tools.alive = vec![sh_tool(dir.path(), "httpx", "exit 0\n", &["{input}"])];
    let h = harness(dir, tools, operator_accepting(0));

    let run = h.pipeline.run(&h.session).await.unwrap();

    assert_eq!(run.final_state, PipelineState::Aborted);
    assert_eq!(
        statuses(&run),
        vec![
            ("recon".to_string(), OutcomeStatus::Success),
            ("alive_check".to_string(), OutcomeStatus::Failed),
        ]
    );
    assert_eq!(
        run.stage(PipelineState::AliveCheck).unwrap().failure_kind,
        Some(FailureKind::StageCrash)
    );
    assert!(run.report_path.is_none());
    assert!(run.vuln_count.is_none());
    assert!(run.approval.is_none());
    assert!(area_entries(&h.session, Area::Urls).is_empty());
    assert!(area_entries(&h.session, Area::Reports).is_empty());

    let log = run_log(&h.session);
    assert!(log.contains("[ERROR] session "));
    assert!(log.contains("aborted at alive_check"));
    assert_eq!(
        h.audit.activities(),
        vec![activity::SCAN_STARTED, activity::SCAN_ABORTED]
    );
}

#[tokio::test]
async fn test_recon_fallback_then_no_alive_hosts_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let mut tools = example_tools(dir.path());
    tools.recon = vec![sh_tool(dir.path(), "subfinder", "exit 1\n", &["{target}"])];
    tools.alive = vec![sh_tool(dir.path(), "httpx", "cat \"$1\" >/dev/null\n", &["{input}"])];
    let h = harness(dir, tools, operator_accepting(0));

    let run = h.pipeline.run(&h.session).await.unwrap();

    assert_eq!(run.final_state, PipelineState::Aborted);
    assert_eq!(
        statuses(&run),
        vec![
            ("recon".to_string(), OutcomeStatus::Degraded),
            ("alive_check".to_string(), OutcomeStatus::Failed),
        ]
    );
    let store = ArtifactStore::for_pipeline(&h.session);
    assert_eq!(
        store.read_lines(Area::Recon, artifacts::SUBDOMAINS).unwrap(),
        vec!["example.com"]
    );
    assert!(run.report_path.is_none());
    assert!(run.approval.is_none());
    assert!(area_entries(&h.session, Area::Reports).is_empty());
    assert!(run_log(&h.session).contains("aborted at alive_check"));
    assert_eq!(
        h.audit.activities(),
        vec![activity::SCAN_STARTED, activity::SCAN_ABORTED]
    );
}

#[tokio::test]
async fn test_alive_timeout_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let mut tools = example_tools(dir.path());
    tools.alive = vec![sh_tool(dir.path(), "httpx", "sleep 10\n", &["{input}"]).with_timeout_seconds(1)];
    let h = harness(dir, tools, operator_accepting(0));

    let run = h.pipeline.run(&h.session).await.unwrap();

    assert_eq!(run.final_state, PipelineState::Aborted);
    let alive = run.stage(PipelineState::AliveCheck).unwrap();
    assert_eq!(alive.status, OutcomeStatus::Failed);
    assert_eq!(alive.failure_kind, Some(FailureKind::StageTimeout));
    assert_eq!(alive.tools[0].status, OutcomeStatus::TimedOut);
}

#[tokio::test]
async fn test_fallbacks_and_clean_session() {
    let dir = tempfile::tempdir().unwrap();
    let tools = StageTools {
        recon: vec![sh_tool(dir.path(), "subfinder", "exit 1\n", &["{target}"])],
        alive: vec![sh_tool(dir.path(), "httpx", "cat \"$1\"\n", &["{input}"])],
        crawl: vec![sh_tool(dir.path(), "gau", "cat >/dev/null\n", &[]).with_input(InputMode::Stdin)],
        vulnscan: vec![sh_tool(dir.path(), "nuclei", ": > \"$1\"\n", &["{output}"])
            .with_output(OutputMode::File)],
    };
    let mut operator = MockNotificationSink::new();
    operator
        .expect_send()
        .withf(|n| n.vuln_count == 0 && n.subject == "Scan complete - example.com (Clean)")
        .times(1)
        .returning(|_| Ok(()));
    let h = harness(dir, tools, operator);

    let run = h.pipeline.run(&h.session).await.unwrap();

    assert!(run.is_done());
    assert_eq!(
        statuses(&run),
        vec![
            ("recon".to_string(), OutcomeStatus::Degraded),
            ("alive_check".to_string(), OutcomeStatus::Success),
            ("crawl".to_string(), OutcomeStatus::Degraded),
            ("vuln_scan".to_string(), OutcomeStatus::Degraded),
            ("analyze".to_string(), OutcomeStatus::Success),
            ("report".to_string(), OutcomeStatus::Success),
            ("notify".to_string(), OutcomeStatus::Success),
        ]
    );

    let store = ArtifactStore::for_pipeline(&h.session);
    assert_eq!(
        store.read_lines(Area::Recon, artifacts::SUBDOMAINS).unwrap(),
        vec!["example.com"]
    );
    assert_eq!(
        store.read_lines(Area::Urls, artifacts::URLS).unwrap(),
        vec!["example.com"]
    );
    assert!(store.read_lines(Area::Urls, artifacts::PARAMS).unwrap().is_empty());
    assert_eq!(run.vuln_count, Some(0));

    let report = std::fs::read_to_string(run.report_path.as_ref().unwrap()).unwrap();
    assert!(report.contains("- Priority: CLEAN"));
    assert!(report.contains("## No critical findings"));

    assert!(run.approval.is_none());
    assert!(area_entries(&h.session, Area::Approval).is_empty());
    assert!(run_log(&h.session).contains("aggregation_empty: no findings for example.com"));
}

#[tokio::test]
async fn test_operator_sink_failure_saves_report_locally() {
    let dir = tempfile::tempdir().unwrap();
    let tools = example_tools(dir.path());
    let mut operator = MockNotificationSink::new();
    operator
        .expect_send()
        .times(1)
        .returning(|_| Err(NotificationError::transport("connection refused")));
    let h = harness(dir, tools, operator);

    let run = h.pipeline.run(&h.session).await.unwrap();

    assert!(run.is_done());
    let notify = run.stage(PipelineState::Notify).unwrap();
    assert_eq!(notify.status, OutcomeStatus::Degraded);
    assert_eq!(notify.failure_kind, Some(FailureKind::NotificationFailure));

    let Some(Delivery::LocallySaved { path }) = &run.delivery else {
        panic!("expected a local copy, got {:?}", run.delivery);
    };
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("operator_report_") && name.ends_with(".md"));
    assert_eq!(
        std::fs::read_to_string(path).unwrap(),
        std::fs::read_to_string(run.report_path.as_ref().unwrap()).unwrap()
    );
    assert!(run_log(&h.session).contains("notification_failure"));

    let handle = run.approval.unwrap();
    assert!(handle.withdraw("test finished"));
    assert_eq!(handle.join().await.unwrap().status, ApprovalStatus::Withdrawn);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let tools = example_tools(dir.path());
    let h = harness(dir, tools, operator_accepting(0));
    h.pipeline.cancellation_token().cancel("operator interrupt");

    let run = h.pipeline.run(&h.session).await.unwrap();

    assert_eq!(run.final_state, PipelineState::Aborted);
    assert!(run.outcomes.is_empty());
    let aborted = h.audit.records_of_type(activity::SCAN_ABORTED);
    assert_eq!(aborted.len(), 1);
    let details = aborted[0].1.clone().unwrap();
    assert_eq!(details["stage"], "recon");
    assert_eq!(details["reason"], "operator interrupt");
}

#[tokio::test]
async fn test_cancel_honored_at_stage_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let mut tools = example_tools(dir.path());
    tools.recon = vec![sh_tool(
        dir.path(),
        "subfinder",
        "sleep 1\nprintf 'a.example.com\\n'\n",
        &["{target}"],
    )];
    let h = harness(dir, tools, operator_accepting(0));
    let token = h.pipeline.cancellation_token();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel("operator interrupt");
    });
    let run = h.pipeline.run(&h.session).await.unwrap();
    canceller.await.unwrap();

    assert_eq!(run.final_state, PipelineState::Aborted);
    assert_eq!(
        statuses(&run),
        vec![("recon".to_string(), OutcomeStatus::Success)]
    );
    assert!(run_log(&h.session).contains("aborted at alive_check: operator interrupt"));
}

#[tokio::test]
async fn test_missing_optional_tool_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut tools = example_tools(dir.path());
    tools.recon.push(
        ToolSpec::new("amass")
            .with_program("reconflow-test-missing-amass")
            .with_args(["enum", "-d", "{target}"])
            .optional(),
    );
    let h = harness(dir, tools, operator_accepting(1));

    let run = h.pipeline.run(&h.session).await.unwrap();

    let recon = run.stage(PipelineState::Recon).unwrap();
    assert_eq!(recon.status, OutcomeStatus::Success);
    let ran: Vec<_> = recon.tools.iter().filter_map(|t| t.tool_name.as_deref()).collect();
    assert_eq!(ran, vec!["subfinder"]);
    assert!(run_log(&h.session).contains("recon/amass skipped: not installed"));

    if let Some(handle) = run.approval {
        handle.withdraw("test finished");
        handle.join().await.unwrap();
    }
}

#[tokio::test]
async fn test_param_tools_skipped_without_parametrized_urls() {
    let dir = tempfile::tempdir().unwrap();
    let mut tools = example_tools(dir.path());
    tools.crawl = vec![sh_tool(
        dir.path(),
        "gau",
        "cat >/dev/null\nprintf 'https://a.example.com/\\n'\n",
        &[],
    )
    .with_input(InputMode::Stdin)];
    let h = harness(dir, tools, operator_accepting(1));

    let run = h.pipeline.run(&h.session).await.unwrap();

    let scan = run.stage(PipelineState::VulnScan).unwrap();
    let ran: Vec<_> = scan.tools.iter().filter_map(|t| t.tool_name.as_deref()).collect();
    assert_eq!(ran, vec!["nuclei"]);
    assert_eq!(run.vuln_count, Some(2));

    let handle = run.approval.unwrap();
    handle.withdraw("test finished");
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_tool_stderr_is_captured() {
    let dir = tempfile::tempdir().unwrap();
    let mut tools = example_tools(dir.path());
    tools.recon = vec![sh_tool(
        dir.path(),
        "subfinder",
        "echo 'rate limited' >&2\nprintf 'a.example.com\\n'\n",
        &["{target}"],
    )];
    let h = harness(dir, tools, operator_accepting(1));

    let run = h.pipeline.run(&h.session).await.unwrap();

    let stderr = h.session.area_dir(Area::Logs).join("recon_subfinder.stderr");
    assert_eq!(std::fs::read_to_string(stderr).unwrap(), "rate limited\n");
    if let Some(handle) = run.approval {
        handle.withdraw("test finished");
        handle.join().await.unwrap();
    }
}
