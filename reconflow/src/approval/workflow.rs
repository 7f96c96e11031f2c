//! The detached approval unit.

use super::{ApprovalRequest, ApprovalStatus, Decision, DecisionChannel};
use crate::cancellation::CancellationToken;
use crate::core::Finding;
use crate::errors::{ApprovalError, FailureKind, Result};
use crate::events::{activity, AuditSink, NoOpAuditSink};
use crate::notify::NotificationGateway;
use crate::observability::RunLog;
use crate::report::render_developer_report;
use crate::session::{Area, ArtifactStore, Session};
use crate::utils::now_utc;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Developer report file inside [`Area::Approval`].
pub const DEVELOPER_REPORT_FILE: &str = "developer_report.md";

/// Spawns and resumes approval units.
///
/// A unit reads only the vulnerability count from the session and writes
/// only the approval area. It runs on its own task; the pipeline never
/// waits for it.
#[derive(Clone)]
pub struct ApprovalWorkflow {
    channel: Arc<dyn DecisionChannel>,
    gateway: NotificationGateway,
    audit: Arc<dyn AuditSink>,
    log: RunLog,
    idle_timeout: Option<Duration>,
}

impl std::fmt::Debug for ApprovalWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalWorkflow")
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

/// Handle on a running approval unit.
#[derive(Debug)]
pub struct ApprovalHandle {
    request_id: Uuid,
    session_id: String,
    request_path: PathBuf,
    token: Arc<CancellationToken>,
    task: JoinHandle<Result<ApprovalRequest>>,
}

impl ApprovalHandle {
    /// The request id.
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The session the request belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Where the request is persisted.
    #[must_use]
    pub fn request_path(&self) -> &PathBuf {
        &self.request_path
    }

    /// Withdraws the request unless a decision already arrived.
    ///
    /// Returns true if this call issued the withdrawal.
    pub fn withdraw(&self, reason: impl Into<String>) -> bool {
        self.token.cancel(reason)
    }

    /// Token that withdraws the request when cancelled, for callers that
    /// give the handle away to [`ApprovalHandle::join`].
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        self.token.clone()
    }

    /// Waits for the unit and returns the final request state.
    ///
    /// A request whose channel was unavailable comes back still pending.
    pub async fn join(self) -> Result<ApprovalRequest> {
        self.task
            .await
            .map_err(|e| ApprovalError::unavailable(format!("approval unit stopped: {e}")))?
    }
}

impl ApprovalWorkflow {
    /// Creates a workflow deciding through `channel`.
    #[must_use]
    pub fn new(channel: Arc<dyn DecisionChannel>, gateway: NotificationGateway, log: RunLog) -> Self {
        Self {
            channel,
            gateway,
            audit: Arc::new(NoOpAuditSink),
            log,
            idle_timeout: None,
        }
    }

    /// Sets the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Withdraws requests left idle for `timeout`. `None` waits forever.
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Creates a request for a session and starts its unit.
    ///
    /// Returns `None` when the session's vulnerability count is zero or
    /// absent: no request is created then. The request is persisted before
    /// this returns.
    pub async fn spawn(&self, session: &Session, findings: Vec<Finding>) -> Result<Option<ApprovalHandle>> {
        let store = ArtifactStore::for_approval(session);
        let count = store.read_vuln_count()?.unwrap_or(0);
        if count == 0 {
            return Ok(None);
        }

        let request = ApprovalRequest::new(session, count, findings);
        request.save(&store)?;
        self.log.info(format!(
            "approval requested for {} ({count} findings), request {}",
            session.id, request.request_id
        ));
        self.audit
            .record(
                activity::APPROVAL_REQUESTED,
                Some(json!({
                    "request_id": request.request_id,
                    "session_id": session.id,
                    "target": session.target,
                    "vuln_count": count,
                })),
            )
            .await;

        Ok(Some(self.start(store, request)))
    }

    /// Re-attaches a unit to a persisted pending request.
    pub fn resume(&self, session: &Session) -> Result<ApprovalHandle> {
        let store = ArtifactStore::for_approval(session);
        let request = ApprovalRequest::load(&store)?;
        if request.status.is_terminal() {
            return Err(ApprovalError::AlreadyDecided {
                status: request.status.to_string(),
            }
            .into());
        }
        self.log
            .info(format!("resuming approval request {}", request.request_id));
        Ok(self.start(store, request))
    }

    fn start(&self, store: ArtifactStore, request: ApprovalRequest) -> ApprovalHandle {
        let token = Arc::new(CancellationToken::new());
        let handle_token = token.clone();
        let request_id = request.request_id;
        let session_id = request.session_id.clone();
        let request_path = store.area_dir(Area::Approval).join(super::REQUEST_FILE);
        let unit = self.clone();
        let task = tokio::spawn(async move { unit.drive(store, request, &token).await });
        ApprovalHandle {
            request_id,
            session_id,
            request_path,
            token: handle_token,
            task,
        }
    }

    async fn drive(
        &self,
        store: ArtifactStore,
        mut request: ApprovalRequest,
        token: &CancellationToken,
    ) -> Result<ApprovalRequest> {
        let answer = tokio::select! {
            biased;
            () = token.cancelled() => Ok((
                Decision::Withdraw,
                token.reason().unwrap_or_else(|| "withdrawn".to_string()),
            )),
            answer = self.await_decision(&request, &store) => answer,
        };

        let (decision, reason) = match answer {
            Ok(answer) => answer,
            Err(error) => {
                self.log.warn(format!(
                    "{}: {error}; request {} stays pending",
                    FailureKind::ApprovalChannelUnavailable,
                    request.request_id
                ));
                return Ok(request);
            }
        };

        request.decide(decision, Some(reason))?;
        request.save(&store)?;
        self.log.info(format!(
            "approval request {} {}",
            request.request_id, request.status
        ));
        self.audit
            .record(
                activity::APPROVAL_DECIDED,
                Some(json!({
                    "request_id": request.request_id,
                    "session_id": request.session_id,
                    "status": request.status,
                    "reason": request.reason,
                })),
            )
            .await;

        if request.status == ApprovalStatus::Approved {
            let report = render_developer_report(
                &request.target,
                request.vulnerability_count,
                &request.findings,
                now_utc(),
            );
            let report_path = store.write(Area::Approval, DEVELOPER_REPORT_FILE, report)?;
            let delivery = self
                .gateway
                .notify_developer(&store, request.vulnerability_count, &report_path)
                .await?;
            request.delivery = Some(delivery);
            request.save(&store)?;
        }
        Ok(request)
    }

    async fn await_decision(
        &self,
        request: &ApprovalRequest,
        store: &ArtifactStore,
    ) -> Result<(Decision, String), ApprovalError> {
        let waiting = self.channel.wait(request, store);
        match self.idle_timeout {
            None => waiting.await.map(|d| (d, "operator decision".to_string())),
            Some(limit) => match tokio::time::timeout(limit, waiting).await {
                Ok(answer) => answer.map(|d| (d, "operator decision".to_string())),
                Err(_) => Ok((
                    Decision::Withdraw,
                    format!("idle for {limit:?}"),
                )),
            },
        }
    }
}
