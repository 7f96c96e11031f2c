//! Delivery with local-save fallback.

use super::{Audience, CommandNotificationSink, Notification, NotificationSink, UnconfiguredSink};
use crate::config::NotificationConfig;
use crate::errors::{FailureKind, Result};
use crate::events::{activity, AuditSink, NoOpAuditSink};
use crate::observability::RunLog;
use crate::runner::ExternalToolRunner;
use crate::session::ArtifactStore;
use crate::utils::{compact_stamp, now_utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How a notification ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Delivery {
    /// The sink accepted the notification.
    Sent,
    /// The sink failed; the report was copied locally instead.
    LocallySaved {
        /// The timestamped local copy.
        path: PathBuf,
    },
}

impl Delivery {
    /// Returns true if the sink accepted the notification.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Routes notifications to per-audience sinks.
#[derive(Clone)]
pub struct NotificationGateway {
    operator: Arc<dyn NotificationSink>,
    developer: Arc<dyn NotificationSink>,
    audit: Arc<dyn AuditSink>,
    log: RunLog,
}

impl std::fmt::Debug for NotificationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationGateway")
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

impl NotificationGateway {
    /// Creates a gateway from explicit sinks.
    #[must_use]
    pub fn new(
        operator: Arc<dyn NotificationSink>,
        developer: Arc<dyn NotificationSink>,
        log: RunLog,
    ) -> Self {
        Self {
            operator,
            developer,
            audit: Arc::new(NoOpAuditSink),
            log,
        }
    }

    /// Builds command sinks from configuration; unset commands become
    /// [`UnconfiguredSink`]s.
    #[must_use]
    pub fn from_config(config: &NotificationConfig, runner: &ExternalToolRunner) -> Self {
        let sink = |spec: Option<&crate::config::ToolSpec>, audience| -> Arc<dyn NotificationSink> {
            match spec {
                Some(spec) => Arc::new(CommandNotificationSink::new(spec.clone(), runner.clone())),
                None => Arc::new(UnconfiguredSink::new(audience)),
            }
        };
        Self::new(
            sink(config.operator_command.as_ref(), Audience::Operator),
            sink(config.developer_command.as_ref(), Audience::Developer),
            runner.log().clone(),
        )
    }

    /// Sets the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Sends the first-line alert to the operator.
    ///
    /// Fails only when the local fallback copy cannot be written.
    pub async fn notify_operator(
        &self,
        store: &ArtifactStore,
        vuln_count: u64,
        report_path: &Path,
    ) -> Result<Delivery> {
        self.deliver(store, Audience::Operator, vuln_count, report_path)
            .await
    }

    /// Sends the remediation notice to the developers.
    ///
    /// `store` must be an approval unit's view: the fallback copy lands in
    /// the approval area.
    pub async fn notify_developer(
        &self,
        store: &ArtifactStore,
        vuln_count: u64,
        report_path: &Path,
    ) -> Result<Delivery> {
        self.deliver(store, Audience::Developer, vuln_count, report_path)
            .await
    }

    async fn deliver(
        &self,
        store: &ArtifactStore,
        audience: Audience,
        vuln_count: u64,
        report_path: &Path,
    ) -> Result<Delivery> {
        let session = store.session();
        let notification = Notification::new(
            audience,
            &session.target,
            vuln_count,
            report_path,
            &session.root,
        );
        let sink = match audience {
            Audience::Operator => &self.operator,
            Audience::Developer => &self.developer,
        };

        match sink.send(&notification).await {
            Ok(()) => {
                self.log.info(format!(
                    "notification sent to {audience}: {}",
                    notification.subject
                ));
                self.audit
                    .record(
                        activity::NOTIFICATION_SENT,
                        Some(json!({
                            "audience": audience,
                            "target": session.target,
                            "session_id": session.id,
                            "vuln_count": vuln_count,
                            "subject": notification.subject,
                        })),
                    )
                    .await;
                Ok(Delivery::Sent)
            }
            Err(error) => {
                let name = format!(
                    "{}_{}.md",
                    audience.fallback_prefix(),
                    compact_stamp(&now_utc())
                );
                let contents = std::fs::read(report_path)?;
                let path = store.write(audience.area(), &name, contents)?;
                self.log.warn(format!(
                    "{}: {error}; report saved locally at {}",
                    FailureKind::NotificationFailure,
                    path.display()
                ));
                self.audit
                    .record(
                        activity::NOTIFICATION_SAVED_LOCALLY,
                        Some(json!({
                            "audience": audience,
                            "target": session.target,
                            "session_id": session.id,
                            "vuln_count": vuln_count,
                            "path": path,
                            "error": error.to_string(),
                        })),
                    )
                    .await;
                Ok(Delivery::LocallySaved { path })
            }
        }
    }
}
