//! Notification sinks.

use super::{Audience, Notification};
use crate::config::{OutputMode, ToolSpec};
use crate::errors::NotificationError;
use crate::runner::{ExternalToolRunner, Placeholders, ToolInvocation};
use async_trait::async_trait;

/// External delivery mechanism for notifications.
///
/// A failed send is reported as an error; the gateway decides what to do
/// with it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one notification.
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Sink used when no transport is configured for an audience.
#[derive(Debug, Clone, Copy)]
pub struct UnconfiguredSink {
    audience: Audience,
}

impl UnconfiguredSink {
    /// Creates an unconfigured sink for an audience.
    #[must_use]
    pub const fn new(audience: Audience) -> Self {
        Self { audience }
    }
}

#[async_trait]
impl NotificationSink for UnconfiguredSink {
    async fn send(&self, _notification: &Notification) -> Result<(), NotificationError> {
        Err(NotificationError::NotConfigured(self.audience.to_string()))
    }
}

/// Delivers notifications by running an external command.
///
/// The command sees the notification through the `{audience}`, `{subject}`,
/// `{target}`, `{vuln_count}`, `{report}` and `{session}` placeholders. Its
/// output is captured in the area the audience's writer owns.
#[derive(Debug, Clone)]
pub struct CommandNotificationSink {
    spec: ToolSpec,
    runner: ExternalToolRunner,
}

impl CommandNotificationSink {
    /// Creates a command sink.
    #[must_use]
    pub fn new(spec: ToolSpec, runner: ExternalToolRunner) -> Self {
        Self {
            spec: spec.with_output(OutputMode::Stdout),
            runner,
        }
    }
}

#[async_trait]
impl NotificationSink for CommandNotificationSink {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let placeholders = Placeholders::new()
            .with("audience", notification.audience.to_string())
            .with("subject", &notification.subject)
            .with("target", &notification.target)
            .with("vuln_count", notification.vuln_count.to_string())
            .with_path("report", &notification.report_path)
            .with_path("session", &notification.session_path);

        let capture_dir = notification
            .session_path
            .join(notification.audience.area().dir_name());
        let base = format!("notify_{}_{}", notification.audience, self.spec.name);
        let invocation = ToolInvocation::from_spec(
            "notify",
            &self.spec,
            &placeholders,
            None,
            capture_dir.join(format!("{base}.out")),
            capture_dir.join(format!("{base}.stderr")),
        );

        let outcome = self.runner.run(&invocation).await;
        if outcome.status.is_success() {
            Ok(())
        } else {
            Err(NotificationError::transport(
                outcome
                    .error_detail
                    .unwrap_or_else(|| outcome.status.to_string()),
            ))
        }
    }
}
