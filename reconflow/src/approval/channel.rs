//! Decision channels.

use super::{ApprovalRequest, Decision};
use crate::errors::ApprovalError;
use crate::session::{Area, ArtifactStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

/// Decision file polled by [`FileDecisionChannel`], inside [`Area::Approval`].
pub const DECISION_FILE: &str = "decision";

/// Presents a pending request to a human and waits for the answer.
///
/// The wait is unbounded. An error means the channel cannot be reached at
/// all; the request then stays pending.
#[async_trait]
pub trait DecisionChannel: Send + Sync {
    /// Waits for a decision on `request`. `store` is the approval unit's
    /// view of the request's session.
    async fn wait(
        &self,
        request: &ApprovalRequest,
        store: &ArtifactStore,
    ) -> Result<Decision, ApprovalError>;
}

/// In-process channel: decisions are posted by request id.
#[derive(Default)]
pub struct InMemoryChannel {
    waiting: RwLock<HashMap<Uuid, oneshot::Sender<Decision>>>,
}

impl InMemoryChannel {
    /// Creates a new channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a decision. Returns false if nobody waits on `request_id`.
    pub fn decide(&self, request_id: Uuid, decision: Decision) -> bool {
        self.waiting
            .write()
            .remove(&request_id)
            .is_some_and(|tx| tx.send(decision).is_ok())
    }

    /// Returns the number of requests waiting.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.waiting.read().len()
    }

    /// Lists the waiting request ids.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<Uuid> {
        self.waiting.read().keys().copied().collect()
    }

    /// Stops waiting on a request; its waiter sees the channel as unavailable.
    pub fn close(&self, request_id: Uuid) -> bool {
        self.waiting.write().remove(&request_id).is_some()
    }
}

impl std::fmt::Debug for InMemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChannel")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

#[async_trait]
impl DecisionChannel for InMemoryChannel {
    async fn wait(
        &self,
        request: &ApprovalRequest,
        _store: &ArtifactStore,
    ) -> Result<Decision, ApprovalError> {
        let (tx, rx) = oneshot::channel();
        self.waiting.write().insert(request.request_id, tx);
        let result = rx.await;
        self.waiting.write().remove(&request.request_id);
        result.map_err(|_| ApprovalError::unavailable("decision channel closed"))
    }
}

/// Polls `approval/decision` for `approve`, `deny` or `withdraw`.
///
/// Lets a decision be made from another process, e.g. `reconflow decide`.
#[derive(Debug, Clone, Copy)]
pub struct FileDecisionChannel {
    interval: Duration,
}

impl FileDecisionChannel {
    /// Creates a channel polling every `interval`.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Writes a decision file for a waiting channel to pick up.
    pub fn post(store: &ArtifactStore, decision: Decision) -> crate::errors::Result<std::path::PathBuf> {
        store.write(Area::Approval, DECISION_FILE, format!("{decision}\n"))
    }
}

#[async_trait]
impl DecisionChannel for FileDecisionChannel {
    async fn wait(
        &self,
        request: &ApprovalRequest,
        store: &ArtifactStore,
    ) -> Result<Decision, ApprovalError> {
        let mut rejected: Option<String> = None;
        loop {
            let text = store
                .read(Area::Approval, DECISION_FILE)
                .map_err(|e| ApprovalError::unavailable(e.to_string()))?;
            if let Some(text) = text {
                if let Some(decision) = Decision::parse(&text) {
                    debug!(request = %request.request_id, %decision, "decision file read");
                    return Ok(decision);
                }
                if rejected.as_deref() != Some(text.as_str()) {
                    warn!(content = %text.trim(), "ignoring unrecognised decision file");
                    rejected = Some(text);
                }
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionIdPolicy;
    use crate::session::{Session, SessionManager};
    use std::sync::Arc;

    fn session() -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionManager::new(dir.path(), SessionIdPolicy::Suffix)
            .create("example.com")
            .unwrap();
        (dir, session)
    }

    #[tokio::test]
    async fn test_in_memory_decision() {
        let (_dir, session) = session();
        let request = ApprovalRequest::new(&session, 1, Vec::new());
        let id = request.request_id;
        let channel = Arc::new(InMemoryChannel::new());
        let store = ArtifactStore::for_approval(&session);

        let waiter = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.wait(&request, &store).await })
        };
        while channel.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(channel.pending_requests(), vec![id]);
        assert!(channel.decide(id, Decision::Approve));
        assert_eq!(waiter.await.unwrap().unwrap(), Decision::Approve);
        assert!(!channel.decide(id, Decision::Deny));
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_in_memory_close_is_unavailable() {
        let (_dir, session) = session();
        let request = ApprovalRequest::new(&session, 1, Vec::new());
        let id = request.request_id;
        let channel = Arc::new(InMemoryChannel::new());
        let store = ArtifactStore::for_approval(&session);

        let waiter = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.wait(&request, &store).await })
        };
        while channel.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(channel.close(id));
        assert!(matches!(
            waiter.await.unwrap(),
            Err(ApprovalError::ChannelUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_file_channel_picks_up_posted_decision() {
        let (_dir, session) = session();
        let store = ArtifactStore::for_approval(&session);
        let request = ApprovalRequest::new(&session, 1, Vec::new());
        let channel = FileDecisionChannel::new(Duration::from_millis(20));

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { channel.wait(&request, &store).await })
        };
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!waiter.is_finished());

        store.write(Area::Approval, DECISION_FILE, "later\n").unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!waiter.is_finished());

        FileDecisionChannel::post(&store, Decision::Deny).unwrap();
        let decision = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(decision, Decision::Deny);
    }
}
