//! Audit sink trait and implementations.

use crate::utils::iso_timestamp;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Trait for sinks receiving activity records.
///
/// Implementations must never fail the caller: errors are logged and
/// suppressed.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records an activity asynchronously.
    ///
    /// # Arguments
    ///
    /// * `activity` - The activity name (e.g., "scan.started")
    /// * `data` - Optional structured details
    async fn record(&self, activity: &str, data: Option<serde_json::Value>);
}

/// An audit sink that discards everything.
///
/// Used as the default when no history is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuditSink;

#[async_trait]
impl AuditSink for NoOpAuditSink {
    async fn record(&self, _activity: &str, _data: Option<serde_json::Value>) {}
}

/// An audit sink that logs activities through `tracing`.
///
/// Stands in for the history file when that cannot be opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAuditSink;

#[async_trait]
impl AuditSink for LoggingAuditSink {
    async fn record(&self, activity: &str, data: Option<serde_json::Value>) {
        info!(activity = %activity, details = ?data, "Activity: {}", activity);
    }
}

/// A collecting audit sink for tests.
#[derive(Debug, Default)]
pub struct CollectingAuditSink {
    records: RwLock<Vec<(String, Option<serde_json::Value>)>>,
}

impl CollectingAuditSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the collected activity names in order.
    #[must_use]
    pub fn activities(&self) -> Vec<String> {
        self.records.read().iter().map(|(a, _)| a.clone()).collect()
    }

    /// Returns the number of collected records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns records whose activity starts with a prefix.
    #[must_use]
    pub fn records_of_type(&self, prefix: &str) -> Vec<(String, Option<serde_json::Value>)> {
        self.records
            .read()
            .iter()
            .filter(|(a, _)| a.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for CollectingAuditSink {
    async fn record(&self, activity: &str, data: Option<serde_json::Value>) {
        self.records.write().push((activity.to_string(), data));
    }
}

/// Appends one JSON object per activity to a history file.
///
/// Each line is `{"timestamp": .., "activity": .., "details": ..}`.
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Opens (creating if needed) the history file in append mode.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// The history file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, activity: &str, data: Option<serde_json::Value>) {
        let entry = serde_json::json!({
            "timestamp": iso_timestamp(),
            "activity": activity,
            "details": data,
        });
        let mut line = entry.to_string();
        line.push('\n');
        if let Err(e) = self.file.lock().write_all(line.as_bytes()) {
            warn!(error = %e, path = %self.path.display(), "failed to append activity history");
        }
    }
}

impl std::fmt::Debug for JsonlAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlAuditSink")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, activity: &str, data: Option<serde_json::Value>) {
        self.append(activity, data);
    }
}
