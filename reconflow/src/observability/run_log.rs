//! The central, append-only run log.

use crate::utils::iso_timestamp;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

/// Run log file name inside a session's `logs` area.
pub const RUN_LOG_FILE: &str = "reconflow.log";

/// Durable log sink shared by every component of a run.
///
/// Lines have the form `timestamp [LEVEL] message`. Write failures are
/// reported through `tracing` and otherwise ignored: losing a log line must
/// never fail a stage.
#[derive(Clone)]
pub struct RunLog {
    inner: Arc<RunLogInner>,
}

struct RunLogInner {
    path: Option<PathBuf>,
    file: Option<Mutex<File>>,
}

impl RunLog {
    /// Opens (creating if needed) the log file at `path` in append mode.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            inner: Arc::new(RunLogInner {
                path: Some(path),
                file: Some(Mutex::new(file)),
            }),
        })
    }

    /// A log that only forwards to `tracing`.
    #[must_use]
    pub fn tracing_only() -> Self {
        Self {
            inner: Arc::new(RunLogInner {
                path: None,
                file: None,
            }),
        }
    }

    /// The backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// Appends a record at the given level.
    pub fn record(&self, level: Level, message: impl AsRef<str>) {
        let message = message.as_ref();
        match level {
            Level::ERROR => tracing::error!(target: "reconflow::run", "{message}"),
            Level::WARN => tracing::warn!(target: "reconflow::run", "{message}"),
            Level::INFO => tracing::info!(target: "reconflow::run", "{message}"),
            Level::DEBUG => tracing::debug!(target: "reconflow::run", "{message}"),
            Level::TRACE => tracing::trace!(target: "reconflow::run", "{message}"),
        }

        if let Some(file) = &self.inner.file {
            let line = format!("{} [{level}] {message}\n", iso_timestamp());
            if let Err(e) = file.lock().write_all(line.as_bytes()) {
                tracing::warn!(error = %e, "failed to append to run log");
            }
        }
    }

    /// Appends an INFO record.
    pub fn info(&self, message: impl AsRef<str>) {
        self.record(Level::INFO, message);
    }

    /// Appends a WARN record.
    pub fn warn(&self, message: impl AsRef<str>) {
        self.record(Level::WARN, message);
    }

    /// Appends an ERROR record.
    pub fn error(&self, message: impl AsRef<str>) {
        self.record(Level::ERROR, message);
    }

    /// Appends a DEBUG record.
    pub fn debug(&self, message: impl AsRef<str>) {
        self.record(Level::DEBUG, message);
    }
}

impl std::fmt::Debug for RunLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLog").field("path", &self.path()).finish()
    }
}
