//! `tracing` subscriber setup and span timing.

use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Console log rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_level` when set. Returns false if a
/// subscriber was already installed.
pub fn init_logging(default_level: &str, format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(format!("reconflow={default_level},reconflow_cli={default_level}"))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match format {
        LogFormat::Pretty => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span, logging and returning its duration.
    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        tracing::debug!(span = %self.name, elapsed_ms = elapsed.as_millis(), "span finished");
        elapsed
    }
}
