//! Observability utilities.
//!
//! `tracing` is the in-process log stream; [`RunLog`] is the durable one.
//! Every record written to the run log is mirrored to `tracing` at the same
//! level, so operators see failures on the console while the file keeps a
//! permanent trail.

mod run_log;
mod logging;

pub use run_log::{RunLog, RUN_LOG_FILE};
pub use logging::{init_logging, LogFormat, SpanTimer};
