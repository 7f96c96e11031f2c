//! # Reconflow
//!
//! A recon-to-disclosure pipeline orchestrator.
//!
//! Reconflow drives external security tools through a fixed sequence of
//! stages for each target and hands the result to a human:
//!
//! - **Stage pipeline**: recon, liveness, crawl, scan, analyze, report and
//!   notify, with per-stage fallbacks and abort rules
//! - **External tool runner**: timeout-bounded subprocesses whose failures are
//!   outcome data, never errors
//! - **Session store**: one directory per run with a role-based write set
//! - **Notification gateway**: external sink with a local-copy fallback
//! - **Approval workflow**: a detached unit that waits for a human decision
//!   before the developer notification goes out
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reconflow::prelude::*;
//!
//! let config = ReconConfig::load_or_default(None)?;
//! let availability = ToolRegistry::from_config(&config).preflight()?;
//! let session = SessionManager::from_config(&config).create("example.com")?;
//! let log = RunLog::open(session.area_dir(Area::Logs).join(RUN_LOG_FILE))?;
//!
//! let pipeline = StagePipeline::from_config(config, log, Arc::new(NoOpAuditSink))
//!     .with_availability(availability);
//! let run = pipeline.run(&session).await?;
//! if let Some(approval) = run.approval {
//!     approval.join().await?;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod aggregate;
pub mod approval;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod notify;
pub mod observability;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod session;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aggregate::VulnerabilityCount;
    pub use crate::approval::{
        ApprovalHandle, ApprovalRequest, ApprovalStatus, ApprovalWorkflow, Decision,
        DecisionChannel, FileDecisionChannel,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{ReconConfig, ToolSpec};
    pub use crate::core::{Finding, FindingCategory, OutcomeStatus, PipelineState, StageOutcome};
    pub use crate::errors::{FailureKind, ReconflowError, Result};
    pub use crate::events::{AuditSink, JsonlAuditSink, LoggingAuditSink, NoOpAuditSink};
    pub use crate::notify::{Delivery, NotificationGateway, NotificationSink};
    pub use crate::observability::{init_logging, LogFormat, RunLog, RUN_LOG_FILE};
    pub use crate::pipeline::{PipelineRun, StagePipeline};
    pub use crate::report::{ReportGenerator, REPORT_FILE};
    pub use crate::runner::{ExternalToolRunner, ToolAvailability, ToolRegistry};
    pub use crate::session::{Area, ArtifactStore, Session, SessionManager};
    pub use std::sync::Arc;
}
