//! Core domain model types for reconflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Outcome status and pipeline state enums
//! - The immutable stage/tool outcome record
//! - Findings extracted from scanner output

mod finding;
mod outcome;
mod status;

pub use finding::{Finding, FindingCategory};
pub use outcome::StageOutcome;
pub use status::{OutcomeStatus, PipelineState};
