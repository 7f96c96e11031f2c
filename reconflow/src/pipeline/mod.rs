//! Stage pipeline execution.
//!
//! This module provides:
//! - The stage transition table
//! - Folding of tool outcomes into stage outcomes
//! - The pipeline driver that runs a session to `Done` or `Aborted`

mod orchestrator;
mod transitions;

#[cfg(test)]
mod integration_tests;

pub use orchestrator::{PipelineRun, StagePipeline};
pub use transitions::{any_content, fold_stage, has_content, next_state};
