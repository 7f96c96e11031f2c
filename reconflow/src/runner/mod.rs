//! External tool execution.
//!
//! Every scanner, the analysis collaborator and the command notification
//! sink go through [`ExternalToolRunner`]. [`ToolRegistry`] resolves the
//! configured binaries before any session exists.

mod executor;
mod invocation;
mod registry;

pub use executor::ExternalToolRunner;
pub use invocation::{Placeholders, ToolInvocation};
pub use registry::{ToolAvailability, ToolRegistry};
