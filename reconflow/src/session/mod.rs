//! Sessions and their on-disk artifact layout.
//!
//! A [`Session`] is created once per target run and handed explicitly to
//! every component. The "latest session" and "latest report" pointer files
//! are conveniences for humans and the CLI; nothing in the pipeline reads
//! them back.

mod manager;
mod store;

pub use manager::{sanitize_target, Session, SessionManager, LATEST_REPORT_FILE, LATEST_SESSION_FILE};
pub use store::{Area, ArtifactStore, Role, VULN_COUNT_FILE};
