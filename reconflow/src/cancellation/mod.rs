//! Cooperative cancellation.
//!
//! The pipeline checks its token only between stages; a running tool is
//! bounded by its own timeout instead. Approval units use a token of their
//! own for the withdraw action.

mod token;

pub use token::CancellationToken;
