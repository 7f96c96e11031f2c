//! Small shared helpers: timestamps and line-file IO.

mod lines;
pub mod timestamps;

pub use lines::{count_lines, read_lines, write_lines};
pub use timestamps::{compact_stamp, format_iso8601, iso_timestamp, now_utc, Timestamp};
