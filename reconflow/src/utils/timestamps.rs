//! Timestamp helpers.
//!
//! Two renderings are used throughout the crate: RFC3339 with microseconds
//! for log lines and records, and a compact `YYYYmmdd_HHMMSS` stamp for
//! directory and file names.

use chrono::{DateTime, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// # Examples
///
/// ```
/// use reconflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    format_iso8601(&Utc::now())
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp as ISO 8601 with microsecond precision.
#[must_use]
pub fn format_iso8601(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Formats a timestamp for use in file and directory names.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use reconflow::utils::compact_stamp;
///
/// let dt = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
/// assert_eq!(compact_stamp(&dt), "20240309_070501");
/// ```
#[must_use]
pub fn compact_stamp(dt: &Timestamp) -> String {
    dt.format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert_eq!(ts.len(), "2024-01-01T00:00:00.000000+00:00".len());
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_format_iso8601() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_iso8601(&dt), "2024-01-02T03:04:05.000000+00:00");
    }

    #[test]
    fn test_compact_stamp_sorts_chronologically() {
        let a = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 6).unwrap();
        assert!(compact_stamp(&a) < compact_stamp(&b));
    }
}
