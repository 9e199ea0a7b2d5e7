//! Clock abstraction for metadata expiration and commit timestamps.
//!
//! Repositories receive a [`TimeSource`] at construction and every timestamp
//! in the crate flows from it. Metadata traversal never consults the clock;
//! only commit creation and expiration stamping do. [`FixedTimeSource`] makes
//! tests reproducible.

use crate::error::GitTufError;
use std::time::{SystemTime, UNIX_EPOCH};

/// Time source abstraction for pluggable time providers.
///
/// # Implementors
///
/// - [`SystemTimeSource`]: uses `std::time::SystemTime` (the default)
/// - [`FixedTimeSource`]: returns a fixed timestamp (for testing and replay)
pub trait TimeSource: Send + Sync {
    /// Get the current time from this source.
    fn now(&self) -> Result<SystemTime, GitTufError>;

    /// Get current time as Unix timestamp (seconds since epoch).
    fn now_unix(&self) -> Result<u64, GitTufError> {
        let time = self.now()?;
        Ok(time
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs())
    }
}

/// System time source using `std::time::SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Result<SystemTime, GitTufError> {
        Ok(SystemTime::now())
    }
}

/// Fixed time source for testing.
///
/// Returns a predetermined timestamp, useful for reproducible metadata
/// expiration and commit timestamps.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    timestamp: u64,
}

impl FixedTimeSource {
    /// Create from a Unix timestamp (seconds since 1970-01-01 00:00:00 UTC).
    pub fn from_unix_secs(secs: u64) -> Self {
        Self { timestamp: secs }
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> Result<SystemTime, GitTufError> {
        Ok(UNIX_EPOCH + std::time::Duration::from_secs(self.timestamp))
    }
}

const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// Format a Unix timestamp as an RFC 3339 UTC string (`YYYY-MM-DDTHH:MM:SSZ`).
///
/// Accurate for dates between 1970 and 2100; leap seconds are ignored.
pub fn format_rfc3339(secs: u64) -> String {
    let mut days = secs / 86400;
    let rem = secs % 86400;
    let (hour, min, sec) = (rem / 3600, (rem % 3600) / 60, rem % 60);

    let mut year: u32 = 1970;
    loop {
        let in_year: u64 = if is_leap_year(year) { 366 } else { 365 };
        if days < in_year {
            break;
        }
        days -= in_year;
        year += 1;
    }

    let mut month: u32 = 1;
    loop {
        let mut in_month = u64::from(DAYS_IN_MONTH[(month - 1) as usize]);
        if month == 2 && is_leap_year(year) {
            in_month += 1;
        }
        if days < in_month {
            break;
        }
        days -= in_month;
        month += 1;
    }

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        days + 1,
        hour,
        min,
        sec
    )
}

/// Parse an RFC 3339 UTC timestamp (`YYYY-MM-DDTHH:MM:SS[.fraction]Z`) to Unix
/// seconds.
pub fn parse_rfc3339(s: &str) -> Result<u64, GitTufError> {
    let trimmed = s.trim().trim_end_matches('Z');
    let trimmed = trimmed.split('.').next().unwrap_or(trimmed);

    let parts: Vec<&str> = trimmed.split('T').collect();
    if parts.len() != 2 {
        return Err(GitTufError::InvalidMetadata(format!(
            "cannot parse timestamp '{s}'"
        )));
    }

    let date: Vec<u32> = parts[0].split('-').filter_map(|p| p.parse().ok()).collect();
    let time: Vec<u32> = parts[1].split(':').filter_map(|p| p.parse().ok()).collect();
    if date.len() != 3 || time.len() != 3 {
        return Err(GitTufError::InvalidMetadata(format!(
            "cannot parse timestamp '{s}'"
        )));
    }

    let (year, month, day) = (date[0], date[1], date[2]);
    if year < 1970 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(GitTufError::InvalidMetadata(format!(
            "timestamp '{s}' out of range"
        )));
    }

    let mut days: u64 = 0;
    for y in 1970..year {
        days += if is_leap_year(y) { 366 } else { 365 };
    }
    for m in 1..month {
        days += u64::from(DAYS_IN_MONTH[(m - 1) as usize]);
        if m == 2 && is_leap_year(year) {
            days += 1;
        }
    }
    days += u64::from(day - 1);

    Ok(days * 86400 + u64::from(time[0]) * 3600 + u64::from(time[1]) * 60 + u64::from(time[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_source() {
        let source = SystemTimeSource;
        assert!(source.now_unix().unwrap() > 1704067200);
    }

    #[test]
    fn test_fixed_time_source() {
        let source = FixedTimeSource::from_unix_secs(1704067200);
        assert_eq!(source.now_unix().unwrap(), 1704067200);
    }

    #[test]
    fn test_format_rfc3339() {
        assert_eq!(format_rfc3339(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_rfc3339(1704067200), "2024-01-01T00:00:00Z");
        let secs = 1704067200 + 14 * 86400 + 12 * 3600 + 30 * 60 + 45;
        assert_eq!(format_rfc3339(secs), "2024-01-15T12:30:45Z");
    }

    #[test]
    fn test_parse_rfc3339() {
        assert_eq!(parse_rfc3339("2024-01-01T00:00:00Z").unwrap(), 1704067200);
        assert_eq!(
            parse_rfc3339("2024-01-01T00:00:00.123Z").unwrap(),
            1704067200
        );
        assert!(parse_rfc3339("not a timestamp").is_err());
    }

    #[test]
    fn test_round_trip() {
        for secs in [0u64, 951867000, 1704067200, 4102444799] {
            assert_eq!(parse_rfc3339(&format_rfc3339(secs)).unwrap(), secs);
        }
    }

    #[test]
    fn test_leap_year_handling() {
        // 2024-02-29 exists
        let feb29 = parse_rfc3339("2024-02-29T00:00:00Z").unwrap();
        assert_eq!(format_rfc3339(feb29), "2024-02-29T00:00:00Z");
    }
}
