// ABOUTME: Utilities for working with times and timestamps.
// ABOUTME: Provides RFC3339 formatting, unix seconds and monotonic timers.
use ::time::{format_description::well_known::Rfc3339, OffsetDateTime};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get the current system time
pub fn utc_now() -> SystemTime {
    SystemTime::now()
}

/// Convert a SystemTime to an RFC3339 timestamp string
///
/// # Examples
///
/// ```
/// use vb_core::to_rfc3339;
/// use std::time::{UNIX_EPOCH, Duration};
///
/// let time = UNIX_EPOCH + Duration::from_secs(1_609_459_200); // 2021-01-01
/// assert_eq!(to_rfc3339(time), "2021-01-01T00:00:00Z");
/// ```
pub fn to_rfc3339(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Current time as an RFC3339 string, used for stored timestamps and
/// response envelopes
pub fn now_iso8601() -> String {
    to_rfc3339(utc_now())
}

/// Seconds since the unix epoch, used in webhook signatures
pub fn unix_timestamp() -> u64 {
    utc_now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Monotonic duration measurer for execution timings
pub struct MonotonicTimer {
    start: Instant,
}

impl MonotonicTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed whole milliseconds, saturating at u64::MAX
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for MonotonicTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_to_rfc3339() {
        let time = UNIX_EPOCH + Duration::from_secs(1_609_459_200);
        assert_eq!(to_rfc3339(time), "2021-01-01T00:00:00Z");
    }

    #[test]
    fn test_unix_timestamp_is_recent() {
        // After 2020-01-01
        assert!(unix_timestamp() > 1_577_836_800);
    }

    #[test]
    fn test_monotonic_timer() {
        let timer = MonotonicTimer::new();
        thread::sleep(Duration::from_millis(2));
        assert!(timer.elapsed() >= Duration::from_millis(2));
        assert!(timer.elapsed_ms() >= 2);
    }
}
