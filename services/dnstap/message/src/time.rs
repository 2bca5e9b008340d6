//! Event timestamps.

use chrono::{DateTime, Utc};

/// Seconds and nanoseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Whole seconds
    pub secs: u64,
    /// Sub-second part in nanoseconds (< 1_000_000_000)
    pub nanos: u32,
}

impl Timestamp {
    /// Create a timestamp
    pub fn new(secs: u64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        Self::from(Utc::now())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(time: DateTime<Utc>) -> Self {
        // Pre-epoch times clamp to zero
        let secs = time.timestamp().max(0) as u64;
        // Leap seconds are reported as nanos >= 1e9
        let nanos = time.timestamp_subsec_nanos().min(999_999_999);
        Self { secs, nanos }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_keeps_sub_second_precision() {
        let time = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let ts = Timestamp::from(time);
        assert_eq!(ts, Timestamp::new(1_700_000_000, 123_456_789));
    }

    #[test]
    fn test_now_is_sane() {
        let ts = Timestamp::now();
        assert!(ts.secs > 1_600_000_000);
        assert!(ts.nanos < 1_000_000_000);
    }
}
