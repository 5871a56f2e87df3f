//! Timing utilities

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub type EpochMillis = u64;

/// Get current Unix timestamp in milliseconds
pub fn now_millis() -> EpochMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as EpochMillis
}

/// Convert a millisecond count to Duration
pub fn from_millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// Scale a duration by a float factor, saturating at `Duration::MAX`
pub fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_scale() {
        assert_eq!(scale(Duration::from_secs(60), 1.5), Duration::from_secs(90));
        assert_eq!(scale(Duration::from_secs(60), 2.0), Duration::from_secs(120));
    }
}
