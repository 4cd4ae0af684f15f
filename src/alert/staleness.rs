/// Forecast issue-time staleness detection.
///
/// GloFAS forecasts are issued daily; a pipeline that keeps evaluating a
/// forecast several days old would keep firing (or withholding) triggers
/// on outdated data. Staleness does not stop evaluation, it is flagged in
/// the run diagnostics.
///
/// # Clock injection
/// `is_stale_at` takes `now` from the caller; the engine passes the run
/// clock from `RunOptions`.

use chrono::{DateTime, TimeDelta, Utc};

/// Returns `true` if a forecast issued at `issued_at` is older than
/// `max_age_hours` relative to `now`.
///
/// Staleness is strictly greater than the threshold:
///   age >  max_age_hours  →  stale
///   age == max_age_hours  →  not stale
///
/// A forecast issued after `now` (clock skew) is not stale. A threshold
/// too large to represent as a duration never expires.
pub fn is_stale_at(issued_at: DateTime<Utc>, max_age_hours: i64, now: DateTime<Utc>) -> bool {
    let Some(limit) = TimeDelta::try_hours(max_age_hours) else {
        return false;
    };
    now.signed_duration_since(issued_at) > limit
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// A fixed "now" used across all tests: 2024-05-01 13:00:00 UTC.
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    #[test]
    fn test_yesterdays_forecast_is_not_stale_under_48_hours() {
        let issued = Utc.with_ymd_and_hms(2024, 4, 30, 0, 0, 0).unwrap();
        assert!(!is_stale_at(issued, 48, fixed_now()));
    }

    #[test]
    fn test_forecast_exactly_at_threshold_is_not_stale() {
        let issued = Utc.with_ymd_and_hms(2024, 4, 29, 13, 0, 0).unwrap();
        assert!(
            !is_stale_at(issued, 48, fixed_now()),
            "age == threshold should not be stale; staleness is strictly greater than",
        );
    }

    #[test]
    fn test_forecast_one_minute_past_threshold_is_stale() {
        let issued = Utc.with_ymd_and_hms(2024, 4, 29, 12, 59, 0).unwrap();
        assert!(is_stale_at(issued, 48, fixed_now()));
    }

    #[test]
    fn test_future_issue_time_is_not_stale() {
        let issued = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        assert!(!is_stale_at(issued, 48, fixed_now()));
    }

    #[test]
    fn test_unrepresentable_threshold_never_expires() {
        let issued = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert!(!is_stale_at(issued, 10_000_000_000_000, fixed_now()));
        assert!(!is_stale_at(issued, i64::MAX, fixed_now()));
    }

    #[test]
    fn test_same_forecast_stale_under_tight_threshold_not_under_loose() {
        let issued = Utc.with_ymd_and_hms(2024, 4, 30, 1, 0, 0).unwrap(); // 36 hours old
        assert!(is_stale_at(issued, 24, fixed_now()));
        assert!(!is_stale_at(issued, 48, fixed_now()));
    }
}
