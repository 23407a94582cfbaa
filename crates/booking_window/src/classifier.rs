use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::policy::BookingPolicy;
use crate::types::{AvailabilityState, BookingWindowError, ClassificationResult};

/// Classifies a booking window at `now` under the given policy.
///
/// A missing `booking_opens_at` means the campsite is always bookable. Otherwise the
/// remaining time is rounded up to whole hours, so a window opening in thirty minutes
/// reports one hour. Anything at or before `now` is [`AvailabilityState::Available`].
pub fn classify(
    booking_opens_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    policy: &BookingPolicy,
) -> ClassificationResult {
    let Some(opens_at) = booking_opens_at else {
        return ClassificationResult::AVAILABLE;
    };

    let hours = ceil_hours(opens_at - now);
    if hours <= 0 {
        return ClassificationResult::AVAILABLE;
    }

    let state = if hours <= policy.coming_soon_hours() {
        AvailabilityState::ComingSoon
    } else {
        AvailabilityState::ComingLater
    };

    ClassificationResult {
        state,
        days_until: (hours + 23) / 24,
        hours_until: hours,
    }
}

/// Same as [`classify`] for a raw timestamp as it arrives from the park API.
pub fn classify_raw(
    booking_opens_at: Option<&str>,
    now: DateTime<Utc>,
    policy: &BookingPolicy,
) -> Result<ClassificationResult, BookingWindowError> {
    let opens_at = match booking_opens_at {
        Some(raw) if !raw.trim().is_empty() => Some(parse_instant(raw)?),
        _ => None,
    };
    Ok(classify(opens_at, now, policy))
}

/// Parses an RFC 3339 timestamp, or a naive `YYYY-MM-DDTHH:MM:SS[.fff]` one taken as UTC.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, BookingWindowError> {
    let trimmed = raw.trim();

    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(BookingWindowError::InvalidInstant(raw.to_string()))
}

/// The instant at which a notification with `lead_hours` becomes due.
pub fn notify_threshold(opens_at: DateTime<Utc>, lead_hours: u32) -> DateTime<Utc> {
    opens_at - Duration::hours(i64::from(lead_hours))
}

fn ceil_hours(delta: Duration) -> i64 {
    let whole = delta.num_hours();
    if delta > Duration::hours(whole) {
        whole + 1
    } else {
        whole
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, 8, 0, 0).unwrap()
    }

    fn run(opens_at: Option<DateTime<Utc>>) -> ClassificationResult {
        classify(opens_at, now(), &BookingPolicy::default())
    }

    #[test]
    fn test_missing_window_is_available() {
        assert_eq!(run(None), ClassificationResult::AVAILABLE);
    }

    #[test]
    fn test_past_and_present_windows_are_available() {
        for offset in [Duration::zero(), Duration::seconds(-1), Duration::days(-400)] {
            let result = run(Some(now() + offset));
            assert_eq!(result.state, AvailabilityState::Available);
            assert_eq!(result.days_until, 0);
            assert_eq!(result.hours_until, 0);
        }
    }

    #[test]
    fn test_partial_hours_round_up() {
        let result = run(Some(now() + Duration::minutes(30)));
        assert_eq!(result.state, AvailabilityState::ComingSoon);
        assert_eq!(result.hours_until, 1);
        assert_eq!(result.days_until, 1);

        let result = run(Some(now() + Duration::hours(25)));
        assert_eq!(result.hours_until, 25);
        assert_eq!(result.days_until, 2);
    }

    #[test]
    fn test_coming_soon_boundary_is_inclusive() {
        let result = run(Some(now() + Duration::hours(7 * 24)));
        assert_eq!(result.state, AvailabilityState::ComingSoon);
        assert_eq!(result.days_until, 7);

        let result = run(Some(now() + Duration::hours(7 * 24 + 1)));
        assert_eq!(result.state, AvailabilityState::ComingLater);
        assert_eq!(result.days_until, 8);

        // One second past the threshold rounds up into the next hour.
        let result = run(Some(now() + Duration::hours(7 * 24) + Duration::seconds(1)));
        assert_eq!(result.state, AvailabilityState::ComingLater);
    }

    #[test]
    fn test_threshold_follows_policy() {
        let policy = BookingPolicy {
            coming_soon_days: 1,
            ..BookingPolicy::default()
        };
        let result = classify(Some(now() + Duration::hours(30)), now(), &policy);
        assert_eq!(result.state, AvailabilityState::ComingLater);
    }

    #[test]
    fn test_parse_instant_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_instant("2025-06-01T10:00:00Z").unwrap(), expected);
        assert_eq!(parse_instant("2025-06-01T03:00:00-07:00").unwrap(), expected);
        assert_eq!(parse_instant("2025-06-01T10:00:00").unwrap(), expected);
        assert_eq!(parse_instant("2025-06-01T10:00:00.000000").unwrap(), expected);
        assert_eq!(parse_instant(" 2025-06-01 10:00:00 ").unwrap(), expected);
        assert!(matches!(
            parse_instant("next tuesday"),
            Err(BookingWindowError::InvalidInstant(_))
        ));
    }

    #[test]
    fn test_classify_raw() {
        let policy = BookingPolicy::default();
        let result = classify_raw(Some("2025-05-20T10:00:00"), now(), &policy).unwrap();
        assert_eq!(result.hours_until, 2);

        assert_eq!(
            classify_raw(Some(""), now(), &policy).unwrap(),
            ClassificationResult::AVAILABLE
        );
        assert!(classify_raw(Some("garbage"), now(), &policy).is_err());
    }

    #[test]
    fn test_notify_threshold() {
        let opens = now() + Duration::hours(2);
        assert_eq!(notify_threshold(opens, 1), now() + Duration::hours(1));
    }
}
