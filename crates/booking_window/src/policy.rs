use std::env;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;
use validator::Validate;

use crate::types::BookingWindowError;

/// Lead-hour choices offered to users by default.
pub const DEFAULT_LEAD_HOUR_OPTIONS: [u32; 4] = [1, 6, 12, 24];

/// Policy constants for booking-window classification and notification defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BookingPolicy {
    /// Windows opening within this many days are "coming soon" (default: 7)
    #[validate(range(min = 1, message = "coming_soon_days must be positive"))]
    pub coming_soon_days: u32,

    /// Lead time applied when a user stars a campsite without choosing one (default: 1)
    #[validate(range(min = 1, message = "default_lead_hours must be positive"))]
    pub default_lead_hours: u32,

    /// Lead times offered in the UI (default: 1, 6, 12, 24)
    #[validate(length(min = 1, message = "at least one lead-hour option is required"))]
    pub lead_hour_options: Vec<u32>,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            coming_soon_days: 7,
            default_lead_hours: 1,
            lead_hour_options: DEFAULT_LEAD_HOUR_OPTIONS.to_vec(),
        }
    }
}

impl BookingPolicy {
    /// Builds the policy from `COMING_SOON_DAYS` and `DEFAULT_NOTIFY_HOURS`,
    /// falling back to defaults for anything missing or unparsable.
    pub fn from_env() -> Result<Self, BookingWindowError> {
        let mut policy = Self::default();

        if let Some(days) = read_u32("COMING_SOON_DAYS") {
            policy.coming_soon_days = days;
        }
        if let Some(hours) = read_u32("DEFAULT_NOTIFY_HOURS") {
            policy.default_lead_hours = hours;
        }

        policy.check()?;
        Ok(policy)
    }

    /// Runs validation and maps failures to [`BookingWindowError::InvalidPolicy`].
    pub fn check(&self) -> Result<(), BookingWindowError> {
        self.validate()
            .map_err(|e| BookingWindowError::InvalidPolicy(e.to_string()))?;

        if self.lead_hour_options.contains(&0) {
            return Err(BookingWindowError::InvalidPolicy(
                "lead-hour options must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The coming-soon threshold in whole hours.
    pub fn coming_soon_hours(&self) -> i64 {
        i64::from(self.coming_soon_days) * 24
    }

    /// The coming-soon threshold as a duration.
    pub fn coming_soon_window(&self) -> Duration {
        Duration::hours(self.coming_soon_hours())
    }

    /// Whether `hours` is one of the offered lead-hour choices.
    pub fn is_recognized_lead(&self, hours: u32) -> bool {
        self.lead_hour_options.contains(&hours)
    }
}

fn read_u32(key: &str) -> Option<u32> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<u32>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", key, raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = BookingPolicy::default();
        assert_eq!(policy.coming_soon_hours(), 168);
        assert_eq!(policy.default_lead_hours, 1);
        assert!(policy.is_recognized_lead(6));
        assert!(!policy.is_recognized_lead(5));
        assert!(policy.check().is_ok());
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let policy = BookingPolicy {
            coming_soon_days: 0,
            ..BookingPolicy::default()
        };
        assert!(matches!(
            policy.check(),
            Err(BookingWindowError::InvalidPolicy(_))
        ));

        let policy = BookingPolicy {
            lead_hour_options: vec![1, 0],
            ..BookingPolicy::default()
        };
        assert!(policy.check().is_err());

        let policy = BookingPolicy {
            lead_hour_options: vec![],
            ..BookingPolicy::default()
        };
        assert!(policy.check().is_err());
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let policy: BookingPolicy = serde_json::from_str(r#"{"coming_soon_days": 3}"#).unwrap();
        assert_eq!(policy.coming_soon_days, 3);
        assert_eq!(policy.lead_hour_options, vec![1, 6, 12, 24]);
    }
}
