use serde::{Deserialize, Serialize};

/// Availability of a campsite relative to its booking window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityState {
    /// The booking window is open (or the campsite has no window at all).
    Available,
    /// The window opens within the coming-soon threshold.
    ComingSoon,
    /// The window opens after the coming-soon threshold.
    ComingLater,
}

impl AvailabilityState {
    /// Returns the wire label of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityState::Available => "AVAILABLE",
            AvailabilityState::ComingSoon => "COMING_SOON",
            AvailabilityState::ComingLater => "COMING_LATER",
        }
    }
}

impl std::fmt::Display for AvailabilityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a booking window at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Derived availability state
    pub state: AvailabilityState,
    /// Whole days until the window opens, rounded up, never negative
    pub days_until: i64,
    /// Whole hours until the window opens, rounded up, never negative
    pub hours_until: i64,
}

impl ClassificationResult {
    /// Result for a campsite that can be booked right now.
    pub const AVAILABLE: ClassificationResult = ClassificationResult {
        state: AvailabilityState::Available,
        days_until: 0,
        hours_until: 0,
    };
}

/// Errors raised while parsing instants or validating policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingWindowError {
    /// The timestamp could not be parsed.
    #[error("Invalid instant: {0}")]
    InvalidInstant(String),

    /// The policy failed validation.
    #[error("Invalid booking policy: {0}")]
    InvalidPolicy(String),
}
