//! # Booking Window
//!
//! This crate classifies a campsite's reservation window against the current instant.
//! It provides the injectable clock, the policy constants that drive classification,
//! and parsing for the timestamps the park API hands out.

/// Clock abstraction used by every time-dependent component.
pub mod clock;
/// Classification of a booking-open instant into an availability state.
mod classifier;
pub use classifier::*;
/// Policy constants (coming-soon threshold, lead-hour options).
mod policy;
pub use policy::*;
/// Shared types and errors.
mod types;
pub use types::*;

pub use clock::{Clock, ManualClock, SystemClock};
