//! # Camping Session
//!
//! This crate provides the per-user context the camping view works against. A
//! [`CampingSession`] is built at session start, owns the cached catalog, the wishlist
//! store and the notification scheduler, and is dropped at logout. [`SessionTicker`]
//! drives the scheduler on a timer.

/// The session context object
mod session;
pub use session::*;
/// Background timer that sweeps the session
mod ticker;
pub use ticker::*;
/// Configuration, dependencies and errors
mod types;
pub use types::*;
