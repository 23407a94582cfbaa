//! # Notification Scheduler
//!
//! This crate decides when a starred campsite's "booking opens soon" alert is due,
//! marks it fired so it is sent at most once per booking window, and hands it to a
//! [`Notifier`] for delivery.

/// Notification delivery trait and the logging implementation
mod notifier;
pub use notifier::*;
/// Due-ness evaluation and the periodic sweep
mod scheduler;
pub use scheduler::*;
/// Notification, report and error types
mod types;
pub use types::*;
