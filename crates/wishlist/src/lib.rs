//! # Wishlist
//!
//! This crate provides the user's campsite wishlist: the entry model with its
//! notification lead time, the [`WishlistGateway`] seam to the remote API, and the
//! [`WishlistStore`] that applies changes locally and reconciles them with the gateway.

/// Wishlist gateway trait and implementations
mod gateway;
pub use gateway::*;
/// Optimistic, gateway-synchronized wishlist store
mod store;
pub use store::*;
/// Wishlist entry model and errors
mod types;
pub use types::*;
