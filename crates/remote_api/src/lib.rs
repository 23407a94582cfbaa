//! # Remote API
//!
//! This crate provides the HTTP transport shared by the catalog and wishlist gateways.
//! It wraps a `reqwest` client around the park API's base URL and maps transport and
//! status failures onto [`GatewayError`].

/// Client for the park API.
mod client;
pub use client::*;
/// Configuration and errors for the park API client.
mod types;
pub use types::*;
