//! # Campsite Catalog
//!
//! This crate provides the read-only campsite catalog: the campsite model, the
//! [`CatalogGateway`] seam, and its REST and in-memory implementations.

/// Catalog gateway trait and implementations
mod gateway;
pub use gateway::*;
/// Campsite model and identifiers
mod types;
pub use types::*;
