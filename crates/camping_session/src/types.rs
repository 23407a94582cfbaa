use std::env;
use std::sync::Arc;
use std::time::Duration;

use booking_window::{BookingPolicy, BookingWindowError, ClassificationResult, Clock, SystemClock};
use campsite_catalog::{Campsite, CatalogGateway, ParkId};
use notification_scheduler::Notifier;
use remote_api::GatewayError;
use serde::Serialize;
use wishlist::{WishlistError, WishlistGateway};

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the ticker sweeps the wishlist (default: 60 seconds)
    pub tick_interval: Duration,

    /// How often the ticker re-reads the catalog (default: 15 minutes)
    pub catalog_refresh_interval: Duration,

    /// Restrict the catalog to one park (default: all parks)
    pub park_id: Option<ParkId>,

    /// Classification and notification policy
    pub policy: BookingPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            catalog_refresh_interval: Duration::from_secs(15 * 60),
            park_id: None,
            policy: BookingPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Reads `TICK_INTERVAL_SECS`, `CATALOG_REFRESH_SECS`, `PARK_ID` and the policy variables.
    pub fn from_env() -> Result<Self, SessionError> {
        let mut config = Self {
            policy: BookingPolicy::from_env()?,
            ..Self::default()
        };

        if let Some(secs) = read_secs("TICK_INTERVAL_SECS")? {
            config.tick_interval = secs;
        }
        if let Some(secs) = read_secs("CATALOG_REFRESH_SECS")? {
            config.catalog_refresh_interval = secs;
        }
        config.park_id = env::var("PARK_ID")
            .ok()
            .filter(|id| !id.trim().is_empty())
            .map(ParkId::new);

        config.check()?;
        Ok(config)
    }

    /// Validates intervals and policy.
    pub fn check(&self) -> Result<(), SessionError> {
        if self.tick_interval.is_zero() {
            return Err(SessionError::Config("tick interval must be positive".to_string()));
        }
        if self.catalog_refresh_interval.is_zero() {
            return Err(SessionError::Config(
                "catalog refresh interval must be positive".to_string(),
            ));
        }
        self.policy.check()?;
        Ok(())
    }
}

fn read_secs(key: &str) -> Result<Option<Duration>, SessionError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|e| SessionError::Config(format!("Invalid {} {:?}: {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}

/// Collaborators a session is built from.
#[derive(Clone)]
pub struct SessionDeps {
    /// Campsite source
    pub catalog: Arc<dyn CatalogGateway>,
    /// Wishlist persistence
    pub wishlist: Arc<dyn WishlistGateway>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Alert delivery; `None` leaves alerts to the caller of `tick`
    pub notifier: Option<Arc<dyn Notifier>>,
}

impl SessionDeps {
    /// Dependencies using the wall clock and no notifier.
    pub fn new(catalog: Arc<dyn CatalogGateway>, wishlist: Arc<dyn WishlistGateway>) -> Self {
        Self {
            catalog,
            wishlist,
            clock: Arc::new(SystemClock),
            notifier: None,
        }
    }
}

/// A campsite as the camping view renders it.
#[derive(Debug, Clone, Serialize)]
pub struct CampsiteView {
    /// The campsite record
    pub campsite: Campsite,
    /// Availability at the time of the call
    pub availability: ClassificationResult,
    /// Whether the session user starred it
    pub is_wishlisted: bool,
}

/// Errors surfaced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A wishlist operation failed.
    #[error(transparent)]
    Wishlist(#[from] WishlistError),

    /// A catalog call failed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] GatewayError),

    /// The policy is invalid.
    #[error(transparent)]
    Policy(#[from] BookingWindowError),

    /// The session configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.check().is_ok());
        assert_eq!(config.tick_interval, Duration::from_secs(60));
        assert!(config.park_id.is_none());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let config = SessionConfig {
            tick_interval: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert!(matches!(config.check(), Err(SessionError::Config(_))));
    }

    #[test]
    fn test_invalid_policy_is_rejected() {
        let config = SessionConfig {
            policy: BookingPolicy {
                default_lead_hours: 0,
                ..BookingPolicy::default()
            },
            ..SessionConfig::default()
        };
        assert!(matches!(config.check(), Err(SessionError::Policy(_))));
    }
}
