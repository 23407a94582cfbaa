use std::fmt;
use std::num::NonZeroU32;

use booking_window::notify_threshold;
use campsite_catalog::{CampsiteId, deserialize_opaque_id};
use chrono::{DateTime, Utc};
use remote_api::GatewayError;
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wraps a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_opaque_id(deserializer).map(Self)
    }
}

/// Composite key of a wishlist entry.
pub type WishlistKey = (UserId, CampsiteId);

/// How many hours before a booking window opens the user wants to hear about it.
/// Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadHours(NonZeroU32);

impl LeadHours {
    /// One hour, the default preference.
    pub const ONE: LeadHours = LeadHours(NonZeroU32::MIN);

    /// Validates a raw lead time.
    pub fn new(hours: i64) -> Result<Self, WishlistError> {
        u32::try_from(hours)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Self)
            .ok_or_else(|| {
                WishlistError::Validation(format!(
                    "notification lead hours must be a positive integer, got {}",
                    hours
                ))
            })
    }

    /// The lead time in hours.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for LeadHours {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for LeadHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h", self.0)
    }
}

/// A starred campsite with its notification preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistEntry {
    /// Owner of the entry
    pub user_id: UserId,
    /// Starred campsite
    pub campsite_id: CampsiteId,
    /// Notify this many hours before booking opens
    pub notification_lead_hours: LeadHours,
    /// When a notification last fired for the current booking window
    pub last_notified_at: Option<DateTime<Utc>>,
    /// When the campsite was first starred
    pub created_at: DateTime<Utc>,
}

impl WishlistEntry {
    /// Creates an entry that has never fired.
    pub fn new(
        user_id: UserId,
        campsite_id: CampsiteId,
        notification_lead_hours: LeadHours,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            campsite_id,
            notification_lead_hours,
            last_notified_at: None,
            created_at,
        }
    }

    /// The entry's composite key.
    pub fn key(&self) -> WishlistKey {
        (self.user_id.clone(), self.campsite_id.clone())
    }

    /// The instant a window opening at `opens_at` becomes due for this entry.
    pub fn notify_at(&self, opens_at: DateTime<Utc>) -> DateTime<Utc> {
        notify_threshold(opens_at, self.notification_lead_hours.get())
    }
}

/// Errors raised by wishlist operations.
#[derive(Debug, thiserror::Error)]
pub enum WishlistError {
    /// The referenced entry does not exist.
    #[error("Wishlist entry not found for user {user_id} and campsite {campsite_id}")]
    NotFound {
        /// User of the missing entry
        user_id: UserId,
        /// Campsite of the missing entry
        campsite_id: CampsiteId,
    },

    /// The request carried an invalid value.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The remote gateway call failed; local state was rolled back to the last confirmed state.
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}
