use std::collections::HashMap;

use campsite_catalog::{Campsite, CampsiteId, CatalogSnapshot};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use wishlist::{LeadHours, UserId, WishlistEntry};

/// Looks up campsites referenced by wishlist entries.
pub trait CampsiteLookup: Sync {
    /// The campsite with `id`, if the catalog knows it.
    fn campsite(&self, id: &CampsiteId) -> Option<&Campsite>;
}

impl CampsiteLookup for CatalogSnapshot {
    fn campsite(&self, id: &CampsiteId) -> Option<&Campsite> {
        self.get(id)
    }
}

impl CampsiteLookup for HashMap<CampsiteId, Campsite> {
    fn campsite(&self, id: &CampsiteId) -> Option<&Campsite> {
        self.get(id)
    }
}

/// A "booking opens soon" alert that fired during a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueNotification {
    /// Unique id of this alert
    pub id: Uuid,
    /// Recipient
    pub user_id: UserId,
    /// Campsite about to open
    pub campsite_id: CampsiteId,
    /// Campsite display name
    pub campsite_name: String,
    /// When booking opens
    pub booking_opens_at: DateTime<Utc>,
    /// Lead time the user asked for
    pub lead_hours: LeadHours,
    /// Whole hours left until booking opens, rounded up
    pub hours_until: i64,
    /// When the alert fired
    pub fired_at: DateTime<Utc>,
}

impl DueNotification {
    /// Builds the alert for an entry that was just marked fired.
    pub fn new(
        entry: &WishlistEntry,
        campsite: &Campsite,
        opens_at: DateTime<Utc>,
        hours_until: i64,
        fired_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: entry.user_id.clone(),
            campsite_id: entry.campsite_id.clone(),
            campsite_name: campsite.name.clone(),
            booking_opens_at: opens_at,
            lead_hours: entry.notification_lead_hours,
            hours_until,
            fired_at,
        }
    }

    /// Short subject line.
    pub fn subject(&self) -> String {
        format!("🏕️ Booking opens soon: {}", self.campsite_name)
    }

    /// Message body.
    pub fn message(&self) -> String {
        let unit = if self.hours_until == 1 { "hour" } else { "hours" };
        format!(
            "Reservations for {} open in {} {} ({} UTC). You asked to be told {} ahead. -Campsite Tracker",
            self.campsite_name,
            self.hours_until,
            unit,
            self.booking_opens_at.format("%b %d, %Y %H:%M"),
            self.lead_hours
        )
    }
}

/// Something the sweep skipped without failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SweepWarning {
    /// A wishlist entry references a campsite the catalog does not know.
    MissingCampsite {
        /// Owner of the entry
        user_id: UserId,
        /// Unknown campsite
        campsite_id: CampsiteId,
    },
}

/// A fired alert that the notifier could not deliver.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchFailure {
    /// Alert id
    pub notification_id: Uuid,
    /// Delivery error message
    pub error: String,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Alerts fired by this sweep, in wishlist order
    pub due: Vec<DueNotification>,
    /// Entries skipped without failing the sweep
    pub warnings: Vec<SweepWarning>,
    /// Alerts that fired but failed delivery
    pub dispatch_failures: Vec<DispatchFailure>,
    /// Entries re-armed because their campsite's booking window moved
    pub rearmed: usize,
}

/// Errors raised while delivering an alert.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// The channel refused or failed the delivery.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// No recipient address is known for the user.
    #[error("No contact for user {0}")]
    NoRecipient(UserId),
}
