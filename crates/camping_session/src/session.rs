use std::collections::HashSet;
use std::sync::Arc;

use booking_window::{BookingPolicy, ClassificationResult, Clock, classify};
use campsite_catalog::{Campsite, CampsiteId, CatalogGateway, CatalogSnapshot};
use chrono::{DateTime, Utc};
use notification_scheduler::{NotificationScheduler, SweepReport};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use wishlist::{LeadHours, UserId, WishlistEntry, WishlistError, WishlistStore};

use crate::types::{CampsiteView, SessionConfig, SessionDeps, SessionError};

/// Per-user context behind the camping view.
///
/// Built by [`CampingSession::start`] when the user signs in and consumed by
/// [`CampingSession::logout`]. Every operation acts on behalf of the session user.
pub struct CampingSession {
    user_id: UserId,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    catalog_gateway: Arc<dyn CatalogGateway>,

    /// Last catalog read, in catalog order
    catalog: RwLock<CatalogSnapshot>,

    store: Arc<WishlistStore>,
    scheduler: NotificationScheduler,
}

impl CampingSession {
    /// Starts a session: validates config, loads the user's wishlist, then the catalog.
    pub async fn start(
        user_id: UserId,
        deps: SessionDeps,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        config.check()?;
        info!("Starting camping session for user {}", user_id);

        let store = Arc::new(WishlistStore::new(deps.wishlist, deps.clock.clone()));
        let entries = store.load(&user_id).await?;

        let campsites = deps.catalog.list_campsites(config.park_id.as_ref()).await?;
        let catalog = CatalogSnapshot::new(campsites);

        info!(
            "Session ready: {} campsites, {} wishlist entries",
            catalog.len(),
            entries.len()
        );

        let scheduler = NotificationScheduler::new(
            store.clone(),
            deps.notifier,
            config.policy.clone(),
        );

        Ok(Self {
            user_id,
            config,
            clock: deps.clock,
            catalog_gateway: deps.catalog,
            catalog: RwLock::new(catalog),
            store,
            scheduler,
        })
    }

    /// The session user.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The classification policy in force.
    pub fn policy(&self) -> &BookingPolicy {
        &self.config.policy
    }

    /// The session clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Classifies a campsite's booking window at `now`.
    pub fn get_availability(
        &self,
        campsite: &Campsite,
        now: DateTime<Utc>,
    ) -> ClassificationResult {
        classify(campsite.booking_opens_at, now, &self.config.policy)
    }

    /// Classifies a campsite at the session clock's current time.
    pub fn availability_now(&self, campsite: &Campsite) -> ClassificationResult {
        self.get_availability(campsite, self.clock.now())
    }

    /// Looks up a cached campsite.
    pub async fn campsite(&self, campsite_id: &CampsiteId) -> Option<Campsite> {
        self.catalog.read().await.get(campsite_id).cloned()
    }

    /// Every cached campsite with its availability and starred flag, in catalog order.
    pub async fn campsites_with_availability(&self, now: DateTime<Utc>) -> Vec<CampsiteView> {
        let starred: HashSet<CampsiteId> = self
            .store
            .list(&self.user_id)
            .await
            .into_iter()
            .map(|entry| entry.campsite_id)
            .collect();

        let catalog = self.catalog.read().await;
        catalog
            .iter()
            .map(|campsite| CampsiteView {
                availability: self.get_availability(campsite, now),
                is_wishlisted: starred.contains(&campsite.id),
                campsite: campsite.clone(),
            })
            .collect()
    }

    /// Re-reads the catalog. Entries for campsites whose window moved to a new
    /// future instant are re-armed. Returns the number of campsites loaded.
    pub async fn refresh_catalog(&self) -> Result<usize, SessionError> {
        let campsites = self
            .catalog_gateway
            .list_campsites(self.config.park_id.as_ref())
            .await?;
        let fresh = CatalogSnapshot::new(campsites);
        let now = self.clock.now();

        let moved: Vec<CampsiteId> = {
            let current = self.catalog.read().await;
            fresh
                .iter()
                .filter(|campsite| {
                    let previous = current.get(&campsite.id).map(|c| c.booking_opens_at);
                    matches!(previous, Some(previous) if previous != campsite.booking_opens_at)
                        && campsite.booking_opens_at.is_some_and(|opens_at| opens_at > now)
                })
                .map(|campsite| campsite.id.clone())
                .collect()
        };

        let mut rearmed = 0;
        for campsite_id in &moved {
            rearmed += self.store.rearm_campsite(campsite_id).await;
        }
        if rearmed > 0 {
            info!("Re-armed {} wishlist alerts after booking windows moved", rearmed);
        }

        let loaded = fresh.len();
        *self.catalog.write().await = fresh;
        debug!("Catalog refreshed: {} campsites", loaded);

        Ok(loaded)
    }

    /// Stars the campsite, or un-stars it when already starred.
    ///
    /// `lead_hours` defaults to the policy's default lead and is only checked when the
    /// campsite gets starred. Returns the entry when the campsite ends up starred.
    pub async fn toggle_wishlist(
        &self,
        campsite: &Campsite,
        lead_hours: Option<i64>,
    ) -> Result<Option<WishlistEntry>, SessionError> {
        let entry = self
            .store
            .toggle(&self.user_id, &campsite.id, self.lead_hours(lead_hours))
            .await?;

        match &entry {
            Some(entry) => info!(
                "User {} starred {} (notify {} before)",
                self.user_id, campsite.name, entry.notification_lead_hours
            ),
            None => info!("User {} un-starred {}", self.user_id, campsite.name),
        }

        Ok(entry)
    }

    /// Changes how long before opening the user is alerted about a starred campsite.
    pub async fn set_notification_lead_hours(
        &self,
        campsite_id: &CampsiteId,
        hours: i64,
    ) -> Result<WishlistEntry, SessionError> {
        let lead_hours = self.lead_hours(Some(hours))?;
        let entry = self
            .store
            .update_lead_hours(&self.user_id, campsite_id, lead_hours)
            .await?;
        Ok(entry)
    }

    /// Whether the session user starred the campsite.
    pub async fn is_wishlisted(&self, campsite_id: &CampsiteId) -> bool {
        self.store.is_wishlisted(&self.user_id, campsite_id).await
    }

    /// The session user's wishlist in the order it was built.
    pub async fn wishlist(&self) -> Vec<WishlistEntry> {
        self.store.list(&self.user_id).await
    }

    /// Replaces local wishlist state with the gateway's, e.g. after a failed sync.
    pub async fn resync(&self) -> Result<Vec<WishlistEntry>, SessionError> {
        Ok(self.store.load(&self.user_id).await?)
    }

    /// Runs one notification sweep at `now` against the cached catalog.
    pub async fn tick(&self, now: DateTime<Utc>) -> SweepReport {
        let catalog = self.catalog.read().await;
        let report = self.scheduler.tick(&*catalog, now).await;

        for warning in &report.warnings {
            warn!("Sweep skipped an entry: {:?}", warning);
        }
        report
    }

    /// Runs one sweep at the session clock's current time.
    pub async fn tick_now(&self) -> SweepReport {
        self.tick(self.clock.now()).await
    }

    /// Tears the session down.
    pub async fn logout(self) {
        let entries = self.store.list(&self.user_id).await.len();
        info!("User {} logged out ({} wishlist entries)", self.user_id, entries);
    }

    fn lead_hours(&self, hours: Option<i64>) -> Result<LeadHours, WishlistError> {
        let hours = hours.unwrap_or(i64::from(self.config.policy.default_lead_hours));
        let lead_hours = LeadHours::new(hours)?;

        if !self.config.policy.is_recognized_lead(lead_hours.get()) {
            debug!("Lead time {} is not one of the offered options", lead_hours);
        }
        Ok(lead_hours)
    }
}
