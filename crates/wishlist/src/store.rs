use std::collections::HashMap;
use std::sync::Arc;

use booking_window::Clock;
use campsite_catalog::CampsiteId;
use chrono::{DateTime, Utc};
use remote_api::GatewayError;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::gateway::WishlistGateway;
use crate::types::{LeadHours, UserId, WishlistEntry, WishlistError, WishlistKey};

/// Local slot: the entry plus its insertion sequence.
#[derive(Debug, Clone)]
struct Slot {
    seq: u64,
    entry: WishlistEntry,
}

/// What the gateway last acknowledged for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Confirmed {
    lead: LeadHours,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: HashMap<WishlistKey, Slot>,
    next_seq: u64,
    /// Bumped every time the local intent for a key changes.
    versions: HashMap<WishlistKey, u64>,
    /// Remote state per key; a missing key means absent remotely.
    confirmed: HashMap<WishlistKey, Confirmed>,
}

impl StoreState {
    fn version(&self, key: &WishlistKey) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: &WishlistKey) -> u64 {
        let version = self.versions.entry(key.clone()).or_insert(0);
        *version += 1;
        *version
    }

    fn insert(&mut self, entry: WishlistEntry) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(entry.key(), Slot { seq, entry });
    }

    fn sorted(&self, keep: impl Fn(&WishlistEntry) -> bool) -> Vec<WishlistEntry> {
        let mut slots: Vec<&Slot> = self.entries.values().filter(|s| keep(&s.entry)).collect();
        slots.sort_by_key(|s| s.seq);
        slots.into_iter().map(|s| s.entry.clone()).collect()
    }
}

/// Intent recorded by one mutating call, used to roll back if its remote write fails.
struct Intent {
    version: u64,
    previous: Option<WishlistEntry>,
}

/// Wishlist entries keyed by (user, campsite), applied locally first and then
/// reconciled with the [`WishlistGateway`].
///
/// Every read and write of an entry goes through one lock, so a lead-time update and a
/// notification fire on the same entry are serialized. Remote writes for a key run one
/// at a time and always push the latest local intent, so a burst of toggles collapses
/// to the final state.
pub struct WishlistStore {
    gateway: Arc<dyn WishlistGateway>,
    clock: Arc<dyn Clock>,
    state: Mutex<StoreState>,
    sync_locks: Mutex<HashMap<WishlistKey, Arc<Mutex<()>>>>,
}

impl WishlistStore {
    /// Creates an empty store.
    pub fn new(gateway: Arc<dyn WishlistGateway>, clock: Arc<dyn Clock>) -> Self {
        Self {
            gateway,
            clock,
            state: Mutex::new(StoreState::default()),
            sync_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the user's local entries with the gateway's list.
    ///
    /// `last_notified_at` survives for entries whose lead time did not change.
    pub async fn load(&self, user_id: &UserId) -> Result<Vec<WishlistEntry>, WishlistError> {
        let remote = self.gateway.list_wishlist(user_id).await?;

        let mut state = self.state.lock().await;
        let stale: Vec<WishlistKey> = state
            .entries
            .keys()
            .filter(|(user, _)| user == user_id)
            .cloned()
            .collect();
        let mut previous: HashMap<WishlistKey, Slot> = HashMap::new();
        for key in stale {
            if let Some(slot) = state.entries.remove(&key) {
                previous.insert(key.clone(), slot);
            }
            state.confirmed.remove(&key);
            state.bump(&key);
        }

        for mut entry in remote {
            let key = entry.key();
            state.confirmed.insert(
                key.clone(),
                Confirmed {
                    lead: entry.notification_lead_hours,
                },
            );
            match previous.remove(&key) {
                Some(slot) => {
                    if slot.entry.notification_lead_hours == entry.notification_lead_hours {
                        entry.last_notified_at = slot.entry.last_notified_at;
                    }
                    state.entries.insert(key, Slot { seq: slot.seq, entry });
                }
                None => state.insert(entry),
            }
        }

        let loaded = state.sorted(|e| &e.user_id == user_id);
        info!("Loaded {} wishlist entries for user {}", loaded.len(), user_id);
        Ok(loaded)
    }

    /// Stars a campsite. If the entry already exists its lead time is left untouched.
    pub async fn add(
        &self,
        user_id: &UserId,
        campsite_id: &CampsiteId,
        lead_hours: LeadHours,
    ) -> Result<WishlistEntry, WishlistError> {
        let key = (user_id.clone(), campsite_id.clone());

        let (entry, intent) = {
            let mut state = self.state.lock().await;
            match state.entries.get(&key) {
                Some(slot) => {
                    let entry = slot.entry.clone();
                    let intent = Intent {
                        version: state.version(&key),
                        previous: Some(entry.clone()),
                    };
                    (entry, intent)
                }
                None => {
                    let entry = WishlistEntry::new(
                        user_id.clone(),
                        campsite_id.clone(),
                        lead_hours,
                        self.clock.now(),
                    );
                    state.insert(entry.clone());
                    let version = state.bump(&key);
                    debug!("Starred campsite {} for user {}", campsite_id, user_id);
                    (
                        entry,
                        Intent {
                            version,
                            previous: None,
                        },
                    )
                }
            }
        };

        self.sync(&key, intent).await?;
        Ok(self.current_or(&key, entry).await)
    }

    /// Un-stars a campsite. Removing a missing entry succeeds.
    pub async fn remove(
        &self,
        user_id: &UserId,
        campsite_id: &CampsiteId,
    ) -> Result<(), WishlistError> {
        let key = (user_id.clone(), campsite_id.clone());

        let intent = {
            let mut state = self.state.lock().await;
            match state.entries.remove(&key) {
                Some(slot) => {
                    debug!("Un-starred campsite {} for user {}", campsite_id, user_id);
                    Intent {
                        version: state.bump(&key),
                        previous: Some(slot.entry),
                    }
                }
                None => Intent {
                    version: state.version(&key),
                    previous: None,
                },
            }
        };

        self.sync(&key, intent).await
    }

    /// Flips the starred state of a campsite. Returns the entry when it ends up starred.
    ///
    /// The flip is decided under the store lock, so concurrent toggles alternate
    /// instead of both reading the same state. `lead_hours` is only consulted when the
    /// toggle stars the campsite; an invalid lead never blocks un-starring.
    pub async fn toggle(
        &self,
        user_id: &UserId,
        campsite_id: &CampsiteId,
        lead_hours: Result<LeadHours, WishlistError>,
    ) -> Result<Option<WishlistEntry>, WishlistError> {
        let key = (user_id.clone(), campsite_id.clone());

        let (entry, intent) = {
            let mut state = self.state.lock().await;
            match state.entries.remove(&key) {
                Some(slot) => {
                    let version = state.bump(&key);
                    (
                        None,
                        Intent {
                            version,
                            previous: Some(slot.entry),
                        },
                    )
                }
                None => {
                    let entry = WishlistEntry::new(
                        user_id.clone(),
                        campsite_id.clone(),
                        lead_hours?,
                        self.clock.now(),
                    );
                    state.insert(entry.clone());
                    let version = state.bump(&key);
                    (
                        Some(entry),
                        Intent {
                            version,
                            previous: None,
                        },
                    )
                }
            }
        };

        self.sync(&key, intent).await?;
        match entry {
            Some(entry) => Ok(Some(self.current_or(&key, entry).await)),
            None => Ok(None),
        }
    }

    /// Changes an entry's lead time and re-arms its notification.
    pub async fn update_lead_hours(
        &self,
        user_id: &UserId,
        campsite_id: &CampsiteId,
        lead_hours: LeadHours,
    ) -> Result<WishlistEntry, WishlistError> {
        let key = (user_id.clone(), campsite_id.clone());

        let (entry, intent) = {
            let mut state = self.state.lock().await;
            let slot = state
                .entries
                .get_mut(&key)
                .ok_or_else(|| WishlistError::NotFound {
                    user_id: user_id.clone(),
                    campsite_id: campsite_id.clone(),
                })?;
            let previous = slot.entry.clone();
            slot.entry.notification_lead_hours = lead_hours;
            slot.entry.last_notified_at = None;
            let entry = slot.entry.clone();
            let version = state.bump(&key);
            (
                entry,
                Intent {
                    version,
                    previous: Some(previous),
                },
            )
        };

        self.sync(&key, intent).await?;
        Ok(self.current_or(&key, entry).await)
    }

    /// Whether the user has starred the campsite.
    pub async fn is_wishlisted(&self, user_id: &UserId, campsite_id: &CampsiteId) -> bool {
        let key = (user_id.clone(), campsite_id.clone());
        self.state.lock().await.entries.contains_key(&key)
    }

    /// The entry for a key, if starred.
    pub async fn get(&self, user_id: &UserId, campsite_id: &CampsiteId) -> Option<WishlistEntry> {
        let key = (user_id.clone(), campsite_id.clone());
        self.state
            .lock()
            .await
            .entries
            .get(&key)
            .map(|slot| slot.entry.clone())
    }

    /// The local entry for `key` after a write settled, or `fallback` if a later call
    /// already removed it.
    async fn current_or(&self, key: &WishlistKey, fallback: WishlistEntry) -> WishlistEntry {
        self.state
            .lock()
            .await
            .entries
            .get(key)
            .map(|slot| slot.entry.clone())
            .unwrap_or(fallback)
    }

    /// The user's entries in insertion order.
    pub async fn list(&self, user_id: &UserId) -> Vec<WishlistEntry> {
        self.state.lock().await.sorted(|e| &e.user_id == user_id)
    }

    /// Every entry in insertion order.
    pub async fn list_all(&self) -> Vec<WishlistEntry> {
        self.state.lock().await.sorted(|_| true)
    }

    /// Marks an entry as notified at `now` if `is_due` holds for its current state.
    ///
    /// The check and the write happen under the same lock, so a concurrent lead-time
    /// update either lands before (and is seen by `is_due`) or after (and clears the mark).
    /// An entry whose lead time the gateway has not confirmed yet never fires; it is
    /// picked up by a later sweep once the write settles either way.
    pub async fn fire_if<F>(
        &self,
        key: &WishlistKey,
        now: DateTime<Utc>,
        is_due: F,
    ) -> Option<WishlistEntry>
    where
        F: FnOnce(&WishlistEntry) -> bool,
    {
        let mut state = self.state.lock().await;
        let confirmed = state.confirmed.get(key).map(|c| c.lead);
        let slot = state.entries.get_mut(key)?;
        if confirmed != Some(slot.entry.notification_lead_hours) {
            debug!("Write pending for {}/{}, deferring its alert", key.0, key.1);
            return None;
        }
        if !is_due(&slot.entry) {
            return None;
        }
        slot.entry.last_notified_at = Some(now);
        Some(slot.entry.clone())
    }

    /// Clears `last_notified_at` on every entry for the campsite. Returns how many were re-armed.
    pub async fn rearm_campsite(&self, campsite_id: &CampsiteId) -> usize {
        let mut state = self.state.lock().await;
        let mut rearmed = 0;
        for slot in state.entries.values_mut() {
            if &slot.entry.campsite_id == campsite_id && slot.entry.last_notified_at.is_some() {
                slot.entry.last_notified_at = None;
                rearmed += 1;
            }
        }
        if rearmed > 0 {
            debug!("Re-armed {} wishlist entries for campsite {}", rearmed, campsite_id);
        }
        rearmed
    }

    async fn key_lock(&self, key: &WishlistKey) -> Arc<Mutex<()>> {
        self.sync_locks
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Drops the key's sync lock once no other write holds or waits on it.
    async fn release_key_lock(&self, key: &WishlistKey, key_lock: Arc<Mutex<()>>) {
        let mut locks = self.sync_locks.lock().await;
        // One reference lives in the map, the other is ours.
        if Arc::strong_count(&key_lock) == 2 {
            locks.remove(key);
        }
    }

    /// Pushes the latest local intent for `key` to the gateway.
    async fn sync(&self, key: &WishlistKey, intent: Intent) -> Result<(), WishlistError> {
        let key_lock = self.key_lock(key).await;
        let result = {
            let _guard = key_lock.lock().await;
            self.push_intent(key, intent).await
        };
        self.release_key_lock(key, key_lock).await;
        result
    }

    async fn push_intent(&self, key: &WishlistKey, intent: Intent) -> Result<(), WishlistError> {
        let (desired, confirmed) = {
            let state = self.state.lock().await;
            (
                state
                    .entries
                    .get(key)
                    .map(|slot| slot.entry.notification_lead_hours),
                state.confirmed.get(key).copied(),
            )
        };

        let (user_id, campsite_id) = key;
        let result = match (desired, confirmed) {
            (None, None) => return Ok(()),
            (Some(lead), Some(remote)) if lead == remote.lead => return Ok(()),
            (Some(lead), None) => self
                .gateway
                .create_wishlist_entry(user_id, campsite_id, lead)
                .await
                .map(|e| Some(e.notification_lead_hours)),
            (Some(lead), Some(_)) => {
                let updated = match self
                    .gateway
                    .update_wishlist_entry(user_id, campsite_id, lead)
                    .await
                {
                    Err(GatewayError::NotFound) => {
                        debug!("Remote entry vanished, recreating {}/{}", user_id, campsite_id);
                        self.gateway
                            .create_wishlist_entry(user_id, campsite_id, lead)
                            .await
                    }
                    other => other,
                };
                updated.map(|e| Some(e.notification_lead_hours))
            }
            (None, Some(_)) => match self
                .gateway
                .delete_wishlist_entry(user_id, campsite_id)
                .await
            {
                Ok(()) | Err(GatewayError::NotFound) => Ok(None),
                Err(e) => Err(e),
            },
        };

        let mut state = self.state.lock().await;
        let current = state.version(key) == intent.version;
        match result {
            Ok(Some(lead)) => {
                state.confirmed.insert(key.clone(), Confirmed { lead });
                if current {
                    adopt_remote_lead(&mut state, key, lead);
                }
                Ok(())
            }
            Ok(None) => {
                state.confirmed.remove(key);
                Ok(())
            }
            Err(e) => {
                if current {
                    error!(
                        "Wishlist write for user {} campsite {} failed, rolling back: {}",
                        user_id, campsite_id, e
                    );
                    rollback(&mut state, key, intent.previous, self.clock.now());
                } else {
                    error!(
                        "Wishlist write for user {} campsite {} failed, a newer change is pending: {}",
                        user_id, campsite_id, e
                    );
                }
                Err(e.into())
            }
        }
    }
}

/// Takes the lead time the gateway persisted when it differs from the local one,
/// e.g. when the entry already existed remotely.
fn adopt_remote_lead(state: &mut StoreState, key: &WishlistKey, lead: LeadHours) {
    let Some(slot) = state.entries.get_mut(key) else {
        return;
    };
    if slot.entry.notification_lead_hours == lead {
        return;
    }
    info!(
        "Remote wishlist entry {}/{} keeps lead {}, replacing local {}",
        key.0, key.1, lead, slot.entry.notification_lead_hours
    );
    slot.entry.notification_lead_hours = lead;
    slot.entry.last_notified_at = None;
}

/// Restores the local entry to what the gateway last confirmed.
///
/// A fire mark recorded since the failed write is kept when it is later than the
/// one being restored.
fn rollback(
    state: &mut StoreState,
    key: &WishlistKey,
    previous: Option<WishlistEntry>,
    now: DateTime<Utc>,
) {
    let confirmed = state.confirmed.get(key).copied();
    let current = state.entries.remove(key);

    if let Some(Confirmed { lead }) = confirmed {
        let seq = current.as_ref().map(|slot| slot.seq);
        let fired_since = current
            .as_ref()
            .filter(|slot| slot.entry.notification_lead_hours == lead)
            .and_then(|slot| slot.entry.last_notified_at);
        let mut entry = previous
            .clone()
            .or_else(|| current.map(|slot| slot.entry))
            .unwrap_or_else(|| WishlistEntry::new(key.0.clone(), key.1.clone(), lead, now));

        let same_window = previous
            .as_ref()
            .is_some_and(|p| p.notification_lead_hours == lead);
        if !same_window {
            entry.last_notified_at = None;
        }
        entry.last_notified_at = entry.last_notified_at.max(fired_since);
        entry.notification_lead_hours = lead;

        match seq {
            Some(seq) => {
                state.entries.insert(key.clone(), Slot { seq, entry });
            }
            None => state.insert(entry),
        }
    }

    state.bump(key);
}
