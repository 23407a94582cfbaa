use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use booking_window::{AvailabilityState, BookingPolicy, classify};
use campsite_catalog::CampsiteId;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use wishlist::{WishlistEntry, WishlistKey, WishlistStore};

use crate::notifier::Notifier;
use crate::types::{CampsiteLookup, DispatchFailure, DueNotification, SweepReport, SweepWarning};

/// Whether `entry` must fire at `now` for a window opening at `opens_at`.
///
/// Due means: the window is still in the future, `now` has reached the entry's lead
/// threshold, and nothing has fired since that threshold.
pub fn is_due(
    entry: &WishlistEntry,
    opens_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    policy: &BookingPolicy,
) -> bool {
    let Some(opens_at) = opens_at else {
        return false;
    };
    if classify(Some(opens_at), now, policy).state == AvailabilityState::Available {
        return false;
    }

    let threshold = entry.notify_at(opens_at);
    now >= threshold && entry.last_notified_at.is_none_or(|last| last < threshold)
}

/// Entries that are due at `now`, plus warnings for entries whose campsite is unknown.
#[derive(Debug, Default)]
pub struct DueScan {
    /// Keys of due entries, in input order
    pub due: Vec<WishlistKey>,
    /// Skipped entries
    pub warnings: Vec<SweepWarning>,
}

/// Evaluates every entry against its campsite's booking window. Pure; marks nothing.
pub fn due_notifications<L>(
    entries: &[WishlistEntry],
    lookup: &L,
    now: DateTime<Utc>,
    policy: &BookingPolicy,
) -> DueScan
where
    L: CampsiteLookup + ?Sized,
{
    let mut scan = DueScan::default();

    for entry in entries {
        let Some(campsite) = lookup.campsite(&entry.campsite_id) else {
            warn!(
                "Wishlist entry of user {} references unknown campsite {}, skipping",
                entry.user_id, entry.campsite_id
            );
            scan.warnings.push(SweepWarning::MissingCampsite {
                user_id: entry.user_id.clone(),
                campsite_id: entry.campsite_id.clone(),
            });
            continue;
        };

        if is_due(entry, campsite.booking_opens_at, now, policy) {
            scan.due.push(entry.key());
        }
    }

    scan
}

#[derive(Debug, Default)]
struct SweepState {
    /// Last booking-open instant seen per campsite.
    known_windows: HashMap<CampsiteId, Option<DateTime<Utc>>>,
}

/// Periodically re-evaluates the wishlist and fires due alerts at most once per window.
pub struct NotificationScheduler {
    store: Arc<WishlistStore>,
    notifier: Option<Arc<dyn Notifier>>,
    policy: BookingPolicy,
    /// Held for the whole sweep so sweeps never overlap.
    sweep: Mutex<SweepState>,
}

impl NotificationScheduler {
    /// Create a new scheduler over a wishlist store
    pub fn new(
        store: Arc<WishlistStore>,
        notifier: Option<Arc<dyn Notifier>>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            policy,
            sweep: Mutex::new(SweepState::default()),
        }
    }

    /// Runs one sweep at `now`: re-arms moved windows, fires due entries, dispatches them.
    pub async fn tick<L>(&self, lookup: &L, now: DateTime<Utc>) -> SweepReport
    where
        L: CampsiteLookup + ?Sized,
    {
        let mut sweep = self.sweep.lock().await;
        let mut report = SweepReport::default();

        let entries = self.store.list_all().await;
        debug!("Sweeping {} wishlist entries at {}", entries.len(), now);

        report.rearmed = self.rearm_moved_windows(&mut sweep, &entries, lookup, now).await;

        // Re-read so re-armed entries are evaluated with their cleared mark.
        let entries = if report.rearmed > 0 {
            self.store.list_all().await
        } else {
            entries
        };

        let scan = due_notifications(&entries, lookup, now, &self.policy);
        report.warnings = scan.warnings;

        for key in scan.due {
            let Some(campsite) = lookup.campsite(&key.1) else {
                continue;
            };
            let Some(opens_at) = campsite.booking_opens_at else {
                continue;
            };

            let policy = &self.policy;
            let fired = self
                .store
                .fire_if(&key, now, |entry| is_due(entry, Some(opens_at), now, policy))
                .await;

            if let Some(entry) = fired {
                let hours_until = classify(Some(opens_at), now, policy).hours_until;
                let notification = DueNotification::new(
                    &entry,
                    campsite,
                    opens_at,
                    hours_until,
                    now,
                );
                info!(
                    "Campsite {} opens in {}h, notifying user {}",
                    notification.campsite_name, hours_until, notification.user_id
                );
                report.due.push(notification);
            }
        }

        if let Some(notifier) = &self.notifier {
            for notification in &report.due {
                match notifier.send_opening_soon(notification).await {
                    Ok(delivery_id) => {
                        debug!("Delivered alert {} as {}", notification.id, delivery_id);
                    }
                    Err(e) => {
                        error!("Failed to deliver alert {}: {}", notification.id, e);
                        report.dispatch_failures.push(DispatchFailure {
                            notification_id: notification.id,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        report
    }

    /// Clears the fired mark for campsites whose booking window moved to a new future instant.
    async fn rearm_moved_windows<L>(
        &self,
        sweep: &mut SweepState,
        entries: &[WishlistEntry],
        lookup: &L,
        now: DateTime<Utc>,
    ) -> usize
    where
        L: CampsiteLookup + ?Sized,
    {
        let mut rearmed = 0;
        let mut seen = HashSet::new();

        for entry in entries {
            if !seen.insert(&entry.campsite_id) {
                continue;
            }
            let Some(campsite) = lookup.campsite(&entry.campsite_id) else {
                continue;
            };

            let current = campsite.booking_opens_at;
            let previous = sweep.known_windows.insert(entry.campsite_id.clone(), current);
            let moved = matches!(previous, Some(previous) if previous != current);

            if moved && current.is_some_and(|opens_at| opens_at > now) {
                info!("Booking window of campsite {} moved, re-arming alerts", entry.campsite_id);
                rearmed += self.store.rearm_campsite(&entry.campsite_id).await;
            }
        }

        rearmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NotificationError;
    use async_trait::async_trait;
    use booking_window::ManualClock;
    use campsite_catalog::{Campsite, CatalogSnapshot};
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wishlist::{InMemoryWishlistGateway, LeadHours, UserId};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap()
    }

    fn user() -> UserId {
        UserId::from("hiker")
    }

    fn catalog(opens_at: Option<DateTime<Utc>>) -> CatalogSnapshot {
        CatalogSnapshot::new(vec![Campsite::new("C", "park", "Campsite C", opens_at)])
    }

    async fn setup(
        lead: i64,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> (Arc<WishlistStore>, NotificationScheduler) {
        let store = Arc::new(WishlistStore::new(
            Arc::new(InMemoryWishlistGateway::new()),
            Arc::new(ManualClock::new(now())),
        ));
        store
            .add(&user(), &CampsiteId::from("C"), LeadHours::new(lead).unwrap())
            .await
            .unwrap();
        let scheduler = NotificationScheduler::new(
            store.clone(),
            notifier,
            BookingPolicy::default(),
        );
        (store, scheduler)
    }

    fn entry(lead: i64, last: Option<DateTime<Utc>>) -> WishlistEntry {
        let mut entry = WishlistEntry::new(
            user(),
            CampsiteId::from("C"),
            LeadHours::new(lead).unwrap(),
            now(),
        );
        entry.last_notified_at = last;
        entry
    }

    #[test]
    fn test_is_due_rules() {
        let policy = BookingPolicy::default();
        let opens = now() + Duration::hours(2);

        assert!(!is_due(&entry(1, None), None, now(), &policy));
        assert!(!is_due(&entry(1, None), Some(opens), now(), &policy));
        assert!(is_due(&entry(1, None), Some(opens), now() + Duration::hours(1), &policy));
        assert!(is_due(&entry(2, None), Some(opens), now(), &policy));
        // Window already open.
        assert!(!is_due(&entry(24, None), Some(now()), now(), &policy));
        assert!(!is_due(&entry(24, None), Some(now() - Duration::hours(1)), now(), &policy));
        // Fired after the threshold: done for this window.
        let fired = now() + Duration::minutes(61);
        assert!(!is_due(&entry(1, Some(fired)), Some(opens), fired, &policy));
        // Fired for an earlier window: eligible again.
        let stale = now() - Duration::days(3);
        assert!(is_due(&entry(1, Some(stale)), Some(opens), fired, &policy));
    }

    #[test]
    fn test_due_notifications_skips_unknown_campsites() {
        let entries = vec![
            entry(1, None),
            WishlistEntry::new(user(), CampsiteId::from("ghost"), LeadHours::ONE, now()),
        ];
        let scan = due_notifications(
            &entries,
            &catalog(Some(now() + Duration::minutes(30))),
            now(),
            &BookingPolicy::default(),
        );

        assert_eq!(scan.due, vec![(user(), CampsiteId::from("C"))]);
        assert_eq!(
            scan.warnings,
            vec![SweepWarning::MissingCampsite {
                user_id: user(),
                campsite_id: CampsiteId::from("ghost"),
            }]
        );
    }

    #[tokio::test]
    async fn test_scenario_fires_once_at_lead_time() {
        let (store, scheduler) = setup(1, None).await;
        let lookup = catalog(Some(now() + Duration::hours(2)));

        assert!(scheduler.tick(&lookup, now()).await.due.is_empty());

        let report = scheduler.tick(&lookup, now() + Duration::hours(1)).await;
        assert_eq!(report.due.len(), 1);
        assert_eq!(report.due[0].campsite_id, CampsiteId::from("C"));
        assert_eq!(report.due[0].hours_until, 1);
        let stored = store.get(&user(), &CampsiteId::from("C")).await.unwrap();
        assert_eq!(stored.last_notified_at, Some(now() + Duration::hours(1)));

        assert!(scheduler.tick(&lookup, now() + Duration::hours(1)).await.due.is_empty());
        let later = now() + Duration::hours(1) + Duration::minutes(30);
        assert!(scheduler.tick(&lookup, later).await.due.is_empty());
    }

    #[tokio::test]
    async fn test_moved_window_rearms() {
        let (_, scheduler) = setup(1, None).await;
        let first = catalog(Some(now() + Duration::minutes(30)));
        assert_eq!(scheduler.tick(&first, now()).await.due.len(), 1);
        assert!(scheduler.tick(&first, now()).await.due.is_empty());

        // Window moved earlier; without the re-arm the old mark would suppress it.
        let moved = catalog(Some(now() + Duration::minutes(20)));
        let report = scheduler.tick(&moved, now() + Duration::minutes(5)).await;
        assert_eq!(report.rearmed, 1);
        assert_eq!(report.due.len(), 1);

        // Window moved into the past: nothing to re-arm, nothing to fire.
        let past = catalog(Some(now() - Duration::hours(1)));
        let report = scheduler.tick(&past, now() + Duration::minutes(6)).await;
        assert_eq!(report.rearmed, 0);
        assert!(report.due.is_empty());
    }

    #[tokio::test]
    async fn test_moved_window_far_ahead_fires_again_later() {
        let (_, scheduler) = setup(6, None).await;
        let first = catalog(Some(now() + Duration::hours(3)));
        assert_eq!(scheduler.tick(&first, now()).await.due.len(), 1);

        let next = now() + Duration::days(30);
        let moved = catalog(Some(next));
        assert!(scheduler.tick(&moved, now() + Duration::hours(1)).await.due.is_empty());
        let report = scheduler.tick(&moved, next - Duration::hours(6)).await;
        assert_eq!(report.due.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_campsite_does_not_block_others() {
        let (store, scheduler) = setup(1, None).await;
        store
            .add(&user(), &CampsiteId::from("ghost"), LeadHours::ONE)
            .await
            .unwrap();

        let report = scheduler.tick(&catalog(Some(now() + Duration::minutes(10))), now()).await;
        assert_eq!(report.due.len(), 1);
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ticks_fire_once() {
        let (_, scheduler) = setup(1, None).await;
        let lookup = catalog(Some(now() + Duration::minutes(30)));

        let (a, b) = tokio::join!(scheduler.tick(&lookup, now()), scheduler.tick(&lookup, now()));
        assert_eq!(a.due.len() + b.due.len(), 1);
    }

    struct CountingNotifier {
        sent: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn send_opening_soon(
            &self,
            notification: &DueNotification,
        ) -> Result<String, NotificationError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotificationError::Delivery("smtp down".to_string()))
            } else {
                Ok(format!("mock-{}", notification.id))
            }
        }
    }

    #[tokio::test]
    async fn test_dispatch_and_failures() {
        let notifier = Arc::new(CountingNotifier {
            sent: AtomicUsize::new(0),
            fail: false,
        });
        let (_, scheduler) = setup(1, Some(notifier.clone())).await;
        let lookup = catalog(Some(now() + Duration::minutes(30)));
        let report = scheduler.tick(&lookup, now()).await;
        assert_eq!(report.due.len(), 1);
        assert!(report.dispatch_failures.is_empty());
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);

        let failing = Arc::new(CountingNotifier {
            sent: AtomicUsize::new(0),
            fail: true,
        });
        let (_, scheduler) = setup(1, Some(failing.clone())).await;
        let report = scheduler.tick(&lookup, now()).await;
        assert_eq!(report.dispatch_failures.len(), 1);
        // A failed delivery still counts as fired for this window.
        assert!(scheduler.tick(&lookup, now()).await.due.is_empty());
        assert_eq!(failing.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lead_update_between_ticks_rearms() {
        let (store, scheduler) = setup(1, None).await;
        let lookup = catalog(Some(now() + Duration::minutes(30)));
        assert_eq!(scheduler.tick(&lookup, now()).await.due.len(), 1);

        store
            .update_lead_hours(&user(), &CampsiteId::from("C"), LeadHours::new(6).unwrap())
            .await
            .unwrap();
        assert_eq!(scheduler.tick(&lookup, now()).await.due.len(), 1);
    }
}
