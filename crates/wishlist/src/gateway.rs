use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use booking_window::{Clock, SystemClock, parse_instant};
use campsite_catalog::CampsiteId;
use chrono::{DateTime, Utc};
use remote_api::{ApiClient, GatewayError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::{LeadHours, UserId, WishlistEntry};

/// Remote persistence for wishlist entries.
#[async_trait]
pub trait WishlistGateway: Send + Sync {
    /// Lists a user's entries.
    async fn list_wishlist(&self, user_id: &UserId) -> Result<Vec<WishlistEntry>, GatewayError>;

    /// Creates an entry.
    async fn create_wishlist_entry(
        &self,
        user_id: &UserId,
        campsite_id: &CampsiteId,
        lead_hours: LeadHours,
    ) -> Result<WishlistEntry, GatewayError>;

    /// Updates an entry's lead time. Fails with [`GatewayError::NotFound`] when absent.
    async fn update_wishlist_entry(
        &self,
        user_id: &UserId,
        campsite_id: &CampsiteId,
        lead_hours: LeadHours,
    ) -> Result<WishlistEntry, GatewayError>;

    /// Deletes an entry. Deleting a missing entry succeeds.
    async fn delete_wishlist_entry(
        &self,
        user_id: &UserId,
        campsite_id: &CampsiteId,
    ) -> Result<(), GatewayError>;
}

/// Wishlist entry as serialized by the park API.
#[derive(Debug, Clone, Deserialize)]
pub struct WishlistRecord {
    /// Owner
    pub user_id: UserId,
    /// Starred campsite
    pub campsite_id: CampsiteId,
    /// Lead time in hours
    #[serde(default = "default_lead")]
    pub notification_hours_before: i64,
    /// Creation timestamp, naive timestamps are UTC
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_lead() -> i64 {
    1
}

impl WishlistRecord {
    /// Converts the record; `received_at` stands in for a missing `created_at`.
    pub fn into_entry(self, received_at: DateTime<Utc>) -> Result<WishlistEntry, GatewayError> {
        let lead = LeadHours::new(self.notification_hours_before)
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        let created_at = match self.created_at.as_deref() {
            Some(raw) => parse_instant(raw).map_err(|e| GatewayError::Decode(e.to_string()))?,
            None => received_at,
        };

        Ok(WishlistEntry::new(
            self.user_id,
            self.campsite_id,
            lead,
            created_at,
        ))
    }
}

#[derive(Debug, Serialize)]
struct CreateWishlistBody<'a> {
    campsite_id: &'a str,
    notification_hours_before: u32,
}

/// Wishlist gateway backed by the park API.
pub struct RemoteWishlistGateway {
    api: ApiClient,
    clock: Arc<dyn Clock>,
}

impl RemoteWishlistGateway {
    /// Creates a wishlist gateway on top of an API client.
    pub fn new(api: ApiClient) -> Self {
        Self::with_clock(api, Arc::new(SystemClock))
    }

    /// Creates a wishlist gateway that timestamps undated records with `clock`.
    pub fn with_clock(api: ApiClient, clock: Arc<dyn Clock>) -> Self {
        Self { api, clock }
    }
}

#[async_trait]
impl WishlistGateway for RemoteWishlistGateway {
    async fn list_wishlist(&self, user_id: &UserId) -> Result<Vec<WishlistEntry>, GatewayError> {
        let records: Vec<WishlistRecord> = self
            .api
            .get_json(&["users", user_id.as_str(), "wishlist"])
            .await?;
        debug!("Fetched {} wishlist records for user {}", records.len(), user_id);
        let received_at = self.clock.now();
        records
            .into_iter()
            .map(|record| record.into_entry(received_at))
            .collect()
    }

    async fn create_wishlist_entry(
        &self,
        user_id: &UserId,
        campsite_id: &CampsiteId,
        lead_hours: LeadHours,
    ) -> Result<WishlistEntry, GatewayError> {
        let body = CreateWishlistBody {
            campsite_id: campsite_id.as_str(),
            notification_hours_before: lead_hours.get(),
        };
        let record: WishlistRecord = self
            .api
            .post_json(&["users", user_id.as_str(), "wishlist"], &body)
            .await?;
        record.into_entry(self.clock.now())
    }

    async fn update_wishlist_entry(
        &self,
        user_id: &UserId,
        campsite_id: &CampsiteId,
        lead_hours: LeadHours,
    ) -> Result<WishlistEntry, GatewayError> {
        let record: WishlistRecord = self
            .api
            .put_query(
                &["users", user_id.as_str(), "wishlist", campsite_id.as_str()],
                &[("notification_hours", lead_hours.get().to_string())],
            )
            .await?;
        record.into_entry(self.clock.now())
    }

    async fn delete_wishlist_entry(
        &self,
        user_id: &UserId,
        campsite_id: &CampsiteId,
    ) -> Result<(), GatewayError> {
        match self
            .api
            .delete(&["users", user_id.as_str(), "wishlist", campsite_id.as_str()])
            .await
        {
            Ok(()) | Err(GatewayError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Number of calls an [`InMemoryWishlistGateway`] has served, per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayCalls {
    /// `list_wishlist` calls
    pub list: usize,
    /// `create_wishlist_entry` calls
    pub create: usize,
    /// `update_wishlist_entry` calls
    pub update: usize,
    /// `delete_wishlist_entry` calls
    pub delete: usize,
}

impl GatewayCalls {
    /// Total mutating calls.
    pub fn writes(&self) -> usize {
        self.create + self.update + self.delete
    }
}

#[derive(Default)]
struct InMemoryState {
    entries: Vec<WishlistEntry>,
    failures: VecDeque<GatewayError>,
    calls: GatewayCalls,
}

/// In-process wishlist gateway with optional latency and injected failures.
pub struct InMemoryWishlistGateway {
    state: Mutex<InMemoryState>,
    latency: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryWishlistGateway {
    fn default() -> Self {
        Self {
            state: Mutex::new(InMemoryState::default()),
            latency: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl InMemoryWishlistGateway {
    /// Creates an empty gateway that answers immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty gateway that sleeps `latency` before every mutating call.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Stamps created entries with `clock` instead of the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Seeds remote entries, bypassing call accounting.
    pub async fn seed(&self, entries: Vec<WishlistEntry>) {
        self.state.lock().await.entries.extend(entries);
    }

    /// Makes the next mutating call fail with `error`.
    pub async fn fail_next(&self, error: GatewayError) {
        self.state.lock().await.failures.push_back(error);
    }

    /// Calls served so far.
    pub async fn calls(&self) -> GatewayCalls {
        self.state.lock().await.calls
    }

    /// Entries currently held for `user_id`.
    pub async fn entries(&self, user_id: &UserId) -> Vec<WishlistEntry> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect()
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl WishlistGateway for InMemoryWishlistGateway {
    async fn list_wishlist(&self, user_id: &UserId) -> Result<Vec<WishlistEntry>, GatewayError> {
        let mut state = self.state.lock().await;
        state.calls.list += 1;
        Ok(state
            .entries
            .iter()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_wishlist_entry(
        &self,
        user_id: &UserId,
        campsite_id: &CampsiteId,
        lead_hours: LeadHours,
    ) -> Result<WishlistEntry, GatewayError> {
        self.delay().await;
        let mut state = self.state.lock().await;
        state.calls.create += 1;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        if let Some(existing) = state
            .entries
            .iter()
            .find(|e| &e.user_id == user_id && &e.campsite_id == campsite_id)
        {
            return Ok(existing.clone());
        }

        let entry = WishlistEntry::new(
            user_id.clone(),
            campsite_id.clone(),
            lead_hours,
            self.clock.now(),
        );
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn update_wishlist_entry(
        &self,
        user_id: &UserId,
        campsite_id: &CampsiteId,
        lead_hours: LeadHours,
    ) -> Result<WishlistEntry, GatewayError> {
        self.delay().await;
        let mut state = self.state.lock().await;
        state.calls.update += 1;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        let entry = state
            .entries
            .iter_mut()
            .find(|e| &e.user_id == user_id && &e.campsite_id == campsite_id)
            .ok_or(GatewayError::NotFound)?;
        entry.notification_lead_hours = lead_hours;
        Ok(entry.clone())
    }

    async fn delete_wishlist_entry(
        &self,
        user_id: &UserId,
        campsite_id: &CampsiteId,
    ) -> Result<(), GatewayError> {
        self.delay().await;
        let mut state = self.state.lock().await;
        state.calls.delete += 1;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        state
            .entries
            .retain(|e| !(&e.user_id == user_id && &e.campsite_id == campsite_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_decodes_park_api_payload() {
        let json = r#"{
            "id": 5,
            "user_id": 1,
            "campsite_id": 12,
            "notification_hours_before": 6,
            "created_at": "2025-04-02T09:30:00",
            "campsite": {"id": 12, "name": "Upper Pines"}
        }"#;
        let record: WishlistRecord = serde_json::from_str(json).unwrap();
        let entry = record.into_entry(Utc::now()).unwrap();

        assert_eq!(entry.user_id, UserId::from("1"));
        assert_eq!(entry.campsite_id, CampsiteId::from("12"));
        assert_eq!(entry.notification_lead_hours.get(), 6);
        assert_eq!(
            entry.created_at,
            Utc.with_ymd_and_hms(2025, 4, 2, 9, 30, 0).unwrap()
        );
        assert_eq!(entry.last_notified_at, None);
    }

    #[test]
    fn test_record_with_invalid_lead_is_a_decode_error() {
        let json = r#"{"user_id": 1, "campsite_id": 12, "notification_hours_before": 0}"#;
        let record: WishlistRecord = serde_json::from_str(json).unwrap();
        assert!(matches!(
            record.into_entry(Utc::now()),
            Err(GatewayError::Decode(_))
        ));
    }

    #[test]
    fn test_undated_record_uses_received_at() {
        let json = r#"{"user_id": 1, "campsite_id": 12}"#;
        let record: WishlistRecord = serde_json::from_str(json).unwrap();
        let received_at = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();

        let entry = record.into_entry(received_at).unwrap();
        assert_eq!(entry.created_at, received_at);
        assert_eq!(entry.notification_lead_hours, LeadHours::ONE);
    }

    #[test]
    fn test_create_body_shape() {
        let body = CreateWishlistBody {
            campsite_id: "12",
            notification_hours_before: 24,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"campsite_id": "12", "notification_hours_before": 24})
        );
    }

    #[tokio::test]
    async fn test_in_memory_semantics() {
        let gateway = InMemoryWishlistGateway::new();
        let user = UserId::from("u");
        let site = CampsiteId::from("c");

        assert!(matches!(
            gateway
                .update_wishlist_entry(&user, &site, LeadHours::ONE)
                .await,
            Err(GatewayError::NotFound)
        ));

        gateway
            .create_wishlist_entry(&user, &site, LeadHours::new(6).unwrap())
            .await
            .unwrap();
        let again = gateway
            .create_wishlist_entry(&user, &site, LeadHours::ONE)
            .await
            .unwrap();
        assert_eq!(again.notification_lead_hours.get(), 6);

        gateway.delete_wishlist_entry(&user, &site).await.unwrap();
        gateway.delete_wishlist_entry(&user, &site).await.unwrap();
        assert!(gateway.list_wishlist(&user).await.unwrap().is_empty());

        let calls = gateway.calls().await;
        assert_eq!(calls.create, 2);
        assert_eq!(calls.update, 1);
        assert_eq!(calls.delete, 2);
        assert_eq!(calls.list, 1);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let gateway = InMemoryWishlistGateway::new();
        let user = UserId::from("u");
        let site = CampsiteId::from("c");

        gateway.fail_next(GatewayError::Timeout).await;
        assert!(
            gateway
                .create_wishlist_entry(&user, &site, LeadHours::ONE)
                .await
                .is_err()
        );
        assert!(
            gateway
                .create_wishlist_entry(&user, &site, LeadHours::ONE)
                .await
                .is_ok()
        );
    }
}
