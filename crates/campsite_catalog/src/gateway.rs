use async_trait::async_trait;
use chrono::{DateTime, Utc};
use remote_api::{ApiClient, GatewayError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::types::{Campsite, CampsiteId, CampsiteRecord, ParkId, ParkRecord};

/// Read-only source of campsite records.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    /// Lists campsites, optionally restricted to one park.
    async fn list_campsites(&self, park_id: Option<&ParkId>) -> Result<Vec<Campsite>, GatewayError>;
}

/// Catalog backed by the park API.
///
/// The API only lists campsites per park, so the unfiltered catalog is read as
/// `GET /parks` followed by `GET /parks/{id}/campsites` for each park in turn.
pub struct RemoteCatalog {
    api: ApiClient,
}

impl RemoteCatalog {
    /// Creates a catalog gateway on top of an API client.
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl CatalogGateway for RemoteCatalog {
    async fn list_campsites(
        &self,
        park_id: Option<&ParkId>,
    ) -> Result<Vec<Campsite>, GatewayError> {
        let records = match park_id {
            Some(park) => self.park_campsites(park.clone()).await?,
            None => {
                let parks: Vec<ParkRecord> = self.api.get_json(&["parks"]).await?;
                debug!("Listing campsites across {} parks", parks.len());
                gather_by_park(parks, |park| self.park_campsites(park)).await?
            }
        };

        debug!("Fetched {} campsite records", records.len());
        Ok(convert_records(records))
    }
}

impl RemoteCatalog {
    async fn park_campsites(&self, park: ParkId) -> Result<Vec<CampsiteRecord>, GatewayError> {
        self.api
            .get_json(&["parks", park.as_str(), "campsites"])
            .await
    }
}

/// Concatenates the campsites of every park, in park order.
///
/// A park deleted between listing parks and fetching its campsites is skipped;
/// any other failure aborts the listing.
async fn gather_by_park<F, Fut>(
    parks: Vec<ParkRecord>,
    mut fetch: F,
) -> Result<Vec<CampsiteRecord>, GatewayError>
where
    F: FnMut(ParkId) -> Fut,
    Fut: Future<Output = Result<Vec<CampsiteRecord>, GatewayError>>,
{
    let mut records = Vec::new();
    for park in parks {
        match fetch(park.id.clone()).await {
            Ok(mut batch) => records.append(&mut batch),
            Err(GatewayError::NotFound) => {
                warn!("Park {} disappeared while listing campsites", park.id);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(records)
}

/// Converts wire records, dropping (and logging) any with a malformed booking instant.
pub fn convert_records(records: Vec<CampsiteRecord>) -> Vec<Campsite> {
    records
        .into_iter()
        .filter_map(|record| {
            let id = record.id.clone();
            match Campsite::try_from(record) {
                Ok(campsite) => Some(campsite),
                Err(e) => {
                    warn!("Skipping campsite {}: {}", id, e);
                    None
                }
            }
        })
        .collect()
}

/// In-process catalog, used for tests and offline runs.
#[derive(Default)]
pub struct InMemoryCatalog {
    campsites: RwLock<Vec<Campsite>>,
}

impl InMemoryCatalog {
    /// Creates a catalog holding `campsites`.
    pub fn new(campsites: Vec<Campsite>) -> Self {
        Self {
            campsites: RwLock::new(campsites),
        }
    }

    /// Inserts a campsite or replaces the one with the same id.
    pub async fn upsert(&self, campsite: Campsite) {
        let mut campsites = self.campsites.write().await;
        match campsites.iter_mut().find(|c| c.id == campsite.id) {
            Some(existing) => *existing = campsite,
            None => campsites.push(campsite),
        }
    }

    /// Removes a campsite. Returns whether it existed.
    pub async fn remove(&self, id: &CampsiteId) -> bool {
        let mut campsites = self.campsites.write().await;
        let before = campsites.len();
        campsites.retain(|c| &c.id != id);
        campsites.len() != before
    }

    /// Moves a campsite's booking window. Returns whether the campsite exists.
    pub async fn set_booking_opens(
        &self,
        id: &CampsiteId,
        opens_at: Option<DateTime<Utc>>,
    ) -> bool {
        let mut campsites = self.campsites.write().await;
        match campsites.iter_mut().find(|c| &c.id == id) {
            Some(campsite) => {
                campsite.booking_opens_at = opens_at;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl CatalogGateway for InMemoryCatalog {
    async fn list_campsites(
        &self,
        park_id: Option<&ParkId>,
    ) -> Result<Vec<Campsite>, GatewayError> {
        let campsites = self.campsites.read().await;
        Ok(campsites
            .iter()
            .filter(|c| park_id.is_none_or(|park| &c.park_id == park))
            .cloned()
            .collect())
    }
}
