use std::collections::HashMap;
use std::fmt;

use booking_window::{BookingWindowError, parse_instant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifiers arrive from the park API as numbers or strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

/// Deserializes an opaque identifier that may be encoded as a JSON number or string.
pub fn deserialize_opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserialize_opaque_id(deserializer).map(Self)
            }
        }
    };
}

opaque_id!(
    /// Unique identifier of a campsite.
    CampsiteId
);
opaque_id!(
    /// Identifier of the park that owns a campsite.
    ParkId
);

/// Facilities offered at a campsite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amenities {
    /// Potable water on site
    #[serde(default)]
    pub has_water: bool,
    /// Toilets on site
    #[serde(default)]
    pub has_toilets: bool,
    /// Maximum number of campers
    #[serde(default)]
    pub max_occupancy: Option<u32>,
}

/// A campsite as owned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campsite {
    /// Unique identifier
    pub id: CampsiteId,
    /// Owning park
    pub park_id: ParkId,
    /// Display name
    pub name: String,
    /// Elevation in feet
    #[serde(default)]
    pub elevation: Option<i32>,
    /// On-site facilities
    #[serde(flatten)]
    pub amenities: Amenities,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// When reservations open; `None` means always bookable
    #[serde(default)]
    pub booking_opens_at: Option<DateTime<Utc>>,
}

impl Campsite {
    /// Minimal campsite with no amenities.
    pub fn new(
        id: impl Into<CampsiteId>,
        park_id: impl Into<ParkId>,
        name: impl Into<String>,
        booking_opens_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: id.into(),
            park_id: park_id.into(),
            name: name.into(),
            elevation: None,
            amenities: Amenities::default(),
            description: None,
            booking_opens_at,
        }
    }
}

/// Park as listed by `GET /parks`; only the id matters to the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct ParkRecord {
    /// Park id
    pub id: ParkId,
    /// Display name
    #[serde(default)]
    pub name: String,
}

/// Campsite as serialized by the park API.
#[derive(Debug, Clone, Deserialize)]
pub struct CampsiteRecord {
    /// Campsite id
    pub id: CampsiteId,
    /// Park id
    pub park_id: ParkId,
    /// Display name
    pub name: String,
    /// Elevation in feet
    #[serde(default)]
    pub elevation: Option<i32>,
    /// Potable water on site
    #[serde(default)]
    pub has_water: bool,
    /// Toilets on site
    #[serde(default)]
    pub has_toilets: bool,
    /// Maximum number of campers
    #[serde(default)]
    pub max_occupancy: Option<u32>,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Raw booking-open timestamp, naive timestamps are UTC
    #[serde(default)]
    pub booking_opens: Option<String>,
}

impl TryFrom<CampsiteRecord> for Campsite {
    type Error = BookingWindowError;

    fn try_from(record: CampsiteRecord) -> Result<Self, Self::Error> {
        let booking_opens_at = match record.booking_opens.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(parse_instant(raw)?),
            _ => None,
        };

        Ok(Self {
            id: record.id,
            park_id: record.park_id,
            name: record.name,
            elevation: record.elevation,
            amenities: Amenities {
                has_water: record.has_water,
                has_toilets: record.has_toilets,
                max_occupancy: record.max_occupancy,
            },
            description: record.description,
            booking_opens_at,
        })
    }
}

/// Ordered catalog contents with lookup by id.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    campsites: Vec<Campsite>,
    by_id: HashMap<CampsiteId, usize>,
}

impl CatalogSnapshot {
    /// Builds a snapshot. A later duplicate id replaces the earlier record in place.
    pub fn new(campsites: Vec<Campsite>) -> Self {
        let mut snapshot = Self::default();
        for campsite in campsites {
            match snapshot.by_id.get(&campsite.id) {
                Some(&index) => snapshot.campsites[index] = campsite,
                None => {
                    snapshot
                        .by_id
                        .insert(campsite.id.clone(), snapshot.campsites.len());
                    snapshot.campsites.push(campsite);
                }
            }
        }
        snapshot
    }

    /// Looks up a campsite by id.
    pub fn get(&self, id: &CampsiteId) -> Option<&Campsite> {
        self.by_id.get(id).map(|&index| &self.campsites[index])
    }

    /// Campsites in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &Campsite> {
        self.campsites.iter()
    }

    /// Number of campsites.
    pub fn len(&self) -> usize {
        self.campsites.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.campsites.is_empty()
    }
}
