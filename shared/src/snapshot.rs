use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::colors::ParcelColor;
use crate::geometry::ParcelGeometry;
use crate::parcel::{OwnerInfo, ParcelId};

/// Durable-store key holding the click collection (records with owner data).
pub const DURABLE_STORE_KEY: &str = "parcelData";

/// Session-cache key holding the search collection snapshot.
pub const SESSION_STORE_KEY: &str = "searchParcels";

/// One click-collection record as written to the durable store. Visual
/// handles never serialize; they are rebuilt by the projector on restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurableParcelRecord {
    pub id: ParcelId,
    pub geometry: ParcelGeometry,
    #[serde(default)]
    pub properties: serde_json::Value,
    pub display_label: String,
    #[serde(default)]
    pub color: ParcelColor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_info: Option<OwnerInfo>,
    pub saved_at: DateTime<Utc>,
}

/// One search-collection record as written to the session cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionParcelRecord {
    pub id: ParcelId,
    pub geometry: ParcelGeometry,
    #[serde(default)]
    pub properties: serde_json::Value,
    pub display_label: String,
    #[serde(default)]
    pub color: ParcelColor,
    /// Epoch milliseconds at save time.
    pub timestamp: i64,
}

/// Page-lifetime snapshot of the search collection, keyed by parcel id.
/// Sealed with a CRC32 over the serialized map; a mismatch on load means the
/// cache was truncated or hand-edited and the snapshot is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub parcels: BTreeMap<String, SessionParcelRecord>,
    pub checksum: u32,
}

impl SessionSnapshot {
    pub fn seal(parcels: BTreeMap<String, SessionParcelRecord>) -> Self {
        let checksum = checksum_of(&parcels);
        SessionSnapshot { parcels, checksum }
    }

    pub fn verify(&self) -> bool {
        self.checksum == checksum_of(&self.parcels)
    }
}

fn checksum_of(parcels: &BTreeMap<String, SessionParcelRecord>) -> u32 {
    serde_json::to_vec(parcels)
        .map(|bytes| crc32fast::hash(&bytes))
        .unwrap_or(0)
}
