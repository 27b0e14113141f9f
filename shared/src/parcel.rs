use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::ParcelGeometry;

/// Stable cadastral parcel identifier (PNU). Unique within one tracked
/// collection; the same physical parcel may carry both a search record and a
/// click record at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParcelId(String);

impl ParcelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParcelId {
    fn from(value: &str) -> Self {
        ParcelId(value.to_string())
    }
}

impl From<String> for ParcelId {
    fn from(value: String) -> Self {
        ParcelId(value)
    }
}

impl std::fmt::Display for ParcelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// User-entered annotation data. Present only after an explicit save; its
/// presence is what promotes a record from ephemeral to durable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub saved_at: DateTime<Utc>,
}

/// One parcel as returned by the lookup provider: identity, outline and the
/// raw attribute bag (opaque to the registry, consumed only by the label
/// formatter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelFeature {
    pub id: ParcelId,
    pub geometry: ParcelGeometry,
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl ParcelFeature {
    /// Lenient parse of one GeoJSON feature. Features without a usable PNU
    /// or polygonal geometry yield `None` (the provider occasionally returns
    /// administrative shapes with no parcel identity).
    pub fn from_geojson_feature(value: &serde_json::Value) -> Option<Self> {
        let properties = value.get("properties")?.clone();
        let id = pnu_property(&properties)?;
        let geometry = ParcelGeometry::from_geojson(value.get("geometry")?)?;
        Some(ParcelFeature {
            id,
            geometry,
            properties,
        })
    }

    /// First parsable feature of a provider feature collection, or `None`
    /// when the collection is empty (the not-found signal).
    pub fn first_of_collection(value: &serde_json::Value) -> Option<Self> {
        value
            .get("features")?
            .as_array()?
            .iter()
            .find_map(Self::from_geojson_feature)
    }
}

fn pnu_property(properties: &serde_json::Value) -> Option<ParcelId> {
    for key in ["pnu", "PNU"] {
        match properties.get(key) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                return Some(ParcelId::from(s.trim()));
            }
            Some(serde_json::Value::Number(n)) => {
                return Some(ParcelId::from(n.to_string()));
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::ParcelFeature;

    fn feature_json(pnu: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "type": "Feature",
            "properties": { "pnu": pnu, "addr": "서울특별시 종로구 사직동 344-1" },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[126.97, 37.57], [126.98, 37.57], [126.98, 37.58]]]
            }
        })
    }

    #[test]
    fn parses_provider_feature() {
        let value = feature_json(serde_json::json!("1111012900103440001"));
        let feature = ParcelFeature::from_geojson_feature(&value).expect("feature should parse");
        assert_eq!(feature.id.as_str(), "1111012900103440001");
        assert!(feature.geometry.is_renderable());
    }

    #[test]
    fn accepts_numeric_pnu() {
        let value = feature_json(serde_json::json!(1111012900103440001u64));
        let feature = ParcelFeature::from_geojson_feature(&value).expect("feature should parse");
        assert_eq!(feature.id.as_str(), "1111012900103440001");
    }

    #[test]
    fn rejects_feature_without_pnu() {
        let mut value = feature_json(serde_json::json!(""));
        assert!(ParcelFeature::from_geojson_feature(&value).is_none());

        value["properties"] = serde_json::json!({ "addr": "어딘가" });
        assert!(ParcelFeature::from_geojson_feature(&value).is_none());
    }

    #[test]
    fn first_of_collection_skips_unparsable_features() {
        let collection = serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": {}, "geometry": null },
                feature_json(serde_json::json!("1111012900103440001")),
            ]
        });
        let feature =
            ParcelFeature::first_of_collection(&collection).expect("second feature should parse");
        assert_eq!(feature.id.as_str(), "1111012900103440001");
    }

    #[test]
    fn empty_collection_is_not_found() {
        let collection = serde_json::json!({ "type": "FeatureCollection", "features": [] });
        assert!(ParcelFeature::first_of_collection(&collection).is_none());
    }
}
