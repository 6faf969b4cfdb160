//! GeoJSON map layer handed to the map-rendering collaborator.

use serde::{Deserialize, Serialize};

use crate::types::GatewayStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { kind: "FeatureCollection".into(), features }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

impl Feature {
    pub fn point(lat: f64, lng: f64, properties: FeatureProperties) -> Self {
        Self {
            kind: "Feature".into(),
            // GeoJSON positions are [longitude, latitude]
            geometry: Geometry { kind: "Point".into(), coordinates: [lng, lat] },
            properties,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FeatureProperties {
    Post {
        id: String,
        gateway: Option<String>,
        outlier: bool,
        duplicate: bool,
    },
    Gateway {
        id: String,
        status: GatewayStatus,
        device_count: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_feature_uses_lng_lat_order() {
        let f = Feature::point(
            -23.5,
            -46.6,
            FeatureProperties::Gateway {
                id: "GW1".into(),
                status: GatewayStatus::New,
                device_count: 3,
            },
        );
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v["type"], "Feature");
        assert_eq!(v["geometry"]["coordinates"][0], -46.6);
        assert_eq!(v["properties"]["kind"], "gateway");
        assert_eq!(v["properties"]["status"], "NEW");
    }
}
