use gwplan_geo::{CoordinateValue, GeoPoint};
use serde::{Deserialize, Serialize};

/// One row as handed over by the input collaborator, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDevice {
    pub id: String,
    pub lat: CoordinateValue,
    pub lng: CoordinateValue,
}

impl RawDevice {
    pub fn new(
        id: impl Into<String>,
        lat: impl Into<CoordinateValue>,
        lng: impl Into<CoordinateValue>,
    ) -> Self {
        Self { id: id.into(), lat: lat.into(), lng: lng.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
}

impl Device {
    pub fn new(id: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self { id: id.into(), lat, lng }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gateway {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub is_fixed: bool,
}

impl Gateway {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    pub fn status(&self) -> GatewayStatus {
        if self.is_fixed { GatewayStatus::Fixed } else { GatewayStatus::New }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayStatus {
    Fixed,
    New,
}

impl std::fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayStatus::Fixed => f.write_str("FIXED"),
            GatewayStatus::New => f.write_str("NEW"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRow {
    pub gateway_id: String,
    pub lat: f64,
    pub lng: f64,
    pub status: GatewayStatus,
    pub device_count: usize,
    pub assigned_devices: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierRow {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub isolation_m: f64,
}

/// Devices found at the exact same coordinate; `ids[0]` is the one kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub lat: f64,
    pub lng: f64,
    pub ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_device_accepts_numbers_and_strings() {
        let rows: Vec<RawDevice> =
            serde_json::from_str(r#"[{"id":"P1","lat":-23.5,"lng":"-46,6"}]"#).unwrap();
        assert_eq!(rows[0].lat, CoordinateValue::Number(-23.5));
        assert_eq!(rows[0].lng, CoordinateValue::Text("-46,6".into()));
    }

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&GatewayStatus::Fixed).unwrap(), "\"FIXED\"");
        assert_eq!(GatewayStatus::New.to_string(), "NEW");
    }
}
