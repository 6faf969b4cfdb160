use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),
}

/// A coordinate as it arrives from a spreadsheet row: either already numeric
/// or a string that may use a comma as decimal separator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoordinateValue {
    Number(f64),
    Text(String),
}

impl From<f64> for CoordinateValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for CoordinateValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl CoordinateValue {
    /// True when the value is text written with a decimal comma.
    pub fn uses_decimal_comma(&self) -> bool {
        matches!(self, Self::Text(s) if s.contains(','))
    }
}

pub fn normalize_coordinate(value: &CoordinateValue) -> Result<f64, CoordinateError> {
    let v = match value {
        CoordinateValue::Number(n) => *n,
        CoordinateValue::Text(s) => s
            .trim()
            .replacen(',', ".", 1)
            .parse::<f64>()
            .map_err(|_| CoordinateError::InvalidCoordinate(s.clone()))?,
    };
    if !v.is_finite() {
        return Err(CoordinateError::InvalidCoordinate(format!("{}", v)));
    }
    Ok(v)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        haversine_m(self.lat, self.lng, other.lat, other.lng)
    }
}

pub fn distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    a.distance_m(b)
}

pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Axis-aligned box in degrees, x = longitude, y = latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn from_point(p: GeoPoint) -> Self {
        Self { min_lng: p.lng, min_lat: p.lat, max_lng: p.lng, max_lat: p.lat }
    }

    pub fn empty() -> Self {
        Self {
            min_lng: f64::INFINITY,
            min_lat: f64::INFINITY,
            max_lng: f64::NEG_INFINITY,
            max_lat: f64::NEG_INFINITY,
        }
    }

    pub fn extend(&mut self, other: &BoundingBox) {
        self.min_lng = self.min_lng.min(other.min_lng);
        self.min_lat = self.min_lat.min(other.min_lat);
        self.max_lng = self.max_lng.max(other.max_lng);
        self.max_lat = self.max_lat.max(other.max_lat);
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lng <= other.max_lng
            && self.max_lng >= other.min_lng
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        p.lng >= self.min_lng
            && p.lng <= self.max_lng
            && p.lat >= self.min_lat
            && p.lat <= self.max_lat
    }

    /// True when the box spans the whole globe, i.e. widening it further finds nothing new.
    pub fn is_global(&self) -> bool {
        self.min_lat <= -90.0
            && self.max_lat >= 90.0
            && self.min_lng <= -180.0
            && self.max_lng >= 180.0
    }
}

/// Smallest lat/lng box holding every point within `radius_m` great-circle
/// meters of the center. The longitude half-width widens with latitude and
/// covers the full circle once the cap reaches a pole.
///
/// Longitudes are clamped to [-180, 180]; use [`search_windows`] when the
/// circle may cross the antimeridian.
pub fn search_window(center: GeoPoint, radius_m: f64) -> BoundingBox {
    let (min_lat, max_lat, dlng) = window_extent(center, radius_m);
    if dlng >= 180.0 {
        return BoundingBox { min_lng: -180.0, min_lat, max_lng: 180.0, max_lat };
    }
    BoundingBox {
        min_lng: (center.lng - dlng).max(-180.0),
        min_lat,
        max_lng: (center.lng + dlng).min(180.0),
        max_lat,
    }
}

/// [`search_window`] plus the part of the circle that wraps past +/-180
/// degrees, if any. Together the boxes hold every point within `radius_m`.
pub fn search_windows(center: GeoPoint, radius_m: f64) -> Vec<BoundingBox> {
    let mut out = vec![search_window(center, radius_m)];
    let (min_lat, max_lat, dlng) = window_extent(center, radius_m);
    if dlng >= 180.0 {
        return out;
    }
    let (west, east) = (center.lng - dlng, center.lng + dlng);
    if west < -180.0 {
        out.push(BoundingBox { min_lng: west + 360.0, min_lat, max_lng: 180.0, max_lat });
    }
    if east > 180.0 {
        out.push(BoundingBox { min_lng: -180.0, min_lat, max_lng: east - 360.0, max_lat });
    }
    out
}

// (min_lat, max_lat, longitude half-width); the half-width is 180 once a pole is inside.
fn window_extent(center: GeoPoint, radius_m: f64) -> (f64, f64, f64) {
    let ang = (radius_m.max(0.0) / EARTH_RADIUS_M).min(std::f64::consts::PI);
    let dlat = ang.to_degrees();
    let min_lat = center.lat - dlat;
    let max_lat = center.lat + dlat;
    if min_lat <= -90.0 || max_lat >= 90.0 {
        return (min_lat.max(-90.0), max_lat.min(90.0), 180.0);
    }
    let ratio = ang.sin() / center.lat.to_radians().cos();
    let dlng = if ratio >= 1.0 { 180.0 } else { ratio.asin().to_degrees() };
    (min_lat, max_lat, dlng)
}

/// Offset a point by metric east/north displacements on a local plane.
pub fn offset_m(origin: GeoPoint, east_m: f64, north_m: f64) -> GeoPoint {
    let dlat = (north_m / EARTH_RADIUS_M).to_degrees();
    let dlng = (east_m / (EARTH_RADIUS_M * origin.lat.to_radians().cos())).to_degrees();
    GeoPoint::new(origin.lat + dlat, origin.lng + dlng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_and_point_decimals_agree() {
        let a = normalize_coordinate(&"40,5".into()).unwrap();
        let b = normalize_coordinate(&"40.5".into()).unwrap();
        assert_eq!(a, 40.5);
        assert_eq!(a, b);
        assert_eq!(normalize_coordinate(&40.5.into()).unwrap(), 40.5);
    }

    #[test]
    fn garbage_coordinate_is_rejected() {
        let err = normalize_coordinate(&"abc".into()).unwrap_err();
        assert_eq!(err, CoordinateError::InvalidCoordinate("abc".into()));
        assert!(normalize_coordinate(&CoordinateValue::Number(f64::NAN)).is_err());
        assert!(normalize_coordinate(&"".into()).is_err());
    }

    #[test]
    fn negative_comma_coordinate() {
        assert_eq!(normalize_coordinate(&" -23,5505 ".into()).unwrap(), -23.5505);
    }

    #[test]
    fn distance_is_zero_on_self_and_symmetric() {
        let p = GeoPoint::new(-23.55, -46.63);
        let q = GeoPoint::new(-22.90, -43.17);
        assert_eq!(distance(&p, &p), 0.0);
        assert_eq!(distance(&p, &q), distance(&q, &p));
        // Sao Paulo - Rio de Janeiro is roughly 360 km
        let d = distance(&p, &q);
        assert!(d > 350_000.0 && d < 370_000.0, "d = {}", d);
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.9).abs() < 1.0, "d = {}", d);
    }

    #[test]
    fn window_holds_points_on_the_circle() {
        for lat in [0.0, 45.0, -60.0, 80.0] {
            let c = GeoPoint::new(lat, 10.0);
            let w = search_window(c, 150.0);
            for bearing in 0..36 {
                let theta = (bearing as f64 * 10.0).to_radians();
                let p = offset_m(c, 149.0 * theta.sin(), 149.0 * theta.cos());
                if c.distance_m(&p) <= 150.0 {
                    assert!(w.contains(&p), "lat {} bearing {}", lat, bearing * 10);
                }
            }
        }
    }

    #[test]
    fn window_scales_with_radius() {
        let c = GeoPoint::new(-23.0, -46.0);
        let small = search_window(c, 150.0);
        let large = search_window(c, 1500.0);
        assert!(large.max_lat - large.min_lat > 9.0 * (small.max_lat - small.min_lat));
        assert!(large.max_lng - large.min_lng > 9.0 * (small.max_lng - small.min_lng));
    }

    #[test]
    fn window_near_pole_spans_all_longitudes() {
        let w = search_window(GeoPoint::new(89.999, 0.0), 500.0);
        assert_eq!(w.min_lng, -180.0);
        assert_eq!(w.max_lng, 180.0);
        assert_eq!(w.max_lat, 90.0);
        assert_eq!(search_windows(GeoPoint::new(89.999, 0.0), 500.0).len(), 1);
    }

    #[test]
    fn window_wraps_past_the_antimeridian() {
        let east = GeoPoint::new(0.0, 179.9995);
        let west = GeoPoint::new(0.0, -179.9995);
        assert!(east.distance_m(&west) < 120.0);
        assert!(!search_window(east, 150.0).contains(&west));

        let ws = search_windows(east, 150.0);
        assert_eq!(ws.len(), 2);
        assert!(ws.iter().any(|w| w.contains(&west)));
        assert_eq!(search_windows(GeoPoint::new(0.0, 10.0), 150.0).len(), 1);
    }
}
