pub mod geo;
pub mod spatial;

pub use geo::{
    distance, haversine_m, normalize_coordinate, search_window, search_windows, BoundingBox,
    CoordinateError, CoordinateValue, GeoPoint,
};
pub use spatial::SpatialIndex;
