//! Isolation-based outlier filter.

use gwplan_geo::{GeoPoint, SpatialIndex};
use gwplan_proto::types::{Device, OutlierRow};
use tracing::{info, warn};

use crate::config::PlannerConfig;
use crate::error::{PlanError, PlanResult};

#[derive(Debug, Clone)]
pub struct OutlierFilter {
    pub kept: Vec<Device>,
    pub outliers: Vec<OutlierRow>,
    pub median_m: f64,
    pub std_dev_m: f64,
    pub threshold_m: f64,
}

/// Distance from each device to its closest neighbor, meters.
pub fn nearest_neighbor_distances(devices: &[Device], start_radius_m: f64) -> Vec<f64> {
    let points: Vec<GeoPoint> = devices.iter().map(Device::point).collect();
    let index = SpatialIndex::bulk_load(&points);
    (0..points.len())
        .map(|i| index.nearest_other_distance(i, start_radius_m).unwrap_or(0.0))
        .collect()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 { (v[mid - 1] + v[mid]) / 2.0 } else { v[mid] }
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Drops devices whose nearest neighbor is farther than
/// `max(median + 3 * stddev, 2 * min_gateway_distance)`.
///
/// The statistics are recomputed on the survivors until a pass flags nothing
/// new, so filtering the kept set again never finds another outlier.
pub fn filter_outliers(devices: &[Device], cfg: &PlannerConfig) -> PlanResult<OutlierFilter> {
    let mut remaining: Vec<usize> = (0..devices.len()).collect();
    let mut isolation_of: Vec<Option<f64>> = vec![None; devices.len()];
    let mut passes = 0;
    let (median_m, std_dev_m, threshold_m) = loop {
        passes += 1;
        let subset: Vec<Device> = remaining.iter().map(|&i| devices[i].clone()).collect();
        let isolation = nearest_neighbor_distances(&subset, cfg.hop_distance);
        let median_m = median(&isolation);
        let std_dev_m = std_dev(&isolation);
        let threshold_m = (median_m + 3.0 * std_dev_m).max(2.0 * cfg.min_gateway_distance);

        let before = remaining.len();
        let mut survivors = Vec::with_capacity(before);
        for (&i, &iso) in remaining.iter().zip(&isolation) {
            if iso > threshold_m {
                let d = &devices[i];
                warn!(
                    pass = passes,
                    "outlier: device {} is {:.0} m from its nearest neighbor (threshold {:.0} m)",
                    d.id,
                    iso,
                    threshold_m
                );
                isolation_of[i] = Some(iso);
            } else {
                survivors.push(i);
            }
        }
        remaining = survivors;
        if remaining.is_empty() {
            return Err(PlanError::NoServiceableDevices(devices.len()));
        }
        if remaining.len() == before {
            break (median_m, std_dev_m, threshold_m);
        }
    };

    let kept: Vec<Device> = remaining.iter().map(|&i| devices[i].clone()).collect();
    let outliers: Vec<OutlierRow> = devices
        .iter()
        .zip(&isolation_of)
        .filter_map(|(d, iso)| {
            iso.map(|isolation_m| OutlierRow {
                id: d.id.clone(),
                lat: d.lat,
                lng: d.lng,
                isolation_m,
            })
        })
        .collect();
    info!(
        kept = kept.len(),
        outliers = outliers.len(),
        passes,
        median_m,
        std_dev_m,
        threshold_m,
        "outlier filter"
    );
    Ok(OutlierFilter { kept, outliers, median_m, std_dev_m, threshold_m })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwplan_geo::geo::offset_m;

    fn grid_with_far_point(far_m: f64) -> Vec<Device> {
        let o = GeoPoint::new(-15.79, -47.88);
        let mut out = Vec::new();
        for r in 0..10 {
            for c in 0..10 {
                let p = offset_m(o, c as f64 * 50.0, r as f64 * 50.0);
                out.push(Device::new(format!("P{}", r * 10 + c), p.lat, p.lng));
            }
        }
        let p = offset_m(o, far_m, far_m);
        out.push(Device::new("LONELY", p.lat, p.lng));
        out
    }

    #[test]
    fn statistics_helpers() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0);
    }

    #[test]
    fn isolated_device_is_reported() {
        let devices = grid_with_far_point(5_000.0);
        let f = filter_outliers(&devices, &PlannerConfig::default()).unwrap();
        assert_eq!(f.outliers.len(), 1);
        assert_eq!(f.outliers[0].id, "LONELY");
        assert!(f.outliers[0].isolation_m > 6_000.0);
        assert_eq!(f.kept.len(), 100);
        assert!(f.kept.iter().all(|d| d.id != "LONELY"));
    }

    #[test]
    fn floor_protects_moderately_spaced_devices() {
        // ~495 m from the grid: beyond median + 3 sd, but under 2 x 300 m
        let devices = grid_with_far_point(800.0);
        let f = filter_outliers(&devices, &PlannerConfig::default()).unwrap();
        assert!(f.outliers.is_empty());
        assert_eq!(f.threshold_m, 600.0);
    }

    #[test]
    fn filtering_the_kept_set_again_finds_nothing_new() {
        // FAR inflates the spread so MID only stands out once FAR is gone
        let o = GeoPoint::new(-15.79, -47.88);
        let mut devices = grid_with_far_point(10_000.0);
        let mid = offset_m(o, 450.0 + 700.0, 0.0);
        devices.push(Device::new("MID", mid.lat, mid.lng));

        let cfg = PlannerConfig::default();
        let first = filter_outliers(&devices, &cfg).unwrap();
        let mut ids: Vec<&str> = first.outliers.iter().map(|o| o.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["LONELY", "MID"]);
        assert_eq!(first.kept.len(), 100);
        let mid_row = first.outliers.iter().find(|o| o.id == "MID").unwrap();
        assert!((mid_row.isolation_m - 700.0).abs() < 5.0, "isolation {}", mid_row.isolation_m);

        let second = filter_outliers(&first.kept, &cfg).unwrap();
        assert!(second.outliers.is_empty(), "{:?}", second.outliers);
        assert_eq!(second.kept.len(), first.kept.len());
        assert_eq!(second.threshold_m, first.threshold_m);
    }

    #[test]
    fn single_device_is_serviceable() {
        let devices = vec![Device::new("ONLY", 1.0, 1.0)];
        let f = filter_outliers(&devices, &PlannerConfig::default()).unwrap();
        assert_eq!(f.kept.len(), 1);
    }

    #[test]
    fn empty_input_has_no_serviceable_devices() {
        let err = filter_outliers(&[], &PlannerConfig::default()).unwrap_err();
        assert!(matches!(err, PlanError::NoServiceableDevices(0)));
    }
}
