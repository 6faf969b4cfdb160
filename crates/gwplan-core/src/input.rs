//! Normalization and deduplication of the device rows handed to the planner.

use std::collections::HashMap;

use gwplan_geo::normalize_coordinate;
use gwplan_proto::types::{Device, DuplicateGroup, Gateway, RawDevice};
use tracing::{info, warn};

use crate::error::{PlanError, PlanResult};

#[derive(Debug, Clone)]
pub struct PreparedDevices {
    /// Every normalized row, duplicates included, in input order.
    pub all: Vec<Device>,
    /// One device per distinct coordinate; the clustering input.
    pub unique: Vec<Device>,
    pub duplicates: Vec<DuplicateGroup>,
    /// Rows whose coordinates were written with a decimal comma.
    pub comma_normalized: usize,
}

impl PreparedDevices {
    /// Number of rows dropped by deduplication.
    pub fn duplicate_count(&self) -> usize {
        self.all.len() - self.unique.len()
    }
}

fn normalize_row(row: &RawDevice) -> PlanResult<(f64, f64)> {
    if row.id.trim().is_empty() {
        return Err(PlanError::Input("device with empty id".into()));
    }
    let lat = normalize_coordinate(&row.lat)
        .map_err(|source| PlanError::InvalidCoordinate { id: row.id.clone(), source })?;
    let lng = normalize_coordinate(&row.lng)
        .map_err(|source| PlanError::InvalidCoordinate { id: row.id.clone(), source })?;
    if lat.abs() > 90.0 || lng.abs() > 180.0 {
        return Err(PlanError::Input(format!(
            "device {}: coordinates out of range ({}, {})",
            row.id, lat, lng
        )));
    }
    Ok((lat, lng))
}

// -0.0 and 0.0 are the same place
fn coord_key(lat: f64, lng: f64) -> (u64, u64) {
    ((lat + 0.0).to_bits(), (lng + 0.0).to_bits())
}

pub fn prepare_devices(rows: &[RawDevice]) -> PlanResult<PreparedDevices> {
    if rows.is_empty() {
        return Err(PlanError::Input("device set is empty".into()));
    }

    let mut all = Vec::with_capacity(rows.len());
    let mut comma_normalized = 0;
    for row in rows {
        let (lat, lng) = normalize_row(row)?;
        if row.lat.uses_decimal_comma() || row.lng.uses_decimal_comma() {
            comma_normalized += 1;
        }
        all.push(Device::new(row.id.clone(), lat, lng));
    }

    let mut groups: Vec<DuplicateGroup> = Vec::new();
    let mut by_coord: HashMap<(u64, u64), usize> = HashMap::new();
    let mut unique = Vec::new();
    for d in &all {
        match by_coord.get(&coord_key(d.lat, d.lng)) {
            Some(&g) => groups[g].ids.push(d.id.clone()),
            None => {
                by_coord.insert(coord_key(d.lat, d.lng), groups.len());
                groups.push(DuplicateGroup { lat: d.lat, lng: d.lng, ids: vec![d.id.clone()] });
                unique.push(d.clone());
            }
        }
    }

    let duplicates: Vec<DuplicateGroup> = groups.into_iter().filter(|g| g.ids.len() > 1).collect();
    for g in &duplicates {
        warn!(
            "duplicate coordinates ({}, {}): {} devices ({}); keeping {}",
            g.lat,
            g.lng,
            g.ids.len(),
            g.ids.join(", "),
            g.ids[0]
        );
    }
    info!(
        rows = all.len(),
        unique = unique.len(),
        comma_normalized,
        "devices normalized"
    );

    Ok(PreparedDevices { all, unique, duplicates, comma_normalized })
}

pub fn prepare_fixed(rows: &[RawDevice]) -> PlanResult<Vec<Gateway>> {
    rows.iter()
        .map(|row| {
            let (lat, lng) = normalize_row(row)?;
            Ok(Gateway { id: row.id.clone(), lat, lng, is_fixed: true })
        })
        .collect()
}
