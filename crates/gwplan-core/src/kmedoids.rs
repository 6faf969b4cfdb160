//! K-Medoids clustering with k-means++ seeding.
//!
//! Medoids are always real devices, except fixed gateways which keep their
//! own coordinates and never move. Members are tracked as indices into the
//! device slice.

use gwplan_geo::GeoPoint;
use gwplan_proto::types::{Device, Gateway};
use rand::Rng;
use tracing::{debug, info};

use crate::config::PlannerConfig;
use crate::error::{PlanError, PlanResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Medoid {
    pub gateway: Gateway,
    /// Index of the device the gateway sits on; `None` for fixed gateways.
    pub device: Option<usize>,
}

impl Medoid {
    fn fixed(gateway: &Gateway) -> Self {
        Self { gateway: gateway.clone(), device: None }
    }

    fn on_device(devices: &[Device], i: usize) -> Self {
        let d = &devices[i];
        Self {
            gateway: Gateway { id: d.id.clone(), lat: d.lat, lng: d.lng, is_fixed: false },
            device: Some(i),
        }
    }

    pub fn point(&self) -> GeoPoint {
        self.gateway.point()
    }
}

#[derive(Debug, Clone)]
pub struct Clustering {
    pub medoids: Vec<Medoid>,
    /// Member device indices per medoid, same order as `medoids`.
    pub members: Vec<Vec<usize>>,
    pub unassigned: Vec<usize>,
    pub iterations: usize,
    pub converged: bool,
}

pub fn k_medoids<R: Rng + ?Sized>(
    devices: &[Device],
    k: usize,
    fixed: &[Gateway],
    cfg: &PlannerConfig,
    rng: &mut R,
) -> PlanResult<Clustering> {
    let points: Vec<GeoPoint> = devices.iter().map(Device::point).collect();
    let mut medoids = seed(devices, &points, k, fixed, cfg, rng)?;
    info!(k = medoids.len(), fixed = fixed.len(), "k-medoids: seeded");

    let (mut members, mut unassigned) = assign(&points, &medoids, cfg.max_devices_per_gateway);
    let mut iterations = 0;
    let mut converged = false;
    while iterations < cfg.max_iterations.max(1) {
        iterations += 1;
        let moved = update(devices, &points, &mut medoids, &members, cfg);
        debug!(iteration = iterations, moved, unassigned = unassigned.len(), "k-medoids: round");
        if moved == 0 {
            converged = true;
            break;
        }
        (members, unassigned) = assign(&points, &medoids, cfg.max_devices_per_gateway);
    }

    info!(iterations, converged, unassigned = unassigned.len(), "k-medoids: done");
    Ok(Clustering { medoids, members, unassigned, iterations, converged })
}

/// k-means++ seeding. Fixed gateways take the first slots, then each new
/// medoid is drawn with probability proportional to its squared distance to
/// the closest medoid chosen so far, among devices that keep the minimum
/// gateway spacing.
pub fn seed<R: Rng + ?Sized>(
    devices: &[Device],
    points: &[GeoPoint],
    k: usize,
    fixed: &[Gateway],
    cfg: &PlannerConfig,
    rng: &mut R,
) -> PlanResult<Vec<Medoid>> {
    let mut medoids: Vec<Medoid> = fixed.iter().map(Medoid::fixed).collect();
    let target = k.max(fixed.len());
    let mut chosen = vec![false; points.len()];
    let mut nearest: Vec<f64> = points
        .iter()
        .map(|p| medoids.iter().map(|m| p.distance_m(&m.point())).fold(f64::INFINITY, f64::min))
        .collect();

    while medoids.len() < target {
        let eligible: Vec<usize> = (0..points.len())
            .filter(|&i| !chosen[i] && nearest[i] >= cfg.min_gateway_distance)
            .collect();
        if eligible.is_empty() {
            return Err(PlanError::SeedingExhausted {
                slot: medoids.len() + 1,
                k: target,
                min_distance_m: cfg.min_gateway_distance,
            });
        }

        let pick = if medoids.is_empty() {
            eligible[rng.gen_range(0..eligible.len())]
        } else {
            let total: f64 = eligible.iter().map(|&i| nearest[i].powi(2)).sum();
            if total > 0.0 && total.is_finite() {
                let target_w = rng.gen::<f64>() * total;
                let mut acc = 0.0;
                let mut pick = eligible[eligible.len() - 1];
                for &i in &eligible {
                    acc += nearest[i].powi(2);
                    if acc >= target_w {
                        pick = i;
                        break;
                    }
                }
                pick
            } else {
                debug!(slot = medoids.len() + 1, "k-means++: zero total weight, uniform pick");
                eligible[rng.gen_range(0..eligible.len())]
            }
        };

        chosen[pick] = true;
        let p = points[pick];
        for (i, q) in points.iter().enumerate() {
            nearest[i] = nearest[i].min(p.distance_m(q));
        }
        medoids.push(Medoid::on_device(devices, pick));
    }
    Ok(medoids)
}

/// Nearest-medoid assignment under the per-gateway capacity.
///
/// Devices carrying a medoid join their own cluster first. Every other device
/// goes, in input order, to the nearest medoid that still has room; on equal
/// distance the lower medoid index wins, so results depend on medoid order.
pub fn assign(
    points: &[GeoPoint],
    medoids: &[Medoid],
    cap: usize,
) -> (Vec<Vec<usize>>, Vec<usize>) {
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); medoids.len()];
    let mut placed = vec![false; points.len()];
    if cap > 0 {
        for (mi, m) in medoids.iter().enumerate() {
            if let Some(d) = m.device {
                members[mi].push(d);
                placed[d] = true;
            }
        }
    }

    let centers: Vec<GeoPoint> = medoids.iter().map(Medoid::point).collect();
    let mut unassigned = Vec::new();
    for (i, p) in points.iter().enumerate() {
        if placed[i] {
            continue;
        }
        let mut best: Option<(usize, f64)> = None;
        for (mi, c) in centers.iter().enumerate() {
            if members[mi].len() >= cap {
                continue;
            }
            let d = p.distance_m(c);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((mi, d));
            }
        }
        match best {
            Some((mi, _)) => members[mi].push(i),
            None => unassigned.push(i),
        }
    }
    (members, unassigned)
}

/// Moves each movable medoid to the member with the smallest total distance
/// to the rest of its cluster, skipping members that would sit closer than
/// the minimum spacing to another medoid. Returns how many medoids moved.
pub fn update(
    devices: &[Device],
    points: &[GeoPoint],
    medoids: &mut [Medoid],
    members: &[Vec<usize>],
    cfg: &PlannerConfig,
) -> usize {
    let mut moved = 0;
    for mi in 0..medoids.len() {
        if medoids[mi].gateway.is_fixed || members[mi].is_empty() {
            continue;
        }
        let mut best: Option<(usize, f64)> = None;
        for &cand in &members[mi] {
            let cp = points[cand];
            let separated = medoids
                .iter()
                .enumerate()
                .all(|(oj, o)| oj == mi || cp.distance_m(&o.point()) >= cfg.min_gateway_distance);
            if !separated {
                continue;
            }
            let total: f64 = members[mi].iter().map(|&j| cp.distance_m(&points[j])).sum();
            if best.map_or(true, |(_, bt)| total < bt) {
                best = Some((cand, total));
            }
        }
        if let Some((cand, _)) = best {
            if medoids[mi].device != Some(cand) {
                medoids[mi] = Medoid::on_device(devices, cand);
                moved += 1;
            }
        }
    }
    moved
}
