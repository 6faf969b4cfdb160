//! Per-cluster hop and relay-load checks.
//!
//! A [`ValidationUnit`] owns copies of everything it reads, so units can run
//! on separate threads without sharing state.

use std::collections::VecDeque;

use gwplan_geo::GeoPoint;
use gwplan_proto::types::{Device, Gateway};

use crate::config::PlannerConfig;
use crate::graph::ConnectivityGraph;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<String>,
    /// Hop count per member, aligned with the cluster's member order.
    /// `None` for members the traversal never reached.
    pub distances: Vec<Option<u32>>,
    pub max_depth: u32,
    pub max_relay_load: usize,
}

impl ValidationResult {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            distances: Vec::new(),
            max_depth: 0,
            max_relay_load: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationUnit {
    pub members: Vec<Device>,
    pub gateway: Gateway,
    pub config: PlannerConfig,
}

impl ValidationUnit {
    pub fn run(&self) -> ValidationResult {
        validate_cluster(&self.members, &self.gateway, &self.config)
    }
}

/// Breadth-first traversal from the gateway over the cluster's own
/// connectivity subgraph.
///
/// A movable gateway sits on one of its members and that member is the root.
/// A fixed gateway is added as an extra root node at its own coordinate.
pub fn validate_cluster(
    members: &[Device],
    gateway: &Gateway,
    cfg: &PlannerConfig,
) -> ValidationResult {
    let mut points: Vec<GeoPoint> = members.iter().map(Device::point).collect();
    let on_member = if gateway.is_fixed {
        None
    } else {
        members.iter().position(|d| d.lat == gateway.lat && d.lng == gateway.lng)
    };
    let root = match on_member {
        Some(i) => i,
        None => {
            points.push(gateway.point());
            points.len() - 1
        }
    };

    let graph = ConnectivityGraph::build(&points, cfg.hop_distance);
    let mut hops: Vec<Option<u32>> = vec![None; points.len()];
    hops[root] = Some(0);
    let mut queue = VecDeque::from([root]);
    let mut max_depth = 0;
    let mut max_relay_load = 0;

    while let Some(cur) = queue.pop_front() {
        let depth = hops[cur].unwrap_or(0);
        max_depth = max_depth.max(depth);
        let mut load = 0usize;
        for &n in graph.neighbors(cur) {
            if hops[n].is_some() {
                continue;
            }
            hops[n] = Some(depth + 1);
            queue.push_back(n);
            load += 1;
            if cur != root && load > cfg.max_relay_load {
                hops.truncate(members.len());
                return ValidationResult {
                    valid: false,
                    reason: Some(format!(
                        "device {} relays for more than {} devices",
                        members[cur].id, cfg.max_relay_load
                    )),
                    distances: hops,
                    max_depth,
                    max_relay_load: load,
                };
            }
        }
        if cur != root {
            max_relay_load = max_relay_load.max(load);
        }
    }

    hops.truncate(members.len());
    let reason = members.iter().zip(&hops).find_map(|(d, h)| match h {
        None => Some(format!("device {} is unreachable from gateway {}", d.id, gateway.id)),
        Some(h) if *h > cfg.max_hops => Some(format!(
            "device {} is {} hops from gateway {} (max {})",
            d.id, h, gateway.id, cfg.max_hops
        )),
        Some(_) => None,
    });

    ValidationResult { valid: reason.is_none(), reason, distances: hops, max_depth, max_relay_load }
}
