//! Turns a finished [`Plan`] into the artifacts handed to persistence:
//! gateway table, map layer, summary report and outlier report.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use gwplan_proto::map::{Feature, FeatureCollection, FeatureProperties};
use gwplan_proto::types::{GatewayRow, OutlierRow};
use serde::Serialize;

use crate::controller::{CapReason, Plan, PlanOutcome};

pub fn gateway_table(plan: &Plan) -> Vec<GatewayRow> {
    plan.clusters
        .iter()
        .map(|c| GatewayRow {
            gateway_id: c.gateway.id.clone(),
            lat: c.gateway.lat,
            lng: c.gateway.lng,
            status: c.gateway.status(),
            device_count: c.members.len(),
            assigned_devices: c.members.iter().map(|d| d.id.clone()).collect(),
        })
        .collect()
}

pub fn outlier_report(plan: &Plan) -> Vec<OutlierRow> {
    plan.outliers.outliers.clone()
}

/// Every input row as a post, plus every gateway kept in the plan.
///
/// Duplicates inherit the gateway of the device kept at their coordinate.
pub fn map_layer(plan: &Plan) -> FeatureCollection {
    let mut gateway_of: HashMap<&str, &str> = HashMap::new();
    for c in &plan.clusters {
        for d in &c.members {
            gateway_of.insert(d.id.as_str(), c.gateway.id.as_str());
        }
    }
    let mut duplicate_of: HashMap<&str, &str> = HashMap::new();
    for g in &plan.prepared.duplicates {
        for id in &g.ids[1..] {
            duplicate_of.insert(id.as_str(), g.ids[0].as_str());
        }
    }
    let outliers: HashSet<&str> = plan.outliers.outliers.iter().map(|o| o.id.as_str()).collect();

    let mut features = Vec::with_capacity(plan.prepared.all.len() + plan.clusters.len());
    for d in &plan.prepared.all {
        let kept_id = duplicate_of.get(d.id.as_str()).copied().unwrap_or(d.id.as_str());
        features.push(Feature::point(
            d.lat,
            d.lng,
            FeatureProperties::Post {
                id: d.id.clone(),
                gateway: gateway_of.get(kept_id).map(|g| g.to_string()),
                outlier: outliers.contains(kept_id),
                duplicate: duplicate_of.contains_key(d.id.as_str()),
            },
        ));
    }
    for c in &plan.clusters {
        features.push(Feature::point(
            c.gateway.lat,
            c.gateway.lng,
            FeatureProperties::Gateway {
                id: c.gateway.id.clone(),
                status: c.gateway.status(),
                device_count: c.members.len(),
            },
        ));
    }
    FeatureCollection::new(features)
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub outcome: PlanOutcome,
    pub total_devices: usize,
    pub valid_devices: usize,
    pub duplicate_devices: usize,
    /// Rows whose coordinates used a decimal comma.
    pub comma_normalized_devices: usize,
    pub outlier_devices: usize,
    pub serviceable_devices: usize,
    pub initial_gateways: usize,
    pub final_gateways: usize,
    pub fixed_gateways: usize,
    pub new_gateways: usize,
    pub assigned_devices: usize,
    pub unassigned_devices: usize,
    /// Percent of serviceable devices covered by a gateway.
    pub assignment_rate: f64,
    pub rounds: usize,
    pub hop_distance_m: f64,
    pub min_gateway_distance_m: f64,
    pub max_devices_per_gateway: usize,
    pub max_hops: u32,
    pub max_relay_load: usize,
    pub outlier_threshold_m: f64,
    pub alerts: Vec<String>,
}

pub fn summary(plan: &Plan) -> SummaryReport {
    let cfg = &plan.config;
    let serviceable = plan.outliers.kept.len();
    let assigned = plan.assigned_count();
    let fixed_gateways = plan.clusters.iter().filter(|c| c.gateway.is_fixed).count();

    let mut alerts = Vec::new();
    for c in &plan.clusters {
        if c.members.len() > cfg.max_devices_per_gateway {
            alerts.push(format!(
                "CAPACITY: gateway {} serves {} devices (max {})",
                c.gateway.id,
                c.members.len(),
                cfg.max_devices_per_gateway
            ));
        }
    }
    match plan.cap_reason {
        Some(CapReason::GatewayCap(k)) => alerts.push(format!(
            "GATEWAY CAP: limit of {} gateways reached with constraints unresolved",
            k
        )),
        Some(CapReason::RoundBudget(n)) => alerts.push(format!(
            "ITERATIONS: budget of {} rounds exhausted with constraints unresolved",
            n
        )),
        Some(CapReason::SeedingExhausted(k)) => alerts.push(format!(
            "SEEDING: no room for gateway {} at least {:.0} m from the others; {}",
            k, cfg.min_gateway_distance, "kept the previous layout"
        )),
        None => {}
    }
    if !plan.unassigned.is_empty() {
        alerts.push(format!("UNASSIGNED: {} devices have no gateway", plan.unassigned.len()));
    }
    if plan.outcome == PlanOutcome::Capped {
        alerts.extend(plan.violations.iter().map(|v| format!("VIOLATION: {}", v)));
    }
    alerts.extend(plan.fixed_conflicts.iter().map(|c| format!("FIXED: {}", c)));
    for f in &plan.fixed {
        if !plan.clusters.iter().any(|c| c.gateway.is_fixed && c.gateway.id == f.id) {
            alerts.push(format!("FIXED: gateway {} serves no devices", f.id));
        }
    }

    SummaryReport {
        outcome: plan.outcome,
        total_devices: plan.prepared.all.len(),
        valid_devices: plan.prepared.unique.len(),
        duplicate_devices: plan.prepared.duplicate_count(),
        comma_normalized_devices: plan.prepared.comma_normalized,
        outlier_devices: plan.outliers.outliers.len(),
        serviceable_devices: serviceable,
        initial_gateways: plan.initial_gateways,
        final_gateways: plan.clusters.len(),
        fixed_gateways,
        new_gateways: plan.clusters.len() - fixed_gateways,
        assigned_devices: assigned,
        unassigned_devices: plan.unassigned.len(),
        assignment_rate: if serviceable == 0 {
            0.0
        } else {
            100.0 * assigned as f64 / serviceable as f64
        },
        rounds: plan.rounds,
        hop_distance_m: cfg.hop_distance,
        min_gateway_distance_m: cfg.min_gateway_distance,
        max_devices_per_gateway: cfg.max_devices_per_gateway,
        max_hops: cfg.max_hops,
        max_relay_load: cfg.max_relay_load,
        outlier_threshold_m: plan.outliers.threshold_m,
        alerts,
    }
}

impl SummaryReport {
    pub fn render(&self) -> String {
        let mut s = String::new();
        let outcome = match self.outcome {
            PlanOutcome::Accepted => "ACCEPTED",
            PlanOutcome::Capped => "CAPPED",
        };
        let _ = writeln!(s, "Gateway placement report");
        let _ = writeln!(s, "outcome: {} after {} rounds", outcome, self.rounds);
        let _ = writeln!(s);
        let _ = writeln!(s, "devices total:        {}", self.total_devices);
        let _ = writeln!(s, "devices valid:        {}", self.valid_devices);
        let _ = writeln!(s, "duplicates:           {}", self.duplicate_devices);
        let _ = writeln!(s, "decimal commas fixed: {}", self.comma_normalized_devices);
        let _ = writeln!(
            s,
            "outliers:             {} (threshold {:.0} m)",
            self.outlier_devices, self.outlier_threshold_m
        );
        let _ = writeln!(s, "serviceable:          {}", self.serviceable_devices);
        let _ = writeln!(s, "gateways initial:     {}", self.initial_gateways);
        let _ = writeln!(
            s,
            "gateways final:       {} ({} fixed, {} new)",
            self.final_gateways, self.fixed_gateways, self.new_gateways
        );
        let _ = writeln!(
            s,
            "assigned:             {} ({:.1}%)",
            self.assigned_devices, self.assignment_rate
        );
        let _ = writeln!(s, "unassigned:           {}", self.unassigned_devices);
        let _ = writeln!(s);
        let _ = writeln!(s, "hop distance:         {:.0} m", self.hop_distance_m);
        let _ = writeln!(s, "min gateway distance: {:.0} m", self.min_gateway_distance_m);
        let _ = writeln!(s, "max devices/gateway:  {}", self.max_devices_per_gateway);
        let _ = writeln!(s, "max hops:             {}", self.max_hops);
        let _ = writeln!(s, "max relay load:       {}", self.max_relay_load);
        if !self.alerts.is_empty() {
            let _ = writeln!(s);
            let _ = writeln!(s, "alerts:");
            for a in &self.alerts {
                let _ = writeln!(s, "  - {}", a);
            }
        }
        s
    }
}
