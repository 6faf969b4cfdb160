//! End-to-end planning scenarios.
//!
//! Each test drives the full pipeline (normalization, outlier filter,
//! clustering, parallel validation, refinement) through `Planner::plan`.

use gwplan_core::output::{gateway_table, map_layer, outlier_report, summary};
use gwplan_core::{ChannelProgress, NoProgress, Plan, PlanOutcome, Planner, PlannerConfig};
use gwplan_geo::geo::offset_m;
use gwplan_geo::GeoPoint;
use gwplan_proto::types::{GatewayStatus, RawDevice};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

fn origin() -> GeoPoint {
    GeoPoint::new(-22.9068, -43.1729)
}

fn raw_at(id: impl Into<String>, east: f64, north: f64) -> RawDevice {
    let p = offset_m(origin(), east, north);
    RawDevice::new(id, p.lat, p.lng)
}

/// 10 devices on a 2 x 5 grid inside a 50 m square.
fn small_grid() -> Vec<RawDevice> {
    let mut out = Vec::new();
    for r in 0..2 {
        for c in 0..5 {
            out.push(raw_at(format!("P{}", r * 5 + c), c as f64 * 12.5, r as f64 * 50.0));
        }
    }
    out
}

/// A tight 5 x 6 block of devices, 20 m apart, starting at (east, north).
fn block(prefix: &str, east: f64, north: f64) -> Vec<RawDevice> {
    let mut out = Vec::new();
    for r in 0..5 {
        for c in 0..6 {
            let (e, n) = (east + c as f64 * 20.0, north + r as f64 * 20.0);
            out.push(raw_at(format!("{}{}", prefix, r * 6 + c), e, n));
        }
    }
    out
}

fn seeded(seed: u64) -> PlannerConfig {
    PlannerConfig { seed: Some(seed), ..PlannerConfig::default() }
}

fn assert_accepted_invariants(plan: &Plan) {
    let cfg = &plan.config;
    assert_eq!(plan.outcome, PlanOutcome::Accepted);
    assert!(plan.violations.is_empty(), "violations: {:?}", plan.violations);
    assert!(plan.unassigned.is_empty());
    for (i, a) in plan.clusters.iter().enumerate() {
        assert!(a.valid);
        assert!(a.members.len() <= cfg.max_devices_per_gateway);
        let within = a.hops.iter().all(|h| matches!(h, Some(x) if *x <= cfg.max_hops));
        assert!(within, "hops {:?}", a.hops);
        for b in &plan.clusters[i + 1..] {
            let d = a.gateway.point().distance_m(&b.gateway.point());
            assert!(
                d >= cfg.min_gateway_distance,
                "{} and {} are {} m apart",
                a.gateway.id,
                b.gateway.id,
                d
            );
        }
    }
}

#[tokio::test]
async fn scenario_a_compact_grid_needs_one_gateway() {
    let plan = Planner::new(seeded(1)).plan(&small_grid(), &[], &NoProgress).await.unwrap();
    assert_accepted_invariants(&plan);
    assert_eq!(plan.clusters.len(), 1);
    assert_eq!(plan.assigned_count(), 10);
    assert_eq!(plan.rounds, 1);

    let table = gateway_table(&plan);
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].gateway_id, "GW001");
    assert_eq!(table[0].status, GatewayStatus::New);
    assert_eq!(table[0].device_count, 10);
}

#[tokio::test]
async fn scenario_b_random_field_respects_capacity() {
    let mut rng = StdRng::seed_from_u64(2024);
    let devices: Vec<RawDevice> = (0..500)
        .map(|i| {
            let (e, n) = (rng.gen_range(0.0..5_000.0), rng.gen_range(0.0..5_000.0));
            raw_at(format!("R{}", i), e, n)
        })
        .collect();

    let plan = Planner::new(seeded(7)).plan(&devices, &[], &NoProgress).await.unwrap();
    assert!(plan.clusters.len() >= 2, "gateways: {}", plan.clusters.len());
    assert!(plan.clusters.iter().all(|c| c.members.len() <= 250));
    assert_eq!(plan.assigned_count() + plan.unassigned.len(), plan.outliers.kept.len());

    let report = summary(&plan);
    assert_eq!(report.total_devices, 500);
    assert_eq!(report.final_gateways, plan.clusters.len());
    if plan.outcome == PlanOutcome::Capped {
        assert!(!report.alerts.is_empty());
    }
}

#[tokio::test]
async fn scenario_c_isolated_device_is_reported_not_assigned() {
    let mut devices = small_grid();
    devices.push(raw_at("HERMIT", 10_000.0, 0.0));

    let plan = Planner::new(seeded(3)).plan(&devices, &[], &NoProgress).await.unwrap();
    assert_accepted_invariants(&plan);

    let outliers = outlier_report(&plan);
    assert_eq!(outliers.len(), 1);
    assert_eq!(outliers[0].id, "HERMIT");
    assert!(outliers[0].isolation_m > 9_000.0);
    assert!(plan.clusters.iter().all(|c| c.members.iter().all(|d| d.id != "HERMIT")));
    assert_eq!(plan.assigned_count(), 10);

    let map = serde_json::to_value(map_layer(&plan)).unwrap();
    let hermit = map["features"]
        .as_array()
        .unwrap()
        .iter()
        .find(|f| f["properties"]["id"] == "HERMIT")
        .unwrap();
    assert_eq!(hermit["properties"]["outlier"], true);
    assert!(hermit["properties"]["gateway"].is_null());
}

#[tokio::test]
async fn scenario_d_fixed_gateway_keeps_exact_coordinates() {
    let center = offset_m(origin(), 25.0, 25.0);
    let fixed = vec![RawDevice::new("TOWER-1", center.lat, center.lng)];

    let plan = Planner::new(seeded(4)).plan(&small_grid(), &fixed, &NoProgress).await.unwrap();
    assert_accepted_invariants(&plan);

    let table = gateway_table(&plan);
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].gateway_id, "TOWER-1");
    assert_eq!(table[0].lat, center.lat);
    assert_eq!(table[0].lng, center.lng);
    assert_eq!(table[0].status, GatewayStatus::Fixed);
    assert_eq!(table[0].device_count, 10);
}

#[tokio::test]
async fn duplicate_coordinates_cluster_once_and_report_both() {
    let mut devices = small_grid();
    let p0 = devices[0].clone();
    devices.push(RawDevice { id: "P0-COPY".into(), ..p0 });

    let plan = Planner::new(seeded(5)).plan(&devices, &[], &NoProgress).await.unwrap();
    assert_eq!(plan.assigned_count(), 10);
    assert_eq!(plan.prepared.duplicates.len(), 1);
    assert_eq!(plan.prepared.duplicates[0].ids, vec!["P0".to_string(), "P0-COPY".to_string()]);

    let clustered: Vec<&str> =
        plan.clusters.iter().flat_map(|c| c.members.iter().map(|d| d.id.as_str())).collect();
    assert_eq!(clustered.iter().filter(|id| **id == "P0" || **id == "P0-COPY").count(), 1);

    let report = summary(&plan);
    assert_eq!(report.total_devices, 11);
    assert_eq!(report.duplicate_devices, 1);
}

#[tokio::test]
async fn separate_blocks_grow_to_one_gateway_each() {
    let mut devices = block("N", 0.0, 0.0);
    devices.extend(block("S", 0.0, -2_000.0));

    let plan = Planner::new(seeded(11)).plan(&devices, &[], &NoProgress).await.unwrap();
    assert_accepted_invariants(&plan);
    assert_eq!(plan.initial_gateways, 1);
    assert_eq!(plan.clusters.len(), 2);
    assert_eq!(plan.rounds, 2);
    for c in &plan.clusters {
        let first = c.members[0].id.chars().next();
        assert!(c.members.iter().all(|d| d.id.chars().next() == first));
    }
}

#[tokio::test]
async fn progress_sink_does_not_change_the_plan() {
    let mut devices = block("N", 0.0, 0.0);
    devices.extend(block("S", 0.0, -2_000.0));
    let planner = Planner::new(seeded(21));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let with_progress = planner.plan(&devices, &[], &ChannelProgress::new(tx)).await.unwrap();
    let silent = planner.plan(&devices, &[], &NoProgress).await.unwrap();

    let ids = |p: &Plan| {
        p.clusters
            .iter()
            .map(|c| (c.gateway.id.clone(), c.anchor.clone(), c.members.len()))
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&with_progress), ids(&silent));

    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    assert!(!events.is_empty());
    assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
    assert_eq!(events.last().map(|e| e.percent), Some(100));
}
