//! Refinement controller.
//!
//! Runs K-Medoids for a gateway count k, validates every cluster in
//! parallel and grows k until all clusters hold, or the gateway cap or the
//! round budget runs out.

use gwplan_proto::types::{Device, Gateway, RawDevice};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PlannerConfig;
use crate::error::{PlanError, PlanResult};
use crate::input::{prepare_devices, prepare_fixed, PreparedDevices};
use crate::kmedoids::{k_medoids, Clustering};
use crate::outliers::{filter_outliers, OutlierFilter};
use crate::progress::ProgressSink;
use crate::validator::{ValidationResult, ValidationUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    Seed,
    Cluster,
    Validate,
    Accept,
    Grow,
    Done,
    Capped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanOutcome {
    /// Every cluster satisfies every constraint.
    Accepted,
    /// Budgets ran out; the last solution is kept with violations attached.
    Capped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapReason {
    GatewayCap(usize),
    RoundBudget(usize),
    SeedingExhausted(usize),
}

#[derive(Debug, Clone)]
pub struct ClusterPlan {
    pub gateway: Gateway,
    /// Device hosting a movable gateway.
    pub anchor: Option<String>,
    pub members: Vec<Device>,
    /// Hop count per member, aligned with `members`.
    pub hops: Vec<Option<u32>>,
    pub valid: bool,
}

#[derive(Debug, Clone)]
pub struct Plan {
    pub outcome: PlanOutcome,
    pub cap_reason: Option<CapReason>,
    pub clusters: Vec<ClusterPlan>,
    pub unassigned: Vec<Device>,
    pub prepared: PreparedDevices,
    pub outliers: OutlierFilter,
    pub fixed: Vec<Gateway>,
    pub initial_gateways: usize,
    pub rounds: usize,
    /// Constraint violations of the returned solution; empty when accepted.
    pub violations: Vec<String>,
    /// Fixed gateway pairs closer than the minimum spacing.
    pub fixed_conflicts: Vec<String>,
    pub config: PlannerConfig,
}

impl Plan {
    pub fn assigned_count(&self) -> usize {
        self.clusters.iter().map(|c| c.members.len()).sum()
    }
}

struct Round {
    k: usize,
    clustering: Clustering,
    results: Vec<ValidationResult>,
    violations: Vec<String>,
}

pub fn initial_gateway_count(devices: usize, fixed: usize, cfg: &PlannerConfig) -> usize {
    let k = match cfg.max_gateways {
        Some(m) => m,
        None => devices.div_ceil(cfg.max_devices_per_gateway.max(1)),
    };
    k.max(fixed).max(1)
}

#[derive(Debug, Clone)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub async fn plan(
        &self,
        devices: &[RawDevice],
        fixed: &[RawDevice],
        progress: &dyn ProgressSink,
    ) -> PlanResult<Plan> {
        let mut rng = match self.config.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        self.plan_with_rng(devices, fixed, progress, &mut rng).await
    }

    pub async fn plan_with_rng<R: Rng + Send + ?Sized>(
        &self,
        devices: &[RawDevice],
        fixed: &[RawDevice],
        progress: &dyn ProgressSink,
        rng: &mut R,
    ) -> PlanResult<Plan> {
        let cfg = &self.config;

        progress.emit("Normalizing device coordinates", 5);
        let prepared = prepare_devices(devices)?;
        let fixed = prepare_fixed(fixed)?;
        let fixed_conflicts = fixed_spacing_conflicts(&fixed, cfg.min_gateway_distance);
        for c in &fixed_conflicts {
            warn!("{}", c);
        }

        progress.emit("Filtering isolated devices", 15);
        let outliers = filter_outliers(&prepared.unique, cfg)?;
        let serviceable = &outliers.kept;

        let mut state = PlanState::Seed;
        let initial_gateways = initial_gateway_count(serviceable.len(), fixed.len(), cfg);
        let mut k = initial_gateways;
        info!(?state, devices = serviceable.len(), fixed = fixed.len(), k, "planner: starting");

        let mut rounds = 0;
        let mut last: Option<Round> = None;
        let cap_reason = loop {
            rounds += 1;
            transition(&mut state, PlanState::Cluster);
            let percent = round_percent(rounds, cfg);
            progress.emit(&format!("Round {}: clustering with {} gateways", rounds, k), percent);

            let clustering = match k_medoids(serviceable, k, &fixed, cfg, rng) {
                Ok(c) => c,
                Err(e @ PlanError::SeedingExhausted { .. }) if last.is_some() => {
                    warn!("planner: {}; keeping the previous solution", e);
                    rounds -= 1;
                    break Some(CapReason::SeedingExhausted(k));
                }
                Err(e) => return Err(e),
            };

            transition(&mut state, PlanState::Validate);
            let clusters = clustering.medoids.len();
            progress.emit(&format!("Round {}: validating {} clusters", rounds, clusters), percent);
            let results = validate_round(serviceable, &clustering, cfg).await;
            let violations = collect_violations(serviceable, &clustering, &results, cfg);
            let done = violations.is_empty();
            info!(?state, round = rounds, k, violations = violations.len(), "planner: round done");
            last = Some(Round { k, clustering, results, violations });

            if done {
                transition(&mut state, PlanState::Accept);
                break None;
            }
            if rounds >= cfg.max_iterations {
                break Some(CapReason::RoundBudget(cfg.max_iterations));
            }
            if cfg.max_gateways.map_or(true, |m| k < m) {
                transition(&mut state, PlanState::Grow);
                k += 1;
                info!(?state, k, "planner: constraint violated, growing gateway count");
                continue;
            }
            break Some(CapReason::GatewayCap(k));
        };

        // the loop always completes at least one round before breaking
        let Some(round) = last else {
            return Err(PlanError::Input("no clustering round completed".into()));
        };
        let (next, outcome) = match cap_reason {
            Some(_) => (PlanState::Capped, PlanOutcome::Capped),
            None => (PlanState::Done, PlanOutcome::Accepted),
        };
        transition(&mut state, next);
        if let Some(reason) = cap_reason {
            let violations = round.violations.len();
            warn!(?state, ?reason, violations, "planner: capped, keeping last solution");
        }

        let (clusters, unassigned) = build_clusters(serviceable, &round);
        info!(?state, gateways = clusters.len(), k = round.k, rounds, "planner: finished");
        progress.emit(&format!("Planning finished with {} gateways", clusters.len()), 100);

        Ok(Plan {
            outcome,
            cap_reason,
            clusters,
            unassigned,
            prepared,
            outliers,
            fixed,
            initial_gateways,
            rounds,
            violations: round.violations,
            fixed_conflicts,
            config: cfg.clone(),
        })
    }
}

fn transition(state: &mut PlanState, next: PlanState) {
    debug!(from = ?*state, to = ?next, "planner: transition");
    *state = next;
}

fn round_percent(round: usize, cfg: &PlannerConfig) -> u8 {
    let budget = cfg.max_iterations.max(1);
    (20 + 75 * round.min(budget) / budget).min(95) as u8
}

enum Pending {
    Ready(ValidationResult),
    Running(JoinHandle<ValidationResult>),
}

/// Fans out one blocking task per non-empty cluster and waits for all of them.
async fn validate_round(
    devices: &[Device],
    clustering: &Clustering,
    cfg: &PlannerConfig,
) -> Vec<ValidationResult> {
    let mut pending = Vec::with_capacity(clustering.medoids.len());
    for (medoid, members) in clustering.medoids.iter().zip(&clustering.members) {
        if members.is_empty() {
            pending.push(Pending::Ready(ValidationResult {
                valid: true,
                reason: None,
                distances: Vec::new(),
                max_depth: 0,
                max_relay_load: 0,
            }));
            continue;
        }
        if members.len() > cfg.max_devices_per_gateway {
            pending.push(Pending::Ready(ValidationResult::rejected(format!(
                "gateway {} serves {} devices (max {})",
                medoid.gateway.id,
                members.len(),
                cfg.max_devices_per_gateway
            ))));
            continue;
        }
        let unit = ValidationUnit {
            members: members.iter().map(|&i| devices[i].clone()).collect(),
            gateway: medoid.gateway.clone(),
            config: cfg.clone(),
        };
        pending.push(Pending::Running(tokio::task::spawn_blocking(move || unit.run())));
    }

    let gateways: Vec<&str> = clustering.medoids.iter().map(|m| m.gateway.id.as_str()).collect();
    gather(pending, &gateways).await
}

/// Full barrier over one round of units. A unit that fails to complete
/// becomes a rejection for its own cluster; the rest of the batch is kept.
async fn gather(pending: Vec<Pending>, gateways: &[&str]) -> Vec<ValidationResult> {
    let mut results = Vec::with_capacity(pending.len());
    for (p, gateway) in pending.into_iter().zip(gateways) {
        let res = match p {
            Pending::Ready(r) => r,
            Pending::Running(handle) => match handle.await {
                Ok(r) => r,
                Err(e) => {
                    warn!(gateway = %gateway, "validator unit failed: {}", e);
                    let reason = format!("validation of gateway {} failed: {}", gateway, e);
                    ValidationResult::rejected(reason)
                }
            },
        };
        results.push(res);
    }
    results
}

fn collect_violations(
    devices: &[Device],
    clustering: &Clustering,
    results: &[ValidationResult],
    cfg: &PlannerConfig,
) -> Vec<String> {
    let mut out: Vec<String> =
        results.iter().filter(|r| !r.valid).filter_map(|r| r.reason.clone()).collect();

    let occupied: Vec<usize> =
        (0..clustering.medoids.len()).filter(|&i| !clustering.members[i].is_empty()).collect();
    for (n, &a) in occupied.iter().enumerate() {
        for &b in &occupied[n + 1..] {
            let (ga, gb) = (&clustering.medoids[a].gateway, &clustering.medoids[b].gateway);
            if ga.is_fixed && gb.is_fixed {
                continue;
            }
            let d = ga.point().distance_m(&gb.point());
            if d < cfg.min_gateway_distance {
                out.push(format!(
                    "gateways {} and {} are {:.0} m apart (min {:.0} m)",
                    ga.id, gb.id, d, cfg.min_gateway_distance
                ));
            }
        }
    }

    if !clustering.unassigned.is_empty() {
        let unassigned = &clustering.unassigned;
        let sample: Vec<&str> =
            unassigned.iter().take(5).map(|&i| devices[i].id.as_str()).collect();
        let more = if unassigned.len() > sample.len() { ", ..." } else { "" };
        out.push(format!(
            "{} devices unassigned ({}{})",
            unassigned.len(),
            sample.join(", "),
            more
        ));
    }
    out
}

fn fixed_spacing_conflicts(fixed: &[Gateway], min_distance_m: f64) -> Vec<String> {
    let mut out = Vec::new();
    for (n, a) in fixed.iter().enumerate() {
        for b in &fixed[n + 1..] {
            let d = a.point().distance_m(&b.point());
            if d < min_distance_m {
                out.push(format!(
                    "fixed gateways {} and {} are {:.0} m apart (min {:.0} m)",
                    a.id, b.id, d, min_distance_m
                ));
            }
        }
    }
    out
}

/// Drops empty clusters and names new gateways `GW001`, `GW002`, ... in output order.
fn build_clusters(devices: &[Device], round: &Round) -> (Vec<ClusterPlan>, Vec<Device>) {
    let mut clusters = Vec::new();
    let mut next_id = 1;
    let clustering = &round.clustering;
    let rows = clustering.medoids.iter().zip(&clustering.members).zip(&round.results);
    for ((medoid, members), result) in rows {
        if members.is_empty() {
            continue;
        }
        let mut gateway = medoid.gateway.clone();
        let anchor = medoid.device.map(|i| devices[i].id.clone());
        if !gateway.is_fixed {
            gateway.id = format!("GW{:03}", next_id);
            next_id += 1;
        }
        let hops = if result.distances.len() == members.len() {
            result.distances.clone()
        } else {
            vec![None; members.len()]
        };
        clusters.push(ClusterPlan {
            gateway,
            anchor,
            members: members.iter().map(|&i| devices[i].clone()).collect(),
            hops,
            valid: result.valid,
        });
    }
    let unassigned = round.clustering.unassigned.iter().map(|&i| devices[i].clone()).collect();
    (clusters, unassigned)
}
