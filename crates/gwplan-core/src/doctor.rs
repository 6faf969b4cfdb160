use anyhow::Result;
use gwplan_proto::types::RawDevice;
use tracing::{info, warn};

use crate::config::PlannerConfig;
use crate::input::prepare_devices;

pub fn check_config(cfg: &PlannerConfig) -> Result<()> {
    anyhow::ensure!(
        cfg.max_devices_per_gateway >= 1,
        "planner.max_devices_per_gateway must be >= 1"
    );
    anyhow::ensure!(cfg.max_hops >= 1, "planner.max_hops must be >= 1");
    anyhow::ensure!(
        cfg.hop_distance > 0.0 && cfg.hop_distance.is_finite(),
        "planner.hop_distance must be > 0"
    );
    anyhow::ensure!(
        cfg.min_gateway_distance >= 0.0 && cfg.min_gateway_distance.is_finite(),
        "planner.min_gateway_distance must be >= 0"
    );
    anyhow::ensure!(cfg.max_iterations >= 1, "planner.max_iterations must be >= 1");
    anyhow::ensure!(cfg.max_relay_load >= 1, "planner.max_relay_load must be >= 1");
    if let Some(m) = cfg.max_gateways {
        anyhow::ensure!(m >= 1, "planner.max_gateways must be >= 1 when set");
    }
    if cfg.min_gateway_distance < cfg.hop_distance {
        warn!("doctor: min_gateway_distance is below hop_distance; gateways will overlap");
    }
    Ok(())
}

/// Normalizes the device set and reports what the planner would see.
pub fn check_devices(rows: &[RawDevice]) -> Result<()> {
    let prepared = prepare_devices(rows)?;
    info!(
        rows = prepared.all.len(),
        unique = prepared.unique.len(),
        duplicates = prepared.duplicate_count(),
        comma_normalized = prepared.comma_normalized,
        "doctor: devices OK"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass() {
        check_config(&PlannerConfig::default()).unwrap();
    }

    #[test]
    fn bad_thresholds_fail() {
        let base = PlannerConfig::default();
        let bad = |cfg: PlannerConfig| check_config(&cfg).is_err();
        assert!(bad(PlannerConfig { max_devices_per_gateway: 0, ..base.clone() }));
        assert!(bad(PlannerConfig { max_hops: 0, ..base.clone() }));
        assert!(bad(PlannerConfig { hop_distance: 0.0, ..base.clone() }));
        assert!(bad(PlannerConfig { min_gateway_distance: -1.0, ..base.clone() }));
        assert!(bad(PlannerConfig { max_iterations: 0, ..base.clone() }));
        assert!(bad(PlannerConfig { max_relay_load: 0, ..base.clone() }));
        let err = check_config(&PlannerConfig { max_gateways: Some(0), ..base }).unwrap_err();
        assert!(err.to_string().contains("max_gateways"));
    }

    #[test]
    fn device_file_problems_surface() {
        assert!(check_devices(&[]).is_err());
        assert!(check_devices(&[RawDevice::new("P1", "x", 0.0)]).is_err());
        check_devices(&[
            RawDevice::new("P1", "-23,5", "-46,6"),
            RawDevice::new("P2", -23.5, -46.6),
        ])
        .unwrap();
    }
}
