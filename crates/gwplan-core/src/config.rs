use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Planning thresholds. Every field falls back to its default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub max_devices_per_gateway: usize,
    pub max_hops: u32,
    /// Radio range between two neighboring devices, meters.
    pub hop_distance: f64,
    pub max_gateways: Option<usize>,
    pub max_iterations: usize,
    /// Minimum spacing between two gateways, meters.
    pub min_gateway_distance: f64,
    pub max_relay_load: usize,
    /// Seed for k-means++ sampling; entropy when unset.
    pub seed: Option<u64>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_devices_per_gateway: 250,
            max_hops: 15,
            hop_distance: 150.0,
            max_gateways: None,
            max_iterations: 10,
            min_gateway_distance: 300.0,
            max_relay_load: 300,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: "out".into() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub planner: PlannerConfig,
    pub output: OutputConfig,
}

pub fn load_config(path: &Path) -> Result<FileConfig> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&s).context("parse config toml")
}

/// Loads the config file, or the defaults when it is missing or unreadable.
pub fn load_or_default(path: Option<&Path>) -> FileConfig {
    let Some(path) = path else {
        info!("config: no file given, using defaults");
        return FileConfig::default();
    };
    match load_config(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("config: {:#}; falling back to defaults", e);
            FileConfig::default()
        }
    }
}
