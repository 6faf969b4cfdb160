use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::{fs, sync::mpsc};
use tracing::{info, warn};

use gwplan_core::output::{gateway_table, map_layer, outlier_report, summary};
use gwplan_core::{
    doctor, load_or_default, ChannelProgress, FileConfig, Plan, PlanOutcome, Planner, ProgressEvent,
};
use gwplan_geo::CoordinateValue;
use gwplan_proto::types::RawDevice;

#[derive(Debug, Parser)]
#[command(name = "gwplan", version, about = "gwplan - mesh gateway placement planner")]
struct Cli {
    /// TOML config; defaults apply when absent or unreadable.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check planner thresholds and, optionally, a device file.
    Doctor {
        #[arg(long)]
        devices: Option<PathBuf>,
    },
    /// Place gateways for a device file and write the run artifacts.
    Plan {
        #[arg(long)]
        devices: PathBuf,
        /// Gateways that already exist and must be kept.
        #[arg(long)]
        fixed: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        max_gateways: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_or_default(cli.config.as_deref());

    match cli.cmd {
        Command::Doctor { devices } => run_doctor(&cfg, devices.as_deref()).await?,
        Command::Plan { devices, fixed, out, max_gateways, seed } => {
            let mut cfg = cfg;
            if max_gateways.is_some() {
                cfg.planner.max_gateways = max_gateways;
            }
            if seed.is_some() {
                cfg.planner.seed = seed;
            }
            let out = out.unwrap_or_else(|| PathBuf::from(&cfg.output.dir));
            run_plan(&cfg, &devices, fixed.as_deref(), &out).await?
        }
    }
    Ok(())
}

async fn run_doctor(cfg: &FileConfig, devices: Option<&Path>) -> Result<()> {
    info!("doctor: starting");
    doctor::check_config(&cfg.planner)?;
    if let Some(path) = devices {
        let rows = load_rows(path).await?;
        doctor::check_devices(&rows).with_context(|| format!("device file {}", path.display()))?;
    }
    info!("doctor: OK");
    Ok(())
}

async fn run_plan(
    cfg: &FileConfig,
    devices: &Path,
    fixed: Option<&Path>,
    out: &Path,
) -> Result<()> {
    doctor::check_config(&cfg.planner)?;
    let rows = load_rows(devices).await?;
    let fixed_rows = match fixed {
        Some(p) => load_rows(p).await?,
        None => Vec::new(),
    };
    info!(devices = rows.len(), fixed = fixed_rows.len(), "plan: input loaded");

    // progress events are forwarded to the log from their own task
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let forwarder = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            info!(percent = ev.percent, "{}", ev.message);
        }
    });

    let planner = Planner::new(cfg.planner.clone());
    let sink = ChannelProgress::new(tx);
    let plan = planner.plan(&rows, &fixed_rows, &sink).await;
    drop(sink);
    forwarder.await.ok();
    let plan = plan.context("planning failed")?;

    let dir = run_dir(out);
    write_artifacts(&plan, &dir).await?;

    let report = summary(&plan);
    match plan.outcome {
        PlanOutcome::Accepted => {
            info!(gateways = report.final_gateways, dir = %dir.display(), "plan: accepted")
        }
        PlanOutcome::Capped => warn!(
            gateways = report.final_gateways,
            alerts = report.alerts.len(),
            dir = %dir.display(),
            "plan: capped, see report for alerts"
        ),
    }
    print!("{}", report.render());
    Ok(())
}

/// Unique per-run directory so concurrent runs never share output files.
fn run_dir(out: &Path) -> PathBuf {
    out.join(format!("run-{}", time::OffsetDateTime::now_utc().unix_timestamp_nanos()))
}

async fn write_artifacts(plan: &Plan, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await.with_context(|| format!("create {}", dir.display()))?;
    let report = summary(plan);
    let gateways = serde_json::to_vec_pretty(&gateway_table(plan))?;
    write_file(&dir.join("gateways.json"), &gateways).await?;
    write_file(&dir.join("map.geojson"), &serde_json::to_vec_pretty(&map_layer(plan))?).await?;
    let outliers = serde_json::to_vec_pretty(&outlier_report(plan))?;
    write_file(&dir.join("outliers.json"), &outliers).await?;
    write_file(&dir.join("report.json"), &serde_json::to_vec_pretty(&report)?).await?;
    write_file(&dir.join("report.txt"), report.render().as_bytes()).await?;
    info!(dir = %dir.display(), "plan: artifacts written");
    Ok(())
}

async fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    let mut f = fs::File::create(path).await.with_context(|| format!("create {}", path.display()))?;
    f.write_all(data).await.with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

async fn load_rows(path: &Path) -> Result<Vec<RawDevice>> {
    let s = fs::read_to_string(path).await.with_context(|| format!("read {}", path.display()))?;
    parse_rows(&s).with_context(|| format!("parse {}", path.display()))
}

/// Parses a JSON array of `{id, lat, lng}` objects. Rows missing a field are
/// dropped with a warning; coordinate validation is left to the planner.
fn parse_rows(s: &str) -> Result<Vec<RawDevice>> {
    let values: Vec<Value> = serde_json::from_str(s).context("expected a JSON array of devices")?;
    let mut rows = Vec::with_capacity(values.len());
    for (row, v) in values.iter().enumerate() {
        let id = match v.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let lat = v.get("lat").and_then(coordinate);
        let lng = v.get("lng").and_then(coordinate);
        match (id, lat, lng) {
            (Some(id), Some(lat), Some(lng)) => rows.push(RawDevice { id, lat, lng }),
            _ => warn!(row, "dropping device row without id, lat or lng"),
        }
    }
    Ok(rows)
}

fn coordinate(v: &Value) -> Option<CoordinateValue> {
    match v {
        Value::Number(n) => n.as_f64().map(CoordinateValue::Number),
        Value::String(s) => Some(CoordinateValue::Text(s.clone())),
        _ => None,
    }
}
