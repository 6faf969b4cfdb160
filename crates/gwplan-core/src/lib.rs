pub mod config;
pub mod controller;
pub mod doctor;
pub mod error;
pub mod graph;
pub mod input;
pub mod kmedoids;
pub mod outliers;
pub mod output;
pub mod progress;
pub mod validator;

pub use config::{load_config, load_or_default, FileConfig, OutputConfig, PlannerConfig};
pub use controller::{CapReason, ClusterPlan, Plan, PlanOutcome, PlanState, Planner};
pub use error::{PlanError, PlanResult};
pub use progress::{ChannelProgress, NoProgress, ProgressEvent, ProgressSink};
