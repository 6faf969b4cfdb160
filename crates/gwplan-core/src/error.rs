//! Planner error types.

use gwplan_geo::CoordinateError;
use thiserror::Error;

/// Fatal planning failures. Constraint violations are not errors: the
/// refinement loop recovers from them, or reports them as alerts once capped.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("input error: {0}")]
    Input(String),

    #[error("device {id}: {source}")]
    InvalidCoordinate {
        id: String,
        #[source]
        source: CoordinateError,
    },

    #[error(
        "k-means++ seeding exhausted: no candidate at least {min_distance_m} m \
         from the chosen gateways for slot {slot} of {k}"
    )]
    SeedingExhausted { slot: usize, k: usize, min_distance_m: f64 },

    #[error("no serviceable devices: all {0} devices were classified as outliers")]
    NoServiceableDevices(usize),
}

pub type PlanResult<T> = Result<T, PlanError>;
