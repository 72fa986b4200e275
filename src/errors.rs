use thiserror::Error;

use crate::sim::latency::ActionType;

/// Configuration validation errors.
///
/// All of these are fatal and surfaced to the caller before a run starts;
/// nothing in this enum can occur once a simulation is running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("latency bounds for {action:?} are inverted: min {min_us}us > max {max_us}us")]
    LatencyBounds {
        action: ActionType,
        min_us: i64,
        max_us: i64,
    },

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: i64 },

    #[error("{name} must be positive, got {value}")]
    NonPositiveFloat { name: &'static str, value: f64 },

    #[error("{name} must be within [0, 1], got {value}")]
    NotAProbability { name: &'static str, value: f64 },

    #[error("simulation range is empty: end {end_us}us <= start {start_us}us")]
    EmptyRange { start_us: i64, end_us: i64 },

    #[error("unknown strategy profile '{0}'")]
    UnknownProfile(String),
}

/// Main simulator error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    /// Invalid parameter combination, rejected before the run.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Operation on an unknown/inactive order or with a non-positive
    /// quantity. Callers recover locally (no-op); metrics are untouched.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl SimError {
    /// Create an `InvalidOperation` error.
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        SimError::InvalidOperation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
