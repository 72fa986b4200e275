//! Logging setup for the simulator binaries.
//!
//! Component targets allow per-subsystem filtering, e.g.
//! `RUST_LOG=warn,sim::strategy=debug cargo run --bin experiment`.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable format (default)
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
    /// Compact single-line format
    Compact,
}

/// Initialize the global subscriber. `default_filter` applies when
/// `RUST_LOG` is unset. Safe to call once per process.
pub fn init_logging(format: LogFormat, default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
        }
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_env_filter(filter).compact().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .init();
        }
    }
}

/// Log target constants for component-specific filtering.
pub mod targets {
    /// Order book matching and lifecycle
    pub const BOOK: &str = "sim::book";
    /// Latency queue scheduling
    pub const LATENCY: &str = "sim::latency";
    /// Market price process and fill sweep
    pub const MARKET: &str = "sim::market";
    /// Strategy decisions
    pub const STRATEGY: &str = "sim::strategy";
    /// PnL and execution accounting
    pub const METRICS: &str = "sim::metrics";
    /// Driver lifecycle
    pub const ENGINE: &str = "sim::engine";
}
