//! Top-level simulation driver.
//!
//! Validates the full configuration, then advances the market engine in
//! fixed steps over `[starting_timestamp_us, ending_timestamp_us]`,
//! snapshotting metrics each tick and finalizing at the end.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{ConfigError, Result};
use crate::sim::latency::LatencyProfile;
use crate::sim::logging::targets;
use crate::sim::market::{MarketConfig, MarketEngine};
use crate::sim::metrics::{Metrics, MetricsConfig};
use crate::sim::strategy::StrategyParams;

/// Complete configuration of one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub starting_timestamp_us: i64,
    pub ending_timestamp_us: i64,
    pub step_us: i64,
    pub strategy: StrategyParams,
    pub market: MarketConfig,
    pub metrics: MetricsConfig,
    pub latency: LatencyProfile,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            starting_timestamp_us: 1,
            ending_timestamp_us: 10_000_000,
            step_us: 100,
            strategy: StrategyParams::default(),
            market: MarketConfig::default(),
            metrics: MetricsConfig::default(),
            latency: LatencyProfile::default(),
        }
    }
}

impl SimConfig {
    /// Validate every parameter combination before a run.
    pub fn validate(&self) -> Result<()> {
        if self.step_us <= 0 {
            return Err(ConfigError::NonPositive {
                name: "step_us",
                value: self.step_us,
            }
            .into());
        }
        if self.ending_timestamp_us <= self.starting_timestamp_us {
            return Err(ConfigError::EmptyRange {
                start_us: self.starting_timestamp_us,
                end_us: self.ending_timestamp_us,
            }
            .into());
        }
        self.strategy.validate()?;
        self.market.validate()?;
        self.metrics.validate()?;
        self.latency.validate()?;
        Ok(())
    }
}

/// Fixed-step loop over the simulation range.
#[derive(Debug)]
pub struct SimulationEngine {
    starting_timestamp_us: i64,
    ending_timestamp_us: i64,
    step_us: i64,
    current_timestamp_us: i64,
    market_engine: MarketEngine,
}

impl SimulationEngine {
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let market_engine = MarketEngine::new(
            config.strategy,
            config.market,
            config.metrics,
            config.latency,
        )?;
        Ok(Self {
            starting_timestamp_us: config.starting_timestamp_us,
            ending_timestamp_us: config.ending_timestamp_us,
            step_us: config.step_us,
            current_timestamp_us: config.starting_timestamp_us,
            market_engine,
        })
    }

    /// Run the simulation from start to end and finalize metrics.
    pub fn run(&mut self) {
        info!(
            target: targets::ENGINE,
            start_us = self.starting_timestamp_us,
            end_us = self.ending_timestamp_us,
            step_us = self.step_us,
            "starting simulation"
        );
        let mut t_us = self.starting_timestamp_us;
        while t_us <= self.ending_timestamp_us {
            self.current_timestamp_us = t_us;
            self.market_engine.update(t_us);
            self.market_engine.metrics_mut().take_screenshot(t_us);
            t_us += self.step_us;
        }
        self.finalize(self.ending_timestamp_us);
        info!(
            target: targets::ENGINE,
            total_pnl_ticks = self.market_engine.metrics().total_pnl_ticks(),
            trades = self.market_engine.book().trade_log().len(),
            "simulation complete"
        );
    }

    /// Compute end-of-run statistics. `run` calls this automatically.
    pub fn finalize(&mut self, final_timestamp_us: i64) {
        self.market_engine.metrics_mut().finalize(final_timestamp_us);
    }

    pub fn metrics(&self) -> &Metrics {
        self.market_engine.metrics()
    }

    pub fn market_engine(&self) -> &MarketEngine {
        &self.market_engine
    }

    pub fn market_engine_mut(&mut self) -> &mut MarketEngine {
        &mut self.market_engine
    }

    pub fn starting_timestamp_us(&self) -> i64 {
        self.starting_timestamp_us
    }

    pub fn ending_timestamp_us(&self) -> i64 {
        self.ending_timestamp_us
    }

    pub fn current_timestamp_us(&self) -> i64 {
        self.current_timestamp_us
    }

    pub fn step_us(&self) -> i64 {
        self.step_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_config() -> SimConfig {
        SimConfig {
            starting_timestamp_us: 1,
            ending_timestamp_us: 100_000,
            step_us: 100,
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let bad = SimConfig {
            step_us: 0,
            ..short_config()
        };
        assert!(SimulationEngine::new(bad).is_err());

        let bad = SimConfig {
            starting_timestamp_us: 10,
            ending_timestamp_us: 10,
            ..short_config()
        };
        assert!(SimulationEngine::new(bad).is_err());

        let bad = SimConfig {
            starting_timestamp_us: 100,
            ending_timestamp_us: 1,
            ..short_config()
        };
        assert!(SimulationEngine::new(bad).is_err());
    }

    #[test]
    fn test_rejects_bad_strategy_params() {
        let bad = SimConfig {
            strategy: StrategyParams {
                quote_size: 0,
                ..StrategyParams::default()
            },
            ..short_config()
        };
        assert!(SimulationEngine::new(bad).is_err());
    }

    #[test]
    fn test_series_length_matches_step_count() {
        let mut sim = SimulationEngine::new(short_config()).unwrap();
        sim.run();
        // t = 1, 101, ..., 99_901: one screenshot per tick.
        let expected = (100_000 - 1) / 100 + 1;
        assert_eq!(sim.metrics().timestamp_series().len(), expected as usize);
        assert_eq!(sim.current_timestamp_us(), 99_901);
    }

    #[test]
    fn test_run_is_deterministic() {
        let mut a = SimulationEngine::new(short_config()).unwrap();
        let mut b = SimulationEngine::new(short_config()).unwrap();
        a.run();
        b.run();
        assert_eq!(
            a.metrics().total_pnl_ticks_series(),
            b.metrics().total_pnl_ticks_series()
        );
        assert_eq!(a.metrics().returns_series(), b.metrics().returns_series());
        assert_eq!(
            a.market_engine().book().trade_log().len(),
            b.market_engine().book().trade_log().len()
        );
    }

    #[test]
    fn test_pnl_identity_after_run() {
        let mut sim = SimulationEngine::new(short_config()).unwrap();
        sim.run();
        let m = sim.metrics();
        assert!(
            (m.total_pnl_ticks() - (m.realized_pnl_ticks() + m.unrealized_pnl_ticks() - m.fees_ticks()))
                .abs()
                < 1e-9
        );
        if m.position() == 0 {
            assert_eq!(m.unrealized_pnl_ticks(), 0.0);
        }
        assert!(m.resting_filled_qty() + m.resting_cancelled_qty() <= m.resting_attempted_qty());
        assert!(m.sharpe_ratio().is_finite());
        assert!(m.volatility().is_finite());
    }
}
