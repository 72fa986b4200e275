//! Stochastic market engine.
//!
//! Owns the simulated mid-price process and drives one tick of the
//! simulation: EWMA volatility, spread, the mid random walk with jumps,
//! the best bid/ask publish, the probabilistic resting-fill sweep, and
//! the market-update dispatch to the strategy. All randomness draws from
//! a single seeded RNG so a fixed seed plus a fixed configuration
//! reproduces identical metric series.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::errors::{ConfigError, Result};
use crate::sim::book::OrderBook;
use crate::sim::latency::LatencyProfile;
use crate::sim::logging::targets;
use crate::sim::metrics::{Metrics, MetricsConfig};
use crate::sim::order::Side;
use crate::sim::strategy::{PingPongStrategy, StrategyParams};

/// Market process configuration.
///
/// The initial conditions mirror the simulation config surface; the
/// process coefficients are fixed model constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Initial mid price, ticks
    pub starting_mid_price: i64,
    /// Initial bid-ask spread, ticks
    pub start_spread: i64,
    /// Initial volatility (ticks per step)
    pub start_vol: f64,
    /// Volatility floor
    pub min_volatility: f64,
    /// Base probability of filling a resting order the market crossed
    pub start_fill_prob: f64,
    /// EWMA decay for squared log returns
    pub ewma_lambda: f64,
    /// Spread in ticks per unit of volatility
    pub spread_vol_scale: f64,
    /// Exponential decay of fill probability per tick of distance from mid
    pub fill_decay_per_tick: f64,
    /// Per-tick probability of a price jump
    pub jump_probability: f64,
    /// Jump magnitude, ticks (symmetric sign)
    pub jump_size_ticks: i64,
    /// Maximum quantity one sweep fill can take from a resting order
    pub lot_cap: i32,
    /// Master RNG seed
    pub seed: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            starting_mid_price: 10_000,
            start_spread: 2,
            start_vol: 1.0,
            min_volatility: 0.5,
            start_fill_prob: 0.3,
            ewma_lambda: 0.94,
            spread_vol_scale: 2.0,
            fill_decay_per_tick: 0.5,
            jump_probability: 0.001,
            jump_size_ticks: 10,
            lot_cap: 10,
            seed: 42,
        }
    }
}

impl MarketConfig {
    pub fn validate(&self) -> Result<()> {
        if self.starting_mid_price <= 0 {
            return Err(ConfigError::NonPositive {
                name: "starting_mid_price",
                value: self.starting_mid_price,
            }
            .into());
        }
        if self.start_spread <= 0 {
            return Err(ConfigError::NonPositive {
                name: "start_spread",
                value: self.start_spread,
            }
            .into());
        }
        if self.lot_cap <= 0 {
            return Err(ConfigError::NonPositive {
                name: "lot_cap",
                value: self.lot_cap as i64,
            }
            .into());
        }
        for (name, value) in [
            ("start_vol", self.start_vol),
            ("min_volatility", self.min_volatility),
            ("spread_vol_scale", self.spread_vol_scale),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositiveFloat { name, value }.into());
            }
        }
        for (name, value) in [
            ("start_fill_prob", self.start_fill_prob),
            ("ewma_lambda", self.ewma_lambda),
            ("jump_probability", self.jump_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::NotAProbability { name, value }.into());
            }
        }
        if self.fill_decay_per_tick < 0.0 {
            return Err(ConfigError::NonPositiveFloat {
                name: "fill_decay_per_tick",
                value: self.fill_decay_per_tick,
            }
            .into());
        }
        Ok(())
    }
}

/// Drives the market price, the resting-fill sweep, and the strategy.
///
/// Owns the order book, the metrics, the strategy, and the master RNG.
#[derive(Debug)]
pub struct MarketEngine {
    config: MarketConfig,

    mid_price_ticks: i64,
    prev_mid_price_ticks: i64,
    spread_ticks: i64,
    volatility: f64,
    fill_probability: f64,
    best_bid_ticks: i64,
    best_ask_ticks: i64,
    tick_count: u64,

    book: OrderBook,
    metrics: Metrics,
    strategy: PingPongStrategy,
    rng: StdRng,
}

impl MarketEngine {
    pub fn new(
        strategy_params: StrategyParams,
        market_config: MarketConfig,
        metrics_config: MetricsConfig,
        latency_profile: LatencyProfile,
    ) -> Result<Self> {
        market_config.validate()?;
        metrics_config.validate()?;
        let strategy = PingPongStrategy::new(strategy_params, latency_profile)?;
        let rng = StdRng::seed_from_u64(market_config.seed);
        Ok(Self {
            mid_price_ticks: market_config.starting_mid_price,
            prev_mid_price_ticks: market_config.starting_mid_price,
            spread_ticks: market_config.start_spread,
            volatility: market_config.start_vol,
            fill_probability: market_config.start_fill_prob,
            best_bid_ticks: market_config.starting_mid_price - market_config.start_spread / 2,
            best_ask_ticks: market_config.starting_mid_price + market_config.start_spread
                - market_config.start_spread / 2,
            tick_count: 0,
            book: OrderBook::new(),
            metrics: Metrics::new(metrics_config),
            strategy,
            rng,
            config: market_config,
        })
    }

    /// Run one simulation tick at sim time `t_us`.
    pub fn update(&mut self, t_us: i64) {
        self.tick_count += 1;

        // EWMA volatility from the previous step's log return.
        if self.prev_mid_price_ticks > 0 {
            let log_return =
                (self.mid_price_ticks as f64 / self.prev_mid_price_ticks as f64).ln();
            let variance = self.config.ewma_lambda * self.volatility * self.volatility
                + (1.0 - self.config.ewma_lambda) * log_return * log_return;
            self.volatility = variance.sqrt().max(self.config.min_volatility);
        }

        self.spread_ticks = ((self.config.spread_vol_scale * self.volatility).round() as i64).max(1);

        // Mid walk: Gaussian step plus an occasional jump, floored at 1.
        let z: f64 = self.rng.sample(StandardNormal);
        let mut delta = z * self.volatility;
        if self.rng.gen::<f64>() < self.config.jump_probability {
            let sign = if self.rng.gen::<bool>() { 1.0 } else { -1.0 };
            delta += sign * self.config.jump_size_ticks as f64;
        }
        self.prev_mid_price_ticks = self.mid_price_ticks;
        self.mid_price_ticks = (self.mid_price_ticks + delta.round() as i64).max(1);

        self.best_bid_ticks = self.mid_price_ticks - self.spread_ticks / 2;
        self.best_ask_ticks = self.best_bid_ticks + self.spread_ticks;
        self.metrics
            .on_market_price_update(t_us, self.best_bid_ticks, self.best_ask_ticks);

        trace!(
            target: targets::MARKET,
            t_us,
            mid = self.mid_price_ticks,
            spread = self.spread_ticks,
            vol = self.volatility,
            "tick"
        );

        self.sweep_resting_fills(t_us);

        self.strategy
            .schedule_market_update(t_us, self.mid_price_ticks, &mut self.rng);
        self.strategy
            .execute_latency_queue(t_us, &mut self.book, &mut self.metrics, &mut self.rng);
    }

    /// Probabilistically convert resting orders the market has moved
    /// through into trades at their own price. The side evaluated first
    /// alternates by tick parity so equal-distance quotes see no bias.
    fn sweep_resting_fills(&mut self, t_us: i64) {
        let sides = if self.tick_count % 2 == 0 {
            [Side::Buy, Side::Sell]
        } else {
            [Side::Sell, Side::Buy]
        };
        for side in sides {
            for (order_id, price_tick, quantity) in self.book.resting_orders(side) {
                let crossed = match side {
                    Side::Buy => self.best_ask_ticks <= price_tick,
                    Side::Sell => self.best_bid_ticks >= price_tick,
                };
                if !crossed {
                    continue;
                }
                let distance = (price_tick - self.mid_price_ticks).abs() as f64;
                let fill_prob = (self.fill_probability
                    * (-self.config.fill_decay_per_tick * distance).exp())
                .clamp(0.0, 1.0);
                if self.rng.gen::<f64>() >= fill_prob {
                    continue;
                }
                let fill_qty = quantity.min(self.config.lot_cap);
                if let Some(trade) =
                    self.book
                        .fill_resting(order_id, fill_qty, t_us, &mut self.metrics)
                {
                    self.strategy.notify_fill(trade, t_us, &mut self.rng);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut OrderBook {
        &mut self.book
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut Metrics {
        &mut self.metrics
    }

    /// Split mutable access to the book and metrics, for callers that
    /// submit orders directly (the fill hook needs both).
    pub fn book_and_metrics_mut(&mut self) -> (&mut OrderBook, &mut Metrics) {
        (&mut self.book, &mut self.metrics)
    }

    pub fn strategy(&self) -> &PingPongStrategy {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut PingPongStrategy {
        &mut self.strategy
    }

    pub fn market_price_ticks(&self) -> i64 {
        self.mid_price_ticks
    }

    pub fn spread_ticks(&self) -> i64 {
        self.spread_ticks
    }

    pub fn best_bid_ticks(&self) -> i64 {
        self.best_bid_ticks
    }

    pub fn best_ask_ticks(&self) -> i64 {
        self.best_ask_ticks
    }

    pub fn volatility(&self) -> f64 {
        self.volatility
    }

    pub fn fill_probability(&self) -> f64 {
        self.fill_probability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(market: MarketConfig) -> MarketEngine {
        MarketEngine::new(
            StrategyParams::default(),
            market,
            MetricsConfig::default(),
            LatencyProfile::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(MarketConfig::default().validate().is_ok());
        let bad = MarketConfig {
            start_fill_prob: 1.5,
            ..MarketConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = MarketConfig {
            starting_mid_price: 0,
            ..MarketConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = MarketConfig {
            min_volatility: 0.0,
            ..MarketConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_same_seed_same_path() {
        let mut a = engine_with(MarketConfig::default());
        let mut b = engine_with(MarketConfig::default());
        for step in 0..500 {
            let t = 1 + step * 100;
            a.update(t);
            b.update(t);
            assert_eq!(a.market_price_ticks(), b.market_price_ticks());
            assert_eq!(a.spread_ticks(), b.spread_ticks());
        }
        assert_eq!(
            a.metrics().total_pnl_ticks(),
            b.metrics().total_pnl_ticks()
        );
    }

    #[test]
    fn test_different_seed_diverges() {
        let mut a = engine_with(MarketConfig::default());
        let mut b = engine_with(MarketConfig {
            seed: 43,
            ..MarketConfig::default()
        });
        let mut diverged = false;
        for step in 0..200 {
            let t = 1 + step * 100;
            a.update(t);
            b.update(t);
            if a.market_price_ticks() != b.market_price_ticks() {
                diverged = true;
            }
        }
        assert!(diverged, "different seeds should produce different paths");
    }

    #[test]
    fn test_mid_and_spread_stay_positive() {
        let mut engine = engine_with(MarketConfig {
            starting_mid_price: 3,
            start_vol: 5.0,
            min_volatility: 5.0,
            jump_probability: 0.2,
            ..MarketConfig::default()
        });
        for step in 0..2_000 {
            engine.update(1 + step * 100);
            assert!(engine.market_price_ticks() >= 1);
            assert!(engine.spread_ticks() >= 1);
        }
    }

    #[test]
    fn test_publish_reaches_metrics() {
        let mut engine = engine_with(MarketConfig::default());
        engine.update(1);
        let mark = engine.metrics().last_mark_price_ticks();
        let mid = engine.market_price_ticks();
        // Mark is the midpoint of the published quote, which brackets mid.
        assert!((mark - mid).abs() <= engine.spread_ticks());
    }

    #[test]
    fn test_sweep_fills_crossed_resting_order() {
        let mut engine = engine_with(MarketConfig {
            start_fill_prob: 1.0,
            fill_decay_per_tick: 0.0,
            jump_probability: 0.0,
            lot_cap: 100,
            ..MarketConfig::default()
        });
        // Seed a resting buy far above the market: always crossed, always
        // filled under probability one.
        let mid = engine.market_price_ticks();
        let (book, metrics) = engine.book_and_metrics_mut();
        book.add_limit_order(true, mid + 500, 4, 0, metrics).unwrap();
        engine.update(1);
        assert_eq!(engine.book().order_count(), 0);
        let trades = engine.book().trade_log().trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, 4);
        assert_eq!(trades[0].price_tick, mid + 500);
    }

    #[test]
    fn test_sweep_respects_lot_cap() {
        let mut engine = engine_with(MarketConfig {
            start_fill_prob: 1.0,
            fill_decay_per_tick: 0.0,
            jump_probability: 0.0,
            lot_cap: 3,
            ..MarketConfig::default()
        });
        let mid = engine.market_price_ticks();
        let (book, metrics) = engine.book_and_metrics_mut();
        book.add_limit_order(true, mid + 500, 10, 0, metrics).unwrap();
        engine.update(1);
        let trades = engine.book().trade_log().trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, 3);
        assert_eq!(engine.book().resting_orders(Side::Buy)[0].2, 7);
    }

    #[test]
    fn test_sweep_skips_uncrossed_orders() {
        let mut engine = engine_with(MarketConfig {
            start_fill_prob: 1.0,
            fill_decay_per_tick: 0.0,
            jump_probability: 0.0,
            start_vol: 0.5,
            ..MarketConfig::default()
        });
        let mid = engine.market_price_ticks();
        // A buy far below the market is never crossed by the ask.
        let (book, metrics) = engine.book_and_metrics_mut();
        book.add_limit_order(true, mid - 500, 4, 0, metrics).unwrap();
        engine.update(1);
        assert_eq!(engine.book().order_count(), 1);
        assert!(engine.book().trade_log().is_empty());
    }
}
