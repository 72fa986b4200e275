//! Position, PnL, risk and execution-quality accounting.
//!
//! All accounting runs in tick units; `tick_size` only matters to
//! consumers converting to currency. The metrics object is driven by
//! hooks: the order book reports placements, cancels and fills, the
//! market engine reports the published best bid/ask, and the driver
//! snapshots the time series once per tick.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{ConfigError, Result};
use crate::sim::logging::targets;
use crate::sim::order::Side;

/// Annualization constants for the Sharpe ratio (configuration, not state).
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
pub const HOURS_PER_DAY: f64 = 6.5;

/// How the mark price for unrealized PnL is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkingMethod {
    /// Midpoint of the published best bid/ask
    #[default]
    Mid,
    /// Last trade price, falling back to the midpoint
    Last,
}

/// Accounting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Currency value of one tick (fee/rebate conversion only)
    pub tick_size: f64,
    /// Rebate earned per share on maker fills, in ticks
    pub maker_rebate_per_share_ticks: i64,
    /// Fee paid per share on taker fills, in ticks
    pub taker_fee_per_share_ticks: i64,
    /// Width of one returns bucket, microseconds
    pub return_bucket_interval_us: i64,
    pub marking_method: MarkingMethod,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            tick_size: 0.01,
            maker_rebate_per_share_ticks: 0,
            taker_fee_per_share_ticks: 0,
            return_bucket_interval_us: 1_000_000,
            marking_method: MarkingMethod::Mid,
        }
    }
}

impl MetricsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_size <= 0.0 {
            return Err(ConfigError::NonPositiveFloat {
                name: "tick_size",
                value: self.tick_size,
            }
            .into());
        }
        if self.return_bucket_interval_us <= 0 {
            return Err(ConfigError::NonPositive {
                name: "return_bucket_interval_us",
                value: self.return_bucket_interval_us,
            }
            .into());
        }
        Ok(())
    }
}

/// Per-order arrival context, cached from placement until the order is
/// fully filled or cancelled.
#[derive(Debug, Clone, Copy)]
pub struct OrderCacheData {
    pub side: Side,
    /// Mark price when the order was submitted (slippage reference)
    pub arrival_mark_price_ticks: i64,
    pub arrival_timestamp_us: i64,
    pub intended_quantity: i32,
    pub remaining_qty: i32,
    pub is_ioc: bool,
}

/// Final scalar results of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub position: i64,
    pub average_entry_price_ticks: f64,
    pub realized_pnl_ticks: f64,
    pub unrealized_pnl_ticks: f64,
    pub total_pnl_ticks: f64,
    pub fees_ticks: f64,
    pub gross_traded_qty: i64,
    pub resting_attempted_qty: i64,
    pub resting_filled_qty: i64,
    pub resting_cancelled_qty: i64,
    pub fill_ratio: f64,
    pub total_slippage_ticks: i64,
    pub max_drawdown_ticks: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub gross_profit_ticks: f64,
    pub gross_loss_ticks: f64,
    pub profit_factor: f64,
    pub win_rate: f64,
}

/// The metric time series, aligned on `timestamp_us`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsExport {
    pub summary: MetricsSummary,
    pub timestamp_us: Vec<i64>,
    pub total_pnl_ticks: Vec<f64>,
    pub realized_pnl_ticks: Vec<f64>,
    pub unrealized_pnl_ticks: Vec<f64>,
    pub spread_ticks: Vec<i64>,
    pub market_price_ticks: Vec<i64>,
    pub returns: Vec<f64>,
}

/// Position, PnL and execution accounting with a per-tick time series.
#[derive(Debug)]
pub struct Metrics {
    config: MetricsConfig,

    // Position and PnL (tick units)
    position: i64,
    average_entry_price_ticks: f64,
    realized_pnl_ticks: f64,
    unrealized_pnl_ticks: f64,
    total_pnl_ticks: f64,
    fees_ticks: f64,

    // Execution quality
    gross_traded_qty: i64,
    resting_attempted_qty: i64,
    resting_filled_qty: i64,
    resting_cancelled_qty: i64,
    total_slippage_ticks: i64,

    // Market state
    current_best_bid_price_ticks: Option<i64>,
    current_best_ask_price_ticks: Option<i64>,
    last_trade_price_ticks: Option<i64>,
    last_mark_price_ticks: i64,

    // Risk
    equity_value_peak_ticks: f64,
    max_drawdown_ticks: f64,
    volatility: f64,
    sharpe_ratio: f64,
    gross_profit_ticks: f64,
    gross_loss_ticks: f64,
    winning_round_trips: u64,
    closed_round_trips: u64,
    win_rate: f64,

    // Returns bucketing
    last_return_bucket_start_us: Option<i64>,
    last_return_bucket_total_pnl_ticks: f64,

    // Time series
    timestamp_series: Vec<i64>,
    total_pnl_ticks_series: Vec<f64>,
    realized_pnl_ticks_series: Vec<f64>,
    unrealized_pnl_ticks_series: Vec<f64>,
    spread_ticks_series: Vec<i64>,
    market_price_ticks_series: Vec<i64>,
    returns_series: Vec<f64>,

    order_cache: HashMap<i64, OrderCacheData>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

impl Metrics {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            position: 0,
            average_entry_price_ticks: 0.0,
            realized_pnl_ticks: 0.0,
            unrealized_pnl_ticks: 0.0,
            total_pnl_ticks: 0.0,
            fees_ticks: 0.0,
            gross_traded_qty: 0,
            resting_attempted_qty: 0,
            resting_filled_qty: 0,
            resting_cancelled_qty: 0,
            total_slippage_ticks: 0,
            current_best_bid_price_ticks: None,
            current_best_ask_price_ticks: None,
            last_trade_price_ticks: None,
            last_mark_price_ticks: 0,
            equity_value_peak_ticks: 0.0,
            max_drawdown_ticks: 0.0,
            volatility: 0.0,
            sharpe_ratio: 0.0,
            gross_profit_ticks: 0.0,
            gross_loss_ticks: 0.0,
            winning_round_trips: 0,
            closed_round_trips: 0,
            win_rate: 0.0,
            last_return_bucket_start_us: None,
            last_return_bucket_total_pnl_ticks: 0.0,
            timestamp_series: Vec::new(),
            total_pnl_ticks_series: Vec::new(),
            realized_pnl_ticks_series: Vec::new(),
            unrealized_pnl_ticks_series: Vec::new(),
            spread_ticks_series: Vec::new(),
            market_price_ticks_series: Vec::new(),
            returns_series: Vec::new(),
            order_cache: HashMap::new(),
        }
    }

    /// Reset all accounting, keeping the configuration.
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------

    /// An order was submitted. Caches its arrival context; non-IOC
    /// intent counts toward the resting-attempted quantity.
    pub fn on_order_placed(
        &mut self,
        order_id: i64,
        side: Side,
        intended_quantity: i32,
        ts_us: i64,
        is_ioc: bool,
    ) {
        self.order_cache.insert(
            order_id,
            OrderCacheData {
                side,
                arrival_mark_price_ticks: self.last_mark_price_ticks,
                arrival_timestamp_us: ts_us,
                intended_quantity,
                remaining_qty: intended_quantity,
                is_ioc,
            },
        );
        if !is_ioc {
            self.resting_attempted_qty += intended_quantity as i64;
        }
    }

    /// A resting order was cancelled; its remaining quantity counts as
    /// cancelled resting quantity.
    pub fn on_order_cancelled(&mut self, order_id: i64) {
        if let Some(cache) = self.order_cache.remove(&order_id) {
            self.resting_cancelled_qty += cache.remaining_qty.max(0) as i64;
        }
    }

    /// One of our orders traded.
    ///
    /// Applies weighted-average-entry position accounting, fees, slippage
    /// and the execution-quality counters, then refreshes unrealized PnL
    /// at the current mark.
    pub fn on_fill(
        &mut self,
        order_id: i64,
        fill_price_ticks: i64,
        quantity: i32,
        _ts_us: i64,
        is_taker: bool,
    ) {
        if quantity <= 0 {
            return;
        }
        let Some(cache) = self.order_cache.get(&order_id).copied() else {
            // Every own order is registered before it can trade.
            warn!(target: targets::METRICS, order_id, "fill for unknown order id");
            return;
        };

        let qty = quantity as i64;
        let signed = if cache.side == Side::Buy { qty } else { -qty };
        let price = fill_price_ticks as f64;
        let pos_before = self.position;

        if pos_before == 0 || (pos_before > 0) == (signed > 0) {
            // Extends (or opens) the position: re-weight the entry price.
            let abs_before = pos_before.abs() as f64;
            self.average_entry_price_ticks = (self.average_entry_price_ticks * abs_before
                + price * qty as f64)
                / (abs_before + qty as f64);
            self.position = pos_before + signed;
        } else {
            // Reduces or flips: realize PnL on the closed quantity.
            let closed = qty.min(pos_before.abs());
            let direction = if pos_before > 0 { 1.0 } else { -1.0 };
            let delta =
                (price - self.average_entry_price_ticks) * closed as f64 * direction;
            self.realized_pnl_ticks += delta;
            self.record_round_trip(delta);

            self.position = pos_before + signed;
            if self.position == 0 {
                self.average_entry_price_ticks = 0.0;
            } else if (self.position > 0) != (pos_before > 0) {
                // Flipped through zero: the residual opens a new basis.
                self.average_entry_price_ticks = price;
            }
        }

        // Taker pays the fee; maker earns the rebate.
        if is_taker {
            self.fees_ticks += self.config.taker_fee_per_share_ticks as f64 * qty as f64;
        } else {
            self.fees_ticks -= self.config.maker_rebate_per_share_ticks as f64 * qty as f64;
        }

        self.gross_traded_qty += qty;
        if !is_taker {
            self.resting_filled_qty += qty;
        }
        self.total_slippage_ticks +=
            (fill_price_ticks - cache.arrival_mark_price_ticks).abs() * qty;

        if let Some(entry) = self.order_cache.get_mut(&order_id) {
            entry.remaining_qty -= quantity;
            if entry.remaining_qty <= 0 {
                self.order_cache.remove(&order_id);
            }
        }

        self.last_trade_price_ticks = Some(fill_price_ticks);
        self.refresh_unrealized();
    }

    /// The market engine published a new best bid/ask.
    pub fn on_market_price_update(
        &mut self,
        _ts_us: i64,
        best_bid_ticks: i64,
        best_ask_ticks: i64,
    ) {
        self.current_best_bid_price_ticks = Some(best_bid_ticks);
        self.current_best_ask_price_ticks = Some(best_ask_ticks);
        self.refresh_unrealized();
    }

    /// Append one row to the time series and update peak/drawdown and the
    /// returns buckets. Called once per tick by the driver.
    pub fn take_screenshot(&mut self, ts_us: i64) {
        self.timestamp_series.push(ts_us);
        self.total_pnl_ticks_series.push(self.total_pnl_ticks);
        self.realized_pnl_ticks_series.push(self.realized_pnl_ticks);
        self.unrealized_pnl_ticks_series.push(self.unrealized_pnl_ticks);
        self.spread_ticks_series.push(self.current_spread_ticks());
        self.market_price_ticks_series.push(self.last_mark_price_ticks);

        // Drawdown on the total-PnL equity proxy.
        if self.total_pnl_ticks > self.equity_value_peak_ticks {
            self.equity_value_peak_ticks = self.total_pnl_ticks;
        }
        let drawdown = self.equity_value_peak_ticks - self.total_pnl_ticks;
        if drawdown > self.max_drawdown_ticks {
            self.max_drawdown_ticks = drawdown;
        }

        match self.last_return_bucket_start_us {
            None => {
                self.last_return_bucket_start_us = Some(ts_us);
                self.last_return_bucket_total_pnl_ticks = self.total_pnl_ticks;
            }
            Some(start) => {
                if ts_us - start >= self.config.return_bucket_interval_us {
                    self.returns_series
                        .push(self.total_pnl_ticks - self.last_return_bucket_total_pnl_ticks);
                    self.last_return_bucket_start_us = Some(ts_us);
                    self.last_return_bucket_total_pnl_ticks = self.total_pnl_ticks;
                }
            }
        }
    }

    /// Compute the end-of-run statistics. Degenerate inputs (no returns,
    /// zero variance, no closed round trips) yield 0 rather than NaN.
    pub fn finalize(&mut self, _end_ts_us: i64) {
        let n = self.returns_series.len();
        if n >= 2 {
            let nf = n as f64;
            let mean = self.returns_series.iter().sum::<f64>() / nf;
            let variance = self
                .returns_series
                .iter()
                .map(|r| (r - mean).powi(2))
                .sum::<f64>()
                / (nf - 1.0);
            self.volatility = variance.sqrt();

            if self.volatility > 1e-12 {
                let buckets_per_year = TRADING_DAYS_PER_YEAR * HOURS_PER_DAY * 3600.0 * 1e6
                    / self.config.return_bucket_interval_us as f64;
                self.sharpe_ratio = mean / self.volatility * buckets_per_year.sqrt();
            } else {
                self.sharpe_ratio = 0.0;
            }
        } else {
            self.volatility = 0.0;
            self.sharpe_ratio = 0.0;
        }

        self.win_rate = if self.closed_round_trips > 0 {
            self.winning_round_trips as f64 / self.closed_round_trips as f64
        } else {
            0.0
        };
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn average_entry_price_ticks(&self) -> f64 {
        self.average_entry_price_ticks
    }

    pub fn realized_pnl_ticks(&self) -> f64 {
        self.realized_pnl_ticks
    }

    pub fn unrealized_pnl_ticks(&self) -> f64 {
        self.unrealized_pnl_ticks
    }

    pub fn total_pnl_ticks(&self) -> f64 {
        self.total_pnl_ticks
    }

    pub fn fees_ticks(&self) -> f64 {
        self.fees_ticks
    }

    pub fn gross_traded_qty(&self) -> i64 {
        self.gross_traded_qty
    }

    pub fn resting_attempted_qty(&self) -> i64 {
        self.resting_attempted_qty
    }

    pub fn resting_filled_qty(&self) -> i64 {
        self.resting_filled_qty
    }

    pub fn resting_cancelled_qty(&self) -> i64 {
        self.resting_cancelled_qty
    }

    pub fn total_slippage_ticks(&self) -> i64 {
        self.total_slippage_ticks
    }

    /// Resting quantity filled over resting quantity attempted.
    pub fn fill_ratio(&self) -> f64 {
        self.resting_filled_qty as f64 / self.resting_attempted_qty.max(1) as f64
    }

    pub fn max_drawdown_ticks(&self) -> f64 {
        self.max_drawdown_ticks
    }

    pub fn volatility(&self) -> f64 {
        self.volatility
    }

    pub fn sharpe_ratio(&self) -> f64 {
        self.sharpe_ratio
    }

    pub fn gross_profit_ticks(&self) -> f64 {
        self.gross_profit_ticks
    }

    pub fn gross_loss_ticks(&self) -> f64 {
        self.gross_loss_ticks
    }

    /// Gross profit over gross loss; 0 with no closed losses.
    pub fn profit_factor(&self) -> f64 {
        if self.gross_loss_ticks <= 0.0 {
            0.0
        } else {
            self.gross_profit_ticks / self.gross_loss_ticks
        }
    }

    pub fn win_rate(&self) -> f64 {
        self.win_rate
    }

    pub fn last_mark_price_ticks(&self) -> i64 {
        self.last_mark_price_ticks
    }

    pub fn timestamp_series(&self) -> &[i64] {
        &self.timestamp_series
    }

    pub fn total_pnl_ticks_series(&self) -> &[f64] {
        &self.total_pnl_ticks_series
    }

    pub fn returns_series(&self) -> &[f64] {
        &self.returns_series
    }

    pub fn order_cache(&self) -> &HashMap<i64, OrderCacheData> {
        &self.order_cache
    }

    /// Final scalar results.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            position: self.position,
            average_entry_price_ticks: self.average_entry_price_ticks,
            realized_pnl_ticks: self.realized_pnl_ticks,
            unrealized_pnl_ticks: self.unrealized_pnl_ticks,
            total_pnl_ticks: self.total_pnl_ticks,
            fees_ticks: self.fees_ticks,
            gross_traded_qty: self.gross_traded_qty,
            resting_attempted_qty: self.resting_attempted_qty,
            resting_filled_qty: self.resting_filled_qty,
            resting_cancelled_qty: self.resting_cancelled_qty,
            fill_ratio: self.fill_ratio(),
            total_slippage_ticks: self.total_slippage_ticks,
            max_drawdown_ticks: self.max_drawdown_ticks,
            volatility: self.volatility,
            sharpe_ratio: self.sharpe_ratio,
            gross_profit_ticks: self.gross_profit_ticks,
            gross_loss_ticks: self.gross_loss_ticks,
            profit_factor: self.profit_factor(),
            win_rate: self.win_rate,
        }
    }

    /// Summary plus the full aligned time series, for JSON export.
    pub fn export(&self) -> MetricsExport {
        MetricsExport {
            summary: self.summary(),
            timestamp_us: self.timestamp_series.clone(),
            total_pnl_ticks: self.total_pnl_ticks_series.clone(),
            realized_pnl_ticks: self.realized_pnl_ticks_series.clone(),
            unrealized_pnl_ticks: self.unrealized_pnl_ticks_series.clone(),
            spread_ticks: self.spread_ticks_series.clone(),
            market_price_ticks: self.market_price_ticks_series.clone(),
            returns: self.returns_series.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn record_round_trip(&mut self, realized_delta: f64) {
        self.closed_round_trips += 1;
        if realized_delta > 0.0 {
            self.winning_round_trips += 1;
            self.gross_profit_ticks += realized_delta;
        } else if realized_delta < 0.0 {
            self.gross_loss_ticks += -realized_delta;
        }
    }

    fn current_spread_ticks(&self) -> i64 {
        match (
            self.current_best_bid_price_ticks,
            self.current_best_ask_price_ticks,
        ) {
            (Some(bid), Some(ask)) => ask - bid,
            _ => 0,
        }
    }

    fn mid_price_ticks(&self) -> Option<i64> {
        match (
            self.current_best_bid_price_ticks,
            self.current_best_ask_price_ticks,
        ) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2),
            _ => None,
        }
    }

    /// Recompute the mark and the mark-dependent PnL fields.
    fn refresh_unrealized(&mut self) {
        let mid = self.mid_price_ticks();
        let mark = match self.config.marking_method {
            MarkingMethod::Mid => mid,
            MarkingMethod::Last => self.last_trade_price_ticks.or(mid),
        };
        if let Some(mark) = mark {
            self.last_mark_price_ticks = mark;
        }
        self.unrealized_pnl_ticks = if self.position == 0 {
            0.0
        } else {
            self.position as f64
                * (self.last_mark_price_ticks as f64 - self.average_entry_price_ticks)
        };
        self.total_pnl_ticks = self.realized_pnl_ticks + self.unrealized_pnl_ticks - self.fees_ticks;
    }
}
