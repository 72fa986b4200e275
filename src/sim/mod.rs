//! Deterministic discrete-event HFT simulator core.
//!
//! Components, leaves first:
//! - **order**: value types for resting orders and executed trades
//! - **book**: price-time-priority matching, cancels, modifies, trade log
//! - **latency**: priority queue of deferred actions keyed by execution time
//! - **metrics**: position, PnL, risk and execution-quality accounting
//! - **market**: stochastic mid/spread walk and probabilistic resting fills
//! - **strategy**: ping-pong market maker over the latency queue and book
//! - **engine**: fixed-step driver over the simulation range
//!
//! Everything shares one logical microsecond clock advanced by the
//! driver; there are no threads and no wall-clock dependencies.

pub mod book;
pub mod engine;
pub mod latency;
pub mod logging;
pub mod market;
pub mod metrics;
pub mod order;
pub mod profiles;
pub mod strategy;

#[cfg(test)]
mod tests;

pub use book::{AddResult, BookSnapshot, OrderBook};
pub use engine::{SimConfig, SimulationEngine};
pub use latency::{
    ActionType, DeferredAction, LatencyBounds, LatencyProfile, LatencyQueue, QuoteKind,
};
pub use logging::{init_logging, targets, LogFormat};
pub use market::{MarketConfig, MarketEngine};
pub use metrics::{
    MarkingMethod, Metrics, MetricsConfig, MetricsExport, MetricsSummary, OrderCacheData,
    HOURS_PER_DAY, TRADING_DAYS_PER_YEAR,
};
pub use order::{Order, Side, Trade, TradeLog, MARKET_ORDER_ID, NO_ORDER};
pub use profiles::{
    builtin_profiles, find_profile, StrategyProfile, AGGRESSIVE, BALANCED, PASSIVE,
};
pub use strategy::{PingPongStrategy, PongOrder, StrategyParams, StrategyState};
