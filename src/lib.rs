#![deny(unreachable_pub)]

//! Deterministic discrete-event simulator for a ping-pong HFT
//! market-making strategy: a price-time-priority order book, a latency
//! queue deferring every trading action, a stochastic market engine, and
//! full PnL/risk accounting, all on one logical microsecond clock.

mod errors;
pub mod sim;

pub use errors::{ConfigError, Result, SimError};

pub use sim::{
    builtin_profiles,
    find_profile,
    init_logging,
    targets as log_targets,
    ActionType,
    AddResult,
    BookSnapshot,
    DeferredAction,
    LatencyBounds,
    LatencyProfile,
    LatencyQueue,
    LogFormat,
    MarketConfig,
    MarketEngine,
    MarkingMethod,
    Metrics,
    MetricsConfig,
    MetricsExport,
    MetricsSummary,
    Order,
    OrderBook,
    OrderCacheData,
    PingPongStrategy,
    PongOrder,
    QuoteKind,
    Side,
    SimConfig,
    SimulationEngine,
    StrategyParams,
    StrategyProfile,
    StrategyState,
    Trade,
    TradeLog,
    AGGRESSIVE,
    BALANCED,
    HOURS_PER_DAY,
    MARKET_ORDER_ID,
    NO_ORDER,
    PASSIVE,
    TRADING_DAYS_PER_YEAR,
};
