//! Value types for resting orders and executed trades.

use serde::{Deserialize, Serialize};

/// Sentinel order id meaning "no order" (cleared slot, market side of a
/// simulated sweep fill).
pub const NO_ORDER: i64 = -1;

/// Order id used for the market side of a probabilistic resting fill.
/// The simulated market is never a real order in the book.
pub const MARKET_ORDER_ID: i64 = 0;

/// Side of an order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The opposite side.
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn is_buy(self) -> bool {
        matches!(self, Side::Buy)
    }

    pub fn from_is_buy(is_buy: bool) -> Self {
        if is_buy {
            Side::Buy
        } else {
            Side::Sell
        }
    }
}

/// A limit order resting in (or passing through) the book.
///
/// Prices are integer ticks; ids are assigned by the book and increase
/// monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    /// Book-assigned id
    pub id: i64,
    /// Buy (bid) or sell (ask)
    pub is_buy: bool,
    /// Limit price in ticks
    pub price_tick: i64,
    /// Remaining quantity; strictly positive while active
    pub quantity: i32,
    /// False once fully filled or cancelled
    pub is_active: bool,
    /// Creation timestamp (microseconds, sim clock)
    pub ts_created_us: i64,
    /// Last modification timestamp
    pub ts_last_update_us: i64,
}

impl Order {
    /// Create a new active order.
    pub fn new(id: i64, is_buy: bool, price_tick: i64, quantity: i32, ts_us: i64) -> Self {
        Self {
            id,
            is_buy,
            price_tick,
            quantity,
            is_active: true,
            ts_created_us: ts_us,
            ts_last_update_us: ts_us,
        }
    }

    pub fn side(&self) -> Side {
        Side::from_is_buy(self.is_buy)
    }
}

/// An executed trade between a buy order and a sell order.
///
/// `was_instant` marks the leading trade of an aggressive matching call
/// (the incoming order crossed the resting book on arrival). Sweep fills
/// produced by the market engine are never instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: i64,
    pub buy_order_id: i64,
    pub sell_order_id: i64,
    /// Execution price in ticks (always the resting order's price)
    pub price_tick: i64,
    pub quantity: i32,
    pub timestamp_us: i64,
    pub was_instant: bool,
}

/// Append-only log of executed trades, ordered by timestamp.
#[derive(Debug, Clone, Default)]
pub struct TradeLog {
    trades: Vec<Trade>,
    next_trade_id: i64,
}

impl TradeLog {
    pub fn new() -> Self {
        Self {
            trades: Vec::new(),
            next_trade_id: 1,
        }
    }

    /// Record a trade, assigning its id. Returns a copy of the stored trade.
    pub fn add_trade(
        &mut self,
        buy_order_id: i64,
        sell_order_id: i64,
        price_tick: i64,
        quantity: i32,
        timestamp_us: i64,
        was_instant: bool,
    ) -> Trade {
        if let Some(last) = self.trades.last() {
            // Monotone timestamps: the single logical clock never runs backwards.
            assert!(
                timestamp_us >= last.timestamp_us,
                "trade log timestamp regression: {} < {}",
                timestamp_us,
                last.timestamp_us
            );
        }
        let trade = Trade {
            trade_id: self.next_trade_id,
            buy_order_id,
            sell_order_id,
            price_tick,
            quantity,
            timestamp_us,
            was_instant,
        };
        self.next_trade_id += 1;
        self.trades.push(trade);
        trade
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Price of the most recent trade, if any.
    pub fn last_price_tick(&self) -> Option<i64> {
        self.trades.last().map(|t| t.price_tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_new_is_active() {
        let order = Order::new(1, true, 100, 5, 10);
        assert!(order.is_active);
        assert_eq!(order.quantity, 5);
        assert_eq!(order.ts_created_us, 10);
        assert_eq!(order.ts_last_update_us, 10);
        assert_eq!(order.side(), Side::Buy);
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_trade_log_assigns_increasing_ids() {
        let mut log = TradeLog::new();
        let t1 = log.add_trade(1, 2, 100, 3, 10, true);
        let t2 = log.add_trade(1, 3, 100, 1, 10, false);
        assert_eq!(t1.trade_id, 1);
        assert_eq!(t2.trade_id, 2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.last_price_tick(), Some(100));
    }

    #[test]
    #[should_panic(expected = "timestamp regression")]
    fn test_trade_log_rejects_time_regression() {
        let mut log = TradeLog::new();
        log.add_trade(1, 2, 100, 3, 10, true);
        log.add_trade(1, 3, 100, 1, 9, false);
    }
}
