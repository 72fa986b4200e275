//! Price-time-priority limit order book.
//!
//! Bids and asks are ordered maps from price to a FIFO queue of resting
//! orders, with a side-band id lookup for the cancel/modify path. Every
//! fill appends to the trade log and notifies [`Metrics`] through its
//! fill hook, so accounting never drifts from the matching engine.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::debug;

use crate::errors::{Result, SimError};
use crate::sim::logging::targets;
use crate::sim::metrics::Metrics;
use crate::sim::order::{Order, Side, Trade, TradeLog, MARKET_ORDER_ID};

/// Location of an active order inside the book.
#[derive(Debug, Clone, Copy)]
struct OrderRef {
    is_buy: bool,
    price_tick: i64,
}

/// Outcome of an order submission: the assigned id plus any trades the
/// incoming order executed against the resting book.
#[derive(Debug, Clone)]
pub struct AddResult {
    pub order_id: i64,
    pub trades: Vec<Trade>,
}

/// Read-only view of the book for observers.
#[derive(Debug, Clone)]
pub struct BookSnapshot {
    pub best_bid: Option<i64>,
    pub best_ask: Option<i64>,
    /// (price, total quantity) per level, best first
    pub bid_depth: Vec<(i64, i64)>,
    pub ask_depth: Vec<(i64, i64)>,
}

/// Limit order book with price-time priority matching.
#[derive(Debug, Default)]
pub struct OrderBook {
    /// Bids: price -> FIFO queue of orders, iterated best (highest) first
    buys: BTreeMap<i64, VecDeque<Order>>,
    /// Asks: price -> FIFO queue of orders, iterated best (lowest) first
    sells: BTreeMap<i64, VecDeque<Order>>,
    /// Active order id -> side/level location
    lookup: HashMap<i64, OrderRef>,
    /// Append-only execution history
    trade_log: TradeLog,
    /// Next id to assign; ids increase monotonically
    next_order_id: i64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            buys: BTreeMap::new(),
            sells: BTreeMap::new(),
            lookup: HashMap::new(),
            trade_log: TradeLog::new(),
            next_order_id: 1,
        }
    }

    /// Submit a limit order. Matches against the opposite side first; any
    /// unfilled remainder rests at `price_tick` at the tail of its level.
    ///
    /// Returns the created order's id and the trades executed on arrival.
    /// Non-positive quantities and prices are rejected.
    pub fn add_limit_order(
        &mut self,
        is_buy: bool,
        price_tick: i64,
        quantity: i32,
        ts_us: i64,
        metrics: &mut Metrics,
    ) -> Result<AddResult> {
        if quantity <= 0 {
            return Err(SimError::invalid_operation(format!(
                "limit order quantity must be positive, got {quantity}"
            )));
        }
        if price_tick <= 0 {
            return Err(SimError::invalid_operation(format!(
                "limit price must be positive, got {price_tick}"
            )));
        }

        let order_id = self.next_id();
        metrics.on_order_placed(order_id, Side::from_is_buy(is_buy), quantity, ts_us, false);

        let (trades, remainder) =
            self.match_incoming(is_buy, price_tick, quantity, ts_us, order_id, metrics);

        if remainder > 0 {
            let order = Order::new(order_id, is_buy, price_tick, remainder, ts_us);
            self.side_mut(is_buy)
                .entry(price_tick)
                .or_default()
                .push_back(order);
            self.lookup.insert(order_id, OrderRef { is_buy, price_tick });
        }

        self.assert_uncrossed();
        Ok(AddResult { order_id, trades })
    }

    /// Submit an immediate-or-cancel order: matches at any crossing price
    /// and discards the remainder. The remainder never rests.
    pub fn add_ioc_order(
        &mut self,
        is_buy: bool,
        quantity: i32,
        ts_us: i64,
        metrics: &mut Metrics,
    ) -> Result<AddResult> {
        if quantity <= 0 {
            return Err(SimError::invalid_operation(format!(
                "IOC order quantity must be positive, got {quantity}"
            )));
        }

        let order_id = self.next_id();
        metrics.on_order_placed(order_id, Side::from_is_buy(is_buy), quantity, ts_us, true);

        // An unbounded crossing price matches every opposing level.
        let limit = if is_buy { i64::MAX } else { i64::MIN };
        let (trades, remainder) =
            self.match_incoming(is_buy, limit, quantity, ts_us, order_id, metrics);

        if remainder > 0 {
            debug!(
                target: targets::BOOK,
                order_id,
                remainder,
                "IOC remainder discarded"
            );
        }

        self.assert_uncrossed();
        Ok(AddResult { order_id, trades })
    }

    /// Cancel an active order. Returns false for unknown or already
    /// inactive ids; metrics are untouched in that case.
    pub fn cancel_order(&mut self, order_id: i64, metrics: &mut Metrics) -> bool {
        let Some(order_ref) = self.lookup.remove(&order_id) else {
            return false;
        };
        self.remove_from_level(order_id, order_ref);
        metrics.on_order_cancelled(order_id);
        true
    }

    /// Change an order's quantity.
    ///
    /// Reducing keeps time priority; increasing re-queues the order at the
    /// tail of its level. A new quantity of zero cancels; negative values
    /// are a no-op returning false.
    pub fn modify_order(
        &mut self,
        order_id: i64,
        new_quantity: i32,
        ts_us: i64,
        metrics: &mut Metrics,
    ) -> bool {
        if new_quantity < 0 {
            return false;
        }
        if new_quantity == 0 {
            return self.cancel_order(order_id, metrics);
        }
        let Some(&order_ref) = self.lookup.get(&order_id) else {
            return false;
        };

        let level = self
            .side_mut(order_ref.is_buy)
            .get_mut(&order_ref.price_tick)
            .expect("order in lookup but its level is missing");
        let pos = level
            .iter()
            .position(|o| o.id == order_id)
            .expect("order in lookup but not in its level");

        if new_quantity <= level[pos].quantity {
            level[pos].quantity = new_quantity;
            level[pos].ts_last_update_us = ts_us;
        } else {
            let mut order = level.remove(pos).expect("position just located");
            order.quantity = new_quantity;
            order.ts_last_update_us = ts_us;
            level.push_back(order);
        }
        true
    }

    /// Execute a partial or full fill of a resting order at its own price,
    /// with the simulated market as counterparty. Used by the market
    /// engine's probabilistic fill sweep.
    ///
    /// Returns the trade, or `None` if the order is no longer active.
    pub fn fill_resting(
        &mut self,
        order_id: i64,
        quantity: i32,
        ts_us: i64,
        metrics: &mut Metrics,
    ) -> Option<Trade> {
        let &order_ref = self.lookup.get(&order_id)?;
        let level = self
            .side_mut(order_ref.is_buy)
            .get_mut(&order_ref.price_tick)?;
        let pos = level.iter().position(|o| o.id == order_id)?;

        let fill_qty = quantity.min(level[pos].quantity);
        if fill_qty <= 0 {
            return None;
        }
        level[pos].quantity -= fill_qty;
        level[pos].ts_last_update_us = ts_us;
        let exhausted = level[pos].quantity == 0;
        if exhausted {
            level[pos].is_active = false;
        }
        let price_tick = order_ref.price_tick;
        if exhausted {
            self.lookup.remove(&order_id);
            self.remove_from_level(order_id, order_ref);
        }

        let (buy_id, sell_id) = if order_ref.is_buy {
            (order_id, MARKET_ORDER_ID)
        } else {
            (MARKET_ORDER_ID, order_id)
        };
        let trade = self
            .trade_log
            .add_trade(buy_id, sell_id, price_tick, fill_qty, ts_us, false);
        metrics.on_fill(order_id, price_tick, fill_qty, ts_us, false);
        Some(trade)
    }

    /// Highest bid price, if any bids rest.
    pub fn best_bid(&self) -> Option<i64> {
        self.buys.keys().next_back().copied()
    }

    /// Lowest ask price, if any asks rest.
    pub fn best_ask(&self) -> Option<i64> {
        self.sells.keys().next().copied()
    }

    /// Look up an active order by id.
    pub fn order(&self, order_id: i64) -> Option<&Order> {
        let order_ref = self.lookup.get(&order_id)?;
        self.side(order_ref.is_buy)
            .get(&order_ref.price_tick)?
            .iter()
            .find(|o| o.id == order_id)
    }

    /// Whether an order id is active in the book.
    pub fn contains(&self, order_id: i64) -> bool {
        self.lookup.contains_key(&order_id)
    }

    /// Number of active resting orders.
    pub fn order_count(&self) -> usize {
        self.lookup.len()
    }

    pub fn trade_log(&self) -> &TradeLog {
        &self.trade_log
    }

    /// All resting orders on one side as `(id, price_tick, quantity)`,
    /// best price first, FIFO within a level. Used by the fill sweep.
    pub fn resting_orders(&self, side: Side) -> Vec<(i64, i64, i32)> {
        let mut out = Vec::new();
        match side {
            Side::Buy => {
                for (&price, level) in self.buys.iter().rev() {
                    for o in level {
                        out.push((o.id, price, o.quantity));
                    }
                }
            }
            Side::Sell => {
                for (&price, level) in self.sells.iter() {
                    for o in level {
                        out.push((o.id, price, o.quantity));
                    }
                }
            }
        }
        out
    }

    /// Best bid/ask and per-level depth for observers.
    pub fn snapshot(&self) -> BookSnapshot {
        let depth = |level: &VecDeque<Order>| level.iter().map(|o| o.quantity as i64).sum();
        BookSnapshot {
            best_bid: self.best_bid(),
            best_ask: self.best_ask(),
            bid_depth: self
                .buys
                .iter()
                .rev()
                .map(|(&p, level)| (p, depth(level)))
                .collect(),
            ask_depth: self
                .sells
                .iter()
                .map(|(&p, level)| (p, depth(level)))
                .collect(),
        }
    }

    fn next_id(&mut self) -> i64 {
        let id = self.next_order_id;
        self.next_order_id += 1;
        id
    }

    fn side(&self, is_buy: bool) -> &BTreeMap<i64, VecDeque<Order>> {
        if is_buy {
            &self.buys
        } else {
            &self.sells
        }
    }

    fn side_mut(&mut self, is_buy: bool) -> &mut BTreeMap<i64, VecDeque<Order>> {
        if is_buy {
            &mut self.buys
        } else {
            &mut self.sells
        }
    }

    /// Match an incoming order against the opposite side.
    ///
    /// Consumes opposing levels in price order and orders within a level
    /// in arrival order, emitting trades at the resting order's price.
    /// Returns the trades plus the unfilled remainder.
    fn match_incoming(
        &mut self,
        is_buy: bool,
        limit_tick: i64,
        quantity: i32,
        ts_us: i64,
        taker_id: i64,
        metrics: &mut Metrics,
    ) -> (Vec<Trade>, i32) {
        let mut trades = Vec::new();
        let mut remainder = quantity;

        while remainder > 0 {
            // Best opposing price that still crosses the incoming limit.
            let best = if is_buy {
                self.sells.keys().next().copied().filter(|&p| p <= limit_tick)
            } else {
                self.buys.keys().next_back().copied().filter(|&p| p >= limit_tick)
            };
            let Some(level_price) = best else { break };

            // Consume the front order of the level, then release the level
            // borrow before touching the trade log / lookup / metrics.
            let (maker_id, fill_qty, exhausted, emptied) = {
                let level = self
                    .side_mut(!is_buy)
                    .get_mut(&level_price)
                    .expect("best price key just observed");
                let front = level.front_mut().expect("levels are never empty");
                let fill_qty = remainder.min(front.quantity);
                front.quantity -= fill_qty;
                front.ts_last_update_us = ts_us;
                let maker_id = front.id;
                let exhausted = front.quantity == 0;
                if exhausted {
                    front.is_active = false;
                    level.pop_front();
                }
                (maker_id, fill_qty, exhausted, level.is_empty())
            };
            remainder -= fill_qty;
            if exhausted {
                self.lookup.remove(&maker_id);
            }
            if emptied {
                self.side_mut(!is_buy).remove(&level_price);
            }

            let (buy_id, sell_id) = if is_buy {
                (taker_id, maker_id)
            } else {
                (maker_id, taker_id)
            };
            let trade = self.trade_log.add_trade(
                buy_id,
                sell_id,
                level_price,
                fill_qty,
                ts_us,
                trades.is_empty(),
            );
            trades.push(trade);

            metrics.on_fill(maker_id, level_price, fill_qty, ts_us, false);
            metrics.on_fill(taker_id, level_price, fill_qty, ts_us, true);
        }

        (trades, remainder)
    }

    fn remove_from_level(&mut self, order_id: i64, order_ref: OrderRef) {
        let level = self
            .side_mut(order_ref.is_buy)
            .get_mut(&order_ref.price_tick)
            .expect("order ref points at a missing level");
        let pos = level
            .iter()
            .position(|o| o.id == order_id)
            .expect("order ref points at a level that does not hold it");
        level.remove(pos);
        if level.is_empty() {
            self.side_mut(order_ref.is_buy).remove(&order_ref.price_tick);
        }
    }

    /// A crossed book after matching means the matching loop is broken;
    /// abort rather than let accounting silently corrupt.
    fn assert_uncrossed(&self) {
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            assert!(bid < ask, "crossed book: best bid {bid} >= best ask {ask}");
        }
    }
}
