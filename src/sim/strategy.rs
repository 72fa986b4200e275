//! Ping-pong market-making strategy.
//!
//! The strategy places speculative "ping" quotes one offset away from
//! the mid and, when a ping fills, queues the opposite-side "pong" one
//! tick through the fill price to capture the round trip. It never
//! mutates the order book synchronously: every reaction is scheduled
//! through the latency queue and executed by the dispatcher once the sim
//! clock reaches the sampled execution time.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{ConfigError, Result};
use crate::sim::book::OrderBook;
use crate::sim::latency::{DeferredAction, LatencyProfile, LatencyQueue, QuoteKind};
use crate::sim::logging::targets;
use crate::sim::metrics::Metrics;
use crate::sim::order::{Trade, NO_ORDER};

/// Where the strategy is in its ping-pong cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyState {
    WaitingToBuy,
    WaitingToSell,
    #[default]
    Balanced,
}

/// Strategy parameters, fixed at construction and adjustable via setters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Shares per ping order
    pub quote_size: i32,
    /// Ping distance from the mid, in ticks
    pub tick_offset: i64,
    /// Absolute inventory bound; pings stop once a fill could exceed it
    pub max_inventory: i64,
    /// Mid move (ticks) beyond which resting pings are cancelled
    pub cancel_threshold_ticks: i64,
    /// Minimum microseconds between requote cycles
    pub cooldown_us: i64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            quote_size: 1,
            tick_offset: 1,
            max_inventory: 10,
            cancel_threshold_ticks: 1,
            cooldown_us: 1,
        }
    }
}

impl StrategyParams {
    pub fn validate(&self) -> Result<()> {
        if self.quote_size <= 0 {
            return Err(ConfigError::NonPositive {
                name: "quote_size",
                value: self.quote_size as i64,
            }
            .into());
        }
        for (name, value) in [
            ("tick_offset", self.tick_offset),
            ("max_inventory", self.max_inventory),
            ("cancel_threshold_ticks", self.cancel_threshold_ticks),
            ("cooldown_us", self.cooldown_us),
        ] {
            if value < 0 {
                return Err(ConfigError::NonPositive { name, value }.into());
            }
        }
        Ok(())
    }
}

/// A queued pong opportunity: price and quantity recorded when the
/// matching ping filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PongOrder {
    pub price_tick: i64,
    pub quantity: i32,
}

/// Ping-pong market maker over the latency queue and order book.
#[derive(Debug)]
pub struct PingPongStrategy {
    params: StrategyParams,
    state: StrategyState,

    /// Active ping ids; `NO_ORDER` when the side is idle
    active_buy_order_id: i64,
    active_sell_order_id: i64,
    /// A send is queued but not yet executed for the side
    buy_send_inflight: bool,
    sell_send_inflight: bool,

    last_pinged_mid_ticks: Option<i64>,
    last_quote_time_us: i64,
    current_mid_ticks: i64,

    /// Buy pongs pop best (highest) price first
    buy_pongs: BinaryHeap<PongOrder>,
    /// Sell pongs pop best (lowest) price first
    sell_pongs: BinaryHeap<Reverse<PongOrder>>,
    /// Live pong order ids, for classifying fills
    pong_order_ids: HashSet<i64>,

    latency: LatencyQueue,
}

impl PingPongStrategy {
    pub fn new(params: StrategyParams, latency_profile: LatencyProfile) -> Result<Self> {
        params.validate()?;
        latency_profile.validate()?;
        Ok(Self {
            params,
            state: StrategyState::Balanced,
            active_buy_order_id: NO_ORDER,
            active_sell_order_id: NO_ORDER,
            buy_send_inflight: false,
            sell_send_inflight: false,
            last_pinged_mid_ticks: None,
            last_quote_time_us: 0,
            current_mid_ticks: 0,
            buy_pongs: BinaryHeap::new(),
            sell_pongs: BinaryHeap::new(),
            pong_order_ids: HashSet::new(),
            latency: LatencyQueue::new(latency_profile),
        })
    }

    // ------------------------------------------------------------------
    // Entry points called by the market engine
    // ------------------------------------------------------------------

    /// Queue a market-data update; the strategy reacts once it arrives.
    pub fn schedule_market_update<R: Rng>(&mut self, t_us: i64, mid_ticks: i64, rng: &mut R) {
        self.latency.schedule(
            DeferredAction::MarketUpdate {
                mid_price_ticks: mid_ticks,
            },
            t_us,
            rng,
        );
    }

    /// Queue a fill acknowledgement for one of our trades.
    pub fn notify_fill<R: Rng>(&mut self, trade: Trade, t_us: i64, rng: &mut R) {
        self.latency
            .schedule(DeferredAction::AcknowledgeFill { trade }, t_us, rng);
    }

    /// Drain and dispatch every queued action due at or before `t_us`.
    ///
    /// The only synchronous book access the strategy performs; called by
    /// the market engine at the end of each tick.
    pub fn execute_latency_queue<R: Rng>(
        &mut self,
        t_us: i64,
        book: &mut OrderBook,
        metrics: &mut Metrics,
        rng: &mut R,
    ) {
        while let Some((at_us, action)) = self.latency.pop_due(t_us) {
            self.dispatch(at_us, action, book, metrics, rng);
        }
    }

    // ------------------------------------------------------------------
    // Strategy logic
    // ------------------------------------------------------------------

    /// React to a (latency-delayed) market price update. Only schedules
    /// further actions; the book is never touched here.
    pub fn on_market_update<R: Rng>(
        &mut self,
        t_us: i64,
        mid_ticks: i64,
        position: i64,
        rng: &mut R,
    ) {
        self.current_mid_ticks = mid_ticks;

        // Stale pings: the mid ran away from the quoted level.
        if let Some(last_mid) = self.last_pinged_mid_ticks {
            if (mid_ticks - last_mid).abs() > self.params.cancel_threshold_ticks {
                if self.active_buy_order_id != NO_ORDER {
                    self.latency.schedule(
                        DeferredAction::Cancel {
                            order_id: self.active_buy_order_id,
                        },
                        t_us,
                        rng,
                    );
                    self.active_buy_order_id = NO_ORDER;
                }
                if self.active_sell_order_id != NO_ORDER {
                    self.latency.schedule(
                        DeferredAction::Cancel {
                            order_id: self.active_sell_order_id,
                        },
                        t_us,
                        rng,
                    );
                    self.active_sell_order_id = NO_ORDER;
                }
            }
        }

        if t_us - self.last_quote_time_us < self.params.cooldown_us {
            return;
        }

        // Ping placement, gated so a fill can never push inventory past
        // the bound.
        let quote = self.params.quote_size as i64;
        if position + quote <= self.params.max_inventory
            && self.active_buy_order_id == NO_ORDER
            && !self.buy_send_inflight
        {
            let price_tick = mid_ticks - self.params.tick_offset;
            if price_tick > 0 {
                self.latency.schedule(
                    DeferredAction::SendLimit {
                        is_buy: true,
                        price_tick,
                        quantity: self.params.quote_size,
                        kind: QuoteKind::Ping,
                    },
                    t_us,
                    rng,
                );
                self.buy_send_inflight = true;
            }
        }
        if position - quote >= -self.params.max_inventory
            && self.active_sell_order_id == NO_ORDER
            && !self.sell_send_inflight
        {
            self.latency.schedule(
                DeferredAction::SendLimit {
                    is_buy: false,
                    price_tick: mid_ticks + self.params.tick_offset,
                    quantity: self.params.quote_size,
                    kind: QuoteKind::Ping,
                },
                t_us,
                rng,
            );
            self.sell_send_inflight = true;
        }

        // Requote pongs whose price the mid has reached or moved through.
        while let Some(&Reverse(pong)) = self.sell_pongs.peek() {
            if pong.price_tick > mid_ticks + 1 {
                break;
            }
            self.sell_pongs.pop();
            self.latency.schedule(
                DeferredAction::SendLimit {
                    is_buy: false,
                    price_tick: pong.price_tick,
                    quantity: pong.quantity,
                    kind: QuoteKind::Pong,
                },
                t_us,
                rng,
            );
        }
        while let Some(&pong) = self.buy_pongs.peek() {
            if pong.price_tick < mid_ticks - 1 {
                break;
            }
            self.buy_pongs.pop();
            self.latency.schedule(
                DeferredAction::SendLimit {
                    is_buy: true,
                    price_tick: pong.price_tick,
                    quantity: pong.quantity,
                    kind: QuoteKind::Pong,
                },
                t_us,
                rng,
            );
        }

        self.last_pinged_mid_ticks = Some(mid_ticks);
        self.last_quote_time_us = t_us;
    }

    /// React to an acknowledged fill of one of our orders.
    pub fn on_fill(&mut self, trade: &Trade, book: &OrderBook) {
        // A ping fill spawns the opposite pong one tick through the fill.
        if self.active_buy_order_id != NO_ORDER && trade.buy_order_id == self.active_buy_order_id
        {
            self.sell_pongs.push(Reverse(PongOrder {
                price_tick: trade.price_tick + 1,
                quantity: trade.quantity,
            }));
            self.state = StrategyState::WaitingToSell;
            debug!(
                target: targets::STRATEGY,
                price_tick = trade.price_tick,
                quantity = trade.quantity,
                "buy ping filled, sell pong queued"
            );
            if !book.contains(trade.buy_order_id) {
                self.active_buy_order_id = NO_ORDER;
            }
        }
        if self.active_sell_order_id != NO_ORDER
            && trade.sell_order_id == self.active_sell_order_id
        {
            self.buy_pongs.push(PongOrder {
                price_tick: trade.price_tick - 1,
                quantity: trade.quantity,
            });
            self.state = StrategyState::WaitingToBuy;
            debug!(
                target: targets::STRATEGY,
                price_tick = trade.price_tick,
                quantity = trade.quantity,
                "sell ping filled, buy pong queued"
            );
            if !book.contains(trade.sell_order_id) {
                self.active_sell_order_id = NO_ORDER;
            }
        }

        // A pong fill closes the round trip.
        for id in [trade.buy_order_id, trade.sell_order_id] {
            if self.pong_order_ids.contains(&id) {
                if !book.contains(id) {
                    self.pong_order_ids.remove(&id);
                }
                self.state = StrategyState::Balanced;
            }
        }
    }

    // ------------------------------------------------------------------
    // Dispatcher
    // ------------------------------------------------------------------

    fn dispatch<R: Rng>(
        &mut self,
        at_us: i64,
        action: DeferredAction,
        book: &mut OrderBook,
        metrics: &mut Metrics,
        rng: &mut R,
    ) {
        match action {
            DeferredAction::MarketUpdate { mid_price_ticks } => {
                let position = metrics.position();
                self.on_market_update(at_us, mid_price_ticks, position, rng);
            }
            DeferredAction::SendLimit {
                is_buy,
                price_tick,
                quantity,
                kind,
            } => self.dispatch_send_limit(at_us, is_buy, price_tick, quantity, kind, book, metrics, rng),
            DeferredAction::SendIoc { is_buy, quantity } => {
                match book.add_ioc_order(is_buy, quantity, at_us, metrics) {
                    Ok(result) => {
                        for trade in result.trades {
                            self.notify_fill(trade, at_us, rng);
                        }
                    }
                    Err(err) => warn!(target: targets::STRATEGY, %err, "IOC send rejected"),
                }
            }
            DeferredAction::Cancel { order_id } => {
                // No-op if the order filled or vanished in the meantime.
                if !book.cancel_order(order_id, metrics) {
                    debug!(target: targets::STRATEGY, order_id, "cancel arrived for inactive order");
                }
                self.pong_order_ids.remove(&order_id);
            }
            DeferredAction::Modify {
                order_id,
                new_quantity,
            } => {
                if !book.modify_order(order_id, new_quantity, at_us, metrics) {
                    debug!(target: targets::STRATEGY, order_id, "modify arrived for inactive order");
                }
            }
            DeferredAction::AcknowledgeFill { trade } => self.on_fill(&trade, book),
        }
    }

    fn dispatch_send_limit<R: Rng>(
        &mut self,
        at_us: i64,
        is_buy: bool,
        price_tick: i64,
        quantity: i32,
        kind: QuoteKind,
        book: &mut OrderBook,
        metrics: &mut Metrics,
        rng: &mut R,
    ) {
        if kind == QuoteKind::Ping {
            if is_buy {
                self.buy_send_inflight = false;
            } else {
                self.sell_send_inflight = false;
            }
            // At most one active ping per side.
            let occupied = if is_buy {
                self.active_buy_order_id != NO_ORDER
            } else {
                self.active_sell_order_id != NO_ORDER
            };
            if occupied {
                debug!(target: targets::STRATEGY, is_buy, "ping skipped, side already quoted");
                return;
            }
        }

        match book.add_limit_order(is_buy, price_tick, quantity, at_us, metrics) {
            Ok(result) => {
                match kind {
                    QuoteKind::Ping => {
                        if is_buy {
                            self.active_buy_order_id = result.order_id;
                        } else {
                            self.active_sell_order_id = result.order_id;
                        }
                    }
                    QuoteKind::Pong => {
                        self.pong_order_ids.insert(result.order_id);
                    }
                }
                for trade in result.trades {
                    self.notify_fill(trade, at_us, rng);
                }
            }
            Err(err) => warn!(target: targets::STRATEGY, %err, "limit send rejected"),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> StrategyState {
        self.state
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn active_buy_order_id(&self) -> i64 {
        self.active_buy_order_id
    }

    pub fn active_sell_order_id(&self) -> i64 {
        self.active_sell_order_id
    }

    pub fn last_pinged_mid_price_ticks(&self) -> Option<i64> {
        self.last_pinged_mid_ticks
    }

    pub fn last_quote_time_us(&self) -> i64 {
        self.last_quote_time_us
    }

    pub fn current_mid_ticks(&self) -> i64 {
        self.current_mid_ticks
    }

    pub fn latency_queue(&self) -> &LatencyQueue {
        &self.latency
    }

    /// Pending buy pongs as `(price, quantity)`, best price first.
    pub fn buy_pongs(&self) -> Vec<(i64, i32)> {
        let mut heap = self.buy_pongs.clone();
        let mut out = Vec::with_capacity(heap.len());
        while let Some(p) = heap.pop() {
            out.push((p.price_tick, p.quantity));
        }
        out
    }

    /// Pending sell pongs as `(price, quantity)`, best price first.
    pub fn sell_pongs(&self) -> Vec<(i64, i32)> {
        let mut heap = self.sell_pongs.clone();
        let mut out = Vec::with_capacity(heap.len());
        while let Some(Reverse(p)) = heap.pop() {
            out.push((p.price_tick, p.quantity));
        }
        out
    }

    pub fn set_quote_size(&mut self, value: i32) {
        self.params.quote_size = value;
    }

    pub fn set_tick_offset(&mut self, value: i64) {
        self.params.tick_offset = value;
    }

    pub fn set_max_inventory(&mut self, value: i64) {
        self.params.max_inventory = value;
    }

    pub fn set_cancel_threshold_ticks(&mut self, value: i64) {
        self.params.cancel_threshold_ticks = value;
    }

    pub fn set_cooldown_us(&mut self, value: i64) {
        self.params.cooldown_us = value;
    }

    /// Replace the latency queue's per-action bounds.
    pub fn set_latency_profile(&mut self, profile: LatencyProfile) -> Result<()> {
        self.latency.reset_latency_profile(profile)
    }
}
