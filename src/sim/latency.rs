//! Latency-aware event queue.
//!
//! Trading actions never hit the book synchronously; they are queued as
//! [`DeferredAction`]s with a uniformly sampled per-action-type delay and
//! drained by the strategy dispatcher once the sim clock reaches their
//! execution time. Events fire in non-decreasing `execute_at_us` order,
//! FIFO among equal timestamps (insertion sequence breaks ties).

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, Result};
use crate::sim::order::Trade;

/// The kinds of trading actions the queue models, each with its own
/// latency band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    OrderSend,
    Cancel,
    Modify,
    AcknowledgeFill,
    MarketUpdate,
}

/// Why a limit order is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    /// Speculative quote at mid +/- offset
    Ping,
    /// Round-trip closer placed after a ping fill
    Pong,
}

/// A deferred trading action with the data its dispatch needs.
///
/// A tagged variant instead of boxed callbacks keeps the hot path free of
/// allocation and lets the dispatcher pattern-match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeferredAction {
    SendLimit {
        is_buy: bool,
        price_tick: i64,
        quantity: i32,
        kind: QuoteKind,
    },
    SendIoc {
        is_buy: bool,
        quantity: i32,
    },
    Cancel {
        order_id: i64,
    },
    Modify {
        order_id: i64,
        new_quantity: i32,
    },
    AcknowledgeFill {
        trade: Trade,
    },
    MarketUpdate {
        mid_price_ticks: i64,
    },
}

impl DeferredAction {
    /// The latency band this action draws from.
    pub fn action_type(&self) -> ActionType {
        match self {
            DeferredAction::SendLimit { .. } | DeferredAction::SendIoc { .. } => {
                ActionType::OrderSend
            }
            DeferredAction::Cancel { .. } => ActionType::Cancel,
            DeferredAction::Modify { .. } => ActionType::Modify,
            DeferredAction::AcknowledgeFill { .. } => ActionType::AcknowledgeFill,
            DeferredAction::MarketUpdate { .. } => ActionType::MarketUpdate,
        }
    }
}

/// Inclusive `[min, max]` latency band in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyBounds {
    pub min_us: i64,
    pub max_us: i64,
}

impl LatencyBounds {
    pub fn new(min_us: i64, max_us: i64) -> Self {
        Self { min_us, max_us }
    }

    fn validate(&self, action: ActionType) -> Result<()> {
        if self.min_us > self.max_us {
            return Err(ConfigError::LatencyBounds {
                action,
                min_us: self.min_us,
                max_us: self.max_us,
            }
            .into());
        }
        Ok(())
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> i64 {
        rng.gen_range(self.min_us..=self.max_us)
    }
}

/// Per-action latency bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyProfile {
    pub order_send: LatencyBounds,
    pub cancel: LatencyBounds,
    pub modify: LatencyBounds,
    pub acknowledge_fill: LatencyBounds,
    pub market_update: LatencyBounds,
}

impl Default for LatencyProfile {
    fn default() -> Self {
        Self {
            order_send: LatencyBounds::new(50, 200),
            cancel: LatencyBounds::new(30, 150),
            modify: LatencyBounds::new(40, 180),
            acknowledge_fill: LatencyBounds::new(100, 400),
            market_update: LatencyBounds::new(50, 150),
        }
    }
}

impl LatencyProfile {
    pub fn bounds(&self, action: ActionType) -> &LatencyBounds {
        match action {
            ActionType::OrderSend => &self.order_send,
            ActionType::Cancel => &self.cancel,
            ActionType::Modify => &self.modify,
            ActionType::AcknowledgeFill => &self.acknowledge_fill,
            ActionType::MarketUpdate => &self.market_update,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.order_send.validate(ActionType::OrderSend)?;
        self.cancel.validate(ActionType::Cancel)?;
        self.modify.validate(ActionType::Modify)?;
        self.acknowledge_fill.validate(ActionType::AcknowledgeFill)?;
        self.market_update.validate(ActionType::MarketUpdate)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct QueuedEvent {
    execute_at_us: i64,
    seq: u64,
    action: DeferredAction,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.execute_at_us == other.execute_at_us && self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.execute_at_us, self.seq).cmp(&(other.execute_at_us, other.seq))
    }
}

/// Min-ordered queue of deferred actions keyed by `(execute_at_us, seq)`.
#[derive(Debug, Default)]
pub struct LatencyQueue {
    events: BinaryHeap<Reverse<QueuedEvent>>,
    next_seq: u64,
    profile: LatencyProfile,
}

impl LatencyQueue {
    pub fn new(profile: LatencyProfile) -> Self {
        Self {
            events: BinaryHeap::new(),
            next_seq: 0,
            profile,
        }
    }

    /// Queue an action, sampling its latency from the per-action band.
    /// Returns the timestamp the action will execute at.
    pub fn schedule<R: Rng>(
        &mut self,
        action: DeferredAction,
        now_us: i64,
        rng: &mut R,
    ) -> i64 {
        let delay = self.profile.bounds(action.action_type()).sample(rng);
        let execute_at_us = now_us + delay;
        self.events.push(Reverse(QueuedEvent {
            execute_at_us,
            seq: self.next_seq,
            action,
        }));
        self.next_seq += 1;
        execute_at_us
    }

    /// Pop the head event if it is due at or before `t_us`.
    ///
    /// Drain with `while let Some(..) = queue.pop_due(t)`; actions pushed
    /// while draining re-enter the ordering, so anything scheduled with an
    /// execution time at or before `t_us` still fires in the same drain.
    pub fn pop_due(&mut self, t_us: i64) -> Option<(i64, DeferredAction)> {
        let head = self.events.peek()?;
        if head.0.execute_at_us > t_us {
            return None;
        }
        let Reverse(event) = self.events.pop()?;
        Some((event.execute_at_us, event.action))
    }

    /// Execution time of the next pending event.
    pub fn next_execution_time_us(&self) -> Option<i64> {
        self.events.peek().map(|e| e.0.execute_at_us)
    }

    /// Replace the per-action latency bands. Fails without touching the
    /// queue if any band is inverted.
    pub fn reset_latency_profile(&mut self, profile: LatencyProfile) -> Result<()> {
        profile.validate()?;
        self.profile = profile;
        Ok(())
    }

    pub fn profile(&self) -> &LatencyProfile {
        &self.profile
    }

    /// Sample a latency for `action` without queueing anything.
    pub fn compute_execution_latency<R: Rng>(&self, action: ActionType, rng: &mut R) -> i64 {
        self.profile.bounds(action).sample(rng)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn queue() -> LatencyQueue {
        LatencyQueue::new(LatencyProfile::default())
    }

    #[test]
    fn test_schedule_samples_within_bounds() {
        let mut q = queue();
        let mut rng = rng();
        for _ in 0..200 {
            let at = q.schedule(DeferredAction::Cancel { order_id: 1 }, 1_000, &mut rng);
            assert!((1_030..=1_150).contains(&at), "cancel latency out of band: {at}");
        }
        assert_eq!(q.pending_events(), 200);
    }

    #[test]
    fn test_pop_due_non_decreasing_fifo_ties() {
        let mut q = LatencyQueue::new(LatencyProfile {
            order_send: LatencyBounds::new(100, 100),
            cancel: LatencyBounds::new(100, 100),
            modify: LatencyBounds::new(50, 50),
            acknowledge_fill: LatencyBounds::new(10, 10),
            market_update: LatencyBounds::new(100, 100),
        });
        let mut rng = rng();

        // Three events at t=100 (FIFO among ties), one at t=50, one at t=10.
        q.schedule(DeferredAction::Cancel { order_id: 1 }, 0, &mut rng);
        q.schedule(DeferredAction::Cancel { order_id: 2 }, 0, &mut rng);
        q.schedule(
            DeferredAction::Modify { order_id: 3, new_quantity: 1 },
            0,
            &mut rng,
        );
        q.schedule(DeferredAction::Cancel { order_id: 4 }, 0, &mut rng);
        q.schedule(
            DeferredAction::MarketUpdate { mid_price_ticks: 5 },
            0,
            &mut rng,
        );

        let mut fired = Vec::new();
        let mut last_at = i64::MIN;
        while let Some((at, action)) = q.pop_due(1_000) {
            assert!(at >= last_at);
            last_at = at;
            fired.push(action);
        }
        assert_eq!(fired.len(), 5);
        // t=50 modify fires before the t=100 group; ties keep insert order.
        assert!(matches!(fired[0], DeferredAction::Modify { order_id: 3, .. }));
        assert!(matches!(fired[1], DeferredAction::Cancel { order_id: 1 }));
        assert!(matches!(fired[2], DeferredAction::Cancel { order_id: 2 }));
        assert!(matches!(fired[3], DeferredAction::Cancel { order_id: 4 }));
        assert!(matches!(fired[4], DeferredAction::MarketUpdate { .. }));
    }

    #[test]
    fn test_pop_due_holds_future_events() {
        let mut q = queue();
        let mut rng = rng();
        let at = q.schedule(DeferredAction::Cancel { order_id: 1 }, 0, &mut rng);
        assert!(q.pop_due(at - 1).is_none());
        assert!(q.pop_due(at).is_some());
        assert!(q.is_empty());
    }

    #[test]
    fn test_events_scheduled_during_drain_fire_same_drain() {
        let mut q = LatencyQueue::new(LatencyProfile {
            cancel: LatencyBounds::new(5, 5),
            ..LatencyProfile::default()
        });
        let mut rng = rng();
        q.schedule(DeferredAction::Cancel { order_id: 1 }, 0, &mut rng);

        let mut fired = Vec::new();
        while let Some((at, action)) = q.pop_due(100) {
            if let DeferredAction::Cancel { order_id: 1 } = action {
                // Chained action lands at at+5 <= 100, so the same drain
                // must pick it up.
                q.schedule(DeferredAction::Cancel { order_id: 2 }, at, &mut rng);
            }
            fired.push((at, action));
        }
        assert_eq!(fired.len(), 2);
        assert!(matches!(fired[1].1, DeferredAction::Cancel { order_id: 2 }));
        assert_eq!(fired[1].0, 10);
    }

    #[test]
    fn test_reset_profile_rejects_inverted_bounds() {
        let mut q = queue();
        let bad = LatencyProfile {
            order_send: LatencyBounds::new(300, 200),
            ..LatencyProfile::default()
        };
        assert!(q.reset_latency_profile(bad).is_err());
        // Untouched profile still has the defaults.
        assert_eq!(q.profile().order_send, LatencyBounds::new(50, 200));

        let good = LatencyProfile {
            order_send: LatencyBounds::new(10, 20),
            ..LatencyProfile::default()
        };
        assert!(q.reset_latency_profile(good).is_ok());
        assert_eq!(q.profile().order_send, LatencyBounds::new(10, 20));
    }

    #[test]
    fn test_default_profile_matches_action_bands() {
        let profile = LatencyProfile::default();
        assert_eq!(profile.bounds(ActionType::OrderSend), &LatencyBounds::new(50, 200));
        assert_eq!(profile.bounds(ActionType::Cancel), &LatencyBounds::new(30, 150));
        assert_eq!(profile.bounds(ActionType::Modify), &LatencyBounds::new(40, 180));
        assert_eq!(
            profile.bounds(ActionType::AcknowledgeFill),
            &LatencyBounds::new(100, 400)
        );
        assert_eq!(
            profile.bounds(ActionType::MarketUpdate),
            &LatencyBounds::new(50, 150)
        );
    }

    #[test]
    fn test_action_type_mapping() {
        let limit = DeferredAction::SendLimit {
            is_buy: true,
            price_tick: 100,
            quantity: 1,
            kind: QuoteKind::Ping,
        };
        assert_eq!(limit.action_type(), ActionType::OrderSend);
        let ioc = DeferredAction::SendIoc { is_buy: false, quantity: 1 };
        assert_eq!(ioc.action_type(), ActionType::OrderSend);
        assert_eq!(
            DeferredAction::Cancel { order_id: 1 }.action_type(),
            ActionType::Cancel
        );
    }
}
