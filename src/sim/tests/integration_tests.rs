//! Integration tests for the full simulator pipeline:
//! - ping -> pong round trips through the latency queue
//! - matching plus accounting consistency for crossing orders
//! - book invariants under randomized operation sequences
//! - end-to-end runs with the built-in strategy profiles

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::sim::book::OrderBook;
    use crate::sim::engine::{SimConfig, SimulationEngine};
    use crate::sim::latency::{LatencyBounds, LatencyProfile};
    use crate::sim::metrics::Metrics;
    use crate::sim::order::Side;
    use crate::sim::profiles;
    use crate::sim::strategy::{PingPongStrategy, StrategyParams, StrategyState};

    fn zero_latency() -> LatencyProfile {
        LatencyProfile {
            order_send: LatencyBounds::new(0, 0),
            cancel: LatencyBounds::new(0, 0),
            modify: LatencyBounds::new(0, 0),
            acknowledge_fill: LatencyBounds::new(0, 0),
            market_update: LatencyBounds::new(0, 0),
        }
    }

    // =========================================================================
    // Ping -> pong round trip
    // =========================================================================

    #[test]
    fn test_ping_pong_round_trip_realizes_one_tick() {
        let params = StrategyParams {
            quote_size: 1,
            tick_offset: 2,
            max_inventory: 10,
            cancel_threshold_ticks: 1_000,
            cooldown_us: 0,
        };
        let mut strat = PingPongStrategy::new(params, zero_latency()).unwrap();
        let mut book = OrderBook::new();
        let mut metrics = Metrics::default();
        let mut rng = StdRng::seed_from_u64(1);

        // Quote cycle at mid 10000: pings land at 9998 and 10002.
        metrics.on_market_price_update(1, 9_999, 10_001);
        strat.on_market_update(1, 10_000, 0, &mut rng);
        strat.execute_latency_queue(1, &mut book, &mut metrics, &mut rng);
        assert_eq!(book.best_bid(), Some(9_998));
        assert_eq!(book.best_ask(), Some(10_002));

        // The market trades through the buy ping.
        let buy_id = strat.active_buy_order_id();
        let trade = book.fill_resting(buy_id, 1, 10, &mut metrics).unwrap();
        assert_eq!(trade.price_tick, 9_998);
        strat.notify_fill(trade, 10, &mut rng);
        strat.execute_latency_queue(10, &mut book, &mut metrics, &mut rng);

        assert_eq!(strat.state(), StrategyState::WaitingToSell);
        assert_eq!(strat.sell_pongs(), vec![(9_999, 1)]);
        assert_eq!(metrics.position(), 1);

        // Mid drifts to 9999: the sell pong becomes marketable and is placed.
        strat.on_market_update(20, 9_999, 1, &mut rng);
        strat.execute_latency_queue(20, &mut book, &mut metrics, &mut rng);
        assert!(strat.sell_pongs().is_empty());
        assert_eq!(book.best_ask(), Some(9_999));

        // The pong fill closes the round trip one tick above the entry.
        let pong_id = book
            .resting_orders(Side::Sell)
            .into_iter()
            .find(|&(_, price, _)| price == 9_999)
            .map(|(id, _, _)| id)
            .unwrap();
        let trade = book.fill_resting(pong_id, 1, 30, &mut metrics).unwrap();
        strat.notify_fill(trade, 30, &mut rng);
        strat.execute_latency_queue(30, &mut book, &mut metrics, &mut rng);

        assert_eq!(metrics.position(), 0);
        assert!((metrics.realized_pnl_ticks() - 1.0).abs() < 1e-9);
        assert_eq!(strat.state(), StrategyState::Balanced);
        assert_eq!(metrics.unrealized_pnl_ticks(), 0.0);
    }

    // =========================================================================
    // Matching and accounting consistency
    // =========================================================================

    #[test]
    fn test_crossing_buy_matches_weighted_entry_accounting() {
        let mut book = OrderBook::new();
        let mut ours = Metrics::default();
        let mut theirs = Metrics::default();

        // Another participant rests sells at 101 (2) and 102 (3).
        book.add_limit_order(false, 101, 2, 1, &mut theirs).unwrap();
        book.add_limit_order(false, 102, 3, 2, &mut theirs).unwrap();

        // Our buy for 5 at 103 lifts both levels at maker prices.
        let result = book.add_limit_order(true, 103, 5, 10, &mut ours).unwrap();
        assert_eq!(result.trades.len(), 2);
        let filled: i32 = result.trades.iter().map(|t| t.quantity).sum();
        assert_eq!(filled, 5);
        assert_eq!(ours.position(), 5);
        // Weighted entry: (101*2 + 102*3) / 5.
        assert!((ours.average_entry_price_ticks() - 101.6).abs() < 1e-9);
        assert_eq!(ours.gross_traded_qty(), 5);
        assert!(!book.contains(result.order_id));

        // Selling out at 105 realizes against the weighted entry.
        let sell = book.add_limit_order(false, 105, 5, 20, &mut ours).unwrap();
        let trade = book.fill_resting(sell.order_id, 5, 30, &mut ours).unwrap();
        assert_eq!(trade.quantity, 5);
        assert_eq!(ours.position(), 0);
        assert!((ours.realized_pnl_ticks() - (105.0 - 101.6) * 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_add_then_cancel_restores_book_and_counts() {
        let mut book = OrderBook::new();
        let mut metrics = Metrics::default();
        let before = book.snapshot();

        let result = book.add_limit_order(true, 95, 10, 1, &mut metrics).unwrap();
        assert!(book.cancel_order(result.order_id, &mut metrics));

        let after = book.snapshot();
        assert_eq!(before.best_bid, after.best_bid);
        assert_eq!(before.bid_depth, after.bid_depth);
        assert!(!book.contains(result.order_id));
        assert_eq!(metrics.resting_attempted_qty(), 10);
        assert_eq!(metrics.resting_cancelled_qty(), 10);
    }

    // =========================================================================
    // Book invariants under randomized operations
    // =========================================================================

    #[test]
    fn test_book_invariants_under_random_operations() {
        let mut book = OrderBook::new();
        let mut metrics = Metrics::default();
        let mut rng = StdRng::seed_from_u64(2024);
        let mut live_ids: Vec<i64> = Vec::new();

        for ts in 0..2_000i64 {
            match rng.gen_range(0..10) {
                0..=5 => {
                    let is_buy = rng.gen::<bool>();
                    let price = rng.gen_range(9_990..=10_010);
                    let qty = rng.gen_range(1..=5);
                    let result = book
                        .add_limit_order(is_buy, price, qty, ts, &mut metrics)
                        .unwrap();
                    if book.contains(result.order_id) {
                        live_ids.push(result.order_id);
                    }
                }
                6 => {
                    let qty = rng.gen_range(1..=5);
                    book.add_ioc_order(rng.gen::<bool>(), qty, ts, &mut metrics)
                        .unwrap();
                }
                7..=8 => {
                    if !live_ids.is_empty() {
                        let idx = rng.gen_range(0..live_ids.len());
                        book.cancel_order(live_ids.swap_remove(idx), &mut metrics);
                    }
                }
                _ => {
                    if !live_ids.is_empty() {
                        let idx = rng.gen_range(0..live_ids.len());
                        let new_qty = rng.gen_range(0..=6);
                        book.modify_order(live_ids[idx], new_qty, ts, &mut metrics);
                    }
                }
            }

            // Uncrossed after every operation.
            if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
                assert!(bid < ask, "crossed at ts {ts}: {bid} >= {ask}");
            }
            // Lookup agrees with level contents for everything still live.
            live_ids.retain(|&id| book.contains(id));
            for &id in &live_ids {
                let order = book.order(id).expect("lookup promised this id");
                assert_eq!(order.id, id);
                assert!(order.quantity > 0);
                assert!(order.is_active);
            }
        }

        // Trade log is monotone in time by construction; spot-check it.
        let log = book.trade_log().trades();
        for pair in log.windows(2) {
            assert!(pair[0].timestamp_us <= pair[1].timestamp_us);
        }
        assert!(
            metrics.resting_filled_qty() + metrics.resting_cancelled_qty()
                <= metrics.resting_attempted_qty()
        );
    }

    // =========================================================================
    // End-to-end runs
    // =========================================================================

    #[test]
    fn test_full_run_with_each_profile() {
        for profile in profiles::builtin_profiles() {
            let config = SimConfig {
                starting_timestamp_us: 1,
                ending_timestamp_us: 500_000,
                step_us: 100,
                strategy: profile.params,
                ..SimConfig::default()
            };
            let mut sim = SimulationEngine::new(config).unwrap();
            sim.run();
            let m = sim.metrics();

            // The strategy quotes once the cooldown allows it.
            assert!(
                m.resting_attempted_qty() > 0,
                "profile {} never quoted",
                profile.key
            );
            // Accounting identity and NaN-freeness hold for every profile.
            assert!(
                (m.total_pnl_ticks()
                    - (m.realized_pnl_ticks() + m.unrealized_pnl_ticks() - m.fees_ticks()))
                .abs()
                    < 1e-9
            );
            assert!(m.sharpe_ratio().is_finite());
            assert!(m.volatility().is_finite());
            assert!(m.max_drawdown_ticks() >= 0.0);
            assert!(m.fill_ratio() >= 0.0 && m.fill_ratio() <= 1.0);

            // Trade log is monotone across the whole run.
            let log = sim.market_engine().book().trade_log().trades();
            for pair in log.windows(2) {
                assert!(pair[0].timestamp_us <= pair[1].timestamp_us);
            }
        }
    }

    #[test]
    fn test_export_series_are_aligned() {
        let config = SimConfig {
            starting_timestamp_us: 1,
            ending_timestamp_us: 200_000,
            step_us: 100,
            ..SimConfig::default()
        };
        let mut sim = SimulationEngine::new(config).unwrap();
        sim.run();
        let export = sim.metrics().export();
        let n = export.timestamp_us.len();
        assert!(n > 0);
        assert_eq!(export.total_pnl_ticks.len(), n);
        assert_eq!(export.realized_pnl_ticks.len(), n);
        assert_eq!(export.unrealized_pnl_ticks.len(), n);
        assert_eq!(export.spread_ticks.len(), n);
        assert_eq!(export.market_price_ticks.len(), n);

        // Round-trips through JSON for the external consumers.
        let json = serde_json::to_string(&export).unwrap();
        let parsed: crate::sim::metrics::MetricsExport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.timestamp_us.len(), n);
    }
}
