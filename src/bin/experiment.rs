//! Experiment runner for the ping-pong strategy simulator.
//!
//! # Usage
//!
//! ```bash
//! # Balanced strategy, default market
//! cargo run --bin experiment
//!
//! # Use the aggressive profile
//! cargo run --bin experiment -- --strategy aggressive
//!
//! # Compare all profiles over a 60 second session
//! cargo run --bin experiment -- --compare --duration 60000000
//!
//! # Custom parameters plus a JSON series dump
//! cargo run --bin experiment -- --quote-size 5 --tick-offset 1 --output run.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use pingpong_sim::{
    builtin_profiles, find_profile, init_logging, LogFormat, MarketConfig, Metrics, SimConfig,
    SimulationEngine, StrategyParams,
};

#[derive(Parser, Debug)]
#[command(
    name = "experiment",
    about = "HFT ping-pong strategy simulator",
    after_help = "Examples:\n  \
        experiment                        Balanced strategy, default config\n  \
        experiment --strategy aggressive  Use the aggressive profile\n  \
        experiment --compare              Run all strategies and compare\n  \
        experiment --list                 List available strategies\n  \
        experiment --duration 60000000    Run for 60 seconds"
)]
struct Args {
    /// Strategy profile to use
    #[arg(short, long, default_value = "balanced")]
    strategy: String,

    /// List all available strategies and exit
    #[arg(short, long)]
    list: bool,

    /// Run all strategies and compare results
    #[arg(short, long)]
    compare: bool,

    /// Shares per ping order (overrides profile)
    #[arg(long)]
    quote_size: Option<i32>,

    /// Ticks from mid for pings (overrides profile)
    #[arg(long)]
    tick_offset: Option<i64>,

    /// Maximum inventory (overrides profile)
    #[arg(long)]
    max_inv: Option<i64>,

    /// Ticks before cancel (overrides profile)
    #[arg(long)]
    cancel_threshold: Option<i64>,

    /// Microseconds between requotes (overrides profile)
    #[arg(long)]
    cooldown: Option<i64>,

    /// Start timestamp (us)
    #[arg(long, default_value_t = 1)]
    start: i64,

    /// Duration (us)
    #[arg(long, default_value_t = 10_000_000)]
    duration: i64,

    /// Time step (us)
    #[arg(long, default_value_t = 100)]
    step: i64,

    /// Starting mid price (ticks)
    #[arg(long, default_value_t = 10_000)]
    mid_price: i64,

    /// Starting spread (ticks)
    #[arg(long, default_value_t = 2)]
    spread: i64,

    /// Market volatility
    #[arg(long, default_value_t = 1.0)]
    volatility: f64,

    /// Volatility floor
    #[arg(long, default_value_t = 0.5)]
    min_volatility: f64,

    /// Base fill probability
    #[arg(long, default_value_t = 0.3)]
    fill_prob: f64,

    /// Minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Write the metric series and summary to a JSON file
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(LogFormat::Pretty, if args.quiet { "warn" } else { "info" });

    if args.list {
        list_strategies();
        return ExitCode::SUCCESS;
    }

    if args.compare {
        return run_comparison(&args);
    }

    let profile = match find_profile(&args.strategy) {
        Ok(profile) => profile,
        Err(err) => {
            eprintln!("ERROR: {err}");
            let keys: Vec<&str> = builtin_profiles().iter().map(|p| p.key).collect();
            eprintln!("Available: {}", keys.join(", "));
            eprintln!("Use --list to see strategy details");
            return ExitCode::FAILURE;
        }
    };

    let params = apply_overrides(profile.params, &args);
    let config = sim_config(params, &args);

    let mut sim = match SimulationEngine::new(config) {
        Ok(sim) => sim,
        Err(err) => {
            eprintln!("ERROR: {err}");
            return ExitCode::FAILURE;
        }
    };

    if !args.quiet {
        println!("\n{}", "=".repeat(60));
        println!("Running simulation: {}", profile.name);
        println!("{}", "=".repeat(60));
        println!(
            "Strategy: quote_size={}, tick_offset={}, max_inv={}, cancel_threshold={}, cooldown_us={}",
            params.quote_size,
            params.tick_offset,
            params.max_inventory,
            params.cancel_threshold_ticks,
            params.cooldown_us
        );
        println!(
            "Market: duration={}us, step={}us, mid_price={}, spread={}, vol={}, fill_prob={}",
            args.duration, args.step, args.mid_price, args.spread, args.volatility, args.fill_prob
        );
    }

    sim.run();
    print_summary(sim.metrics(), profile.name);

    if let Some(path) = &args.output {
        let export = sim.metrics().export();
        let json = match serde_json::to_string_pretty(&export) {
            Ok(json) => json,
            Err(err) => {
                eprintln!("ERROR: failed to serialize results: {err}");
                return ExitCode::FAILURE;
            }
        };
        if let Err(err) = std::fs::write(path, json) {
            eprintln!("ERROR: failed to write {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
        if !args.quiet {
            println!("Series written to {}", path.display());
        }
    }

    ExitCode::SUCCESS
}

fn apply_overrides(mut params: StrategyParams, args: &Args) -> StrategyParams {
    if let Some(v) = args.quote_size {
        params.quote_size = v;
    }
    if let Some(v) = args.tick_offset {
        params.tick_offset = v;
    }
    if let Some(v) = args.max_inv {
        params.max_inventory = v;
    }
    if let Some(v) = args.cancel_threshold {
        params.cancel_threshold_ticks = v;
    }
    if let Some(v) = args.cooldown {
        params.cooldown_us = v;
    }
    params
}

fn sim_config(params: StrategyParams, args: &Args) -> SimConfig {
    SimConfig {
        starting_timestamp_us: args.start,
        ending_timestamp_us: args.start + args.duration,
        step_us: args.step,
        strategy: params,
        market: MarketConfig {
            starting_mid_price: args.mid_price,
            start_spread: args.spread,
            start_vol: args.volatility,
            min_volatility: args.min_volatility,
            start_fill_prob: args.fill_prob,
            ..MarketConfig::default()
        },
        ..SimConfig::default()
    }
}

fn run_comparison(args: &Args) -> ExitCode {
    let mut results = Vec::new();
    for profile in builtin_profiles() {
        let config = sim_config(profile.params, args);
        let mut sim = match SimulationEngine::new(config) {
            Ok(sim) => sim,
            Err(err) => {
                eprintln!("ERROR: {err}");
                return ExitCode::FAILURE;
            }
        };
        sim.run();
        if !args.quiet {
            print_summary(sim.metrics(), profile.name);
        }
        results.push((profile.name, sim.metrics().summary()));
    }
    print_comparison(&results);
    ExitCode::SUCCESS
}

fn print_summary(metrics: &Metrics, strategy_name: &str) {
    println!("\n{}", "=".repeat(60));
    println!("RESULTS: {strategy_name}");
    println!("{}", "=".repeat(60));

    println!("\n--- PnL Metrics ---");
    println!("  Total PnL (ticks):      {:>12.2}", metrics.total_pnl_ticks());
    println!("  Realized PnL (ticks):   {:>12.2}", metrics.realized_pnl_ticks());
    println!("  Unrealized PnL (ticks): {:>12.2}", metrics.unrealized_pnl_ticks());
    println!("  Fees Paid (ticks):      {:>12.2}", metrics.fees_ticks());

    println!("\n--- Risk Metrics ---");
    println!("  Sharpe Ratio:           {:>12.4}", metrics.sharpe_ratio());
    println!("  Max Drawdown (ticks):   {:>12.2}", metrics.max_drawdown_ticks());
    println!("  Volatility:             {:>12.4}", metrics.volatility());

    println!("\n--- Performance Metrics ---");
    println!("  Win Rate:               {:>11.2}%", metrics.win_rate() * 100.0);
    println!("  Profit Factor:          {:>12.4}", metrics.profit_factor());
    println!("  Gross Profit:           {:>12.4}", metrics.gross_profit_ticks());
    println!("  Gross Loss:             {:>12.4}", metrics.gross_loss_ticks());

    println!("\n--- Trading Activity ---");
    println!("  Final Position:         {:>12}", metrics.position());
    println!("  Gross Traded Qty:       {:>12}", metrics.gross_traded_qty());
    println!("  Fill Ratio:             {:>11.2}%", metrics.fill_ratio() * 100.0);
    println!("  Total Slippage (ticks): {:>12}", metrics.total_slippage_ticks());

    println!("\n--- Order Statistics ---");
    println!("  Resting Attempted:      {:>12}", metrics.resting_attempted_qty());
    println!("  Resting Filled:         {:>12}", metrics.resting_filled_qty());
    println!("  Resting Cancelled:      {:>12}", metrics.resting_cancelled_qty());

    println!("\n--- Time Series Data ---");
    println!("  Data Points:            {:>12}", metrics.timestamp_series().len());
    println!("  Returns Buckets:        {:>12}", metrics.returns_series().len());

    println!("\n{}\n", "=".repeat(60));
}

fn print_comparison(results: &[(&str, pingpong_sim::MetricsSummary)]) {
    println!("\n{}", "=".repeat(80));
    println!("STRATEGY COMPARISON");
    println!("{}", "=".repeat(80));

    let mut header = format!("{:<25}", "Metric");
    for (name, _) in results {
        header.push_str(&format!("{name:>15}"));
    }
    println!("{header}");
    println!("{}", "-".repeat(80));

    let rows: Vec<(&str, Box<dyn Fn(&pingpong_sim::MetricsSummary) -> String>)> = vec![
        ("Total PnL", Box::new(|m| format!("{:.1}", m.total_pnl_ticks))),
        ("Realized PnL", Box::new(|m| format!("{:.1}", m.realized_pnl_ticks))),
        ("Sharpe Ratio", Box::new(|m| format!("{:.4}", m.sharpe_ratio))),
        ("Max Drawdown", Box::new(|m| format!("{:.1}", m.max_drawdown_ticks))),
        ("Win Rate", Box::new(|m| format!("{:.2}%", m.win_rate * 100.0))),
        ("Profit Factor", Box::new(|m| format!("{:.4}", m.profit_factor))),
        ("Fill Ratio", Box::new(|m| format!("{:.2}%", m.fill_ratio * 100.0))),
        ("Gross Traded Qty", Box::new(|m| m.gross_traded_qty.to_string())),
        ("Fees Paid", Box::new(|m| format!("{:.1}", m.fees_ticks))),
    ];

    for (label, getter) in &rows {
        let mut row = format!("{label:<25}");
        for (_, summary) in results {
            row.push_str(&format!("{:>15}", getter(summary)));
        }
        println!("{row}");
    }

    println!("{}\n", "=".repeat(80));
}

fn list_strategies() {
    println!("\n{}", "=".repeat(60));
    println!("AVAILABLE STRATEGIES");
    println!("{}", "=".repeat(60));
    for profile in builtin_profiles() {
        println!("\n[{}] {}", profile.key, profile.name);
        println!("  {}", profile.description);
        let p = &profile.params;
        println!(
            "  quote_size={}, tick_offset={}, max_inv={}, cancel_threshold={}, cooldown_us={}",
            p.quote_size, p.tick_offset, p.max_inventory, p.cancel_threshold_ticks, p.cooldown_us
        );
    }
    println!("\n{}", "=".repeat(60));
}
