//! Predefined strategy parameter profiles.

use crate::errors::{ConfigError, Result};
use crate::sim::strategy::StrategyParams;

/// A named strategy configuration.
#[derive(Debug, Clone, Copy)]
pub struct StrategyProfile {
    /// Lookup key used on the command line
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub params: StrategyParams,
}

/// Tight spreads, high frequency, large positions. Higher risk/reward.
pub const AGGRESSIVE: StrategyProfile = StrategyProfile {
    key: "aggressive",
    name: "Aggressive",
    description: "Tight spreads, high frequency, large positions. Higher risk/reward.",
    params: StrategyParams {
        quote_size: 5,
        tick_offset: 1,
        max_inventory: 20,
        cancel_threshold_ticks: 1,
        cooldown_us: 1_000,
    },
};

/// Moderate parameters. Good starting point for most conditions.
pub const BALANCED: StrategyProfile = StrategyProfile {
    key: "balanced",
    name: "Balanced",
    description: "Moderate parameters. Good starting point for most conditions.",
    params: StrategyParams {
        quote_size: 3,
        tick_offset: 2,
        max_inventory: 10,
        cancel_threshold_ticks: 2,
        cooldown_us: 5_000,
    },
};

/// Wider spreads, lower frequency, smaller positions. Lower risk.
pub const PASSIVE: StrategyProfile = StrategyProfile {
    key: "passive",
    name: "Passive",
    description: "Wider spreads, lower frequency, smaller positions. Lower risk.",
    params: StrategyParams {
        quote_size: 1,
        tick_offset: 3,
        max_inventory: 5,
        cancel_threshold_ticks: 3,
        cooldown_us: 10_000,
    },
};

/// Every built-in profile, in display order.
pub fn builtin_profiles() -> &'static [StrategyProfile] {
    &[AGGRESSIVE, BALANCED, PASSIVE]
}

/// Look up a profile by key (case-insensitive).
pub fn find_profile(key: &str) -> Result<StrategyProfile> {
    let wanted = key.to_lowercase();
    builtin_profiles()
        .iter()
        .find(|p| p.key == wanted)
        .copied()
        .ok_or_else(|| ConfigError::UnknownProfile(key.to_string()).into())
}
