//! Trailing stop configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Trailing stop settings, in percent units.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrailingConfig {
    /// Whether the trailing stop runs at all.
    pub enabled: bool,
    /// Unrealized profit that arms the trailing stop.
    pub activation_profit_pct: Decimal,
    /// Distance kept behind the best favorable price.
    pub trail_distance_pct: Decimal,
    /// Profit every trailing stop must lock in, relative to entry.
    pub min_profit_to_lock_pct: Decimal,
    /// Minimum gap between a new stop and the live price.
    pub safety_margin_pct: Decimal,
    /// Minimum time between two stop updates of the same position.
    #[serde(with = "duration")]
    pub cooldown: Duration,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            activation_profit_pct: dec!(2.0),
            trail_distance_pct: dec!(1.0),
            min_profit_to_lock_pct: dec!(0.8),
            safety_margin_pct: dec!(0.2),
            cooldown: Duration::from_secs(30),
        }
    }
}
