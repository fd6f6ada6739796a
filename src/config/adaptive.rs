//! Adaptive parameter controller configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Adaptive threshold settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Whether thresholds adapt at all.
    pub enabled: bool,
    /// Number of recent closed trades in the rolling window.
    pub window: usize,
    /// Win rate the controller steers toward.
    pub target_win_rate: f64,
    /// Proportional gain of each update.
    pub sensitivity: f64,
    /// Time a new volatility regime must persist before it is adopted.
    #[serde(with = "duration")]
    pub regime_dwell: Duration,
    /// ATR% below which the market is considered calm.
    pub low_volatility_pct: Decimal,
    /// ATR% above which the market is considered volatile.
    pub high_volatility_pct: Decimal,
    /// Starting confidence floor.
    pub initial_min_confidence: f64,
    /// Starting per-trade risk ceiling, as a fraction of capital.
    pub initial_max_risk: Decimal,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 20,
            target_win_rate: 0.5,
            sensitivity: 0.1,
            regime_dwell: Duration::from_secs(300),
            low_volatility_pct: dec!(1.0),
            high_volatility_pct: dec!(3.0),
            initial_min_confidence: 0.6,
            initial_max_risk: dec!(0.02),
        }
    }
}
