//! Risk management configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Risk management settings.
///
/// Percentages are expressed in percent units ("1.5" means 1.5%); fractions
/// of capital (`max_risk_cap`, `kelly_fraction`) are plain decimals.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Stop distance as a multiple of ATR%.
    pub sl_atr_multiplier: Decimal,
    /// Take-profit distance as a multiple of ATR%.
    pub tp_atr_multiplier: Decimal,
    /// Lower bound on the stop distance, in percent of entry.
    pub min_sl_distance_pct: Decimal,
    /// Upper bound on the stop distance, in percent of entry.
    pub max_sl_distance_pct: Decimal,
    /// Minimum accepted reward:risk ratio.
    pub min_reward_risk: Decimal,
    /// Multiplier applied to the raw Kelly fraction (e.g., "0.25" for quarter Kelly).
    pub kelly_fraction: Decimal,
    /// Hard cap on the fraction of capital risked per trade (e.g., "0.02").
    pub max_risk_cap: Decimal,
    /// Below this many trades the win rate is blended toward the prior.
    pub kelly_min_samples: u32,
    /// From this many trades on the empirical win rate is used directly.
    pub kelly_full_trust_samples: u32,
    /// Conservative prior win probability used for thin histories.
    pub kelly_prior_win_rate: Decimal,
    /// Number of recent trades considered for Kelly statistics.
    pub kelly_history_window: u32,
    /// Maximum notional of a single position, in percent of capital.
    pub max_notional_pct: Decimal,
    /// Minimum expected net profit (quote currency) at the take-profit.
    pub min_net_profit: Decimal,
    /// Expected net profit must be at least this multiple of round-trip fees.
    pub min_fee_multiple: Decimal,
    /// Drawdown from peak equity, in percent, that trips the kill switch.
    pub kill_switch_drawdown_pct: Decimal,
    /// How long the kill switch blocks new trades once tripped.
    #[serde(with = "duration")]
    pub kill_switch_cooldown: Duration,
    /// Risk reduction per consecutive loss (e.g., "0.15" removes 15% per loss).
    pub loss_streak_penalty: Decimal,
    /// Lowest dampening factor the loss streak can push risk down to.
    pub min_dampening_factor: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            sl_atr_multiplier: dec!(2.0),
            tp_atr_multiplier: dec!(4.0),
            min_sl_distance_pct: dec!(0.5),
            max_sl_distance_pct: dec!(5.0),
            min_reward_risk: dec!(2.0),
            kelly_fraction: dec!(0.25),
            max_risk_cap: dec!(0.02),
            kelly_min_samples: 10,
            kelly_full_trust_samples: 50,
            kelly_prior_win_rate: dec!(0.45),
            kelly_history_window: 100,
            max_notional_pct: dec!(100),
            min_net_profit: dec!(1.0),
            min_fee_multiple: dec!(3.0),
            kill_switch_drawdown_pct: dec!(10),
            kill_switch_cooldown: Duration::from_secs(24 * 3600),
            loss_streak_penalty: dec!(0.15),
            min_dampening_factor: dec!(0.4),
        }
    }
}
