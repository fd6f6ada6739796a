//! Volatility-derived stop-loss and take-profit levels.

use rust_decimal::Decimal;

use crate::config::RiskConfig;
use crate::domain::Side;

/// Protective levels for a prospective entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectiveLevels {
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// Stop distance in percent of entry.
    pub stop_distance_pct: Decimal,
    /// Take-profit distance in percent of entry.
    pub take_profit_distance_pct: Decimal,
}

impl ProtectiveLevels {
    /// Reward:risk ratio of these levels for the given entry.
    pub fn reward_risk(&self, entry: Decimal) -> Option<Decimal> {
        reward_risk(entry, self.stop_loss, self.take_profit)
    }
}

/// Derives SL/TP from ATR%.
///
/// Stop distance is `max(sl_multiplier * atr%, min_distance%)` capped at
/// `max_distance%`; take-profit distance is `tp_multiplier * atr%`.
pub fn derive_levels(config: &RiskConfig, side: Side, entry: Decimal, atr_pct: Decimal) -> ProtectiveLevels {
    let stop_distance_pct = (config.sl_atr_multiplier * atr_pct)
        .max(config.min_sl_distance_pct)
        .min(config.max_sl_distance_pct);
    let take_profit_distance_pct = config.tp_atr_multiplier * atr_pct;

    let stop_offset = entry * stop_distance_pct / Decimal::ONE_HUNDRED;
    let take_offset = entry * take_profit_distance_pct / Decimal::ONE_HUNDRED;

    let (stop_loss, take_profit) = match side {
        Side::Long => (entry - stop_offset, entry + take_offset),
        Side::Short => (entry + stop_offset, (entry - take_offset).max(Decimal::ZERO)),
    };

    ProtectiveLevels {
        stop_loss,
        take_profit,
        stop_distance_pct,
        take_profit_distance_pct,
    }
}

/// `|tp - entry| / |entry - sl|`, or None when the stop sits at entry.
pub fn reward_risk(entry: Decimal, stop_loss: Decimal, take_profit: Decimal) -> Option<Decimal> {
    let risk = (entry - stop_loss).abs();
    if risk.is_zero() {
        return None;
    }
    Some((take_profit - entry).abs() / risk)
}

/// Accepts iff the ratio is defined and at least `minimum`.
pub fn passes_reward_risk(entry: Decimal, stop_loss: Decimal, take_profit: Decimal, minimum: Decimal) -> bool {
    reward_risk(entry, stop_loss, take_profit).is_some_and(|rr| rr >= minimum)
}
