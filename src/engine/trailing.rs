//! Trailing stop evaluation.
//!
//! A trailing stop can only be expressed as a [`LockedStop`], whose
//! constructor clamps the price to the profit-lock level. An armed trailing
//! stop therefore never sits on the losing side of that level.

use rust_decimal::Decimal;
use std::time::Duration;

use crate::config::TrailingConfig;
use crate::domain::{Position, Side};

/// Stop price that locks at least `min_profit_to_lock_pct` of profit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockedStop {
    price: Decimal,
}

impl LockedStop {
    /// Price that locks exactly `min_profit_pct` relative to entry.
    pub fn lock_level(side: Side, entry: Decimal, min_profit_pct: Decimal) -> Decimal {
        let offset = entry * min_profit_pct / Decimal::ONE_HUNDRED;
        match side {
            Side::Long => entry + offset,
            Side::Short => entry - offset,
        }
    }

    /// Clamps `candidate` so that it locks at least the minimum profit.
    pub fn new(side: Side, entry: Decimal, candidate: Decimal, min_profit_pct: Decimal) -> Self {
        let lock = Self::lock_level(side, entry, min_profit_pct.max(Decimal::ZERO));
        let price = match side {
            Side::Long => candidate.max(lock),
            Side::Short => candidate.min(lock),
        };
        Self { price }
    }

    pub fn price(self) -> Decimal {
        self.price
    }
}

/// Why a trailing update was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailHold {
    Disabled,
    /// Profit has not reached the activation threshold.
    NotArmed,
    /// The stop would not improve on the current one.
    NotFavorable,
    /// The stop would sit too close to the live price.
    WithinSafetyMargin,
    /// The previous update was too recent.
    Cooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailDecision {
    Hold(TrailHold),
    Move(LockedStop),
}

/// Best favorable price seen for a side.
pub fn best_price(side: Side, current_best: Option<Decimal>, price: Decimal) -> Decimal {
    match current_best {
        Some(best) if side.is_better(best, price) => best,
        _ => price,
    }
}

/// Decides whether the stop of `position` should trail to a new level.
///
/// `since_last_update` is the time since this position's stop last moved,
/// if it ever did.
pub fn evaluate(
    config: &TrailingConfig,
    position: &Position,
    best: Decimal,
    price: Decimal,
    since_last_update: Option<Duration>,
) -> TrailDecision {
    if !config.enabled {
        return TrailDecision::Hold(TrailHold::Disabled);
    }
    if since_last_update.is_some_and(|elapsed| elapsed < config.cooldown) {
        return TrailDecision::Hold(TrailHold::Cooldown);
    }

    let armed = position.trailing_active
        || position.unrealized_pnl_pct(best) >= config.activation_profit_pct;
    if !armed {
        return TrailDecision::Hold(TrailHold::NotArmed);
    }

    let trail = best * config.trail_distance_pct / Decimal::ONE_HUNDRED;
    let candidate = match position.side {
        Side::Long => best - trail,
        Side::Short => best + trail,
    };
    let stop = LockedStop::new(
        position.side,
        position.entry_price,
        candidate,
        config.min_profit_to_lock_pct,
    );

    if !position.side.is_better(stop.price(), position.stop_loss) {
        return TrailDecision::Hold(TrailHold::NotFavorable);
    }

    let margin = price * config.safety_margin_pct / Decimal::ONE_HUNDRED;
    let clear_of_price = match position.side {
        Side::Long => stop.price() <= price - margin,
        Side::Short => stop.price() >= price + margin,
    };
    if !clear_of_price {
        return TrailDecision::Hold(TrailHold::WithinSafetyMargin);
    }

    TrailDecision::Move(stop)
}
