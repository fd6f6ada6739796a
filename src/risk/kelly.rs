//! Fractional Kelly sizing with a prior for thin trade histories.

use rust_decimal::Decimal;

use crate::config::RiskConfig;
use crate::domain::{TradeOutcome, TradeResult};

/// Win/loss statistics over a trade window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TradeStats {
    pub samples: u32,
    pub wins: u32,
    pub losses: u32,
    /// Mean pnl percent of winning trades.
    pub avg_win_pct: Decimal,
    /// Mean absolute pnl percent of losing trades.
    pub avg_loss_pct: Decimal,
}

impl TradeStats {
    /// Summarises trades that count for statistics; error exits are skipped.
    pub fn from_trades<'a>(trades: impl IntoIterator<Item = &'a TradeResult>) -> Self {
        let mut stats = TradeStats::default();
        let mut win_sum = Decimal::ZERO;
        let mut loss_sum = Decimal::ZERO;

        for trade in trades.into_iter().filter(|t| t.counts_for_statistics()) {
            stats.samples += 1;
            match trade.outcome {
                TradeOutcome::Win => {
                    stats.wins += 1;
                    win_sum += trade.pnl_pct;
                }
                TradeOutcome::Loss => {
                    stats.losses += 1;
                    loss_sum += trade.pnl_pct.abs();
                }
                TradeOutcome::Breakeven => {}
            }
        }

        if stats.wins > 0 {
            stats.avg_win_pct = win_sum / Decimal::from(stats.wins);
        }
        if stats.losses > 0 {
            stats.avg_loss_pct = loss_sum / Decimal::from(stats.losses);
        }
        stats
    }

    pub fn win_rate(&self) -> Option<Decimal> {
        (self.samples > 0).then(|| Decimal::from(self.wins) / Decimal::from(self.samples))
    }
}

/// Win probability blended toward the prior in proportion to sample size.
///
/// With `n` samples the empirical rate gets weight `n / full_trust_samples`
/// (at most 1), so histories past that threshold use the empirical rate.
pub fn blended_win_rate(config: &RiskConfig, stats: &TradeStats) -> Decimal {
    let Some(empirical) = stats.win_rate() else {
        return config.kelly_prior_win_rate;
    };
    let full_trust = Decimal::from(config.kelly_full_trust_samples.max(1));
    let weight = (Decimal::from(stats.samples) / full_trust).min(Decimal::ONE);
    weight * empirical + (Decimal::ONE - weight) * config.kelly_prior_win_rate
}

/// Payoff ratio `b`: the empirical average win / average loss once the
/// history is deep enough and holds both outcomes, otherwise the planned
/// reward:risk of the trade.
pub fn payoff_ratio(config: &RiskConfig, stats: &TradeStats, planned_reward_risk: Decimal) -> Decimal {
    if stats.samples >= config.kelly_min_samples
        && stats.wins > 0
        && stats.losses > 0
        && !stats.avg_loss_pct.is_zero()
    {
        stats.avg_win_pct / stats.avg_loss_pct
    } else {
        planned_reward_risk
    }
}

/// Raw Kelly fraction `(b*p - q) / b`, not yet scaled or capped.
pub fn kelly_raw(win_rate: Decimal, payoff: Decimal) -> Decimal {
    if payoff <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let q = Decimal::ONE - win_rate;
    (payoff * win_rate - q) / payoff
}

/// Fraction of capital to risk: scaled Kelly, clamped to `[0, cap]`.
pub fn risk_fraction(
    config: &RiskConfig,
    stats: &TradeStats,
    planned_reward_risk: Decimal,
    cap: Decimal,
) -> Decimal {
    let p = blended_win_rate(config, stats);
    let b = payoff_ratio(config, stats, planned_reward_risk);
    let scaled = kelly_raw(p, b) * config.kelly_fraction;
    scaled.max(Decimal::ZERO).min(cap.max(Decimal::ZERO))
}
