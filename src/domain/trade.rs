//! Immutable trade history records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{ExitReason, Position, Side};

/// Absolute pnl percentage below which a trade counts as breakeven.
const BREAKEVEN_BAND_PCT: Decimal = dec!(0.05);

/// TradeOutcome classifies a closed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeOutcome {
    Win,
    Loss,
    Breakeven,
}

impl TradeOutcome {
    /// Classifies a realized pnl percentage.
    pub fn from_pnl_pct(pnl_pct: Decimal) -> Self {
        if pnl_pct.abs() < BREAKEVEN_BAND_PCT {
            TradeOutcome::Breakeven
        } else if pnl_pct > Decimal::ZERO {
            TradeOutcome::Win
        } else {
            TradeOutcome::Loss
        }
    }
}

impl fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeOutcome::Win => write!(f, "win"),
            TradeOutcome::Loss => write!(f, "loss"),
            TradeOutcome::Breakeven => write!(f, "breakeven"),
        }
    }
}

impl FromStr for TradeOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "win" => Ok(TradeOutcome::Win),
            "loss" => Ok(TradeOutcome::Loss),
            "breakeven" => Ok(TradeOutcome::Breakeven),
            _ => Err(format!("Unknown trade outcome: {}", s)),
        }
    }
}

/// TradeResult is written exactly once, when a position closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    pub position_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub quantity: Decimal,
    pub pnl: Decimal,
    pub pnl_pct: Decimal,
    pub outcome: TradeOutcome,
    pub hold_duration_secs: i64,
    pub exit_reason: ExitReason,
    pub strategy_tag: String,
    pub confidence: f64,
    pub closed_at: DateTime<Utc>,
}

impl TradeResult {
    /// Builds the record from a position whose exit fields are filled.
    /// Returns None if the position has not recorded an exit.
    pub fn from_position(position: &Position) -> Option<Self> {
        let exit_price = position.exit_price?;
        let exit_time = position.exit_time?;
        let exit_reason = position.exit_reason?;
        let pnl = position.realized_pnl?;
        let pnl_pct = position.realized_pnl_pct?;

        Some(Self {
            position_id: position.id.clone(),
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            pnl,
            pnl_pct,
            outcome: TradeOutcome::from_pnl_pct(pnl_pct),
            hold_duration_secs: (exit_time - position.entry_time).num_seconds().max(0),
            exit_reason,
            strategy_tag: position.strategy_tag.clone(),
            confidence: position.confidence,
            closed_at: exit_time,
        })
    }

    /// Trades closed for data-integrity reasons carry no information about
    /// strategy edge and are excluded from learning.
    pub fn counts_for_statistics(&self) -> bool {
        self.exit_reason != ExitReason::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_classification() {
        assert_eq!(TradeOutcome::from_pnl_pct(dec!(1.2)), TradeOutcome::Win);
        assert_eq!(TradeOutcome::from_pnl_pct(dec!(-0.7)), TradeOutcome::Loss);
        assert_eq!(TradeOutcome::from_pnl_pct(dec!(0.01)), TradeOutcome::Breakeven);
        assert_eq!(TradeOutcome::from_pnl_pct(dec!(-0.04)), TradeOutcome::Breakeven);
    }

    #[test]
    fn test_from_position_requires_exit() {
        let mut pos = Position::pending(
            "ETH/USDT",
            Side::Short,
            dec!(3000),
            dec!(1),
            dec!(3090),
            dec!(2820),
            0.7,
            "range",
        );
        assert!(TradeResult::from_position(&pos).is_none());

        pos.record_exit(dec!(2900), ExitReason::TakeProfit);
        let result = TradeResult::from_position(&pos).unwrap();
        assert_eq!(result.pnl, dec!(100));
        assert_eq!(result.outcome, TradeOutcome::Win);
        assert_eq!(result.exit_reason, ExitReason::TakeProfit);
        assert!(result.counts_for_statistics());
    }
}
