//! Decisions produced by the decision source and the trade signals derived from them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Side;

/// Direction requested by the decision source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSide {
    Long,
    Short,
    Skip,
}

impl DecisionSide {
    /// Position side for actionable decisions.
    pub fn as_side(self) -> Option<Side> {
        match self {
            DecisionSide::Long => Some(Side::Long),
            DecisionSide::Short => Some(Side::Short),
            DecisionSide::Skip => None,
        }
    }
}

impl fmt::Display for DecisionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionSide::Long => write!(f, "long"),
            DecisionSide::Short => write!(f, "short"),
            DecisionSide::Skip => write!(f, "skip"),
        }
    }
}

/// Stop-loss / take-profit suggested by the decision source.
/// Advisory only: risk levels are always recomputed from volatility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryLevels {
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

/// Typed output of the decision source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub side: DecisionSide,
    /// Confidence in 0..1.
    pub confidence: f64,
    pub rationale: String,
    #[serde(default)]
    pub advisory: AdvisoryLevels,
    /// Strategy that produced the decision.
    pub strategy_tag: String,
}

impl Decision {
    pub fn skip(rationale: impl Into<String>, strategy_tag: impl Into<String>) -> Self {
        Self {
            side: DecisionSide::Skip,
            confidence: 0.0,
            rationale: rationale.into(),
            advisory: AdvisoryLevels::default(),
            strategy_tag: strategy_tag.into(),
        }
    }
}

/// An actionable signal that survived gating.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeSignal {
    pub symbol: String,
    pub side: Side,
    /// Confidence in 0..1, after any multi-timeframe boost.
    pub confidence: f64,
    pub strategy_tag: String,
    pub rationale: String,
}
