//! Position sizing, protective levels and the drawdown kill switch.

mod kelly;
mod kill_switch;
mod levels;
mod manager;

pub use kelly::{TradeStats, blended_win_rate, kelly_raw, payoff_ratio, risk_fraction};
pub use kill_switch::KillSwitch;
pub use levels::{ProtectiveLevels, derive_levels, passes_reward_risk, reward_risk};
pub use manager::RiskManager;

use crate::config::ExchangeConfig;
use crate::domain::{AdvisoryLevels, Fees, Rejection, Side};
use crate::storage::StorageError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Infrastructure failures of the risk manager. Business rejections are
/// returned as `RiskDecision::Rejected` instead.
#[derive(Debug, Error)]
pub enum RiskError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Exchange lot rules applied to computed sizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderLimits {
    pub min_quantity: Decimal,
    pub min_notional: Decimal,
    pub quantity_step: Decimal,
}

impl OrderLimits {
    pub fn from_config(config: &ExchangeConfig) -> Self {
        Self {
            min_quantity: config.min_order_quantity,
            min_notional: config.min_notional,
            quantity_step: config.quantity_step,
        }
    }

    /// Rounds a quantity down to the lot step.
    pub fn round_quantity(&self, quantity: Decimal) -> Decimal {
        if self.quantity_step <= Decimal::ZERO {
            return quantity;
        }
        (quantity / self.quantity_step).floor() * self.quantity_step
    }
}

impl Default for OrderLimits {
    fn default() -> Self {
        Self {
            min_quantity: Decimal::ZERO,
            min_notional: Decimal::ZERO,
            quantity_step: Decimal::ZERO,
        }
    }
}

/// Input to a risk evaluation.
#[derive(Debug, Clone)]
pub struct RiskRequest {
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    /// Capital available for sizing, in quote currency.
    pub capital: Decimal,
    pub confidence: f64,
    /// ATR in percent of price.
    pub atr_pct: Decimal,
    pub fees: Fees,
    /// Adaptive ceiling on the risk fraction; the configured cap still applies.
    pub max_risk: Option<Decimal>,
    /// Levels suggested by the decision source. Logged, never used.
    pub advisory: AdvisoryLevels,
}

/// A fully sized and protected entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SizedOrder {
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub reward_risk: Decimal,
    /// Fraction of capital at risk between entry and stop.
    pub risk_fraction: Decimal,
    pub risk_amount: Decimal,
    pub expected_fees: Decimal,
    pub expected_net_profit: Decimal,
}

impl SizedOrder {
    pub fn notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }
}

/// Result of a risk evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Approved(SizedOrder),
    Rejected(Rejection),
}
