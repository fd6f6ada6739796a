//! Position domain model and its lifecycle state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::OrderSide;

/// Side indicates the direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Profits when price rises.
    Long,
    /// Profits when price falls.
    Short,
}

impl Side {
    /// Order side that opens a position of this direction.
    pub fn entry_order_side(self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes a position of this direction.
    pub fn exit_order_side(self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }

    /// +1 for long, -1 for short.
    pub fn sign(self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// Returns true if `a` is a better price than `b` for this side.
    pub fn is_better(self, a: Decimal, b: Decimal) -> bool {
        match self {
            Side::Long => a > b,
            Side::Short => a < b,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "long" => Ok(Side::Long),
            "short" => Ok(Side::Short),
            _ => Err(format!("Unknown side: {}", s)),
        }
    }
}

/// PositionStatus is the lifecycle state of a position.
///
/// Transitions are monotonic: `pending -> open -> closing -> closed`.
/// The only shortcut is `pending -> closed`, and it is reserved for an entry
/// the exchange refused or shows no fill for. An entry whose outcome is
/// unknown stays pending until the exchange answers; any fill goes through
/// `open` and gets protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Pending,
    Open,
    Closing,
    Closed,
}

impl PositionStatus {
    /// Returns true if moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: PositionStatus) -> bool {
        matches!(
            (self, next),
            (PositionStatus::Pending, PositionStatus::Open)
                | (PositionStatus::Pending, PositionStatus::Closed)
                | (PositionStatus::Open, PositionStatus::Closing)
                | (PositionStatus::Closing, PositionStatus::Closed)
        )
    }

    /// Returns true for every status except `closed`.
    pub fn is_active(self) -> bool {
        self != PositionStatus::Closed
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionStatus::Pending => write!(f, "pending"),
            PositionStatus::Open => write!(f, "open"),
            PositionStatus::Closing => write!(f, "closing"),
            PositionStatus::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PositionStatus::Pending),
            "open" => Ok(PositionStatus::Open),
            "closing" => Ok(PositionStatus::Closing),
            "closed" => Ok(PositionStatus::Closed),
            _ => Err(format!("Unknown position status: {}", s)),
        }
    }
}

/// ExitReason records why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    Manual,
    KillSwitch,
    Error,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::TrailingStop => write!(f, "trailing_stop"),
            ExitReason::Manual => write!(f, "manual"),
            ExitReason::KillSwitch => write!(f, "kill_switch"),
            ExitReason::Error => write!(f, "error"),
        }
    }
}

impl FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop_loss" => Ok(ExitReason::StopLoss),
            "take_profit" => Ok(ExitReason::TakeProfit),
            "trailing_stop" => Ok(ExitReason::TrailingStop),
            "manual" => Ok(ExitReason::Manual),
            "kill_switch" => Ok(ExitReason::KillSwitch),
            "error" => Ok(ExitReason::Error),
            _ => Err(format!("Unknown exit reason: {}", s)),
        }
    }
}

/// Protection identifies the protective orders guarding an open position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protection {
    /// No protective order is live.
    None,
    /// A single exchange-native OCO order.
    Oco { order_id: String },
    /// Two independent orders; the sibling is cancelled manually on fill.
    Separate {
        stop_order_id: String,
        take_profit_order_id: String,
    },
}

impl Protection {
    pub fn is_none(&self) -> bool {
        matches!(self, Protection::None)
    }

    /// Exchange order ids that make up this protection.
    pub fn order_ids(&self) -> Vec<&str> {
        match self {
            Protection::None => Vec::new(),
            Protection::Oco { order_id } => vec![order_id.as_str()],
            Protection::Separate {
                stop_order_id,
                take_profit_order_id,
            } => vec![stop_order_id.as_str(), take_profit_order_id.as_str()],
        }
    }
}

/// Illegal status transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from} -> {to}")]
pub struct TransitionError {
    pub from: PositionStatus,
    pub to: PositionStatus,
}

/// Position represents one open or closed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Unique identifier for this position.
    pub id: String,
    /// Trading symbol in "BASE/QUOTE" format.
    pub symbol: String,
    pub side: Side,
    pub status: PositionStatus,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub entry_time: DateTime<Utc>,
    /// Confidence reported by the decision source, 0..1.
    pub confidence: f64,
    /// Strategy that produced the signal.
    pub strategy_tag: String,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// Stop-loss at creation time; never modified afterwards.
    pub initial_stop_loss: Decimal,
    /// True once a trailing stop with a locked-in profit has been applied.
    pub trailing_active: bool,
    pub protection: Protection,
    pub exit_price: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub realized_pnl: Option<Decimal>,
    pub realized_pnl_pct: Option<Decimal>,
}

impl Position {
    /// Creates a pending position with the given levels.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        symbol: impl Into<String>,
        side: Side,
        entry_price: Decimal,
        quantity: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        confidence: f64,
        strategy_tag: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.into(),
            side,
            status: PositionStatus::Pending,
            entry_price,
            quantity,
            entry_time: Utc::now(),
            confidence,
            strategy_tag: strategy_tag.into(),
            stop_loss,
            take_profit,
            initial_stop_loss: stop_loss,
            trailing_active: false,
            protection: Protection::None,
            exit_price: None,
            exit_time: None,
            exit_reason: None,
            realized_pnl: None,
            realized_pnl_pct: None,
        }
    }

    /// Moves the position to `next`, rejecting non-monotonic transitions.
    pub fn transition_to(&mut self, next: PositionStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Returns true if the initial stop-loss and take-profit sit on the
    /// correct side of the entry price.
    pub fn levels_valid(&self) -> bool {
        match self.side {
            Side::Long => {
                self.initial_stop_loss < self.entry_price && self.take_profit > self.entry_price
            }
            Side::Short => {
                self.initial_stop_loss > self.entry_price && self.take_profit < self.entry_price
            }
        }
    }

    /// Unrealized profit in percent of entry at the given price.
    pub fn unrealized_pnl_pct(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        (price - self.entry_price) / self.entry_price * Decimal::ONE_HUNDRED * self.side.sign()
    }

    /// Realized profit (quote currency) and percent of entry for an exit price.
    pub fn pnl_at(&self, exit_price: Decimal) -> (Decimal, Decimal) {
        let pnl = (exit_price - self.entry_price) * self.quantity * self.side.sign();
        (pnl, self.unrealized_pnl_pct(exit_price))
    }

    /// Returns true if the price has reached the stop-loss.
    pub fn stop_hit(&self, price: Decimal) -> bool {
        match self.side {
            Side::Long => price <= self.stop_loss,
            Side::Short => price >= self.stop_loss,
        }
    }

    /// Returns true if the price has reached the take-profit.
    pub fn take_profit_hit(&self, price: Decimal) -> bool {
        match self.side {
            Side::Long => price >= self.take_profit,
            Side::Short => price <= self.take_profit,
        }
    }

    /// Entry notional in quote currency.
    pub fn notional(&self) -> Decimal {
        self.entry_price * self.quantity
    }

    /// Fills the exit fields from the exit price.
    pub fn record_exit(&mut self, exit_price: Decimal, reason: ExitReason) {
        let (pnl, pnl_pct) = self.pnl_at(exit_price);
        self.exit_price = Some(exit_price);
        self.exit_time = Some(Utc::now());
        self.exit_reason = Some(reason);
        self.realized_pnl = Some(pnl);
        self.realized_pnl_pct = Some(pnl_pct);
    }
}
