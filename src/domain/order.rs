//! Orders sent to the exchange on behalf of a position.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OrderSide represents the direction of an order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// OrderSideBuy indicates a buy order.
    Buy,
    /// OrderSideSell indicates a sell order.
    Sell,
}

/// OrderType represents the type of order execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Executes at the specified price or better.
    Limit,
    /// Executes immediately at the best available price.
    Market,
    /// Stop order that exits the position when price crosses the stop.
    StopLoss,
    /// Limit order that exits the position at the profit target.
    TakeProfit,
    /// Combined stop-loss + take-profit, one cancels the other.
    Oco,
}

/// OrderStatus represents the current state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Submitted and waiting to be filled.
    Open,
    /// Completely filled.
    Filled,
    /// Cancelled before being filled.
    Cancelled,
    /// Refused by the exchange.
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        self != OrderStatus::Open
    }
}

macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($ty::$variant => write!(f, $s),)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok($ty::$variant),)+
                    _ => Err(format!("Unknown {}: {}", stringify!($ty), s)),
                }
            }
        }
    };
}

string_enum!(OrderSide { Buy => "buy", Sell => "sell" });
string_enum!(OrderType {
    Limit => "limit",
    Market => "market",
    StopLoss => "stop_loss",
    TakeProfit => "take_profit",
    Oco => "oco",
});
string_enum!(OrderStatus {
    Open => "open",
    Filled => "filled",
    Cancelled => "cancelled",
    Rejected => "rejected",
});

/// Order is a request sent to the exchange and tied to a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Identifier assigned by the exchange.
    pub id: String,
    /// Position this order belongs to.
    pub position_id: String,
    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub quantity: Decimal,
    /// Limit or fill price, when known.
    pub price: Option<Decimal>,
    /// Trigger price for stop orders (and the stop leg of an OCO).
    pub stop_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates an order record in the given status.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        position_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        status: OrderStatus,
        quantity: Decimal,
        price: Option<Decimal>,
        stop_price: Option<Decimal>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            position_id: position_id.into(),
            symbol: symbol.into(),
            side,
            order_type,
            status,
            quantity,
            price,
            stop_price,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns a copy with the new status and a fresh update timestamp.
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self.updated_at = Utc::now();
        self
    }
}
