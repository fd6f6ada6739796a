//! Entry, exit and protective order handling on top of the exchange gateway.

mod manager;

use crate::domain::{ExitReason, Order, Protection};
use crate::exchanges::ExchangeError;
use rust_decimal::Decimal;
use thiserror::Error;

pub use manager::OrderManager;

/// Order errors.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// The exchange accepted the request but reported it rejected.
    #[error("order {0} rejected by exchange")]
    Rejected(String),

    /// A market order did not fill and was cancelled.
    #[error("order {0} did not fill")]
    NotFilled(String),

    /// Old protection was removed but the replacement could not be placed.
    /// Every remaining leg has been cancelled; the position has no protection.
    #[error("position {position_id} left unprotected: {source}")]
    Unprotected {
        position_id: String,
        cancelled: Vec<Order>,
        source: ExchangeError,
    },

    /// Some protective legs were cancelled but another is still resting.
    /// The stop-loss is always the last leg cancelled, so it is the one
    /// left live.
    #[error("protection of position {position_id} partially cancelled: {source}")]
    PartiallyCancelled {
        position_id: String,
        cancelled: Vec<Order>,
        source: ExchangeError,
    },
}

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;

/// A filled market order.
#[derive(Debug, Clone)]
pub struct Fill {
    pub order: Order,
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Protective orders placed for a position.
#[derive(Debug, Clone)]
pub struct PlacedProtection {
    pub protection: Protection,
    pub orders: Vec<Order>,
}

/// A protective leg executed on the exchange.
#[derive(Debug, Clone)]
pub struct ProtectionFill {
    /// `StopLoss` or `TakeProfit`; the engine refines the stop case to
    /// `TrailingStop` when trailing was active.
    pub reason: ExitReason,
    pub exit_price: Decimal,
    /// Filled leg plus any sibling cancelled on its behalf.
    pub orders: Vec<Order>,
}

/// Outcome of removing or replacing protection.
#[derive(Debug, Clone)]
pub enum ProtectionChange {
    /// Old legs cancelled (and new ones placed, for a replace).
    Applied(PlacedProtection),
    /// A leg had already executed; nothing new was placed.
    AlreadyFilled(ProtectionFill),
}

/// Exchange-side state of a position's protection.
#[derive(Debug, Clone)]
pub enum ProtectionStatus {
    /// Every leg is resting on the book.
    Active,
    /// A leg executed; its sibling has been cancelled.
    Filled(ProtectionFill),
    /// A leg was cancelled or rejected outside our control. Remaining legs
    /// have been cancelled so protection can be placed again from scratch.
    Missing(Vec<Order>),
}
