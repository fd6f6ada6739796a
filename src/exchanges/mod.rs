//! Exchange gateway abstraction and implementations.

mod paper;
mod resilient;

use crate::config::ExchangeConfig;
use crate::domain::{Fees, OrderSide, OrderStatus, OrderType};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use thiserror::Error;

pub use paper::PaperExchange;
pub use resilient::ResilientGateway;

/// Exchange errors.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    /// Symbol is not traded on this exchange.
    #[error("symbol {0} is not supported")]
    SymbolNotSupported(String),

    /// Insufficient funds for the operation.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Order not found.
    #[error("order {0} not found")]
    OrderNotFound(String),

    /// Connection error. The request did not reach the exchange.
    #[error("connection error: {0}")]
    Connection(String),

    /// The request timed out; its outcome on the exchange is unknown.
    #[error("timeout: {0}")]
    Timeout(String),

    /// API error from the exchange.
    #[error("API error: {0}")]
    Api(String),

    /// Operation is not supported by this gateway.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The circuit breaker is open; the call was not attempted.
    #[error("circuit open for {0}")]
    CircuitOpen(String),
}

impl ExchangeError {
    /// Errors worth retrying for idempotent calls.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Connection(_) | ExchangeError::Timeout(_))
    }

    /// Errors that indicate an unhealthy dependency rather than a business refusal.
    pub fn counts_as_failure(&self) -> bool {
        matches!(
            self,
            ExchangeError::Connection(_) | ExchangeError::Timeout(_) | ExchangeError::Api(_)
        )
    }
}

/// Result type for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// A single order submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Limit price (take-profit limit for `TakeProfit` orders).
    pub price: Option<Decimal>,
    /// Trigger price for `StopLoss` orders.
    pub stop_price: Option<Decimal>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
        }
    }

    pub fn stop_loss(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::StopLoss,
            quantity,
            price: None,
            stop_price: Some(stop_price),
        }
    }

    pub fn take_profit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::TakeProfit,
            quantity,
            price: Some(price),
            stop_price: None,
        }
    }
}

/// Combined stop-loss and take-profit submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OcoRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub take_profit: Decimal,
    pub stop_price: Decimal,
}

/// Exchange response to an order submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    pub status: OrderStatus,
    /// Average fill price, for orders that filled immediately.
    pub fill_price: Option<Decimal>,
    pub filled_quantity: Decimal,
}

/// Current state of an order on the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpdate {
    pub order_id: String,
    pub status: OrderStatus,
    pub fill_price: Option<Decimal>,
    /// For filled OCO orders, which leg executed (`StopLoss` or `TakeProfit`).
    pub filled_leg: Option<OrderType>,
}

/// ExchangeGateway is the engine's only view of the exchange.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Name returns the identifier of this gateway (e.g., "paper").
    fn name(&self) -> &str;

    /// Returns the last traded price for a symbol in "BASE/QUOTE" format.
    async fn get_current_price(&self, symbol: &str) -> Result<Decimal>;

    /// Submits a single order.
    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck>;

    /// Returns true if the exchange accepts combined OCO orders.
    fn supports_oco(&self) -> bool {
        false
    }

    /// Submits a combined stop-loss / take-profit order.
    async fn place_oco_order(&self, request: OcoRequest) -> Result<OrderAck> {
        Err(ExchangeError::Unsupported(format!(
            "OCO orders on {} for {}",
            self.name(),
            request.symbol
        )))
    }

    /// Cancels an open order. Cancelling an already-cancelled order succeeds.
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()>;

    /// Retrieves the current state of an order.
    async fn get_order_status(&self, symbol: &str, order_id: &str) -> Result<OrderUpdate>;

    /// Returns the available balance of an asset (zero if none).
    async fn get_balance(&self, asset: &str) -> Result<Decimal>;

    /// Returns the maker and taker fees for a symbol.
    fn get_fees(&self, symbol: &str) -> Fees;
}

/// Builds the gateway named in the configuration.
pub fn create_gateway(config: &ExchangeConfig) -> Result<Arc<dyn ExchangeGateway>> {
    match config.name.as_str() {
        "paper" => Ok(Arc::new(PaperExchange::from_config(config))),
        other => Err(ExchangeError::Unsupported(format!(
            "exchange {} is not yet implemented",
            other
        ))),
    }
}
