//! Exchange gateway configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::duration;
use super::{BreakerConfig, RetryConfig};

/// Settings for the exchange gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Gateway implementation name (e.g., "paper").
    pub name: String,
    /// Taker fee as a decimal (e.g., "0.001" for 0.1%).
    pub fee_taker: Decimal,
    /// Maker fee as a decimal; defaults to the taker fee.
    pub fee_maker: Option<Decimal>,
    /// Whether the exchange accepts combined OCO protective orders.
    #[serde(default)]
    pub supports_oco: bool,
    /// Smallest order quantity accepted by the exchange.
    #[serde(default)]
    pub min_order_quantity: Decimal,
    /// Smallest order notional (quote currency) accepted by the exchange.
    #[serde(default)]
    pub min_notional: Decimal,
    /// Lot size; quantities are rounded down to a multiple of it.
    #[serde(default = "default_quantity_step")]
    pub quantity_step: Decimal,
    /// Per-call timeout for gateway requests (default: 10s).
    #[serde(default = "default_timeout", with = "duration")]
    pub timeout: Duration,
    /// Retry behavior for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Circuit breaker guarding the gateway.
    #[serde(default)]
    pub circuit_breaker: BreakerConfig,
    /// Initial state of the simulated gateway.
    #[serde(default)]
    pub paper: PaperConfig,
}

/// Simulated gateway starting state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaperConfig {
    /// Starting balances keyed by asset (e.g., "USDT": "10000").
    #[serde(default)]
    pub balances: HashMap<String, Decimal>,
    /// Starting prices keyed by symbol (e.g., "BTC/USDT": "100000").
    #[serde(default)]
    pub prices: HashMap<String, Decimal>,
}

fn default_quantity_step() -> Decimal {
    dec!(0.00001)
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}
