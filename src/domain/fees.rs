//! Trading fee structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fees represents the trading fees for a symbol on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fees {
    /// Maker fee (for limit orders that add liquidity).
    /// Expressed as a decimal (e.g., 0.001 for 0.1%).
    pub maker: Decimal,
    /// Taker fee (for orders that remove liquidity).
    /// Expressed as a decimal (e.g., 0.001 for 0.1%).
    pub taker: Decimal,
}

impl Fees {
    /// Creates a new Fees instance.
    pub fn new(maker: Decimal, taker: Decimal) -> Self {
        Self { maker, taker }
    }

    /// Taker fees paid for entering and exiting a position of the given notionals.
    pub fn round_trip(&self, entry_notional: Decimal, exit_notional: Decimal) -> Decimal {
        (entry_notional + exit_notional) * self.taker
    }
}

impl Default for Fees {
    fn default() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }
}
