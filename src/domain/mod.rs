//! Domain models for positions, orders, trade history and market signals.

mod fees;
mod market;
mod order;
mod position;
mod rejection;
mod signal;
mod trade;

pub use fees::Fees;
pub use market::{IndicatorSnapshot, MarketSnapshot, TrendDirection};
pub use order::{Order, OrderSide, OrderStatus, OrderType};
pub use position::{ExitReason, Position, PositionStatus, Protection, Side, TransitionError};
pub use rejection::Rejection;
pub use signal::{AdvisoryLevels, Decision, DecisionSide, TradeSignal};
pub use trade::{TradeOutcome, TradeResult};

/// Returns the base asset of a "BASE/QUOTE" symbol (e.g., "BTC" from "BTC/USDT").
pub fn base_asset(symbol: &str) -> &str {
    symbol.split('/').next().unwrap_or(symbol)
}

/// Returns the quote asset of a "BASE/QUOTE" symbol, or "USDT" when absent.
pub fn quote_asset(symbol: &str) -> &str {
    symbol.split('/').nth(1).unwrap_or("USDT")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_and_quote_asset() {
        assert_eq!(base_asset("BTC/USDT"), "BTC");
        assert_eq!(quote_asset("BTC/USDT"), "USDT");
        assert_eq!(base_asset("ETHUSDT"), "ETHUSDT");
        assert_eq!(quote_asset("ETHUSDT"), "USDT");
    }
}
