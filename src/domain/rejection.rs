//! Business rejections: expected outcomes of the gating pipeline, not errors.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

/// Rejection explains why a signal did not become a position.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    RewardRiskTooLow {
        ratio: Decimal,
        minimum: Decimal,
    },
    KillSwitchActive {
        until: DateTime<Utc>,
    },
    SizeBelowMinimum {
        quantity: Decimal,
        notional: Decimal,
    },
    FeeUnprofitable {
        expected_net: Decimal,
        fees: Decimal,
    },
    CorrelationBlocked {
        symbol: String,
        open_symbol: String,
        correlation: f64,
    },
    CapacityExceeded {
        open: usize,
        max: usize,
    },
    SymbolAlreadyOpen {
        symbol: String,
    },
    TimeframeMisaligned {
        alignment: f64,
        minimum: f64,
    },
    LowConfidence {
        confidence: f64,
        minimum: f64,
    },
}

impl Rejection {
    /// Stable code used in logs and statistics.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::RewardRiskTooLow { .. } => "RR_TOO_LOW",
            Rejection::KillSwitchActive { .. } => "KILL_SWITCH_ACTIVE",
            Rejection::SizeBelowMinimum { .. } => "SIZE_BELOW_MINIMUM",
            Rejection::FeeUnprofitable { .. } => "FEE_UNPROFITABLE",
            Rejection::CorrelationBlocked { .. } => "CORRELATION_BLOCKED",
            Rejection::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Rejection::SymbolAlreadyOpen { .. } => "SYMBOL_ALREADY_OPEN",
            Rejection::TimeframeMisaligned { .. } => "TIMEFRAME_MISALIGNED",
            Rejection::LowConfidence { .. } => "LOW_CONFIDENCE",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::RewardRiskTooLow { ratio, minimum } => write!(
                f,
                "{}: reward/risk {:.2} below minimum {}",
                self.code(),
                ratio,
                minimum
            ),
            Rejection::KillSwitchActive { until } => {
                write!(f, "{}: trading halted until {}", self.code(), until)
            }
            Rejection::SizeBelowMinimum { quantity, notional } => write!(
                f,
                "{}: quantity {} (notional {}) below exchange minimum",
                self.code(),
                quantity,
                notional
            ),
            Rejection::FeeUnprofitable { expected_net, fees } => write!(
                f,
                "{}: expected net profit {} against fees {}",
                self.code(),
                expected_net,
                fees
            ),
            Rejection::CorrelationBlocked {
                symbol,
                open_symbol,
                correlation,
            } => write!(
                f,
                "{}: {} correlates {:.2} with open {}",
                self.code(),
                symbol,
                correlation,
                open_symbol
            ),
            Rejection::CapacityExceeded { open, max } => {
                write!(f, "{}: {} of {} positions open", self.code(), open, max)
            }
            Rejection::SymbolAlreadyOpen { symbol } => {
                write!(f, "{}: {} already has an active position", self.code(), symbol)
            }
            Rejection::TimeframeMisaligned { alignment, minimum } => write!(
                f,
                "{}: alignment {:.2} below minimum {:.2}",
                self.code(),
                alignment,
                minimum
            ),
            Rejection::LowConfidence {
                confidence,
                minimum,
            } => write!(
                f,
                "{}: confidence {:.2} below minimum {:.2}",
                self.code(),
                confidence,
                minimum
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_codes_are_stable() {
        let r = Rejection::RewardRiskTooLow {
            ratio: dec!(1.4),
            minimum: dec!(2.0),
        };
        assert_eq!(r.code(), "RR_TOO_LOW");
        assert!(r.to_string().starts_with("RR_TOO_LOW"));

        let c = Rejection::CorrelationBlocked {
            symbol: "ETH/USDT".into(),
            open_symbol: "BTC/USDT".into(),
            correlation: 0.85,
        };
        assert_eq!(c.code(), "CORRELATION_BLOCKED");
    }
}
