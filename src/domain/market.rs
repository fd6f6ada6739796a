//! Precomputed market and indicator snapshots consumed by the gating layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Side;

/// Directional read of a single timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl TrendDirection {
    /// Returns true if the direction agrees with the given side.
    pub fn agrees_with(self, side: Side) -> bool {
        matches!(
            (self, side),
            (TrendDirection::Bullish, Side::Long) | (TrendDirection::Bearish, Side::Short)
        )
    }
}

/// Indicator values for one timeframe, computed upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub rsi: f64,
    pub macd_histogram: f64,
    #[serde(default)]
    pub adx: Option<f64>,
    #[serde(default)]
    pub bb_upper: Option<f64>,
    #[serde(default)]
    pub bb_lower: Option<f64>,
}

impl IndicatorSnapshot {
    /// Majority vote of EMA cross, RSI midline and MACD histogram sign.
    pub fn direction(&self) -> TrendDirection {
        let votes = [
            vote(self.ema_fast - self.ema_slow),
            vote(self.rsi - 50.0),
            vote(self.macd_histogram),
        ];
        let bullish = votes.iter().filter(|v| **v > 0).count();
        let bearish = votes.iter().filter(|v| **v < 0).count();

        if bullish >= 2 {
            TrendDirection::Bullish
        } else if bearish >= 2 {
            TrendDirection::Bearish
        } else {
            TrendDirection::Neutral
        }
    }
}

fn vote(delta: f64) -> i8 {
    if delta > 0.0 {
        1
    } else if delta < 0.0 {
        -1
    } else {
        0
    }
}

/// MarketSnapshot bundles everything the decision and gating layer needs for
/// one symbol at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    /// Average true range as a percentage of price (1.5 means 1.5%).
    pub atr_pct: Decimal,
    /// Indicator snapshots keyed by timeframe label ("4h", "1h", "15m").
    pub timeframes: BTreeMap<String, IndicatorSnapshot>,
}

impl MarketSnapshot {
    pub fn timeframe(&self, label: &str) -> Option<&IndicatorSnapshot> {
        self.timeframes.get(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(ema_fast: f64, ema_slow: f64, rsi: f64, macd: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema_fast,
            ema_slow,
            rsi,
            macd_histogram: macd,
            adx: None,
            bb_upper: None,
            bb_lower: None,
        }
    }

    #[test]
    fn test_direction_majority_vote() {
        assert_eq!(snapshot(101.0, 100.0, 60.0, 0.5).direction(), TrendDirection::Bullish);
        assert_eq!(snapshot(99.0, 100.0, 40.0, 0.5).direction(), TrendDirection::Bearish);
        assert_eq!(snapshot(101.0, 100.0, 40.0, 0.0).direction(), TrendDirection::Neutral);
    }

    #[test]
    fn test_agreement() {
        assert!(TrendDirection::Bullish.agrees_with(Side::Long));
        assert!(!TrendDirection::Bullish.agrees_with(Side::Short));
        assert!(!TrendDirection::Neutral.agrees_with(Side::Long));
    }
}
