//! Built-in strategies dispatched by market regime.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use std::fmt;

use super::{DecisionError, DecisionSource};
use crate::domain::{
    AdvisoryLevels, Decision, DecisionSide, IndicatorSnapshot, MarketSnapshot, TrendDirection,
};

/// ADX at or above which the market is treated as trending.
const TRENDING_ADX: f64 = 25.0;
const OVERSOLD_RSI: f64 = 30.0;
const OVERBOUGHT_RSI: f64 = 70.0;
/// Fraction of the Bollinger width that counts as "at the band".
const BAND_PROXIMITY: f64 = 0.2;

/// Strategy selected for the current regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Follow a strong directional move.
    Trend,
    /// Fade an exhausted move at RSI extremes.
    Reversal,
    /// Trade the Bollinger range in a sideways market.
    Range,
}

impl Strategy {
    pub fn tag(self) -> &'static str {
        match self {
            Strategy::Trend => "trend",
            Strategy::Reversal => "reversal",
            Strategy::Range => "range",
        }
    }

    /// Single dispatch point for all strategies.
    pub fn evaluate(self, price: f64, indicators: &IndicatorSnapshot) -> Decision {
        match self {
            Strategy::Trend => trend(indicators),
            Strategy::Reversal => reversal(indicators),
            Strategy::Range => range(price, indicators),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Trend when ADX is strong, reversal at RSI extremes, range otherwise.
pub fn select_strategy(indicators: &IndicatorSnapshot) -> Strategy {
    if indicators.adx.is_some_and(|adx| adx >= TRENDING_ADX) {
        Strategy::Trend
    } else if indicators.rsi <= OVERSOLD_RSI || indicators.rsi >= OVERBOUGHT_RSI {
        Strategy::Reversal
    } else {
        Strategy::Range
    }
}

fn decision(side: DecisionSide, confidence: f64, rationale: String, strategy: Strategy) -> Decision {
    Decision {
        side,
        confidence: confidence.clamp(0.0, 1.0),
        rationale,
        advisory: AdvisoryLevels::default(),
        strategy_tag: strategy.tag().to_string(),
    }
}

fn trend(ind: &IndicatorSnapshot) -> Decision {
    let adx = ind.adx.unwrap_or(TRENDING_ADX);
    let side = match ind.direction() {
        TrendDirection::Bullish if ind.macd_histogram > 0.0 => DecisionSide::Long,
        TrendDirection::Bearish if ind.macd_histogram < 0.0 => DecisionSide::Short,
        _ => {
            return Decision::skip("trend without momentum confirmation", Strategy::Trend.tag());
        }
    };
    let confidence = 0.55 + ((adx - TRENDING_ADX) / 100.0).clamp(0.0, 0.3);
    decision(
        side,
        confidence,
        format!("ADX {:.1} trend, RSI {:.1}", adx, ind.rsi),
        Strategy::Trend,
    )
}

fn reversal(ind: &IndicatorSnapshot) -> Decision {
    let (side, excess) = if ind.rsi <= OVERSOLD_RSI {
        (DecisionSide::Long, OVERSOLD_RSI - ind.rsi)
    } else if ind.rsi >= OVERBOUGHT_RSI {
        (DecisionSide::Short, ind.rsi - OVERBOUGHT_RSI)
    } else {
        return Decision::skip("RSI not extreme", Strategy::Reversal.tag());
    };
    let confidence = 0.5 + (excess / 50.0).clamp(0.0, 0.3);
    decision(
        side,
        confidence,
        format!("RSI {:.1} exhaustion", ind.rsi),
        Strategy::Reversal,
    )
}

fn range(price: f64, ind: &IndicatorSnapshot) -> Decision {
    let (Some(upper), Some(lower)) = (ind.bb_upper, ind.bb_lower) else {
        return Decision::skip("no Bollinger bands", Strategy::Range.tag());
    };
    let width = upper - lower;
    if width <= 0.0 {
        return Decision::skip("degenerate Bollinger bands", Strategy::Range.tag());
    }

    let position = (price - lower) / width;
    let (side, edge) = if position <= BAND_PROXIMITY {
        (DecisionSide::Long, BAND_PROXIMITY - position)
    } else if position >= 1.0 - BAND_PROXIMITY {
        (DecisionSide::Short, position - (1.0 - BAND_PROXIMITY))
    } else {
        return Decision::skip("price mid-range", Strategy::Range.tag());
    };
    let confidence = 0.55 + edge.clamp(0.0, 0.25);
    decision(
        side,
        confidence,
        format!("price at {:.0}% of Bollinger range", position * 100.0),
        Strategy::Range,
    )
}

/// Decision source running the built-in strategies on the primary timeframe.
pub struct RuleDecisionSource {
    primary: String,
}

impl RuleDecisionSource {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
        }
    }
}

#[async_trait]
impl DecisionSource for RuleDecisionSource {
    fn name(&self) -> &str {
        "rules"
    }

    async fn decide(&self, snapshot: &MarketSnapshot) -> Result<Decision, DecisionError> {
        let Some(indicators) = snapshot.timeframe(&self.primary) else {
            return Err(DecisionError::Malformed(format!(
                "{} snapshot lacks primary timeframe {}",
                snapshot.symbol, self.primary
            )));
        };
        let price = snapshot.price.to_f64().unwrap_or_default();
        let strategy = select_strategy(indicators);
        Ok(strategy.evaluate(price, indicators))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn indicators(rsi: f64, adx: Option<f64>, macd: f64, fast: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            ema_fast: fast,
            ema_slow: 100.0,
            rsi,
            macd_histogram: macd,
            adx,
            bb_upper: Some(110.0),
            bb_lower: Some(90.0),
        }
    }

    #[test]
    fn test_regime_selection() {
        assert_eq!(select_strategy(&indicators(60.0, Some(32.0), 1.0, 101.0)), Strategy::Trend);
        assert_eq!(select_strategy(&indicators(25.0, Some(15.0), -1.0, 99.0)), Strategy::Reversal);
        assert_eq!(select_strategy(&indicators(50.0, None, 0.0, 100.0)), Strategy::Range);
    }

    #[test]
    fn test_trend_follows_direction() {
        let d = Strategy::Trend.evaluate(105.0, &indicators(60.0, Some(35.0), 1.0, 101.0));
        assert_eq!(d.side, DecisionSide::Long);
        assert!((d.confidence - 0.65).abs() < 1e-9);
        assert_eq!(d.strategy_tag, "trend");

        let d = Strategy::Trend.evaluate(95.0, &indicators(40.0, Some(35.0), -1.0, 99.0));
        assert_eq!(d.side, DecisionSide::Short);
    }

    #[test]
    fn test_reversal_fades_extremes() {
        let d = Strategy::Reversal.evaluate(92.0, &indicators(20.0, Some(10.0), -1.0, 99.0));
        assert_eq!(d.side, DecisionSide::Long);
        assert!((d.confidence - 0.7).abs() < 1e-9);

        let d = Strategy::Reversal.evaluate(108.0, &indicators(80.0, Some(10.0), 1.0, 101.0));
        assert_eq!(d.side, DecisionSide::Short);
    }

    #[test]
    fn test_range_trades_bands() {
        let ind = indicators(50.0, None, 0.0, 100.0);
        assert_eq!(Strategy::Range.evaluate(91.0, &ind).side, DecisionSide::Long);
        assert_eq!(Strategy::Range.evaluate(109.0, &ind).side, DecisionSide::Short);
        assert_eq!(Strategy::Range.evaluate(100.0, &ind).side, DecisionSide::Skip);
    }

    #[tokio::test]
    async fn test_rule_source_requires_primary_timeframe() {
        let source = RuleDecisionSource::new("1h");
        let mut snapshot = MarketSnapshot {
            symbol: "BTC/USDT".into(),
            timestamp: Utc::now(),
            price: dec!(91),
            atr_pct: dec!(1.5),
            timeframes: BTreeMap::new(),
        };
        assert!(source.decide(&snapshot).await.is_err());

        snapshot
            .timeframes
            .insert("1h".into(), indicators(50.0, None, 0.0, 100.0));
        let d = source.decide(&snapshot).await.unwrap();
        assert_eq!(d.side, DecisionSide::Long);
        assert_eq!(d.strategy_tag, "range");
    }
}
