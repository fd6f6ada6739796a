//! Multi-timeframe alignment gate.

use crate::config::TimeframeConfig;
use crate::domain::{MarketSnapshot, Rejection, Side, TrendDirection};

/// Weighted agreement of the configured timeframes with a candidate side.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Sum of the weights of agreeing timeframes, in 0..1.
    pub score: f64,
    /// Direction read on each configured timeframe, in configuration order.
    pub directions: Vec<(String, TrendDirection)>,
    /// Configured timeframes absent from the snapshot; they never agree.
    pub missing: Vec<String>,
}

pub struct TimeframeGate {
    config: TimeframeConfig,
}

impl TimeframeGate {
    pub fn new(config: TimeframeConfig) -> Self {
        Self { config }
    }

    pub fn primary(&self) -> &str {
        &self.config.primary
    }

    pub fn alignment(&self, snapshot: &MarketSnapshot, side: Side) -> Alignment {
        let mut score = 0.0;
        let mut directions = Vec::with_capacity(self.config.timeframes.len());
        let mut missing = Vec::new();

        for tf in &self.config.timeframes {
            match snapshot.timeframe(&tf.name) {
                Some(indicators) => {
                    let direction = indicators.direction();
                    if direction.agrees_with(side) {
                        score += tf.weight;
                    }
                    directions.push((tf.name.clone(), direction));
                }
                None => missing.push(tf.name.clone()),
            }
        }

        Alignment {
            score: score.clamp(0.0, 1.0),
            directions,
            missing,
        }
    }

    /// Boost proportional to the alignment in excess of the minimum,
    /// reaching `max_confidence_boost` at full alignment.
    pub fn confidence_boost(&self, alignment: f64) -> f64 {
        let min = self.config.min_alignment;
        if alignment < min {
            return 0.0;
        }
        let span = 1.0 - min;
        if span <= f64::EPSILON {
            return self.config.max_confidence_boost;
        }
        (self.config.max_confidence_boost * (alignment - min) / span)
            .clamp(0.0, self.config.max_confidence_boost)
    }

    /// Returns the boosted confidence when the gate passes.
    pub fn check(
        &self,
        snapshot: &MarketSnapshot,
        side: Side,
        confidence: f64,
    ) -> Result<f64, Rejection> {
        let alignment = self.alignment(snapshot, side);
        if alignment.score < self.config.min_alignment {
            return Err(Rejection::TimeframeMisaligned {
                alignment: alignment.score,
                minimum: self.config.min_alignment,
            });
        }
        Ok((confidence + self.confidence_boost(alignment.score)).min(1.0))
    }
}
