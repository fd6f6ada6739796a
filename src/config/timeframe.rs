//! Multi-timeframe gate configuration.

use serde::Deserialize;

/// Multi-timeframe alignment settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeframeConfig {
    /// Minimum weighted alignment (0..1) for the gate to pass.
    pub min_alignment: f64,
    /// Largest confidence boost granted at full alignment (0.15 = 15 points).
    pub max_confidence_boost: f64,
    /// Timeframe that drives strategy selection.
    pub primary: String,
    /// Timeframes and their weights; weights must sum to 1.
    pub timeframes: Vec<TimeframeWeight>,
}

/// One timeframe and its weight in the alignment score.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeframeWeight {
    pub name: String,
    pub weight: f64,
}

impl Default for TimeframeConfig {
    fn default() -> Self {
        Self {
            min_alignment: 0.6,
            max_confidence_boost: 0.15,
            primary: "1h".to_string(),
            timeframes: vec![
                TimeframeWeight { name: "4h".to_string(), weight: 0.5 },
                TimeframeWeight { name: "1h".to_string(), weight: 0.3 },
                TimeframeWeight { name: "15m".to_string(), weight: 0.2 },
            ],
        }
    }
}
