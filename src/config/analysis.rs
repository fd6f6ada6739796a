//! Signal analysis loop configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Analysis loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Interval between analysis cycles.
    #[serde(with = "duration")]
    pub interval: Duration,
    /// Number of symbols evaluated in parallel.
    pub workers: usize,
    /// Upper bound on the evaluation of a single symbol.
    #[serde(with = "duration")]
    pub symbol_timeout: Duration,
    /// Interval between overview notifications.
    #[serde(with = "duration")]
    pub overview_interval: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            workers: 4,
            symbol_timeout: Duration::from_secs(30),
            overview_interval: Duration::from_secs(3600),
        }
    }
}
