//! Portfolio-level limits and correlation settings.

use serde::Deserialize;

/// Portfolio constraints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    /// Maximum number of simultaneously active positions.
    pub max_concurrent_positions: usize,
    /// Allow more than one active position on the same symbol.
    pub allow_multiple_per_symbol: bool,
    /// New positions are blocked when correlated above this with an open one.
    pub max_correlation: f64,
    /// Correlation assumed for pairs missing from the table.
    pub default_correlation: f64,
    /// Static pair correlations.
    pub correlations: Vec<CorrelationEntry>,
}

/// Correlation between two symbols.
#[derive(Debug, Clone, Deserialize)]
pub struct CorrelationEntry {
    pub a: String,
    pub b: String,
    pub value: f64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            max_concurrent_positions: 3,
            allow_multiple_per_symbol: false,
            max_correlation: 0.7,
            default_correlation: 0.0,
            correlations: Vec::new(),
        }
    }
}
