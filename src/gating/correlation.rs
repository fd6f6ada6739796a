//! Pair correlation filter and diversification score.

use std::collections::HashMap;

use crate::config::PortfolioConfig;
use crate::domain::Rejection;

/// Symmetric symbol-pair correlation table.
///
/// Seeded from configuration.
/// A symbol correlates 1.0 with itself; unknown pairs use the default.
#[derive(Debug, Clone)]
pub struct CorrelationFilter {
    max_correlation: f64,
    default_correlation: f64,
    table: HashMap<(String, String), f64>,
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl CorrelationFilter {
    pub fn new(max_correlation: f64, default_correlation: f64) -> Self {
        Self {
            max_correlation,
            default_correlation,
            table: HashMap::new(),
        }
    }

    pub fn from_config(config: &PortfolioConfig) -> Self {
        let mut filter = Self::new(config.max_correlation, config.default_correlation);
        for entry in &config.correlations {
            filter.set(&entry.a, &entry.b, entry.value);
        }
        filter
    }

    pub fn set(&mut self, a: &str, b: &str, value: f64) {
        if a == b {
            return;
        }
        self.table.insert(pair_key(a, b), value.clamp(-1.0, 1.0));
    }

    pub fn correlation(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        self.table
            .get(&pair_key(a, b))
            .copied()
            .unwrap_or(self.default_correlation)
    }

    /// Blocks `symbol` when it correlates above the maximum with any open
    /// position on a different symbol.
    pub fn check<'a>(
        &self,
        symbol: &str,
        open_symbols: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), Rejection> {
        for open in open_symbols {
            if open == symbol {
                continue;
            }
            let correlation = self.correlation(symbol, open);
            if correlation > self.max_correlation {
                return Err(Rejection::CorrelationBlocked {
                    symbol: symbol.to_string(),
                    open_symbol: open.to_string(),
                    correlation,
                });
            }
        }
        Ok(())
    }

    /// `1 - mean pairwise correlation` of the open symbols, in 0..1.
    /// A portfolio with fewer than two positions is fully diversified.
    pub fn diversification_score(&self, open_symbols: &[&str]) -> f64 {
        let mut sum = 0.0;
        let mut pairs = 0u32;
        for (i, a) in open_symbols.iter().enumerate() {
            for b in &open_symbols[i + 1..] {
                sum += self.correlation(a, b);
                pairs += 1;
            }
        }
        if pairs == 0 {
            return 1.0;
        }
        (1.0 - sum / f64::from(pairs)).clamp(0.0, 1.0)
    }
}
