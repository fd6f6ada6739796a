//! Portfolio exposure summary.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::domain::Position;
use crate::gating::CorrelationFilter;

/// Snapshot of capital committed to active positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioExposure {
    pub open_positions: usize,
    /// Sum of entry notionals in quote currency.
    pub total_notional: Decimal,
    /// Total notional in percent of capital.
    pub exposure_pct: Decimal,
    /// Notional per symbol.
    pub by_symbol: BTreeMap<String, Decimal>,
    /// 1 minus the mean pairwise correlation of open symbols.
    pub diversification: f64,
}

impl PortfolioExposure {
    pub fn compute(positions: &[Position], capital: Decimal, correlation: &CorrelationFilter) -> Self {
        let mut by_symbol: BTreeMap<String, Decimal> = BTreeMap::new();
        for position in positions {
            *by_symbol.entry(position.symbol.clone()).or_default() += position.notional();
        }
        let total_notional: Decimal = by_symbol.values().copied().sum();
        let exposure_pct = if capital > Decimal::ZERO {
            total_notional / capital * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        let symbols: Vec<&str> = positions.iter().map(|p| p.symbol.as_str()).collect();

        Self {
            open_positions: positions.len(),
            total_notional,
            exposure_pct,
            diversification: correlation.diversification_score(&symbols),
            by_symbol,
        }
    }
}
