//! Runtime statistics for the position engine.

use rust_decimal::Decimal;

use crate::domain::{ExitReason, TradeOutcome, TradeResult};

/// Counters kept since process start.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub positions_opened: u64,
    pub positions_closed: u64,
    /// Entries that failed before the position held exposure.
    pub entries_aborted: u64,
    pub wins: u64,
    pub losses: u64,
    pub breakevens: u64,
    pub realized_pnl: Decimal,
    pub best_trade: Decimal,
    pub worst_trade: Decimal,
    pub stop_loss_exits: u64,
    pub take_profit_exits: u64,
    pub trailing_exits: u64,
    pub trailing_updates: u64,
    /// Positions closed because protection could not be restored.
    pub defensive_closes: u64,
    pub supervisor_adjustments: u64,
}

impl EngineStats {
    pub fn record_close(&mut self, result: &TradeResult) {
        self.positions_closed += 1;
        self.realized_pnl += result.pnl;
        self.best_trade = self.best_trade.max(result.pnl);
        self.worst_trade = self.worst_trade.min(result.pnl);

        match result.exit_reason {
            ExitReason::StopLoss => self.stop_loss_exits += 1,
            ExitReason::TakeProfit => self.take_profit_exits += 1,
            ExitReason::TrailingStop => self.trailing_exits += 1,
            _ => {}
        }

        if result.counts_for_statistics() {
            match result.outcome {
                TradeOutcome::Win => self.wins += 1,
                TradeOutcome::Loss => self.losses += 1,
                TradeOutcome::Breakeven => self.breakevens += 1,
            }
        }
    }

    /// Share of decided trades that were wins.
    pub fn win_rate(&self) -> Option<f64> {
        let decided = self.wins + self.losses;
        (decided > 0).then(|| self.wins as f64 / decided as f64)
    }
}
