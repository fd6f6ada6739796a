//! Optional periodic review of open positions by an external advisor.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::decision::DecisionError;
use crate::domain::Position;

/// Adjustment proposed by a supervisor.
///
/// Supervisors can only reduce risk or let a winner run: the engine drops
/// any stop that is not tighter than the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorAction {
    Hold,
    TightenStopLoss(Decimal),
    ExtendTakeProfit(Decimal),
}

/// PositionSupervisor reviews a live position at the monitor's supervisor
/// interval.
#[async_trait]
pub trait PositionSupervisor: Send + Sync {
    fn name(&self) -> &str;

    async fn review(&self, position: &Position, price: Decimal) -> Result<SupervisorAction, DecisionError>;
}
