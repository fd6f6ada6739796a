//! One background monitor per open position.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::recovery::EntryCheck;
use super::trailing::{self, TrailDecision};
use super::{Adjustment, EngineError, MonitorHandle, PositionEngine, SupervisorAction, WatchState};
use crate::domain::{ExitReason, Position, PositionStatus, Protection, Side};
use crate::notification::{Event, TrailingUpdatedData};
use crate::orders::ProtectionStatus;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What a monitor does after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MonitorStep {
    Continue,
    /// The position is closed; the monitor exits.
    Done,
}

impl PositionEngine {
    /// Spawns the monitor of a position unless one is already running.
    pub(super) async fn start_monitor(self: &Arc<Self>, position_id: &str) {
        if self.is_shutting_down() {
            return;
        }
        let mut monitors = self.monitors.lock().await;
        if monitors.contains_key(position_id) {
            return;
        }

        let token = self.shutdown.child_token();
        let engine = Arc::clone(self);
        let id = position_id.to_string();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move { engine.run_monitor(id, loop_token).await });

        monitors.insert(position_id.to_string(), MonitorHandle { token, handle });
    }

    /// Stops a position's monitor. Safe to call from inside that monitor.
    pub(super) async fn stop_monitor(&self, position_id: &str) {
        if let Some(monitor) = self.monitors.lock().await.remove(position_id) {
            monitor.token.cancel();
        }
    }

    async fn run_monitor(self: Arc<Self>, position_id: String, token: CancellationToken) {
        let period = self.config.monitor.poll_interval.max(MIN_POLL_INTERVAL);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(position_id = %position_id, "Monitor started");

        loop {
            // Cancellation only interrupts the wait, never a tick in progress.
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.tick(&position_id).await {
                Ok(MonitorStep::Continue) => {}
                Ok(MonitorStep::Done) => break,
                Err(e) => warn!(position_id = %position_id, error = %e, "Monitor tick failed"),
            }
        }

        self.monitors.lock().await.remove(&position_id);
        debug!(position_id = %position_id, "Monitor stopped");
    }

    /// One monitoring pass over a position.
    pub(crate) async fn tick(&self, position_id: &str) -> Result<MonitorStep, EngineError> {
        let lock = self.position_lock(position_id).await;
        let _guard = lock.lock().await;

        let Some(position) = self.store.get_position(position_id).await? else {
            return Ok(MonitorStep::Done);
        };

        match position.status {
            PositionStatus::Closed => Ok(MonitorStep::Done),
            PositionStatus::Pending => match self.reconcile_entry(position).await? {
                EntryCheck::Adopted(_) | EntryCheck::Deferred => Ok(MonitorStep::Continue),
                EntryCheck::Aborted | EntryCheck::Flattened => Ok(MonitorStep::Done),
            },
            PositionStatus::Closing => {
                let reason = position.exit_reason.unwrap_or(ExitReason::Error);
                info!(position_id, reason = %reason, "Retrying close");
                self.close_locked(position, reason).await?;
                Ok(MonitorStep::Done)
            }
            PositionStatus::Open => self.watch_open(position).await,
        }
    }

    async fn watch_open(&self, mut position: Position) -> Result<MonitorStep, EngineError> {
        match self.orders.check_protection(&position).await? {
            ProtectionStatus::Active => {}
            ProtectionStatus::Filled(fill) => {
                self.settle_fill(position, fill).await?;
                return Ok(MonitorStep::Done);
            }
            ProtectionStatus::Missing(orders) => {
                warn!(position_id = %position.id, symbol = %position.symbol, "Protection missing, placing again");
                position.protection = Protection::None;
                self.store.save_position(&position, &orders).await?;
                return match self.protect(&position).await {
                    Ok(placed) => {
                        position.protection = placed.protection;
                        self.store.save_position(&position, &placed.orders).await?;
                        Ok(MonitorStep::Continue)
                    }
                    Err(e) => {
                        self.close_defensively(position, &e.to_string()).await?;
                        Ok(MonitorStep::Done)
                    }
                };
            }
        }

        let price = self.orders.gateway().get_current_price(&position.symbol).await?;

        let Some(position) = self.trail(position, price).await? else {
            return Ok(MonitorStep::Done);
        };
        self.supervise(position, price).await
    }

    /// Applies a trailing update if one is due. Returns None if the
    /// position closed meanwhile.
    async fn trail(&self, position: Position, price: Decimal) -> Result<Option<Position>, EngineError> {
        let (best, since_last) = {
            let mut watch = self.watch.lock().await;
            let state = watch.entry(position.id.clone()).or_insert_with(WatchState::new);
            let best = trailing::best_price(position.side, state.best_price, price);
            state.best_price = Some(best);
            (best, state.last_trail.map(|t| t.elapsed()))
        };

        let stop = match trailing::evaluate(&self.config.trailing, &position, best, price, since_last) {
            TrailDecision::Hold(reason) => {
                trace!(position_id = %position.id, ?reason, "Trailing stop held");
                return Ok(Some(position));
            }
            TrailDecision::Move(stop) => stop,
        };

        let old_stop = position.stop_loss;
        let take_profit = position.take_profit;
        let position = match self
            .adjust_protection(position, stop.price(), take_profit, true)
            .await?
        {
            Adjustment::Applied(position) => position,
            Adjustment::Exited => return Ok(None),
        };

        if let Some(state) = self.watch.lock().await.get_mut(&position.id) {
            state.last_trail = Some(Instant::now());
        }
        self.stats.lock().await.trailing_updates += 1;

        let locked_pnl_pct = position.unrealized_pnl_pct(position.stop_loss);
        info!(
            position_id = %position.id,
            symbol = %position.symbol,
            old_stop = %old_stop,
            new_stop = %position.stop_loss,
            price = %price,
            locked_pnl_pct = %locked_pnl_pct.round_dp(2),
            "Trailing stop moved"
        );
        self.notifier.send_async(Event::trailing_updated(TrailingUpdatedData {
            position_id: position.id.clone(),
            symbol: position.symbol.clone(),
            side: position.side,
            old_stop,
            new_stop: position.stop_loss,
            price,
            locked_pnl_pct,
        }));

        Ok(Some(position))
    }

    /// Consults the supervisor at its interval and applies risk-reducing
    /// proposals.
    async fn supervise(&self, position: Position, price: Decimal) -> Result<MonitorStep, EngineError> {
        let Some(supervisor) = self.supervisor.clone() else {
            return Ok(MonitorStep::Continue);
        };
        let interval = self.config.monitor.supervisor_interval;
        if interval.is_zero() {
            return Ok(MonitorStep::Continue);
        }
        {
            let mut watch = self.watch.lock().await;
            let state = watch.entry(position.id.clone()).or_insert_with(WatchState::new);
            if state.last_review.elapsed() < interval {
                return Ok(MonitorStep::Continue);
            }
            state.last_review = Instant::now();
        }

        let action = match supervisor.review(&position, price).await {
            Ok(action) => action,
            Err(e) => {
                warn!(position_id = %position.id, supervisor = supervisor.name(), error = %e, "Supervisor review failed");
                return Ok(MonitorStep::Continue);
            }
        };

        let (stop_loss, take_profit) = match action {
            SupervisorAction::Hold => return Ok(MonitorStep::Continue),
            SupervisorAction::TightenStopLoss(stop) => {
                if !self.stop_acceptable(&position, stop, price) {
                    warn!(position_id = %position.id, stop = %stop, "Supervisor stop rejected");
                    return Ok(MonitorStep::Continue);
                }
                (stop, position.take_profit)
            }
            SupervisorAction::ExtendTakeProfit(take_profit) => {
                if !position.side.is_better(take_profit, position.take_profit) {
                    warn!(position_id = %position.id, take_profit = %take_profit, "Supervisor take-profit rejected");
                    return Ok(MonitorStep::Continue);
                }
                (position.stop_loss, take_profit)
            }
        };

        match self
            .adjust_protection(position, stop_loss, take_profit, false)
            .await?
        {
            Adjustment::Applied(position) => {
                self.stats.lock().await.supervisor_adjustments += 1;
                info!(
                    position_id = %position.id,
                    supervisor = supervisor.name(),
                    stop_loss = %position.stop_loss,
                    take_profit = %position.take_profit,
                    "Supervisor adjustment applied"
                );
                Ok(MonitorStep::Continue)
            }
            Adjustment::Exited => Ok(MonitorStep::Done),
        }
    }

    /// A stop proposed from outside must be tighter than the current one
    /// and clear of the price by the safety margin.
    fn stop_acceptable(&self, position: &Position, stop: Decimal, price: Decimal) -> bool {
        let margin = price * self.config.trailing.safety_margin_pct / Decimal::ONE_HUNDRED;
        let clear_of_price = match position.side {
            Side::Long => stop <= price - margin,
            Side::Short => stop >= price + margin,
        };
        position.side.is_better(stop, position.stop_loss) && clear_of_price
    }
}
