//! Startup reconciliation of stored positions against the exchange.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{ACTIVE, EngineError, PositionEngine, WatchState};
use crate::domain::{ExitReason, Order, Position, PositionStatus, Protection, Side, base_asset};
use crate::notification::{Event, PositionCreatedData};
use crate::orders::{ProtectionChange, ProtectionStatus};

/// What recovery did with the active positions it found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Open positions whose exposure and protection check out.
    pub resumed: usize,
    /// Open positions whose missing protection was placed again.
    pub reprotected: usize,
    /// Positions whose protective order executed while we were down.
    pub settled: usize,
    /// Positions with no exposure left on the exchange.
    pub closed_as_error: usize,
    /// Positions that were mid-close and have now been closed.
    pub closes_completed: usize,
    /// Pending positions whose entry is confirmed not to have filled.
    pub entries_aborted: usize,
    /// Pending positions whose entry did fill; now open and protected.
    pub entries_adopted: usize,
    /// Positions left to their monitor because the exchange was unavailable.
    pub deferred: usize,
}

impl RecoveryReport {
    /// Positions now being monitored.
    pub fn monitored(&self) -> usize {
        self.resumed + self.reprotected + self.entries_adopted + self.deferred
    }
}

enum Recovered {
    Resumed,
    Reprotected,
    Settled,
    ClosedAsError,
    Deferred,
}

/// What the exchange says about a pending position's entry order.
pub(super) enum EntryCheck {
    /// The entry filled; the position is open and protected.
    Adopted(Position),
    /// Nothing was bought or sold; the position is closed.
    Aborted,
    /// The entry filled but could not be protected; it was flattened.
    Flattened,
    /// The exchange could not be asked, or a defensive close failed; the
    /// monitor takes it from here.
    Deferred,
}

impl PositionEngine {
    /// Reconciles every active position with the exchange and resumes
    /// monitoring. Running it again on the same state changes nothing.
    pub async fn recover(self: &Arc<Self>) -> Result<RecoveryReport, EngineError> {
        let positions = self.active_positions().await?;
        info!(count = positions.len(), "Recovering active positions");

        let mut report = RecoveryReport::default();
        for stale in positions {
            let lock = self.position_lock(&stale.id).await;
            let _guard = lock.lock().await;

            let Some(position) = self.store.get_position(&stale.id).await? else {
                continue;
            };
            let id = position.id.clone();

            match position.status {
                PositionStatus::Closed => {}
                PositionStatus::Pending => match self.reconcile_entry(position).await? {
                    EntryCheck::Adopted(_) => {
                        self.resume(&id).await;
                        report.entries_adopted += 1;
                    }
                    EntryCheck::Aborted => report.entries_aborted += 1,
                    EntryCheck::Flattened => report.closed_as_error += 1,
                    EntryCheck::Deferred => {
                        self.resume(&id).await;
                        report.deferred += 1;
                    }
                },
                PositionStatus::Closing => {
                    let reason = position.exit_reason.unwrap_or(ExitReason::Error);
                    match self.close_locked(position, reason).await {
                        Ok(_) => report.closes_completed += 1,
                        Err(e) => {
                            warn!(position_id = %id, error = %e, "Close still failing, monitor will retry");
                            self.resume(&id).await;
                            report.deferred += 1;
                        }
                    }
                }
                PositionStatus::Open => match self.reconcile(position).await? {
                    Recovered::Resumed => {
                        self.resume(&id).await;
                        report.resumed += 1;
                    }
                    Recovered::Reprotected => {
                        self.resume(&id).await;
                        report.reprotected += 1;
                    }
                    Recovered::Deferred => {
                        self.resume(&id).await;
                        report.deferred += 1;
                    }
                    Recovered::Settled => report.settled += 1,
                    Recovered::ClosedAsError => report.closed_as_error += 1,
                },
            }
        }

        info!(
            resumed = report.resumed,
            reprotected = report.reprotected,
            settled = report.settled,
            closed_as_error = report.closed_as_error,
            closes_completed = report.closes_completed,
            entries_aborted = report.entries_aborted,
            entries_adopted = report.entries_adopted,
            deferred = report.deferred,
            "Recovery complete"
        );
        Ok(report)
    }

    async fn resume(self: &Arc<Self>, position_id: &str) {
        self.watch
            .lock()
            .await
            .entry(position_id.to_string())
            .or_insert_with(WatchState::new);
        self.start_monitor(position_id).await;
    }

    /// Settles a pending position against the exchange. Base-asset holdings
    /// not claimed by another active position on the symbol are taken as
    /// this entry's fill; only when there are none is the entry aborted.
    /// The caller holds the position lock.
    pub(super) async fn reconcile_entry(&self, mut position: Position) -> Result<EntryCheck, EngineError> {
        let gateway = self.orders.gateway();
        let balance = match gateway.get_balance(base_asset(&position.symbol)).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(position_id = %position.id, error = %e, "Cannot check entry, leaving position pending");
                return Ok(EntryCheck::Deferred);
            }
        };

        let claimed: Decimal = self
            .store
            .positions_with_status(&ACTIVE)
            .await?
            .iter()
            .filter(|p| p.id != position.id && p.symbol == position.symbol)
            .filter(|p| p.status != PositionStatus::Pending)
            .map(|p| p.quantity * p.side.sign())
            .sum();
        let held = (balance - claimed) * position.side.sign();

        if held <= Decimal::ZERO {
            self.abort_entry(position, "entry not found on exchange").await;
            return Ok(EntryCheck::Aborted);
        }

        let price = match gateway.get_current_price(&position.symbol).await {
            Ok(price) => price,
            Err(e) => {
                warn!(position_id = %position.id, error = %e, "Cannot price filled entry, leaving position pending");
                return Ok(EntryCheck::Deferred);
            }
        };

        // The fill price is unknown; the planned distances move to the current price.
        let shift = price - position.entry_price;
        position.entry_price = price;
        position.quantity = held.min(position.quantity);
        position.stop_loss += shift;
        position.take_profit += shift;
        position.initial_stop_loss = position.stop_loss;
        position.entry_time = Utc::now();
        position.transition_to(PositionStatus::Open)?;
        self.store.save_position(&position, &[]).await?;
        self.stats.lock().await.positions_opened += 1;
        warn!(
            position_id = %position.id,
            symbol = %position.symbol,
            quantity = %position.quantity,
            price = %price,
            "Pending entry found filled on exchange, adopting position"
        );

        match self.protect(&position).await {
            Ok(placed) => {
                position.protection = placed.protection;
                self.store.save_position(&position, &placed.orders).await?;
                self.watch
                    .lock()
                    .await
                    .insert(position.id.clone(), WatchState::new());
                self.notifier
                    .send_async(Event::position_created(PositionCreatedData::from(&position)));
                Ok(EntryCheck::Adopted(position))
            }
            Err(e) => {
                let id = position.id.clone();
                match self.close_defensively(position, &e.to_string()).await {
                    Ok(()) => Ok(EntryCheck::Flattened),
                    Err(close_err) => {
                        error!(position_id = %id, error = %close_err, "Defensive close failed, monitor will retry");
                        Ok(EntryCheck::Deferred)
                    }
                }
            }
        }
    }

    /// Compares an open position with the exchange: a protective order may
    /// have executed, the exposure may be gone, or protection may be missing.
    async fn reconcile(&self, mut position: Position) -> Result<Recovered, EngineError> {
        let status = match self.orders.check_protection(&position).await {
            Ok(status) => status,
            Err(e) => {
                warn!(position_id = %position.id, error = %e, "Cannot check protection during recovery");
                return Ok(Recovered::Deferred);
            }
        };

        let missing = match status {
            ProtectionStatus::Filled(fill) => {
                info!(position_id = %position.id, reason = %fill.reason, "Protective order executed while offline");
                self.settle_fill(position, fill).await?;
                return Ok(Recovered::Settled);
            }
            ProtectionStatus::Active => None,
            ProtectionStatus::Missing(orders) => Some(orders),
        };

        let balance = match self
            .orders
            .gateway()
            .get_balance(base_asset(&position.symbol))
            .await
        {
            Ok(balance) => balance,
            Err(e) => {
                warn!(position_id = %position.id, error = %e, "Cannot check balance during recovery");
                if let Some(orders) = &missing {
                    position.protection = Protection::None;
                    self.store.save_position(&position, orders).await?;
                }
                return Ok(Recovered::Deferred);
            }
        };
        let holds_exposure = match position.side {
            Side::Long => balance > Decimal::ZERO,
            Side::Short => balance < Decimal::ZERO,
        };

        if !holds_exposure {
            error!(
                position_id = %position.id,
                symbol = %position.symbol,
                balance = %balance,
                "Exposure not found on exchange, closing position as error"
            );
            self.close_without_exposure(position, missing.unwrap_or_default())
                .await?;
            return Ok(Recovered::ClosedAsError);
        }

        let Some(orders) = missing else {
            return Ok(Recovered::Resumed);
        };

        warn!(position_id = %position.id, "Protection missing after restart, placing again");
        position.protection = Protection::None;
        self.store.save_position(&position, &orders).await?;
        match self.protect(&position).await {
            Ok(placed) => {
                position.protection = placed.protection;
                self.store.save_position(&position, &placed.orders).await?;
                Ok(Recovered::Reprotected)
            }
            Err(e) => {
                self.close_defensively(position, &e.to_string()).await?;
                Ok(Recovered::ClosedAsError)
            }
        }
    }

    /// Closes a position that holds nothing on the exchange. No market order
    /// is sent; the exit is booked at entry price so the phantom position
    /// does not feed a fictitious result into the kill switch.
    async fn close_without_exposure(
        &self,
        mut position: Position,
        mut orders: Vec<Order>,
    ) -> Result<(), EngineError> {
        if !position.protection.is_none() {
            match self.orders.cancel_protection(&position).await {
                Ok(ProtectionChange::Applied(removed)) => orders.extend(removed.orders),
                Ok(ProtectionChange::AlreadyFilled(fill)) => {
                    self.settle_fill(position, fill).await?;
                    return Ok(());
                }
                Err(e) => {
                    warn!(position_id = %position.id, error = %e, "Failed to cancel orphaned protection")
                }
            }
            position.protection = Protection::None;
        }

        let entry_price = position.entry_price;
        position.transition_to(PositionStatus::Closing)?;
        position.record_exit(entry_price, ExitReason::Error);
        position.transition_to(PositionStatus::Closed)?;
        self.finalize(position, &orders).await?;
        self.notify_error(
            "Position closed at startup: exposure not found on exchange".to_string(),
            None,
        );
        Ok(())
    }
}
