//! PositionEngine owns the lifecycle of every position.
//!
//! Locking: the portfolio lock serializes admission (capacity, symbol and
//! correlation checks plus the pending insert) and is released before any
//! order is placed. Each position has its own lock, held across every
//! read-modify-write of that position. The portfolio lock is never taken
//! while a position lock is held.

mod error;
mod exposure;
mod monitor;
mod recovery;
mod stats;
mod supervisor;
mod trailing;

pub use error::EngineError;
pub use exposure::PortfolioExposure;
pub use recovery::RecoveryReport;
pub use stats::EngineStats;
pub use supervisor::{PositionSupervisor, SupervisorAction};
pub use trailing::{LockedStop, TrailDecision, TrailHold};

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use recovery::EntryCheck;

use crate::config::{Config, MonitorConfig, PortfolioConfig, TrailingConfig};
use crate::domain::{
    ExitReason, Order, Position, PositionStatus, Protection, Rejection, TradeResult, TradeSignal,
};
use crate::gating::{AdaptiveController, CorrelationFilter};
use crate::notification::{
    ErrorData, Event, Notifier, PositionCreatedData, ProtectionHitData,
};
use crate::orders::{
    OrderError, OrderManager, PlacedProtection, ProtectionChange, ProtectionFill, ProtectionStatus,
};
use crate::risk::{RiskManager, SizedOrder};
use crate::storage::PositionStore;

/// Statuses that count against portfolio capacity.
const ACTIVE: [PositionStatus; 3] = [
    PositionStatus::Pending,
    PositionStatus::Open,
    PositionStatus::Closing,
];

const COMPONENT: &str = "PositionEngine";

/// Engine settings taken from the application config.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub trailing: TrailingConfig,
    pub portfolio: PortfolioConfig,
    pub monitor: MonitorConfig,
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            trailing: config.trailing.clone(),
            portfolio: config.portfolio.clone(),
            monitor: config.monitor.clone(),
        }
    }
}

/// Result of the portfolio admission checks.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Allowed,
    Rejected(Rejection),
}

/// Result of `create_position`.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Opened(Position),
    Rejected(Rejection),
}

enum Adjustment {
    Applied(Position),
    /// The position closed while its protection was being changed.
    Exited,
}

struct MonitorHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Per-position state that lives only in memory.
struct WatchState {
    best_price: Option<Decimal>,
    last_trail: Option<Instant>,
    last_review: Instant,
}

impl WatchState {
    fn new() -> Self {
        Self {
            best_price: None,
            last_trail: None,
            last_review: Instant::now(),
        }
    }
}

pub struct PositionEngine {
    config: EngineConfig,
    store: Arc<dyn PositionStore>,
    orders: OrderManager,
    risk: Arc<RiskManager>,
    adaptive: Arc<AdaptiveController>,
    correlation: RwLock<CorrelationFilter>,
    notifier: Arc<dyn Notifier>,
    supervisor: Option<Arc<dyn PositionSupervisor>>,

    portfolio: RwLock<()>,
    position_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    monitors: Mutex<HashMap<String, MonitorHandle>>,
    watch: Mutex<HashMap<String, WatchState>>,
    stats: Mutex<EngineStats>,
    shutdown: CancellationToken,
}

impl PositionEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn PositionStore>,
        orders: OrderManager,
        risk: Arc<RiskManager>,
        adaptive: Arc<AdaptiveController>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let correlation = CorrelationFilter::from_config(&config.portfolio);
        Self {
            config,
            store,
            orders,
            risk,
            adaptive,
            correlation: RwLock::new(correlation),
            notifier,
            supervisor: None,
            portfolio: RwLock::new(()),
            position_locks: Mutex::new(HashMap::new()),
            monitors: Mutex::new(HashMap::new()),
            watch: Mutex::new(HashMap::new()),
            stats: Mutex::new(EngineStats::default()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_supervisor(mut self, supervisor: Arc<dyn PositionSupervisor>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn orders(&self) -> &OrderManager {
        &self.orders
    }

    pub async fn stats(&self) -> EngineStats {
        self.stats.lock().await.clone()
    }

    /// Overrides the correlation of a symbol pair.
    pub async fn set_correlation(&self, a: &str, b: &str, value: f64) {
        self.correlation.write().await.set(a, b, value);
    }

    /// Positions that are pending, open or closing.
    pub async fn active_positions(&self) -> Result<Vec<Position>, EngineError> {
        Ok(self.store.positions_with_status(&ACTIVE).await?)
    }

    pub async fn exposure(&self, capital: Decimal) -> Result<PortfolioExposure, EngineError> {
        let positions = self.active_positions().await?;
        let correlation = self.correlation.read().await;
        Ok(PortfolioExposure::compute(&positions, capital, &correlation))
    }

    /// Number of running position monitors.
    pub async fn monitored_count(&self) -> usize {
        self.monitors.lock().await.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Checks capacity, the per-symbol rule and correlation against the
    /// current portfolio without reserving a slot.
    pub async fn can_open_position(&self, symbol: &str) -> Result<Admission, EngineError> {
        let _portfolio = self.portfolio.read().await;
        self.admission(symbol).await
    }

    async fn admission(&self, symbol: &str) -> Result<Admission, EngineError> {
        let active = self.store.positions_with_status(&ACTIVE).await?;
        let portfolio = &self.config.portfolio;

        if !portfolio.allow_multiple_per_symbol && active.iter().any(|p| p.symbol == symbol) {
            return Ok(Admission::Rejected(Rejection::SymbolAlreadyOpen {
                symbol: symbol.to_string(),
            }));
        }
        if active.len() >= portfolio.max_concurrent_positions {
            return Ok(Admission::Rejected(Rejection::CapacityExceeded {
                open: active.len(),
                max: portfolio.max_concurrent_positions,
            }));
        }

        let correlation = self.correlation.read().await;
        let others = active
            .iter()
            .map(|p| p.symbol.as_str())
            .filter(|s| *s != symbol);
        if let Err(rejection) = correlation.check(symbol, others) {
            return Ok(Admission::Rejected(rejection));
        }
        Ok(Admission::Allowed)
    }

    /// Opens a position for an approved order: admission, entry, protection,
    /// then a dedicated monitor.
    ///
    /// A portfolio limit yields `CreateOutcome::Rejected`. A refused entry
    /// closes the pending position with reason `error` and returns the
    /// error; so does a failure to protect a filled entry, after the
    /// position has been flattened. When the entry request fails in
    /// transit, the exchange decides: a fill is adopted and protected.
    pub async fn create_position(
        self: &Arc<Self>,
        signal: &TradeSignal,
        order: &SizedOrder,
    ) -> Result<CreateOutcome, EngineError> {
        if self.is_shutting_down() {
            return Err(EngineError::ShuttingDown);
        }

        let mut position = Position::pending(
            &signal.symbol,
            signal.side,
            order.entry_price,
            order.quantity,
            order.stop_loss,
            order.take_profit,
            signal.confidence,
            &signal.strategy_tag,
        );
        if !position.levels_valid() || position.quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidLevels {
                symbol: signal.symbol.clone(),
                reason: format!(
                    "{} entry {} with stop {} and take-profit {}, quantity {}",
                    signal.side, order.entry_price, order.stop_loss, order.take_profit, order.quantity
                ),
            });
        }

        {
            let _portfolio = self.portfolio.write().await;
            if let Admission::Rejected(rejection) = self.admission(&signal.symbol).await? {
                info!(
                    symbol = %signal.symbol,
                    code = rejection.code(),
                    reason = %rejection,
                    "Position rejected by portfolio limits"
                );
                return Ok(CreateOutcome::Rejected(rejection));
            }
            self.store.save_position(&position, &[]).await?;
        }

        let lock = self.position_lock(&position.id).await;
        let _guard = lock.lock().await;

        let fill = match self.orders.open_entry(&position).await {
            Ok(fill) => fill,
            // The order may have reached the exchange; ask before aborting.
            Err(OrderError::Exchange(e)) if e.is_transient() => {
                warn!(position_id = %position.id, error = %e, "Entry outcome unknown, checking exchange");
                let id = position.id.clone();
                match self.reconcile_entry(position).await? {
                    EntryCheck::Adopted(position) => {
                        self.start_monitor(&position.id).await;
                        return Ok(CreateOutcome::Opened(position));
                    }
                    EntryCheck::Deferred => self.start_monitor(&id).await,
                    EntryCheck::Aborted | EntryCheck::Flattened => {}
                }
                return Err(OrderError::Exchange(e).into());
            }
            Err(e) => {
                self.abort_entry(position, &e.to_string()).await;
                return Err(e.into());
            }
        };

        // Keep the planned stop and take-profit distances if the fill slipped.
        let slippage = fill.price - position.entry_price;
        position.entry_price = fill.price;
        position.quantity = fill.quantity;
        position.stop_loss += slippage;
        position.take_profit += slippage;
        position.initial_stop_loss = position.stop_loss;
        position.entry_time = Utc::now();
        position.transition_to(PositionStatus::Open)?;
        self.store
            .save_position(&position, std::slice::from_ref(&fill.order))
            .await?;
        self.stats.lock().await.positions_opened += 1;

        info!(
            position_id = %position.id,
            symbol = %position.symbol,
            side = %position.side,
            entry = %position.entry_price,
            quantity = %position.quantity,
            stop_loss = %position.stop_loss,
            take_profit = %position.take_profit,
            "Entry filled"
        );

        match self.protect(&position).await {
            Ok(placed) => {
                position.protection = placed.protection;
                self.store.save_position(&position, &placed.orders).await?;
            }
            Err(e) => {
                let detail = e.to_string();
                if let Err(close_err) = self.close_defensively(position.clone(), &detail).await {
                    error!(
                        position_id = %position.id,
                        error = %close_err,
                        "Defensive close failed, monitor will retry"
                    );
                    self.start_monitor(&position.id).await;
                }
                return Err(e.into());
            }
        }

        self.watch
            .lock()
            .await
            .insert(position.id.clone(), WatchState::new());
        self.notifier
            .send_async(Event::position_created(PositionCreatedData::from(&position)));
        self.start_monitor(&position.id).await;

        Ok(CreateOutcome::Opened(position))
    }

    /// Closes a position at market. Returns the trade result, or None if
    /// the position was already closed.
    pub async fn close_position(
        &self,
        position_id: &str,
        reason: ExitReason,
    ) -> Result<Option<TradeResult>, EngineError> {
        let lock = self.position_lock(position_id).await;
        let _guard = lock.lock().await;

        let position = self
            .store
            .get_position(position_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(position_id.to_string()))?;

        match position.status {
            PositionStatus::Closed => Ok(None),
            PositionStatus::Pending => {
                warn!(position_id, "Cannot close a position whose entry is unconfirmed");
                Ok(None)
            }
            PositionStatus::Open | PositionStatus::Closing => {
                self.close_locked(position, reason).await
            }
        }
    }

    /// Stops accepting positions and waits for every monitor to finish its
    /// current poll. In-flight order placements complete.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let monitors: Vec<(String, MonitorHandle)> = self.monitors.lock().await.drain().collect();
        info!(count = monitors.len(), "Stopping position monitors");

        for (position_id, monitor) in monitors {
            monitor.token.cancel();
            if let Err(e) = monitor.handle.await {
                warn!(position_id, error = %e, "Monitor task ended abnormally");
            }
        }
    }

    async fn position_lock(&self, position_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.position_locks.lock().await;
        Arc::clone(locks.entry(position_id.to_string()).or_default())
    }

    /// Places protection, retrying once immediately.
    async fn protect(&self, position: &Position) -> Result<PlacedProtection, OrderError> {
        match self.orders.place_protection(position).await {
            Ok(placed) => Ok(placed),
            Err(first) => {
                warn!(position_id = %position.id, error = %first, "Protection failed, retrying");
                self.orders.place_protection(position).await
            }
        }
    }

    /// Marks a pending position whose entry never filled as closed. Only
    /// called once the exchange has refused the order or shows no fill.
    async fn abort_entry(&self, mut position: Position, detail: &str) {
        warn!(position_id = %position.id, symbol = %position.symbol, detail, "Entry aborted");
        let entry_price = position.entry_price;
        position.record_exit(entry_price, ExitReason::Error);
        if let Err(e) = position.transition_to(PositionStatus::Closed) {
            error!(position_id = %position.id, error = %e, "Cannot abort entry");
            return;
        }
        if let Err(e) = self.store.save_position(&position, &[]).await {
            error!(position_id = %position.id, error = %e, "Failed to persist aborted entry");
        }
        self.stats.lock().await.entries_aborted += 1;
        self.notify_error(
            format!("Entry for {} aborted", position.symbol),
            Some(detail.to_string()),
        );
    }

    /// Flattens a position that could not be protected.
    async fn close_defensively(&self, position: Position, detail: &str) -> Result<(), EngineError> {
        error!(
            position_id = %position.id,
            symbol = %position.symbol,
            detail,
            "Position unprotected, closing at market"
        );
        self.stats.lock().await.defensive_closes += 1;
        self.notify_error(
            format!("{} left unprotected, closing at market", position.symbol),
            Some(detail.to_string()),
        );
        self.close_locked(position, ExitReason::Error).await.map(|_| ())
    }

    /// Closes an open or closing position. The caller holds its lock.
    ///
    /// If the market order fails, protection is placed again before
    /// returning; the position stays `closing` and its monitor retries the
    /// close on the next tick.
    async fn close_locked(
        &self,
        mut position: Position,
        reason: ExitReason,
    ) -> Result<Option<TradeResult>, EngineError> {
        if position.status == PositionStatus::Open {
            position.transition_to(PositionStatus::Closing)?;
            position.exit_reason = Some(reason);
            self.store.save_position(&position, &[]).await?;
        }
        let reason = position.exit_reason.unwrap_or(reason);

        let mut orders = match self.orders.cancel_protection(&position).await? {
            ProtectionChange::AlreadyFilled(fill) => return self.settle_fill(position, fill).await,
            ProtectionChange::Applied(removed) => removed.orders,
        };
        position.protection = Protection::None;

        let fill = match self.orders.close_at_market(&position).await {
            Ok(fill) => fill,
            Err(e) => {
                warn!(position_id = %position.id, error = %e, "Market close failed, restoring protection");
                match self.orders.place_protection(&position).await {
                    Ok(placed) => {
                        position.protection = placed.protection;
                        orders.extend(placed.orders);
                    }
                    Err(protect_err) => error!(
                        position_id = %position.id,
                        error = %protect_err,
                        "Position closing without protection"
                    ),
                }
                self.store.save_position(&position, &orders).await?;
                return Err(e.into());
            }
        };
        orders.push(fill.order);
        position.record_exit(fill.price, reason);
        position.transition_to(PositionStatus::Closed)?;
        self.finalize(position, &orders).await
    }

    /// Records an exit executed by a protective order.
    async fn settle_fill(
        &self,
        mut position: Position,
        fill: ProtectionFill,
    ) -> Result<Option<TradeResult>, EngineError> {
        let reason = match fill.reason {
            ExitReason::StopLoss if position.trailing_active => ExitReason::TrailingStop,
            other => other,
        };
        let level = match fill.reason {
            ExitReason::TakeProfit => position.take_profit,
            _ => position.stop_loss,
        };

        if position.status == PositionStatus::Open {
            position.transition_to(PositionStatus::Closing)?;
        }
        position.protection = Protection::None;
        position.record_exit(fill.exit_price, reason);
        position.transition_to(PositionStatus::Closed)?;

        let result = self.finalize(position, &fill.orders).await?;
        if let Some(result) = &result {
            let data = ProtectionHitData {
                position_id: result.position_id.clone(),
                symbol: result.symbol.clone(),
                side: result.side,
                level,
                exit_price: result.exit_price,
                pnl: result.pnl,
                pnl_pct: result.pnl_pct,
                trailing: reason == ExitReason::TrailingStop,
            };
            let event = match reason {
                ExitReason::TakeProfit => Event::tp_hit(data),
                _ => Event::sl_hit(data),
            };
            self.notifier.send_async(event);
        }
        Ok(result)
    }

    /// Persists a closed position and its trade result in one transaction,
    /// then runs the close callbacks once.
    async fn finalize(
        &self,
        position: Position,
        orders: &[Order],
    ) -> Result<Option<TradeResult>, EngineError> {
        let result = TradeResult::from_position(&position)
            .ok_or_else(|| EngineError::MissingExit(position.id.clone()))?;

        if !self.store.finalize_close(&position, &result, orders).await? {
            debug!(position_id = %position.id, "Trade result already recorded");
            return Ok(None);
        }

        info!(
            position_id = %result.position_id,
            symbol = %result.symbol,
            reason = %result.exit_reason,
            exit = %result.exit_price,
            pnl = %result.pnl,
            pnl_pct = %result.pnl_pct.round_dp(2),
            "Position closed"
        );
        self.on_closed(&result).await;
        Ok(Some(result))
    }

    async fn on_closed(&self, result: &TradeResult) {
        self.stats.lock().await.record_close(result);
        self.watch.lock().await.remove(&result.position_id);
        self.stop_monitor(&result.position_id).await;
        self.position_locks.lock().await.remove(&result.position_id);

        self.notifier
            .send_async(Event::position_closed(result.into()));

        match self.risk.record_trade(result).await {
            Ok(true) => self.notify_error(
                "Kill switch tripped, new trades halted".to_string(),
                self.risk
                    .kill_switch_until()
                    .await
                    .map(|until| format!("until {}", until)),
            ),
            Ok(false) => {}
            Err(e) => error!(position_id = %result.position_id, error = %e, "Risk manager failed to record trade"),
        }

        if let Err(e) = self.adaptive.on_trade_closed(result).await {
            warn!(position_id = %result.position_id, error = %e, "Adaptive controller failed to record trade");
        }
    }

    /// Swaps the position's protection for new levels. If the swap leaves
    /// the position unprotected or half protected, protection is placed
    /// again right away and the position is flattened when that fails too.
    async fn adjust_protection(
        &self,
        mut position: Position,
        stop_loss: Decimal,
        take_profit: Decimal,
        arm_trailing: bool,
    ) -> Result<Adjustment, EngineError> {
        match self
            .orders
            .replace_protection(&position, stop_loss, take_profit)
            .await
        {
            Ok(ProtectionChange::Applied(placed)) => {
                position.stop_loss = stop_loss;
                position.take_profit = take_profit;
                position.trailing_active |= arm_trailing;
                position.protection = placed.protection;
                self.store.save_position(&position, &placed.orders).await?;
                Ok(Adjustment::Applied(position))
            }
            Ok(ProtectionChange::AlreadyFilled(fill)) => {
                self.settle_fill(position, fill).await?;
                Ok(Adjustment::Exited)
            }
            Err(OrderError::Unprotected {
                cancelled, source, ..
            }) => {
                error!(
                    position_id = %position.id,
                    error = %source,
                    "Protection removed but replacement failed"
                );
                position.protection = Protection::None;
                self.store.save_position(&position, &cancelled).await?;
                self.reprotect(position, stop_loss, take_profit, arm_trailing)
                    .await
            }
            Err(OrderError::PartiallyCancelled {
                cancelled, source, ..
            }) => {
                error!(
                    position_id = %position.id,
                    error = %source,
                    "Protection partially cancelled, rebuilding"
                );
                self.store.save_position(&position, &cancelled).await?;
                let leftovers = match self.orders.check_protection(&position).await? {
                    ProtectionStatus::Filled(fill) => {
                        self.settle_fill(position, fill).await?;
                        return Ok(Adjustment::Exited);
                    }
                    ProtectionStatus::Missing(orders) => orders,
                    ProtectionStatus::Active => return Ok(Adjustment::Applied(position)),
                };
                position.protection = Protection::None;
                self.store.save_position(&position, &leftovers).await?;
                self.reprotect(position, stop_loss, take_profit, arm_trailing)
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Places protection at the target levels for a position that has none.
    async fn reprotect(
        &self,
        position: Position,
        stop_loss: Decimal,
        take_profit: Decimal,
        arm_trailing: bool,
    ) -> Result<Adjustment, EngineError> {
        let mut target = position.clone();
        target.stop_loss = stop_loss;
        target.take_profit = take_profit;
        target.trailing_active |= arm_trailing;
        match self.orders.place_protection(&target).await {
            Ok(placed) => {
                target.protection = placed.protection;
                self.store.save_position(&target, &placed.orders).await?;
                Ok(Adjustment::Applied(target))
            }
            Err(e) => {
                self.close_defensively(position, &e.to_string()).await?;
                Ok(Adjustment::Exited)
            }
        }
    }

    fn notify_error(&self, message: String, error: Option<String>) {
        self.notifier.send_async(Event::error(ErrorData {
            component: COMPONENT.to_string(),
            message,
            error,
        }));
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
