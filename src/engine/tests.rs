//! Tests for the position engine against the paper exchange.

use super::monitor::MonitorStep;
use super::*;
use crate::config::{AdaptiveConfig, RiskConfig};
use crate::decision::DecisionError;
use crate::domain::{Fees, OrderSide, Side, TradeOutcome};
use crate::exchanges::{ExchangeGateway, OrderRequest, PaperExchange};
use crate::gating::AdaptiveController;
use crate::notification::NoopNotifier;
use crate::risk::OrderLimits;
use crate::storage::{SqliteStorage, SqliteStorageConfig};
use async_trait::async_trait;
use futures_util::future::join_all;
use rust_decimal_macros::dec;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    engine: Arc<PositionEngine>,
    exchange: Arc<PaperExchange>,
    store: Arc<dyn PositionStore>,
    _dir: TempDir,
}

impl Harness {
    /// A second engine over the same store and exchange, as after a restart.
    fn restarted(&self, config: EngineConfig) -> Arc<PositionEngine> {
        Arc::new(build_engine(config, self.store.clone(), self.exchange.clone()))
    }

    async fn position(&self, id: &str) -> Position {
        self.store.get_position(id).await.unwrap().unwrap()
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        trailing: TrailingConfig {
            cooldown: Duration::ZERO,
            ..TrailingConfig::default()
        },
        portfolio: PortfolioConfig::default(),
        // Monitors stay idle; tests drive ticks directly.
        monitor: MonitorConfig {
            poll_interval: Duration::from_secs(3600),
            supervisor_interval: Duration::ZERO,
        },
    }
}

fn build_engine(
    config: EngineConfig,
    store: Arc<dyn PositionStore>,
    exchange: Arc<PaperExchange>,
) -> PositionEngine {
    let gateway: Arc<dyn ExchangeGateway> = exchange;
    let risk = Arc::new(RiskManager::new(
        RiskConfig::default(),
        OrderLimits::default(),
        store.clone(),
    ));
    let adaptive = Arc::new(AdaptiveController::new(AdaptiveConfig::default(), store.clone()));
    PositionEngine::new(
        config,
        store,
        OrderManager::new(gateway),
        risk,
        adaptive,
        Arc::new(NoopNotifier::new()),
    )
}

async fn harness_with(config: EngineConfig, supports_oco: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let storage = SqliteStorage::new(SqliteStorageConfig {
        path: dir.path().join("engine.db").to_str().unwrap().to_string(),
        max_connections: 1,
    })
    .await
    .unwrap();
    let store: Arc<dyn PositionStore> = Arc::new(storage);

    let exchange = Arc::new(PaperExchange::new(
        Fees::new(dec!(0.001), dec!(0.001)),
        supports_oco,
    ));
    exchange.set_balance("USDT", dec!(1000000)).await;
    exchange.set_price("BTC/USDT", dec!(100000)).await;
    exchange.set_price("ETH/USDT", dec!(3000)).await;

    let engine = Arc::new(build_engine(config, store.clone(), exchange.clone()));
    Harness {
        engine,
        exchange,
        store,
        _dir: dir,
    }
}

async fn harness() -> Harness {
    harness_with(test_config(), true).await
}

fn long_order(symbol: &str, entry: Decimal, quantity: Decimal) -> (TradeSignal, SizedOrder) {
    let stop_loss = entry * dec!(0.97);
    let take_profit = entry * dec!(1.06);
    let signal = TradeSignal {
        symbol: symbol.to_string(),
        side: Side::Long,
        confidence: 0.75,
        strategy_tag: "trend".to_string(),
        rationale: "test".to_string(),
    };
    let order = SizedOrder {
        symbol: symbol.to_string(),
        side: Side::Long,
        entry_price: entry,
        quantity,
        stop_loss,
        take_profit,
        reward_risk: dec!(2),
        risk_fraction: dec!(0.02),
        risk_amount: (entry - stop_loss) * quantity,
        expected_fees: dec!(0),
        expected_net_profit: (take_profit - entry) * quantity,
    };
    (signal, order)
}

async fn open_btc(h: &Harness) -> Position {
    let (signal, order) = long_order("BTC/USDT", dec!(100000), dec!(0.1));
    match h.engine.create_position(&signal, &order).await.unwrap() {
        CreateOutcome::Opened(position) => position,
        CreateOutcome::Rejected(r) => panic!("unexpected rejection: {}", r),
    }
}

/// A BTC long recorded as pending, as if the engine stopped mid-entry.
async fn save_pending_btc(h: &Harness) -> Position {
    let position = Position::pending(
        "BTC/USDT",
        Side::Long,
        dec!(100000),
        dec!(0.1),
        dec!(97000),
        dec!(106000),
        0.75,
        "trend",
    );
    h.store.save_position(&position, &[]).await.unwrap();
    position
}

#[tokio::test]
async fn test_create_position_opens_and_protects() {
    let h = harness().await;
    let position = open_btc(&h).await;

    assert_eq!(position.status, PositionStatus::Open);
    assert_eq!(position.entry_price, dec!(100000));
    assert_eq!(position.stop_loss, dec!(97000));
    assert!(matches!(position.protection, Protection::Oco { .. }));

    let stored = h.position(&position.id).await;
    assert_eq!(stored.status, PositionStatus::Open);
    assert_eq!(stored.protection, position.protection);
    assert_eq!(h.exchange.open_order_count().await, 1);
    assert_eq!(h.engine.monitored_count().await, 1);
    assert_eq!(h.engine.stats().await.positions_opened, 1);

    let orders = h.store.orders_for_position(&position.id).await.unwrap();
    assert_eq!(orders.len(), 2);
}

#[tokio::test]
async fn test_separate_orders_without_oco() {
    let h = harness_with(test_config(), false).await;
    let position = open_btc(&h).await;

    assert!(matches!(position.protection, Protection::Separate { .. }));
    assert_eq!(h.exchange.open_order_count().await, 2);
}

#[tokio::test]
async fn test_trailing_stop_arms_and_exits_with_locked_profit() {
    let h = harness().await;
    let position = open_btc(&h).await;

    h.exchange.set_price("BTC/USDT", dec!(102000)).await;
    assert_eq!(h.engine.tick(&position.id).await.unwrap(), MonitorStep::Continue);

    let trailed = h.position(&position.id).await;
    assert!(trailed.trailing_active);
    assert_eq!(trailed.stop_loss, dec!(100980));
    assert_eq!(trailed.initial_stop_loss, dec!(97000));
    assert_eq!(h.exchange.open_order_count().await, 1);
    assert_eq!(h.engine.stats().await.trailing_updates, 1);

    h.exchange.set_price("BTC/USDT", dec!(100900)).await;
    assert_eq!(h.engine.tick(&position.id).await.unwrap(), MonitorStep::Done);

    let closed = h.position(&position.id).await;
    assert_eq!(closed.status, PositionStatus::Closed);
    assert_eq!(closed.exit_reason, Some(ExitReason::TrailingStop));
    assert_eq!(closed.exit_price, Some(dec!(100980)));
    assert_eq!(closed.realized_pnl, Some(dec!(98)));

    let trades = h.store.recent_trades(10).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].outcome, TradeOutcome::Win);
    assert_eq!(h.engine.monitored_count().await, 0);
}

#[tokio::test]
async fn test_trailing_stop_only_moves_forward() {
    let h = harness().await;
    let position = open_btc(&h).await;

    let mut last_stop = position.stop_loss;
    for price in [
        dec!(101000),
        dec!(102500),
        dec!(101800),
        dec!(103000),
        dec!(102200),
        dec!(104100),
        dec!(103500),
    ] {
        h.exchange.set_price("BTC/USDT", price).await;
        h.engine.tick(&position.id).await.unwrap();

        let current = h.position(&position.id).await;
        assert_eq!(current.status, PositionStatus::Open);
        assert!(current.stop_loss >= last_stop, "stop moved back at {}", price);
        if current.trailing_active {
            assert!(current.stop_loss >= dec!(100800));
        }
        last_stop = current.stop_loss;
    }
    assert_eq!(last_stop, dec!(103059));
}

#[tokio::test]
async fn test_take_profit_exit() {
    let h = harness().await;
    let position = open_btc(&h).await;

    h.exchange.set_price("BTC/USDT", dec!(100500)).await;
    h.engine.tick(&position.id).await.unwrap();
    // Gap through the take-profit without a trailing update in between.
    h.exchange.set_price("BTC/USDT", dec!(106500)).await;
    assert_eq!(h.engine.tick(&position.id).await.unwrap(), MonitorStep::Done);

    let closed = h.position(&position.id).await;
    assert_eq!(closed.exit_reason, Some(ExitReason::TakeProfit));
    assert_eq!(closed.exit_price, Some(dec!(106000)));

    let stats = h.engine.stats().await;
    assert_eq!(stats.wins, 1);
    assert_eq!(stats.take_profit_exits, 1);
}

#[tokio::test]
async fn test_stop_loss_exit() {
    let h = harness().await;
    let position = open_btc(&h).await;

    h.exchange.set_price("BTC/USDT", dec!(96500)).await;
    h.engine.tick(&position.id).await.unwrap();

    let closed = h.position(&position.id).await;
    assert_eq!(closed.exit_reason, Some(ExitReason::StopLoss));
    assert_eq!(closed.realized_pnl, Some(dec!(-300)));
    assert_eq!(h.engine.stats().await.losses, 1);
}

#[tokio::test]
async fn test_concurrent_creates_respect_capacity() {
    let h = harness().await;
    let symbols = ["AAA/USDT", "BBB/USDT", "CCC/USDT", "DDD/USDT", "EEE/USDT", "FFF/USDT"];
    for symbol in symbols {
        h.exchange.set_price(symbol, dec!(100)).await;
    }
    let orders: Vec<_> = symbols
        .iter()
        .map(|s| long_order(s, dec!(100), dec!(1)))
        .collect();

    let outcomes = join_all(
        orders
            .iter()
            .map(|(signal, order)| h.engine.create_position(signal, order)),
    )
    .await;

    let opened = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(CreateOutcome::Opened(_))))
        .count();
    let rejected = outcomes
        .iter()
        .filter(|o| {
            matches!(
                o,
                Ok(CreateOutcome::Rejected(Rejection::CapacityExceeded { max: 3, .. }))
            )
        })
        .count();
    assert_eq!(opened, 3);
    assert_eq!(rejected, 3);
    assert_eq!(h.engine.active_positions().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_symbol_already_open() {
    let h = harness().await;
    open_btc(&h).await;

    let (signal, order) = long_order("BTC/USDT", dec!(100000), dec!(0.05));
    let outcome = h.engine.create_position(&signal, &order).await.unwrap();
    assert!(matches!(
        outcome,
        CreateOutcome::Rejected(Rejection::SymbolAlreadyOpen { .. })
    ));
}

#[tokio::test]
async fn test_correlated_symbol_blocked() {
    let h = harness().await;
    h.engine.set_correlation("BTC/USDT", "ETH/USDT", 0.85).await;
    open_btc(&h).await;

    let admission = h.engine.can_open_position("ETH/USDT").await.unwrap();
    let Admission::Rejected(rejection) = admission else {
        panic!("expected rejection");
    };
    assert_eq!(rejection.code(), "CORRELATION_BLOCKED");

    h.exchange.set_price("SOL/USDT", dec!(150)).await;
    assert_eq!(
        h.engine.can_open_position("SOL/USDT").await.unwrap(),
        Admission::Allowed
    );
}

#[tokio::test]
async fn test_failed_entry_closes_pending_position() {
    let h = harness().await;
    h.exchange.fail_next_placements(1).await;

    let (signal, order) = long_order("BTC/USDT", dec!(100000), dec!(0.1));
    assert!(h.engine.create_position(&signal, &order).await.is_err());

    assert!(h.engine.active_positions().await.unwrap().is_empty());
    assert!(h.store.recent_trades(10).await.unwrap().is_empty());
    assert_eq!(h.engine.stats().await.entries_aborted, 1);
    assert_eq!(h.engine.monitored_count().await, 0);
}

#[tokio::test]
async fn test_unprotectable_position_is_flattened() {
    let h = harness().await;
    // Entry passes, both protection attempts fail, the market close passes.
    h.exchange.fail_placements_after(1, 2).await;

    let (signal, order) = long_order("BTC/USDT", dec!(100000), dec!(0.1));
    assert!(h.engine.create_position(&signal, &order).await.is_err());

    let trades = h.store.recent_trades(10).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].exit_reason, ExitReason::Error);
    assert!(!trades[0].counts_for_statistics());
    assert_eq!(h.exchange.get_balance("BTC").await.unwrap(), dec!(0));
    assert_eq!(h.engine.stats().await.defensive_closes, 1);
}

#[tokio::test]
async fn test_failed_replacement_is_retried_immediately() {
    let h = harness().await;
    let position = open_btc(&h).await;

    h.exchange.fail_next_placements(1).await;
    h.exchange.set_price("BTC/USDT", dec!(102000)).await;
    assert_eq!(h.engine.tick(&position.id).await.unwrap(), MonitorStep::Continue);

    let current = h.position(&position.id).await;
    assert_eq!(current.status, PositionStatus::Open);
    assert_eq!(current.stop_loss, dec!(100980));
    assert!(!current.protection.is_none());
    assert_eq!(h.exchange.open_order_count().await, 1);
}

#[tokio::test]
async fn test_partial_cancel_during_trailing_keeps_position_protected() {
    let h = harness_with(test_config(), false).await;
    let position = open_btc(&h).await;

    // The take-profit cancel passes, the stop cancel fails on both attempts.
    h.exchange.fail_cancels_after(1, 2).await;
    h.exchange.set_price("BTC/USDT", dec!(102000)).await;
    assert_eq!(h.engine.tick(&position.id).await.unwrap(), MonitorStep::Continue);

    let current = h.position(&position.id).await;
    assert_eq!(current.status, PositionStatus::Open);
    assert_eq!(current.stop_loss, dec!(100980));
    assert!(current.trailing_active);
    assert!(matches!(current.protection, Protection::Separate { .. }));
    assert_ne!(current.protection, position.protection);
    assert_eq!(h.exchange.open_order_count().await, 2);
    assert_eq!(h.engine.stats().await.defensive_closes, 0);
}

#[tokio::test]
async fn test_missing_protection_is_replaced() {
    let h = harness().await;
    let position = open_btc(&h).await;

    for id in position.protection.order_ids() {
        h.exchange.cancel_order("BTC/USDT", id).await.unwrap();
    }
    assert_eq!(h.exchange.open_order_count().await, 0);

    assert_eq!(h.engine.tick(&position.id).await.unwrap(), MonitorStep::Continue);
    assert_eq!(h.exchange.open_order_count().await, 1);
    let current = h.position(&position.id).await;
    assert_ne!(current.protection, position.protection);
}

#[tokio::test]
async fn test_manual_close_records_result_once() {
    let h = harness().await;
    let position = open_btc(&h).await;
    h.exchange.set_price("BTC/USDT", dec!(101000)).await;

    let result = h
        .engine
        .close_position(&position.id, ExitReason::Manual)
        .await
        .unwrap()
        .expect("first close returns a result");
    assert_eq!(result.exit_reason, ExitReason::Manual);
    assert_eq!(result.exit_price, dec!(101000));
    assert_eq!(h.exchange.open_order_count().await, 0);

    let again = h
        .engine
        .close_position(&position.id, ExitReason::Manual)
        .await
        .unwrap();
    assert!(again.is_none());
    assert_eq!(h.store.recent_trades(10).await.unwrap().len(), 1);
    assert_eq!(h.engine.monitored_count().await, 0);
}

#[tokio::test]
async fn test_stuck_close_is_retried_by_monitor() {
    let h = harness().await;
    let position = open_btc(&h).await;

    // Protection cancel succeeds, the market close fails.
    h.exchange.fail_next_placements(1).await;
    assert!(
        h.engine
            .close_position(&position.id, ExitReason::Manual)
            .await
            .is_err()
    );
    let stuck = h.position(&position.id).await;
    assert_eq!(stuck.status, PositionStatus::Closing);
    assert!(!stuck.protection.is_none());
    assert_ne!(stuck.protection, position.protection);
    assert_eq!(h.exchange.open_order_count().await, 1);

    assert_eq!(h.engine.tick(&position.id).await.unwrap(), MonitorStep::Done);
    let closed = h.position(&position.id).await;
    assert_eq!(closed.status, PositionStatus::Closed);
    assert_eq!(closed.exit_reason, Some(ExitReason::Manual));
    assert_eq!(h.exchange.open_order_count().await, 0);
    assert_eq!(h.exchange.get_balance("BTC").await.unwrap(), dec!(0));
}

#[tokio::test]
async fn test_recovery_closes_position_without_exposure() {
    let h = harness().await;
    let position = open_btc(&h).await;
    h.engine.shutdown().await;

    // The holding vanished while the engine was down.
    h.exchange.set_balance("BTC", dec!(0)).await;

    let engine = h.restarted(test_config());
    let report = engine.recover().await.unwrap();
    assert_eq!(report.closed_as_error, 1);
    assert_eq!(report.monitored(), 0);

    let closed = h.position(&position.id).await;
    assert_eq!(closed.status, PositionStatus::Closed);
    assert_eq!(closed.exit_reason, Some(ExitReason::Error));
    assert_eq!(closed.realized_pnl, Some(dec!(0)));
    assert_eq!(engine.monitored_count().await, 0);
    assert_eq!(h.exchange.open_order_count().await, 0);

    let again = engine.recover().await.unwrap();
    assert_eq!(again, RecoveryReport::default());
    assert_eq!(h.store.recent_trades(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_recovery_resumes_healthy_position_idempotently() {
    let h = harness().await;
    let position = open_btc(&h).await;
    h.engine.shutdown().await;

    let engine = h.restarted(test_config());
    let first = engine.recover().await.unwrap();
    assert_eq!(first.resumed, 1);
    let after_first = h.position(&position.id).await;

    let second = engine.recover().await.unwrap();
    assert_eq!(second, first);
    let after_second = h.position(&position.id).await;

    assert_eq!(after_first.status, PositionStatus::Open);
    assert_eq!(after_second.protection, after_first.protection);
    assert_eq!(after_second.stop_loss, after_first.stop_loss);
    assert_eq!(engine.monitored_count().await, 1);
    assert_eq!(h.exchange.open_order_count().await, 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_recovery_settles_fill_while_offline() {
    let h = harness().await;
    let position = open_btc(&h).await;
    h.engine.shutdown().await;

    h.exchange.set_price("BTC/USDT", dec!(96000)).await;

    let engine = h.restarted(test_config());
    let report = engine.recover().await.unwrap();
    assert_eq!(report.settled, 1);

    let closed = h.position(&position.id).await;
    assert_eq!(closed.exit_reason, Some(ExitReason::StopLoss));
    assert_eq!(closed.exit_price, Some(dec!(97000)));
}

#[tokio::test]
async fn test_recovery_reprotects_position() {
    let h = harness().await;
    let position = open_btc(&h).await;
    h.engine.shutdown().await;

    for id in position.protection.order_ids() {
        h.exchange.cancel_order("BTC/USDT", id).await.unwrap();
    }

    let engine = h.restarted(test_config());
    let report = engine.recover().await.unwrap();
    assert_eq!(report.reprotected, 1);
    assert_eq!(h.exchange.open_order_count().await, 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_recovery_adopts_filled_pending_entry() {
    let h = harness().await;
    let pending = save_pending_btc(&h).await;

    // The entry filled but the engine stopped before recording it.
    h.exchange.set_price("BTC/USDT", dec!(100500)).await;
    h.exchange
        .place_order(OrderRequest::market("BTC/USDT", OrderSide::Buy, dec!(0.1)))
        .await
        .unwrap();

    let engine = h.restarted(test_config());
    let report = engine.recover().await.unwrap();
    assert_eq!(report.entries_adopted, 1);
    assert_eq!(report.entries_aborted, 0);
    assert_eq!(report.monitored(), 1);

    let adopted = h.position(&pending.id).await;
    assert_eq!(adopted.status, PositionStatus::Open);
    assert_eq!(adopted.quantity, dec!(0.1));
    assert_eq!(adopted.entry_price, dec!(100500));
    assert_eq!(adopted.stop_loss, dec!(97500));
    assert_eq!(adopted.take_profit, dec!(106500));
    assert!(!adopted.protection.is_none());
    assert_eq!(h.exchange.open_order_count().await, 1);
    assert_eq!(engine.monitored_count().await, 1);

    let again = engine.recover().await.unwrap();
    assert_eq!(again.resumed, 1);
    assert_eq!(again.entries_adopted, 0);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_recovery_aborts_pending_entry_without_fill() {
    let h = harness().await;
    let pending = save_pending_btc(&h).await;

    let engine = h.restarted(test_config());
    let report = engine.recover().await.unwrap();
    assert_eq!(report.entries_aborted, 1);
    assert_eq!(report.monitored(), 0);

    let aborted = h.position(&pending.id).await;
    assert_eq!(aborted.status, PositionStatus::Closed);
    assert_eq!(aborted.exit_reason, Some(ExitReason::Error));
    assert_eq!(h.exchange.open_order_count().await, 0);
}

#[tokio::test]
async fn test_pending_entry_ignores_holdings_of_other_positions() {
    let h = harness().await;
    let open = open_btc(&h).await;
    h.engine.shutdown().await;
    let pending = save_pending_btc(&h).await;

    let engine = h.restarted(test_config());
    let report = engine.recover().await.unwrap();
    assert_eq!(report.resumed, 1);
    assert_eq!(report.entries_aborted, 1);
    assert_eq!(report.entries_adopted, 0);

    assert_eq!(h.position(&open.id).await.status, PositionStatus::Open);
    assert_eq!(h.position(&pending.id).await.status, PositionStatus::Closed);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_pending_entry_waits_for_reachable_exchange() {
    let h = harness().await;
    let pending = save_pending_btc(&h).await;
    h.exchange.set_unreachable(true).await;

    let engine = h.restarted(test_config());
    let report = engine.recover().await.unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(report.entries_aborted, 0);
    assert_eq!(h.position(&pending.id).await.status, PositionStatus::Pending);

    h.exchange.set_unreachable(false).await;
    assert_eq!(engine.tick(&pending.id).await.unwrap(), MonitorStep::Done);
    let aborted = h.position(&pending.id).await;
    assert_eq!(aborted.status, PositionStatus::Closed);
    assert_eq!(engine.stats().await.entries_aborted, 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_monitors_and_new_positions() {
    let h = harness().await;
    open_btc(&h).await;
    assert_eq!(h.engine.monitored_count().await, 1);

    h.engine.shutdown().await;
    assert_eq!(h.engine.monitored_count().await, 0);

    let (signal, order) = long_order("ETH/USDT", dec!(3000), dec!(1));
    assert!(matches!(
        h.engine.create_position(&signal, &order).await,
        Err(EngineError::ShuttingDown)
    ));
}

#[tokio::test]
async fn test_monitor_loop_closes_position() {
    let mut config = test_config();
    config.monitor.poll_interval = Duration::from_millis(20);
    let h = harness_with(config, true).await;
    let position = open_btc(&h).await;

    h.exchange.set_price("BTC/USDT", dec!(107000)).await;
    for _ in 0..50 {
        if h.position(&position.id).await.status == PositionStatus::Closed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(h.position(&position.id).await.status, PositionStatus::Closed);
    assert_eq!(h.engine.monitored_count().await, 0);
}

struct FixedSupervisor(SupervisorAction);

#[async_trait]
impl PositionSupervisor for FixedSupervisor {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn review(
        &self,
        _position: &Position,
        _price: Decimal,
    ) -> Result<SupervisorAction, DecisionError> {
        Ok(self.0)
    }
}

async fn supervised(action: SupervisorAction) -> (Harness, Arc<PositionEngine>) {
    let mut config = test_config();
    config.monitor.supervisor_interval = Duration::from_millis(1);
    let h = harness_with(config.clone(), true).await;
    let engine = Arc::new(
        build_engine(config, h.store.clone(), h.exchange.clone())
            .with_supervisor(Arc::new(FixedSupervisor(action))),
    );
    (h, engine)
}

async fn open_and_review(engine: &Arc<PositionEngine>) -> Position {
    let (signal, order) = long_order("BTC/USDT", dec!(100000), dec!(0.1));
    let CreateOutcome::Opened(position) = engine.create_position(&signal, &order).await.unwrap() else {
        panic!("expected open");
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    engine.tick(&position.id).await.unwrap();
    position
}

#[tokio::test]
async fn test_supervisor_tightens_stop() {
    let (h, engine) = supervised(SupervisorAction::TightenStopLoss(dec!(99000))).await;
    let position = open_and_review(&engine).await;

    let current = h.position(&position.id).await;
    assert_eq!(current.stop_loss, dec!(99000));
    assert!(!current.trailing_active);
    assert_eq!(engine.stats().await.supervisor_adjustments, 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_supervisor_cannot_widen_stop() {
    let (h, engine) = supervised(SupervisorAction::TightenStopLoss(dec!(96000))).await;
    let position = open_and_review(&engine).await;

    assert_eq!(h.position(&position.id).await.stop_loss, dec!(97000));
    assert_eq!(engine.stats().await.supervisor_adjustments, 0);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_supervisor_extends_take_profit() {
    let (h, engine) = supervised(SupervisorAction::ExtendTakeProfit(dec!(110000))).await;
    let position = open_and_review(&engine).await;

    let current = h.position(&position.id).await;
    assert_eq!(current.take_profit, dec!(110000));
    assert_eq!(current.stop_loss, dec!(97000));
    engine.shutdown().await;
}

#[tokio::test]
async fn test_exposure_summary() {
    let h = harness().await;
    open_btc(&h).await;

    let exposure = h.engine.exposure(dec!(100000)).await.unwrap();
    assert_eq!(exposure.open_positions, 1);
    assert_eq!(exposure.total_notional, dec!(10000));
    assert_eq!(exposure.exposure_pct, dec!(10));
}
