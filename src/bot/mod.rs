//! Trading bot: the application context.
//!
//! Owns every service, runs startup recovery and then the analysis loop that
//! turns market snapshots into positions.

mod config;
mod error;
mod stats;

pub use config::BotConfig;
pub use error::BotError;
pub use stats::Stats;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::decision::{DecisionSource, create_source};
use crate::domain::{Decision, MarketSnapshot, Position, Rejection, TradeSignal, quote_asset};
use crate::engine::{Admission, CreateOutcome, EngineConfig, PositionEngine};
use crate::exchanges::{ExchangeGateway, PaperExchange, ResilientGateway, create_gateway};
use crate::feed::{FileFeed, MarketFeed};
use crate::gating::{AdaptiveController, TimeframeGate};
use crate::notification::{
    Event, Notifier, OverviewData, ShutdownData, StartupData, create_notifier,
};
use crate::orders::OrderManager;
use crate::risk::{OrderLimits, RiskDecision, RiskManager, RiskRequest};
use crate::storage::{PositionStore, SqliteStorage, SqliteStorageConfig};

const MIN_LOOP_INTERVAL: Duration = Duration::from_millis(100);

/// External collaborators of the bot.
pub struct Services {
    pub store: Arc<dyn PositionStore>,
    pub gateway: Arc<dyn ExchangeGateway>,
    /// Simulated exchange that follows snapshot prices in dry-run mode.
    pub paper: Option<Arc<PaperExchange>>,
    pub feed: Arc<dyn MarketFeed>,
    pub decision: Arc<dyn DecisionSource>,
    pub notifier: Arc<dyn Notifier>,
}

impl Services {
    /// Builds the services described by the configuration. An unavailable
    /// store is fatal: the bot must not run with unknown position state.
    pub async fn from_config(config: &Config) -> Result<Self, BotError> {
        let storage = SqliteStorage::new(SqliteStorageConfig {
            path: config.storage.path.clone(),
            max_connections: config.storage.max_connections,
        })
        .await?;

        let (raw, paper): (Arc<dyn ExchangeGateway>, _) = if config.app.dry_run {
            let paper = Arc::new(PaperExchange::from_config(&config.exchange));
            (paper.clone(), Some(paper))
        } else {
            (create_gateway(&config.exchange)?, None)
        };
        let gateway = Arc::new(ResilientGateway::new(raw, &config.exchange));

        Ok(Self {
            store: Arc::new(storage),
            gateway,
            paper,
            feed: Arc::new(FileFeed::from_config(&config.feed)),
            decision: create_source(&config.decision, &config.timeframes)?,
            notifier: create_notifier(config.notification.as_ref()),
        })
    }
}

/// What one symbol evaluation produced.
#[derive(Debug)]
pub enum SymbolOutcome {
    Skipped,
    Rejected(Rejection),
    Opened(Position),
}

struct Evaluation {
    atr_pct: Decimal,
    outcome: SymbolOutcome,
}

/// Trading bot that coordinates all components.
pub struct Bot {
    cfg: Config,
    version: String,
    dry_run: bool,

    store: Arc<dyn PositionStore>,
    gateway: Arc<dyn ExchangeGateway>,
    paper: Option<Arc<PaperExchange>>,
    feed: Arc<dyn MarketFeed>,
    decision: Arc<dyn DecisionSource>,
    notifier: Arc<dyn Notifier>,
    gate: TimeframeGate,
    risk: Arc<RiskManager>,
    adaptive: Arc<AdaptiveController>,
    engine: Arc<PositionEngine>,

    // Runtime state
    started_at: Mutex<Option<Instant>>,
    running: Mutex<bool>,
    stats: Mutex<Stats>,
    shutdown: CancellationToken,
}

impl Bot {
    /// Wires the bot from its services. Every shared component is built
    /// exactly once here.
    pub fn new(cfg: BotConfig, services: Services) -> Self {
        let dry_run = cfg.dry_run();
        let config = cfg.app_config;

        let risk = Arc::new(RiskManager::new(
            config.risk.clone(),
            OrderLimits::from_config(&config.exchange),
            services.store.clone(),
        ));
        let adaptive = Arc::new(AdaptiveController::new(
            config.adaptive.clone(),
            services.store.clone(),
        ));
        let engine = Arc::new(PositionEngine::new(
            EngineConfig::from(&config),
            services.store.clone(),
            OrderManager::new(services.gateway.clone()),
            risk.clone(),
            adaptive.clone(),
            services.notifier.clone(),
        ));

        Bot {
            gate: TimeframeGate::new(config.timeframes.clone()),
            cfg: config,
            version: cfg.version,
            dry_run,
            store: services.store,
            gateway: services.gateway,
            paper: services.paper,
            feed: services.feed,
            decision: services.decision,
            notifier: services.notifier,
            risk,
            adaptive,
            engine,
            started_at: Mutex::new(None),
            running: Mutex::new(false),
            stats: Mutex::new(Stats::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Builds the services from the configuration and wires the bot.
    pub async fn from_config(cfg: BotConfig) -> Result<Self, BotError> {
        let services = Services::from_config(&cfg.app_config).await?;
        Ok(Self::new(cfg, services))
    }

    pub fn engine(&self) -> &Arc<PositionEngine> {
        &self.engine
    }

    /// Restores persisted state, recovers open positions and runs the
    /// analysis loop until a stop is requested.
    pub async fn start(&self) -> Result<(), BotError> {
        {
            let mut running = self.running.lock().await;
            if *running {
                return Err(BotError::AlreadyRunning);
            }
            *running = true;
        }
        *self.started_at.lock().await = Some(Instant::now());

        info!(
            version = %self.version,
            dry_run = self.dry_run,
            exchange = %self.gateway.name(),
            symbols = ?self.cfg.symbols,
            "Starting trading bot"
        );

        self.risk.load().await?;
        self.adaptive.load().await?;
        let report = self.engine.recover().await?;

        self.send_notification(Event::startup(StartupData {
            version: self.version.clone(),
            exchange: self.gateway.name().to_string(),
            symbols: self.cfg.symbols.clone(),
            dry_run: self.dry_run,
            recovered_positions: report.monitored(),
        }))
        .await;

        self.run_main_loop().await;
        Ok(())
    }

    /// Asks the analysis loop to exit after the current cycle.
    pub fn request_stop(&self) {
        self.shutdown.cancel();
    }

    /// Gracefully stops the bot. Monitors finish their current poll; open
    /// positions keep their protective orders on the exchange.
    pub async fn stop(&self) -> Result<(), BotError> {
        self.request_stop();
        {
            let mut running = self.running.lock().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }

        info!("Stopping bot...");
        self.engine.shutdown().await;

        let uptime = self.uptime().await;
        self.send_notification(Event::shutdown(ShutdownData {
            reason: "graceful shutdown".to_string(),
            uptime,
            graceful: true,
        }))
        .await;

        if let Err(e) = self.notifier.close().await {
            debug!(error = %e, "Failed to close notifier");
        }
        self.store.close().await?;

        info!(uptime = ?uptime, "Bot stopped");
        Ok(())
    }

    /// Returns a copy of the current statistics.
    pub async fn stats(&self) -> Stats {
        self.stats.lock().await.clone()
    }

    /// Returns true if the bot is currently running.
    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Returns how long the bot has been running.
    pub async fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .await
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    async fn run_main_loop(&self) {
        let analysis = &self.cfg.analysis;
        let cycle_period = analysis.interval.max(MIN_LOOP_INTERVAL);
        let overview_period = analysis.overview_interval.max(MIN_LOOP_INTERVAL);

        let mut cycle_timer = tokio::time::interval(cycle_period);
        cycle_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut overview_timer = tokio::time::interval_at(
            tokio::time::Instant::now() + overview_period,
            overview_period,
        );

        info!(
            interval = ?cycle_period,
            overview_interval = ?overview_period,
            workers = analysis.workers,
            "Starting analysis loop"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = cycle_timer.tick() => self.run_cycle().await,
                _ = overview_timer.tick() => self.send_overview().await,
            }
        }
    }

    /// Evaluates every configured symbol through the bounded worker pool.
    pub async fn run_cycle(&self) {
        let cycle = {
            let mut stats = self.stats.lock().await;
            stats.analysis_cycles += 1;
            stats.analysis_cycles
        };

        let workers = self.cfg.analysis.workers.max(1);
        // Futures own their symbol so the cycle stays `Send` under `tokio::spawn`.
        let evaluations: Vec<_> = self
            .cfg
            .symbols
            .iter()
            .cloned()
            .map(|symbol| self.evaluate_owned(symbol))
            .collect();
        let results: Vec<(String, Result<Evaluation, BotError>)> = stream::iter(evaluations)
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut atrs = Vec::with_capacity(results.len());
        let (mut opened, mut rejected) = (0u64, 0u64);
        {
            let mut stats = self.stats.lock().await;
            for (symbol, result) in results {
                match result {
                    Ok(evaluation) => {
                        atrs.push(evaluation.atr_pct);
                        match evaluation.outcome {
                            SymbolOutcome::Skipped => stats.skipped += 1,
                            SymbolOutcome::Rejected(rejection) => {
                                stats.signals += 1;
                                stats.record_rejection(&rejection);
                                rejected += 1;
                            }
                            SymbolOutcome::Opened(_) => {
                                stats.signals += 1;
                                stats.positions_opened += 1;
                                opened += 1;
                            }
                        }
                    }
                    Err(e) if e.is_skip() => {
                        stats.skipped += 1;
                        debug!(symbol = %symbol, error = %e, "Symbol skipped this cycle");
                    }
                    Err(e) => {
                        stats.errors += 1;
                        warn!(symbol = %symbol, error = %e, "Symbol evaluation failed");
                    }
                }
            }
        }

        if !atrs.is_empty() {
            let mean = atrs.iter().sum::<Decimal>() / Decimal::from(atrs.len());
            if let Err(e) = self.adaptive.observe_volatility(mean, Utc::now()).await {
                warn!(error = %e, "Failed to update volatility regime");
            }
        }

        info!(cycle, opened, rejected, "Analysis cycle complete");
    }

    async fn evaluate_owned(&self, symbol: String) -> (String, Result<Evaluation, BotError>) {
        let result = self.evaluate_symbol(&symbol).await;
        (symbol, result)
    }

    /// Runs the pipeline for one symbol. Only the analysis phase is bounded
    /// by the symbol timeout; an order in flight is never abandoned.
    async fn evaluate_symbol(&self, symbol: &str) -> Result<Evaluation, BotError> {
        let (snapshot, decision) =
            tokio::time::timeout(self.cfg.analysis.symbol_timeout, self.analyze(symbol))
                .await
                .map_err(|_| BotError::Timeout(symbol.to_string()))??;

        let atr_pct = snapshot.atr_pct;
        let outcome = self.act(symbol, &snapshot, decision).await?;
        Ok(Evaluation { atr_pct, outcome })
    }

    async fn analyze(&self, symbol: &str) -> Result<(MarketSnapshot, Decision), BotError> {
        let snapshot = self.feed.snapshot(symbol).await?;
        if let Some(paper) = &self.paper {
            paper.set_price(symbol, snapshot.price).await;
        }
        let decision = self.decision.decide(&snapshot).await?;
        Ok((snapshot, decision))
    }

    async fn act(
        &self,
        symbol: &str,
        snapshot: &MarketSnapshot,
        decision: Decision,
    ) -> Result<SymbolOutcome, BotError> {
        let Some(side) = decision.side.as_side() else {
            debug!(symbol, rationale = %decision.rationale, "Decision: skip");
            return Ok(SymbolOutcome::Skipped);
        };

        let thresholds = self.adaptive.thresholds().await;
        if decision.confidence < thresholds.min_confidence {
            return Ok(reject(
                symbol,
                Rejection::LowConfidence {
                    confidence: decision.confidence,
                    minimum: thresholds.min_confidence,
                },
            ));
        }

        let confidence = match self.gate.check(snapshot, side, decision.confidence) {
            Ok(confidence) => confidence,
            Err(rejection) => return Ok(reject(symbol, rejection)),
        };

        if let Admission::Rejected(rejection) = self.engine.can_open_position(symbol).await? {
            return Ok(reject(symbol, rejection));
        }

        let capital = self.gateway.get_balance(quote_asset(symbol)).await?;
        let entry_price = self.gateway.get_current_price(symbol).await?;
        let request = RiskRequest {
            symbol: symbol.to_string(),
            side,
            entry_price,
            capital,
            confidence,
            atr_pct: snapshot.atr_pct,
            fees: self.gateway.get_fees(symbol),
            max_risk: Some(thresholds.max_risk),
            advisory: decision.advisory,
        };
        let order = match self.risk.evaluate(&request).await? {
            RiskDecision::Approved(order) => order,
            RiskDecision::Rejected(rejection) => return Ok(reject(symbol, rejection)),
        };

        let signal = TradeSignal {
            symbol: symbol.to_string(),
            side,
            confidence,
            strategy_tag: decision.strategy_tag,
            rationale: decision.rationale,
        };
        match self.engine.create_position(&signal, &order).await? {
            CreateOutcome::Opened(position) => Ok(SymbolOutcome::Opened(position)),
            CreateOutcome::Rejected(rejection) => Ok(reject(symbol, rejection)),
        }
    }

    /// Sends a notification event and logs delivery failures.
    async fn send_notification(&self, event: Event) {
        if let Err(e) = self.notifier.send(&event).await {
            debug!(
                event_type = %event.event_type,
                error = %e,
                "Failed to send notification"
            );
        }
    }

    /// Sends a periodic overview notification with current stats.
    async fn send_overview(&self) {
        let stats = self.stats().await;
        let engine = self.engine.stats().await;

        let capital = match self.cfg.symbols.first() {
            Some(symbol) => self
                .gateway
                .get_balance(quote_asset(symbol))
                .await
                .unwrap_or_default(),
            None => Decimal::ZERO,
        };
        let exposure = match self.engine.exposure(capital).await {
            Ok(exposure) => exposure,
            Err(e) => {
                warn!(error = %e, "Failed to compute exposure for overview");
                return;
            }
        };

        self.send_notification(Event::overview(OverviewData {
            uptime: self.uptime().await,
            analysis_cycles: stats.analysis_cycles,
            signals: stats.signals,
            rejections: stats.total_rejections(),
            positions_opened: engine.positions_opened,
            positions_closed: engine.positions_closed,
            wins: engine.wins,
            losses: engine.losses,
            realized_pnl: engine.realized_pnl,
            open_positions: exposure.open_positions,
            exposure_pct: exposure.exposure_pct,
            regime: self.adaptive.thresholds().await.regime.to_string(),
            dry_run: self.dry_run,
        }))
        .await;
    }
}

fn reject(symbol: &str, rejection: Rejection) -> SymbolOutcome {
    info!(
        symbol,
        code = rejection.code(),
        reason = %rejection,
        "Signal rejected"
    );
    SymbolOutcome::Rejected(rejection)
}
