//! RiskManager turns a signal into a sized order or a rejection.

use super::kelly::{self, TradeStats};
use super::kill_switch::KillSwitch;
use super::levels::derive_levels;
use super::{OrderLimits, RiskDecision, RiskError, RiskRequest, SizedOrder};
use crate::config::RiskConfig;
use crate::domain::{Rejection, TradeOutcome, TradeResult};
use crate::storage::PositionStore;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

const STATE_KEY: &str = "risk_manager";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedRisk {
    kill_switch: KillSwitch,
    loss_counter: u32,
}

#[derive(Debug, Default)]
struct RiskState {
    persisted: PersistedRisk,
    history: VecDeque<TradeResult>,
}

pub struct RiskManager {
    config: RiskConfig,
    limits: OrderLimits,
    store: Arc<dyn PositionStore>,
    state: Mutex<RiskState>,
}

impl RiskManager {
    pub fn new(config: RiskConfig, limits: OrderLimits, store: Arc<dyn PositionStore>) -> Self {
        Self {
            config,
            limits,
            store,
            state: Mutex::new(RiskState::default()),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Restores the kill switch, loss counter and trade window from the store.
    pub async fn load(&self) -> Result<(), RiskError> {
        let persisted = match self.store.load_state(STATE_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => PersistedRisk::default(),
        };
        let trades = self
            .store
            .recent_trades(self.config.kelly_history_window)
            .await?;

        let mut state = self.state.lock().await;
        state.history = trades
            .into_iter()
            .filter(|t| t.counts_for_statistics())
            .collect();
        state.persisted = persisted;

        info!(
            trades = state.history.len(),
            loss_counter = state.persisted.loss_counter,
            kill_switch_until = ?state.persisted.kill_switch.tripped_until,
            "Risk state loaded"
        );
        Ok(())
    }

    /// Evaluates a request. The kill switch is checked before anything else.
    pub async fn evaluate(&self, request: &RiskRequest) -> Result<RiskDecision, RiskError> {
        let mut state = self.state.lock().await;

        if request.capital > Decimal::ZERO {
            state.persisted.kill_switch.ensure_reference(request.capital);
        }
        if let Some(until) = state.persisted.kill_switch.active_until(Utc::now()) {
            return Ok(RiskDecision::Rejected(Rejection::KillSwitchActive { until }));
        }

        if request.entry_price <= Decimal::ZERO {
            return Err(RiskError::InvalidInput(format!(
                "no price data for {}",
                request.symbol
            )));
        }
        if request.atr_pct < Decimal::ZERO {
            return Err(RiskError::InvalidInput(format!(
                "negative ATR for {}",
                request.symbol
            )));
        }

        if request.advisory.stop_loss.is_some() || request.advisory.take_profit.is_some() {
            debug!(
                symbol = %request.symbol,
                advisory_sl = ?request.advisory.stop_loss,
                advisory_tp = ?request.advisory.take_profit,
                "Ignoring advisory levels"
            );
        }

        let entry = request.entry_price;
        let levels = derive_levels(&self.config, request.side, entry, request.atr_pct);
        let reward_risk = match levels.reward_risk(entry) {
            Some(rr) if rr >= self.config.min_reward_risk => rr,
            ratio => {
                return Ok(RiskDecision::Rejected(Rejection::RewardRiskTooLow {
                    ratio: ratio.unwrap_or_default(),
                    minimum: self.config.min_reward_risk,
                }));
            }
        };

        let cap = match request.max_risk {
            Some(adaptive) => self.config.max_risk_cap.min(adaptive),
            None => self.config.max_risk_cap,
        };
        let stats = TradeStats::from_trades(state.history.iter());
        let kelly = kelly::risk_fraction(&self.config, &stats, reward_risk, cap);
        let fraction = (kelly * self.dampening_for(state.persisted.loss_counter)).min(cap);

        let capital = request.capital.max(Decimal::ZERO);
        let risk_amount = capital * fraction;
        let per_unit_risk = (entry - levels.stop_loss).abs();
        let max_quantity = capital * self.config.max_notional_pct / Decimal::ONE_HUNDRED / entry;
        let quantity = self
            .limits
            .round_quantity((risk_amount / per_unit_risk).min(max_quantity));
        let notional = quantity * entry;

        if quantity <= Decimal::ZERO
            || quantity < self.limits.min_quantity
            || notional < self.limits.min_notional
        {
            return Ok(RiskDecision::Rejected(Rejection::SizeBelowMinimum {
                quantity,
                notional,
            }));
        }

        let gross = quantity * (levels.take_profit - entry).abs();
        let fees = request
            .fees
            .round_trip(notional, quantity * levels.take_profit);
        let net = gross - fees;
        if net < self.config.min_net_profit || net < self.config.min_fee_multiple * fees {
            return Ok(RiskDecision::Rejected(Rejection::FeeUnprofitable {
                expected_net: net,
                fees,
            }));
        }

        debug!(
            symbol = %request.symbol,
            side = %request.side,
            quantity = %quantity,
            stop_loss = %levels.stop_loss,
            take_profit = %levels.take_profit,
            reward_risk = %reward_risk,
            risk_fraction = %fraction,
            "Risk approved"
        );

        Ok(RiskDecision::Approved(SizedOrder {
            symbol: request.symbol.clone(),
            side: request.side,
            entry_price: entry,
            quantity,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
            reward_risk,
            risk_fraction: fraction,
            risk_amount: quantity * per_unit_risk,
            expected_fees: fees,
            expected_net_profit: net,
        }))
    }

    /// Feeds a closed trade into the kill switch, loss streak and Kelly
    /// window. Returns true if the kill switch tripped.
    pub async fn record_trade(&self, result: &TradeResult) -> Result<bool, RiskError> {
        let mut state = self.state.lock().await;

        if result.counts_for_statistics() {
            state.history.push_back(result.clone());
            while state.history.len() > self.config.kelly_history_window as usize {
                state.history.pop_front();
            }
            match result.outcome {
                TradeOutcome::Loss => state.persisted.loss_counter += 1,
                TradeOutcome::Win => {
                    state.persisted.loss_counter = state.persisted.loss_counter.saturating_sub(1)
                }
                TradeOutcome::Breakeven => {}
            }
        }

        let cooldown = chrono::Duration::from_std(self.config.kill_switch_cooldown)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let tripped = state.persisted.kill_switch.record(
            result.pnl,
            self.config.kill_switch_drawdown_pct,
            cooldown,
            Utc::now(),
        );
        if tripped {
            error!(
                drawdown_pct = %state.persisted.kill_switch.drawdown_pct(),
                until = ?state.persisted.kill_switch.tripped_until,
                "Kill switch tripped, new trades halted"
            );
        }

        let raw = serde_json::to_string(&state.persisted)?;
        drop(state);
        self.store.save_state(STATE_KEY, &raw).await?;
        Ok(tripped)
    }

    /// Halt deadline if the kill switch is active.
    pub async fn kill_switch_until(&self) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .await
            .persisted
            .kill_switch
            .active_until(Utc::now())
    }

    /// Current risk multiplier from the loss streak.
    pub async fn dampening_factor(&self) -> Decimal {
        let counter = self.state.lock().await.persisted.loss_counter;
        self.dampening_for(counter)
    }

    fn dampening_for(&self, loss_counter: u32) -> Decimal {
        let factor = Decimal::ONE - self.config.loss_streak_penalty * Decimal::from(loss_counter);
        factor
            .max(self.config.min_dampening_factor)
            .min(Decimal::ONE)
    }

    /// Clears in-memory state. Used for test isolation.
    pub async fn reset(&self) {
        *self.state.lock().await = RiskState::default();
    }
}
