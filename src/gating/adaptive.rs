//! Adaptive confidence and risk thresholds.
//!
//! Thresholds move by bounded proportional steps after each closed trade and
//! shift with the volatility regime. A regime flip is only adopted after it
//! persisted for the configured dwell time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::GatingError;
use crate::config::AdaptiveConfig;
use crate::domain::{TradeOutcome, TradeResult};
use crate::storage::PositionStore;

const STATE_KEY: &str = "adaptive";

const MIN_CONFIDENCE_FLOOR: f64 = 0.50;
const MIN_CONFIDENCE_CEILING: f64 = 0.90;
const MAX_RISK_FLOOR: Decimal = dec!(0.005);
const MAX_RISK_CEILING: Decimal = dec!(0.03);

/// Outcomes needed before the controller starts adapting.
const MIN_OBSERVATIONS: usize = 5;
/// Weight of a five-trade streak relative to the win-rate error.
const STREAK_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityRegime {
    Low,
    Normal,
    High,
}

impl VolatilityRegime {
    /// (confidence offset, risk offset) applied on top of the learned base.
    fn offsets(self) -> (f64, Decimal) {
        match self {
            VolatilityRegime::Low => (-0.02, dec!(0.002)),
            VolatilityRegime::Normal => (0.0, Decimal::ZERO),
            VolatilityRegime::High => (0.05, dec!(-0.005)),
        }
    }
}

impl fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatilityRegime::Low => write!(f, "low"),
            VolatilityRegime::Normal => write!(f, "normal"),
            VolatilityRegime::High => write!(f, "high"),
        }
    }
}

/// Thresholds read by the gating layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveThresholds {
    pub min_confidence: f64,
    /// Ceiling on the per-trade risk fraction.
    pub max_risk: Decimal,
    pub regime: VolatilityRegime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AdaptiveState {
    base_min_confidence: f64,
    base_max_risk: Decimal,
    regime: VolatilityRegime,
    pending_regime: Option<(VolatilityRegime, DateTime<Utc>)>,
    outcomes: VecDeque<TradeOutcome>,
    /// Positive for consecutive wins, negative for consecutive losses.
    streak: i32,
}

impl AdaptiveState {
    fn initial(config: &AdaptiveConfig) -> Self {
        Self {
            base_min_confidence: config
                .initial_min_confidence
                .clamp(MIN_CONFIDENCE_FLOOR, MIN_CONFIDENCE_CEILING),
            base_max_risk: config
                .initial_max_risk
                .max(MAX_RISK_FLOOR)
                .min(MAX_RISK_CEILING),
            regime: VolatilityRegime::Normal,
            pending_regime: None,
            outcomes: VecDeque::new(),
            streak: 0,
        }
    }

    fn win_rate(&self) -> Option<f64> {
        if self.outcomes.is_empty() {
            return None;
        }
        let wins = self
            .outcomes
            .iter()
            .filter(|o| **o == TradeOutcome::Win)
            .count();
        Some(wins as f64 / self.outcomes.len() as f64)
    }

    fn thresholds(&self) -> AdaptiveThresholds {
        let (conf_offset, risk_offset) = self.regime.offsets();
        AdaptiveThresholds {
            min_confidence: (self.base_min_confidence + conf_offset)
                .clamp(MIN_CONFIDENCE_FLOOR, MIN_CONFIDENCE_CEILING),
            max_risk: (self.base_max_risk + risk_offset)
                .max(MAX_RISK_FLOOR)
                .min(MAX_RISK_CEILING),
            regime: self.regime,
        }
    }
}

/// Single writer (the engine's close callback and the bot's regime feed),
/// many readers (the gating layer).
pub struct AdaptiveController {
    config: AdaptiveConfig,
    store: Arc<dyn PositionStore>,
    state: RwLock<AdaptiveState>,
}

impl AdaptiveController {
    pub fn new(config: AdaptiveConfig, store: Arc<dyn PositionStore>) -> Self {
        let state = AdaptiveState::initial(&config);
        Self {
            config,
            store,
            state: RwLock::new(state),
        }
    }

    /// Restores learned thresholds from the store.
    pub async fn load(&self) -> Result<(), GatingError> {
        let Some(raw) = self.store.load_state(STATE_KEY).await? else {
            return Ok(());
        };
        let restored: AdaptiveState = serde_json::from_str(&raw)?;
        info!(
            min_confidence = restored.base_min_confidence,
            max_risk = %restored.base_max_risk,
            regime = %restored.regime,
            "Adaptive thresholds restored"
        );
        *self.state.write().await = restored;
        Ok(())
    }

    pub async fn thresholds(&self) -> AdaptiveThresholds {
        if !self.config.enabled {
            return AdaptiveState::initial(&self.config).thresholds();
        }
        self.state.read().await.thresholds()
    }

    /// Rolling win rate and current streak.
    pub async fn rolling_stats(&self) -> (Option<f64>, i32) {
        let state = self.state.read().await;
        (state.win_rate(), state.streak)
    }

    /// Updates the rolling window and nudges the thresholds.
    pub async fn on_trade_closed(&self, result: &TradeResult) -> Result<(), GatingError> {
        if !self.config.enabled || !result.counts_for_statistics() {
            return Ok(());
        }

        let raw = {
            let mut state = self.state.write().await;
            state.outcomes.push_back(result.outcome);
            while state.outcomes.len() > self.config.window.max(1) {
                state.outcomes.pop_front();
            }
            state.streak = match (result.outcome, state.streak) {
                (TradeOutcome::Win, s) if s > 0 => s + 1,
                (TradeOutcome::Win, _) => 1,
                (TradeOutcome::Loss, s) if s < 0 => s - 1,
                (TradeOutcome::Loss, _) => -1,
                (TradeOutcome::Breakeven, s) => s,
            };

            if state.outcomes.len() >= MIN_OBSERVATIONS {
                self.adapt(&mut state);
            }
            serde_json::to_string(&*state)?
        };

        self.store.save_state(STATE_KEY, &raw).await?;
        Ok(())
    }

    fn adapt(&self, state: &mut AdaptiveState) {
        let Some(win_rate) = state.win_rate() else {
            return;
        };
        // Positive pressure tightens: higher confidence floor, lower risk.
        let streak = f64::from(state.streak.clamp(-5, 5)) / 5.0;
        let pressure = (self.config.target_win_rate - win_rate) - STREAK_WEIGHT * streak;
        let step = self.config.sensitivity * pressure;

        let before = state.thresholds();
        state.base_min_confidence = (state.base_min_confidence + step)
            .clamp(MIN_CONFIDENCE_FLOOR, MIN_CONFIDENCE_CEILING);

        let risk_factor = Decimal::from_f64(1.0 - step).unwrap_or(Decimal::ONE);
        state.base_max_risk = (state.base_max_risk * risk_factor)
            .max(MAX_RISK_FLOOR)
            .min(MAX_RISK_CEILING);

        let after = state.thresholds();
        debug!(
            win_rate,
            streak = state.streak,
            min_confidence_before = before.min_confidence,
            min_confidence = after.min_confidence,
            max_risk = %after.max_risk,
            "Adaptive thresholds updated"
        );
    }

    /// Classifies the observed ATR% and adopts a new regime once it held
    /// for the dwell time. Returns true when the regime changed.
    pub async fn observe_volatility(
        &self,
        atr_pct: Decimal,
        now: DateTime<Utc>,
    ) -> Result<bool, GatingError> {
        if !self.config.enabled {
            return Ok(false);
        }
        let candidate = self.classify(atr_pct);
        let dwell = chrono::Duration::from_std(self.config.regime_dwell)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));

        let raw = {
            let mut state = self.state.write().await;
            if candidate == state.regime {
                state.pending_regime = None;
                return Ok(false);
            }
            match state.pending_regime {
                Some((pending, since)) if pending == candidate => {
                    if now - since < dwell {
                        return Ok(false);
                    }
                }
                _ => {
                    state.pending_regime = Some((candidate, now));
                    debug!(
                        current = %state.regime,
                        candidate = %candidate,
                        atr_pct = %atr_pct,
                        "Volatility regime change pending"
                    );
                    if !dwell.is_zero() {
                        return Ok(false);
                    }
                }
            }

            let previous = state.regime;
            state.regime = candidate;
            state.pending_regime = None;
            info!(
                from = %previous,
                to = %candidate,
                atr_pct = %atr_pct,
                min_confidence = state.thresholds().min_confidence,
                max_risk = %state.thresholds().max_risk,
                "Volatility regime changed"
            );
            serde_json::to_string(&*state)?
        };

        self.store.save_state(STATE_KEY, &raw).await?;
        Ok(true)
    }

    fn classify(&self, atr_pct: Decimal) -> VolatilityRegime {
        if atr_pct < self.config.low_volatility_pct {
            VolatilityRegime::Low
        } else if atr_pct > self.config.high_volatility_pct {
            VolatilityRegime::High
        } else {
            VolatilityRegime::Normal
        }
    }

    /// Restores the configured starting thresholds. Used for test isolation.
    pub async fn reset(&self) {
        *self.state.write().await = AdaptiveState::initial(&self.config);
    }
}
