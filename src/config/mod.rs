//! Configuration loading and validation for the trading engine.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides for sensitive credentials.

mod adaptive;
mod analysis;
mod app;
mod decision;
mod duration;
mod error;
mod exchange;
mod execution;
mod feed;
mod monitor;
mod notification;
mod portfolio;
mod risk;
mod storage;
mod timeframe;
mod trailing;

pub use adaptive::AdaptiveConfig;
pub use analysis::AnalysisConfig;
pub use app::AppConfig;
pub use decision::DecisionConfig;
pub use error::ConfigError;
pub use exchange::{ExchangeConfig, PaperConfig};
pub use execution::{BreakerConfig, RetryConfig};
pub use feed::FeedConfig;
pub use monitor::MonitorConfig;
pub use notification::{NotificationConfig, TelegramConfig};
pub use portfolio::{CorrelationEntry, PortfolioConfig};
pub use risk::RiskConfig;
pub use storage::StorageConfig;
pub use timeframe::{TimeframeConfig, TimeframeWeight};
pub use trailing::TrailingConfig;

use rust_decimal::Decimal;
use serde::Deserialize;
use std::{env, fs};

/// Root configuration structure.
///
/// Required sections: app, exchange, symbols.
/// Every other section falls back to its defaults when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Exchange gateway settings.
    pub exchange: ExchangeConfig,
    /// Symbols to analyse (e.g., "BTC/USDT").
    pub symbols: Vec<String>,
    /// Sizing, stop derivation and kill switch.
    #[serde(default)]
    pub risk: RiskConfig,
    /// Trailing stop behaviour.
    #[serde(default)]
    pub trailing: TrailingConfig,
    /// Concurrency and correlation limits.
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    /// Multi-timeframe gate.
    #[serde(default)]
    pub timeframes: TimeframeConfig,
    /// Adaptive thresholds.
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
    /// Position monitors.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Analysis loop.
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Decision source.
    #[serde(default)]
    pub decision: DecisionConfig,
    /// Indicator snapshot feed.
    #[serde(default)]
    pub feed: FeedConfig,
    /// Alert channels like Telegram (optional).
    pub notification: Option<NotificationConfig>,
    /// Position store.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// First loads environment variables from `.env` file (if exists),
    /// then loads YAML config and credentials from environment variables:
    /// - `DECISION_API_KEY`
    /// - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`, `TELEGRAM_ERROR_CHAT_ID`
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore error if not found)
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.load_credentials_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load credentials from environment variables.
    fn load_credentials_from_env(&mut self) {
        self.decision.api_key = env::var("DECISION_API_KEY").unwrap_or_default();

        if let Some(ref mut notification) = self.notification {
            if let Some(ref mut telegram) = notification.telegram {
                if telegram.enabled {
                    telegram.bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
                    telegram.chat_id = env::var("TELEGRAM_CHAT_ID").unwrap_or_default();
                    telegram.error_chat_id = env::var("TELEGRAM_ERROR_CHAT_ID").unwrap_or_default();
                }
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        if self.symbols.is_empty() {
            return Err(ConfigError::Validation(
                "at least one symbol is required".into(),
            ));
        }

        if self.exchange.name.is_empty() {
            return Err(ConfigError::Validation("exchange.name is required".into()));
        }

        if self.exchange.fee_taker < Decimal::ZERO {
            return Err(ConfigError::Validation(
                "exchange.fee_taker must not be negative".into(),
            ));
        }

        if self.exchange.quantity_step <= Decimal::ZERO {
            return Err(ConfigError::Validation(
                "exchange.quantity_step must be positive".into(),
            ));
        }

        if self.exchange.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "exchange.retry.max_attempts must be at least 1".into(),
            ));
        }

        self.validate_risk()?;
        self.validate_trailing()?;
        self.validate_portfolio()?;
        self.validate_timeframes()?;

        if self.analysis.workers == 0 {
            return Err(ConfigError::Validation(
                "analysis.workers must be positive".into(),
            ));
        }

        if self.monitor.poll_interval.is_zero() {
            return Err(ConfigError::Validation(
                "monitor.poll_interval must be positive".into(),
            ));
        }

        match self.decision.source.as_str() {
            "rules" => {}
            "http" => {
                if self.decision.endpoint.as_deref().unwrap_or("").is_empty() {
                    return Err(ConfigError::Validation(
                        "decision.endpoint is required for the http source".into(),
                    ));
                }
            }
            other => {
                return Err(ConfigError::Validation(format!(
                    "decision.source {} is not supported",
                    other
                )));
            }
        }

        Ok(())
    }

    fn validate_risk(&self) -> Result<(), ConfigError> {
        let risk = &self.risk;

        if risk.min_sl_distance_pct <= Decimal::ZERO
            || risk.max_sl_distance_pct < risk.min_sl_distance_pct
        {
            return Err(ConfigError::Validation(
                "risk: require 0 < min_sl_distance_pct <= max_sl_distance_pct".into(),
            ));
        }

        if risk.sl_atr_multiplier <= Decimal::ZERO || risk.tp_atr_multiplier <= Decimal::ZERO {
            return Err(ConfigError::Validation(
                "risk: ATR multipliers must be positive".into(),
            ));
        }

        if risk.min_reward_risk <= Decimal::ZERO {
            return Err(ConfigError::Validation(
                "risk.min_reward_risk must be positive".into(),
            ));
        }

        if risk.max_risk_cap <= Decimal::ZERO || risk.max_risk_cap > Decimal::ONE {
            return Err(ConfigError::Validation(
                "risk.max_risk_cap must be in (0, 1]".into(),
            ));
        }

        if risk.kelly_fraction <= Decimal::ZERO || risk.kelly_fraction > Decimal::ONE {
            return Err(ConfigError::Validation(
                "risk.kelly_fraction must be in (0, 1]".into(),
            ));
        }

        if risk.kelly_prior_win_rate <= Decimal::ZERO || risk.kelly_prior_win_rate >= Decimal::ONE
        {
            return Err(ConfigError::Validation(
                "risk.kelly_prior_win_rate must be in (0, 1)".into(),
            ));
        }

        if risk.kelly_full_trust_samples < risk.kelly_min_samples {
            return Err(ConfigError::Validation(
                "risk.kelly_full_trust_samples must be >= kelly_min_samples".into(),
            ));
        }

        if risk.kill_switch_drawdown_pct <= Decimal::ZERO {
            return Err(ConfigError::Validation(
                "risk.kill_switch_drawdown_pct must be positive".into(),
            ));
        }

        Ok(())
    }

    fn validate_trailing(&self) -> Result<(), ConfigError> {
        let trailing = &self.trailing;

        if trailing.trail_distance_pct <= Decimal::ZERO {
            return Err(ConfigError::Validation(
                "trailing.trail_distance_pct must be positive".into(),
            ));
        }

        if trailing.min_profit_to_lock_pct < Decimal::ZERO {
            return Err(ConfigError::Validation(
                "trailing.min_profit_to_lock_pct must not be negative".into(),
            ));
        }

        if trailing.activation_profit_pct <= trailing.min_profit_to_lock_pct {
            return Err(ConfigError::Validation(
                "trailing.activation_profit_pct must exceed min_profit_to_lock_pct".into(),
            ));
        }

        Ok(())
    }

    fn validate_portfolio(&self) -> Result<(), ConfigError> {
        let portfolio = &self.portfolio;

        if portfolio.max_concurrent_positions == 0 {
            return Err(ConfigError::Validation(
                "portfolio.max_concurrent_positions must be positive".into(),
            ));
        }

        if !(0.0..=1.0).contains(&portfolio.max_correlation) {
            return Err(ConfigError::Validation(
                "portfolio.max_correlation must be in [0, 1]".into(),
            ));
        }

        for entry in &portfolio.correlations {
            if !(-1.0..=1.0).contains(&entry.value) {
                return Err(ConfigError::Validation(format!(
                    "portfolio.correlations: {}/{} value {} is outside [-1, 1]",
                    entry.a, entry.b, entry.value
                )));
            }
        }

        Ok(())
    }

    fn validate_timeframes(&self) -> Result<(), ConfigError> {
        let tf = &self.timeframes;

        if tf.timeframes.is_empty() {
            return Err(ConfigError::Validation(
                "timeframes: at least one timeframe is required".into(),
            ));
        }

        if tf.timeframes.iter().any(|t| t.weight < 0.0) {
            return Err(ConfigError::Validation(
                "timeframes: weights must not be negative".into(),
            ));
        }

        let total: f64 = tf.timeframes.iter().map(|t| t.weight).sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Validation(format!(
                "timeframes: weights must sum to 1 (got {})",
                total
            )));
        }

        if !(0.0..=1.0).contains(&tf.min_alignment) {
            return Err(ConfigError::Validation(
                "timeframes.min_alignment must be in [0, 1]".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
