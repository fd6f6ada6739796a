//! Bot error types.

use crate::decision::DecisionError;
use crate::engine::EngineError;
use crate::exchanges::ExchangeError;
use crate::feed::FeedError;
use crate::gating::GatingError;
use crate::risk::RiskError;
use crate::storage::StorageError;

/// Bot error type.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("bot is already running")]
    AlreadyRunning,
    #[error("storage unavailable: {0}")]
    Storage(#[from] StorageError),
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),
    #[error("decision error: {0}")]
    Decision(#[from] DecisionError),
    #[error("risk error: {0}")]
    Risk(#[from] RiskError),
    #[error("gating error: {0}")]
    Gating(#[from] GatingError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("evaluation of {0} timed out")]
    Timeout(String),
}

impl BotError {
    /// Errors that only mean "skip this symbol for this cycle".
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            BotError::Feed(FeedError::NotFound(_) | FeedError::Stale { .. })
                | BotError::Decision(DecisionError::CircuitOpen(_))
                | BotError::Exchange(ExchangeError::CircuitOpen(_))
        )
    }
}
