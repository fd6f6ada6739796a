//! Engine error types.

use crate::domain::TransitionError;
use crate::exchanges::ExchangeError;
use crate::orders::OrderError;
use crate::storage::StorageError;

/// Infrastructure failures of the position engine. Portfolio limits are
/// reported as `Admission::Rejected`, not as errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("order error: {0}")]
    Order(#[from] OrderError),

    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("position {0} not found")]
    NotFound(String),

    #[error("invalid levels for {symbol}: {reason}")]
    InvalidLevels { symbol: String, reason: String },

    #[error("position {0} closed without exit data")]
    MissingExit(String),

    #[error("engine is shutting down")]
    ShuttingDown,
}
