//! Signal gates applied before the risk manager: multi-timeframe alignment,
//! pair correlation and adaptive thresholds.

mod adaptive;
mod correlation;
mod timeframe;

pub use adaptive::{AdaptiveController, AdaptiveThresholds, VolatilityRegime};
pub use correlation::CorrelationFilter;
pub use timeframe::{Alignment, TimeframeGate};

use crate::storage::StorageError;
use thiserror::Error;

/// Failures persisting or restoring gate state.
#[derive(Debug, Error)]
pub enum GatingError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
