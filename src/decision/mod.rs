//! Decision sources: turn a market snapshot into a typed trade decision.
//!
//! Decisions are directional input only. Any stop-loss or take-profit a
//! source suggests is kept as advisory and never reaches order placement.

mod guarded;
mod http;
mod parser;
mod rules;

pub use guarded::GuardedSource;
pub use http::HttpDecisionSource;
pub use parser::{normalize_confidence, parse_decision, parse_json, parse_keywords};
pub use rules::{RuleDecisionSource, Strategy, select_strategy};

use crate::config::{DecisionConfig, TimeframeConfig};
use crate::domain::{Decision, MarketSnapshot};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("decision source returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed decision: {0}")]
    Malformed(String),

    #[error("circuit open: {0}")]
    CircuitOpen(String),

    #[error("decision source timed out")]
    Timeout,

    #[error("unsupported decision source: {0}")]
    Unsupported(String),
}

impl DecisionError {
    /// Failures of the dependency itself, as opposed to bad payloads.
    pub fn counts_as_failure(&self) -> bool {
        match self {
            DecisionError::Request(_) | DecisionError::Timeout => true,
            DecisionError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// DecisionSource produces a decision for one symbol snapshot.
#[async_trait]
pub trait DecisionSource: Send + Sync {
    fn name(&self) -> &str;

    async fn decide(&self, snapshot: &MarketSnapshot) -> Result<Decision, DecisionError>;
}

/// Builds the configured source wrapped in its circuit breaker.
pub fn create_source(
    config: &DecisionConfig,
    timeframes: &TimeframeConfig,
) -> Result<Arc<dyn DecisionSource>, DecisionError> {
    let inner: Arc<dyn DecisionSource> = match config.source.as_str() {
        "rules" => Arc::new(RuleDecisionSource::new(timeframes.primary.clone())),
        "http" => Arc::new(HttpDecisionSource::new(config)?),
        other => return Err(DecisionError::Unsupported(other.to_string())),
    };
    Ok(Arc::new(GuardedSource::new(inner, config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_source_by_name() {
        let config = DecisionConfig::default();
        let source = create_source(&config, &TimeframeConfig::default()).unwrap();
        assert_eq!(source.name(), "rules");

        let bad = DecisionConfig {
            source: "oracle".into(),
            ..DecisionConfig::default()
        };
        assert!(matches!(
            create_source(&bad, &TimeframeConfig::default()),
            Err(DecisionError::Unsupported(_))
        ));
    }

    #[test]
    fn test_failure_classification() {
        assert!(DecisionError::Timeout.counts_as_failure());
        assert!(
            DecisionError::Status {
                status: 503,
                body: String::new()
            }
            .counts_as_failure()
        );
        assert!(
            !DecisionError::Status {
                status: 400,
                body: String::new()
            }
            .counts_as_failure()
        );
        assert!(!DecisionError::Malformed("x".into()).counts_as_failure());
    }
}
