//! Decision source configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;
use super::BreakerConfig;

/// Decision source settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// "rules" for the built-in strategies, "http" for a remote model.
    pub source: String,
    /// Endpoint receiving market snapshots (required for "http").
    pub endpoint: Option<String>,
    /// Bearer token (loaded from DECISION_API_KEY env var).
    #[serde(skip)]
    pub api_key: String,
    /// Request timeout.
    #[serde(with = "duration")]
    pub timeout: Duration,
    /// Circuit breaker guarding the decision source.
    pub circuit_breaker: BreakerConfig,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            source: "rules".to_string(),
            endpoint: None,
            api_key: String::new(),
            timeout: Duration::from_secs(20),
            circuit_breaker: BreakerConfig::default(),
        }
    }
}
