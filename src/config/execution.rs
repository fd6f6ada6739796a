//! Retry and circuit breaker configuration for external calls.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Retry settings for failed operations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "duration")]
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    #[serde(with = "duration")]
    pub max_delay: Duration,
    /// Factor by which delay increases after each retry.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

/// Circuit breaker settings for a single dependency.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Number of failures within the window before the circuit opens.
    pub failure_threshold: u32,
    /// Number of half-open successes needed to close the circuit again.
    pub success_threshold: u32,
    /// How long the circuit stays open before allowing a probe call.
    #[serde(with = "duration")]
    pub open_timeout: Duration,
    /// Window for counting failures.
    #[serde(with = "duration")]
    pub window: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
            window: Duration::from_secs(60),
        }
    }
}
