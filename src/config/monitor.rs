//! Position monitoring configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Background monitor settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Poll interval of each position monitor.
    #[serde(with = "duration")]
    pub poll_interval: Duration,
    /// Interval between supervisor consultations; zero disables them.
    #[serde(with = "duration")]
    pub supervisor_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            supervisor_interval: Duration::from_secs(60),
        }
    }
}
