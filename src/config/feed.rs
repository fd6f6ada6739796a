//! Market data feed configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Indicator snapshot feed settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// JSON file with snapshots written by the indicator process.
    pub path: String,
    /// Snapshots older than this are ignored.
    #[serde(with = "duration")]
    pub max_age: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            path: "data/snapshots.json".to_string(),
            max_age: Duration::from_secs(300),
        }
    }
}
