//! Snapshots written to a JSON file by an external indicator process.

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::{FeedError, MarketFeed};
use crate::config::FeedConfig;
use crate::domain::MarketSnapshot;

/// Reads the whole file on every call; the file holds a JSON array of
/// snapshots, one per symbol.
pub struct FileFeed {
    path: PathBuf,
    max_age: Duration,
}

impl FileFeed {
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(&config.path, config.max_age)
    }

    async fn read_all(&self) -> Result<Vec<MarketSnapshot>, FeedError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl MarketFeed for FileFeed {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot, FeedError> {
        let snapshot = self
            .read_all()
            .await?
            .into_iter()
            .filter(|s| s.symbol == symbol)
            .max_by_key(|s| s.timestamp)
            .ok_or_else(|| FeedError::NotFound(symbol.to_string()))?;

        let age = Utc::now() - snapshot.timestamp;
        if !self.max_age.is_zero() && age.to_std().is_ok_and(|a| a > self.max_age) {
            return Err(FeedError::Stale {
                symbol: symbol.to_string(),
                age_secs: age.num_seconds(),
            });
        }

        debug!(symbol = %symbol, price = %snapshot.price, atr_pct = %snapshot.atr_pct, "Snapshot loaded");
        Ok(snapshot)
    }
}
