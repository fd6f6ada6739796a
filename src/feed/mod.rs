//! Market data feed: precomputed indicator snapshots per symbol.

mod file;

pub use file::FileFeed;

use crate::domain::MarketSnapshot;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no snapshot for {0}")]
    NotFound(String),

    #[error("snapshot for {symbol} is {age_secs}s old")]
    Stale { symbol: String, age_secs: i64 },
}

/// MarketFeed returns the latest snapshot for a symbol.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot, FeedError>;
}
