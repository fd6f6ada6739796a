//! Durable storage for positions, orders, trade history and engine state.

mod sqlite;

pub use sqlite::{SqliteStorage, SqliteStorageConfig};

use crate::domain::{Order, Position, PositionStatus, TradeResult};
use async_trait::async_trait;

/// PositionStore is the single source of truth after a restart.
///
/// Every method that touches more than one row runs in one transaction, so a
/// crash in the middle of a business operation never leaves partial state.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Inserts or updates a position together with the given orders.
    async fn save_position(&self, position: &Position, orders: &[Order]) -> Result<(), StorageError>;

    /// Retrieves a position by its ID.
    async fn get_position(&self, id: &str) -> Result<Option<Position>, StorageError>;

    /// Retrieves all positions in any of the given statuses, oldest first.
    async fn positions_with_status(
        &self,
        statuses: &[PositionStatus],
    ) -> Result<Vec<Position>, StorageError>;

    /// Retrieves all orders recorded for a position.
    async fn orders_for_position(&self, position_id: &str) -> Result<Vec<Order>, StorageError>;

    /// Persists the closed position, its final orders and the trade result
    /// atomically. Returns false if a trade result for this position already
    /// existed (the result is written exactly once).
    async fn finalize_close(
        &self,
        position: &Position,
        result: &TradeResult,
        orders: &[Order],
    ) -> Result<bool, StorageError>;

    /// Returns up to `limit` most recent trade results in chronological order.
    async fn recent_trades(&self, limit: u32) -> Result<Vec<TradeResult>, StorageError>;

    /// Stores a JSON blob of component state under `key`.
    async fn save_state(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Loads the JSON blob stored under `key`.
    async fn load_state(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Deletes every row. Used for test isolation.
    async fn reset(&self) -> Result<(), StorageError>;

    /// Close closes the storage connection.
    async fn close(&self) -> Result<(), StorageError>;
}

/// StorageError represents errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
