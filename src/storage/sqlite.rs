//! SQLite implementation of PositionStore.

use crate::domain::{
    ExitReason, Order, OrderSide, OrderStatus, OrderType, Position, PositionStatus, Protection,
    Side, TradeOutcome, TradeResult,
};
use crate::storage::{PositionStore, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// SqliteStorage implements PositionStore using SQLite.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

/// SqliteStorageConfig holds SQLite storage configuration.
#[derive(Debug, Clone)]
pub struct SqliteStorageConfig {
    /// Path to the SQLite database file.
    pub path: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
}

impl Default for SqliteStorageConfig {
    fn default() -> Self {
        Self {
            path: "sentinel.db".to_string(),
            max_connections: 5,
        }
    }
}

impl SqliteStorage {
    /// Creates a new SQLite storage instance.
    pub async fn new(config: SqliteStorageConfig) -> Result<Self, StorageError> {
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let storage = Self { pool };

        storage.migrate().await?;

        info!(path = %config.path, "SQLite storage initialized");
        Ok(storage)
    }

    /// Runs database migrations to create the schema.
    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                status TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                entry_time TEXT NOT NULL,
                confidence REAL NOT NULL,
                strategy_tag TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                take_profit TEXT NOT NULL,
                initial_stop_loss TEXT NOT NULL,
                trailing_active INTEGER NOT NULL DEFAULT 0,
                protection_kind TEXT NOT NULL,
                oco_order_id TEXT,
                stop_order_id TEXT,
                take_profit_order_id TEXT,
                exit_price TEXT,
                exit_time TEXT,
                exit_reason TEXT,
                realized_pnl TEXT,
                realized_pnl_pct TEXT,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                position_id TEXT NOT NULL REFERENCES positions(id),
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                type TEXT NOT NULL,
                status TEXT NOT NULL,
                quantity TEXT NOT NULL,
                price TEXT,
                stop_price TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trade_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                position_id TEXT NOT NULL UNIQUE,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                exit_price TEXT NOT NULL,
                quantity TEXT NOT NULL,
                pnl TEXT NOT NULL,
                pnl_pct TEXT NOT NULL,
                result TEXT NOT NULL,
                hold_duration_secs INTEGER NOT NULL,
                exit_reason TEXT NOT NULL,
                strategy_tag TEXT NOT NULL,
                confidence REAL NOT NULL,
                closed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS engine_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_positions_status ON positions(status)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_position ON orders(position_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Inserts or updates a position row.
async fn write_position(conn: &mut SqliteConnection, p: &Position) -> Result<(), StorageError> {
    let (kind, oco_id, stop_id, take_id) = match &p.protection {
        Protection::None => ("none", None, None, None),
        Protection::Oco { order_id } => ("oco", Some(order_id.as_str()), None, None),
        Protection::Separate {
            stop_order_id,
            take_profit_order_id,
        } => (
            "separate",
            None,
            Some(stop_order_id.as_str()),
            Some(take_profit_order_id.as_str()),
        ),
    };

    sqlx::query(
        r#"
        INSERT INTO positions (
            id, symbol, side, status, entry_price, quantity, entry_time, confidence,
            strategy_tag, stop_loss, take_profit, initial_stop_loss, trailing_active,
            protection_kind, oco_order_id, stop_order_id, take_profit_order_id,
            exit_price, exit_time, exit_reason, realized_pnl, realized_pnl_pct, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                  ?18, ?19, ?20, ?21, ?22, CURRENT_TIMESTAMP)
        ON CONFLICT(id) DO UPDATE SET
            status = excluded.status,
            entry_price = excluded.entry_price,
            quantity = excluded.quantity,
            stop_loss = excluded.stop_loss,
            take_profit = excluded.take_profit,
            trailing_active = excluded.trailing_active,
            protection_kind = excluded.protection_kind,
            oco_order_id = excluded.oco_order_id,
            stop_order_id = excluded.stop_order_id,
            take_profit_order_id = excluded.take_profit_order_id,
            exit_price = excluded.exit_price,
            exit_time = excluded.exit_time,
            exit_reason = excluded.exit_reason,
            realized_pnl = excluded.realized_pnl,
            realized_pnl_pct = excluded.realized_pnl_pct,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&p.id)
    .bind(&p.symbol)
    .bind(p.side.to_string())
    .bind(p.status.to_string())
    .bind(p.entry_price.to_string())
    .bind(p.quantity.to_string())
    .bind(p.entry_time.to_rfc3339())
    .bind(p.confidence)
    .bind(&p.strategy_tag)
    .bind(p.stop_loss.to_string())
    .bind(p.take_profit.to_string())
    .bind(p.initial_stop_loss.to_string())
    .bind(p.trailing_active)
    .bind(kind)
    .bind(oco_id)
    .bind(stop_id)
    .bind(take_id)
    .bind(p.exit_price.map(|d| d.to_string()))
    .bind(p.exit_time.map(|t| t.to_rfc3339()))
    .bind(p.exit_reason.map(|r| r.to_string()))
    .bind(p.realized_pnl.map(|d| d.to_string()))
    .bind(p.realized_pnl_pct.map(|d| d.to_string()))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts or updates an order row.
async fn write_order(conn: &mut SqliteConnection, o: &Order) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO orders (
            id, position_id, symbol, side, type, status, quantity, price, stop_price,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            status = excluded.status,
            price = excluded.price,
            stop_price = excluded.stop_price,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&o.id)
    .bind(&o.position_id)
    .bind(&o.symbol)
    .bind(o.side.to_string())
    .bind(o.order_type.to_string())
    .bind(o.status.to_string())
    .bind(o.quantity.to_string())
    .bind(o.price.map(|d| d.to_string()))
    .bind(o.stop_price.map(|d| d.to_string()))
    .bind(o.created_at.to_rfc3339())
    .bind(o.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

const POSITION_COLUMNS: &str = r#"
    id, symbol, side, status, entry_price, quantity, entry_time, confidence,
    strategy_tag, stop_loss, take_profit, initial_stop_loss, trailing_active,
    protection_kind, oco_order_id, stop_order_id, take_profit_order_id,
    exit_price, exit_time, exit_reason, realized_pnl, realized_pnl_pct
"#;

const TRADE_COLUMNS: &str = r#"
    position_id, symbol, side, entry_price, exit_price, quantity, pnl, pnl_pct,
    result, hold_duration_secs, exit_reason, strategy_tag, confidence, closed_at
"#;

#[async_trait]
impl PositionStore for SqliteStorage {
    async fn save_position(&self, position: &Position, orders: &[Order]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        write_position(&mut *tx, position).await?;
        for order in orders {
            write_order(&mut *tx, order).await?;
        }
        tx.commit().await?;

        debug!(
            position_id = %position.id,
            status = %position.status,
            orders = orders.len(),
            "Position saved"
        );
        Ok(())
    }

    async fn get_position(&self, id: &str) -> Result<Option<Position>, StorageError> {
        let sql = format!("SELECT {} FROM positions WHERE id = ?", POSITION_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => Ok(Some(parse_position_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn positions_with_status(
        &self,
        statuses: &[PositionStatus],
    ) -> Result<Vec<Position>, StorageError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM positions WHERE status IN ({}) ORDER BY entry_time ASC",
            POSITION_COLUMNS, placeholders
        );

        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(parse_position_row).collect()
    }

    async fn orders_for_position(&self, position_id: &str) -> Result<Vec<Order>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, position_id, symbol, side, type, status, quantity, price, stop_price,
                created_at, updated_at
            FROM orders WHERE position_id = ? ORDER BY created_at ASC
            "#,
        )
        .bind(position_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_order_row).collect()
    }

    async fn finalize_close(
        &self,
        position: &Position,
        result: &TradeResult,
        orders: &[Order],
    ) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await?;

        write_position(&mut *tx, position).await?;
        for order in orders {
            write_order(&mut *tx, order).await?;
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO trade_history (
                position_id, symbol, side, entry_price, exit_price, quantity, pnl, pnl_pct,
                result, hold_duration_secs, exit_reason, strategy_tag, confidence, closed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(position_id) DO NOTHING
            "#,
        )
        .bind(&result.position_id)
        .bind(&result.symbol)
        .bind(result.side.to_string())
        .bind(result.entry_price.to_string())
        .bind(result.exit_price.to_string())
        .bind(result.quantity.to_string())
        .bind(result.pnl.to_string())
        .bind(result.pnl_pct.to_string())
        .bind(result.outcome.to_string())
        .bind(result.hold_duration_secs)
        .bind(result.exit_reason.to_string())
        .bind(&result.strategy_tag)
        .bind(result.confidence)
        .bind(result.closed_at.to_rfc3339())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        tx.commit().await?;

        debug!(
            position_id = %position.id,
            pnl = %result.pnl,
            outcome = %result.outcome,
            recorded = inserted,
            "Position close persisted"
        );
        Ok(inserted)
    }

    async fn recent_trades(&self, limit: u32) -> Result<Vec<TradeResult>, StorageError> {
        let sql = format!(
            "SELECT {} FROM trade_history ORDER BY id DESC LIMIT ?",
            TRADE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        let mut trades = rows
            .iter()
            .map(parse_trade_row)
            .collect::<Result<Vec<_>, _>>()?;
        trades.reverse();
        Ok(trades)
    }

    async fn save_state(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO engine_state (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_state(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM engine_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn reset(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for table in ["orders", "trade_history", "positions", "engine_state"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal, StorageError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw)
        .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
}

fn opt_decimal(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, StorageError> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| {
        Decimal::from_str(&s)
            .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
    })
    .transpose()
}

fn timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
}

fn enum_column<T: FromStr<Err = String>>(row: &SqliteRow, column: &str) -> Result<T, StorageError> {
    let raw: String = row.try_get(column)?;
    T::from_str(&raw).map_err(StorageError::InvalidData)
}

/// Parses a position from a database row.
fn parse_position_row(row: &SqliteRow) -> Result<Position, StorageError> {
    let kind: String = row.try_get("protection_kind")?;
    let protection = match kind.as_str() {
        "none" => Protection::None,
        "oco" => Protection::Oco {
            order_id: row
                .try_get::<Option<String>, _>("oco_order_id")?
                .ok_or_else(|| StorageError::InvalidData("oco protection without id".into()))?,
        },
        "separate" => {
            let stop: Option<String> = row.try_get("stop_order_id")?;
            let take: Option<String> = row.try_get("take_profit_order_id")?;
            match (stop, take) {
                (Some(stop_order_id), Some(take_profit_order_id)) => Protection::Separate {
                    stop_order_id,
                    take_profit_order_id,
                },
                _ => {
                    return Err(StorageError::InvalidData(
                        "separate protection without both ids".into(),
                    ));
                }
            }
        }
        other => {
            return Err(StorageError::InvalidData(format!(
                "Unknown protection kind: {}",
                other
            )));
        }
    };

    let entry_time: String = row.try_get("entry_time")?;
    let exit_time: Option<String> = row.try_get("exit_time")?;
    let exit_reason: Option<String> = row.try_get("exit_reason")?;

    Ok(Position {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        side: enum_column::<Side>(row, "side")?,
        status: enum_column::<PositionStatus>(row, "status")?,
        entry_price: decimal(row, "entry_price")?,
        quantity: decimal(row, "quantity")?,
        entry_time: timestamp(&entry_time, "entry_time")?,
        confidence: row.try_get("confidence")?,
        strategy_tag: row.try_get("strategy_tag")?,
        stop_loss: decimal(row, "stop_loss")?,
        take_profit: decimal(row, "take_profit")?,
        initial_stop_loss: decimal(row, "initial_stop_loss")?,
        trailing_active: row.try_get("trailing_active")?,
        protection,
        exit_price: opt_decimal(row, "exit_price")?,
        exit_time: exit_time
            .map(|t| timestamp(&t, "exit_time"))
            .transpose()?,
        exit_reason: exit_reason
            .map(|r| ExitReason::from_str(&r).map_err(StorageError::InvalidData))
            .transpose()?,
        realized_pnl: opt_decimal(row, "realized_pnl")?,
        realized_pnl_pct: opt_decimal(row, "realized_pnl_pct")?,
    })
}

/// Parses an order from a database row.
fn parse_order_row(row: &SqliteRow) -> Result<Order, StorageError> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Order {
        id: row.try_get("id")?,
        position_id: row.try_get("position_id")?,
        symbol: row.try_get("symbol")?,
        side: enum_column::<OrderSide>(row, "side")?,
        order_type: enum_column::<OrderType>(row, "type")?,
        status: enum_column::<OrderStatus>(row, "status")?,
        quantity: decimal(row, "quantity")?,
        price: opt_decimal(row, "price")?,
        stop_price: opt_decimal(row, "stop_price")?,
        created_at: timestamp(&created_at, "created_at")?,
        updated_at: timestamp(&updated_at, "updated_at")?,
    })
}

/// Parses a trade result from a database row.
fn parse_trade_row(row: &SqliteRow) -> Result<TradeResult, StorageError> {
    let closed_at: String = row.try_get("closed_at")?;

    Ok(TradeResult {
        position_id: row.try_get("position_id")?,
        symbol: row.try_get("symbol")?,
        side: enum_column::<Side>(row, "side")?,
        entry_price: decimal(row, "entry_price")?,
        exit_price: decimal(row, "exit_price")?,
        quantity: decimal(row, "quantity")?,
        pnl: decimal(row, "pnl")?,
        pnl_pct: decimal(row, "pnl_pct")?,
        outcome: enum_column::<TradeOutcome>(row, "result")?,
        hold_duration_secs: row.try_get("hold_duration_secs")?,
        exit_reason: enum_column::<ExitReason>(row, "exit_reason")?,
        strategy_tag: row.try_get("strategy_tag")?,
        confidence: row.try_get("confidence")?,
        closed_at: timestamp(&closed_at, "closed_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    async fn storage() -> (SqliteStorage, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let storage = SqliteStorage::new(SqliteStorageConfig {
            path: path.to_str().unwrap().to_string(),
            max_connections: 1,
        })
        .await
        .unwrap();
        (storage, dir)
    }

    fn position() -> Position {
        Position::pending(
            "BTC/USDT",
            Side::Long,
            dec!(100000),
            dec!(0.01),
            dec!(97000),
            dec!(106000),
            0.75,
            "trend",
        )
    }

    fn order(position: &Position, id: &str, order_type: OrderType) -> Order {
        Order::new(
            id,
            &position.id,
            &position.symbol,
            OrderSide::Sell,
            order_type,
            OrderStatus::Open,
            position.quantity,
            Some(position.take_profit),
            Some(position.stop_loss),
        )
    }

    #[tokio::test]
    async fn test_save_and_get_position() {
        let (store, _dir) = storage().await;
        let mut pos = position();
        pos.protection = Protection::Oco {
            order_id: "oco-1".to_string(),
        };

        store.save_position(&pos, &[]).await.unwrap();

        let loaded = store.get_position(&pos.id).await.unwrap().unwrap();
        assert_eq!(loaded.symbol, "BTC/USDT");
        assert_eq!(loaded.side, Side::Long);
        assert_eq!(loaded.status, PositionStatus::Pending);
        assert_eq!(loaded.entry_price, dec!(100000));
        assert_eq!(loaded.stop_loss, dec!(97000));
        assert_eq!(loaded.protection, pos.protection);
        assert!(!loaded.trailing_active);
        assert!(loaded.exit_price.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_position() {
        let (store, _dir) = storage().await;
        assert!(store.get_position("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_position_updates_existing_row() {
        let (store, _dir) = storage().await;
        let mut pos = position();
        store.save_position(&pos, &[]).await.unwrap();

        pos.transition_to(PositionStatus::Open).unwrap();
        pos.stop_loss = dec!(100900);
        pos.trailing_active = true;
        pos.protection = Protection::Separate {
            stop_order_id: "s-1".to_string(),
            take_profit_order_id: "t-1".to_string(),
        };
        let orders = vec![
            order(&pos, "s-1", OrderType::StopLoss),
            order(&pos, "t-1", OrderType::TakeProfit),
        ];
        store.save_position(&pos, &orders).await.unwrap();

        let loaded = store.get_position(&pos.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PositionStatus::Open);
        assert_eq!(loaded.stop_loss, dec!(100900));
        assert_eq!(loaded.initial_stop_loss, dec!(97000));
        assert!(loaded.trailing_active);
        assert_eq!(loaded.protection, pos.protection);

        let stored_orders = store.orders_for_position(&pos.id).await.unwrap();
        assert_eq!(stored_orders.len(), 2);
    }

    #[tokio::test]
    async fn test_positions_with_status() {
        let (store, _dir) = storage().await;
        let pending = position();
        let mut open = position();
        open.transition_to(PositionStatus::Open).unwrap();

        store.save_position(&pending, &[]).await.unwrap();
        store.save_position(&open, &[]).await.unwrap();

        let open_only = store
            .positions_with_status(&[PositionStatus::Open])
            .await
            .unwrap();
        assert_eq!(open_only.len(), 1);
        assert_eq!(open_only[0].id, open.id);

        let active = store
            .positions_with_status(&[PositionStatus::Pending, PositionStatus::Open])
            .await
            .unwrap();
        assert_eq!(active.len(), 2);

        assert!(store.positions_with_status(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_finalize_close_writes_trade_once() {
        let (store, _dir) = storage().await;
        let mut pos = position();
        pos.transition_to(PositionStatus::Open).unwrap();
        let stop = order(&pos, "s-1", OrderType::StopLoss);
        store.save_position(&pos, &[stop.clone()]).await.unwrap();

        pos.transition_to(PositionStatus::Closing).unwrap();
        pos.record_exit(dec!(103000), ExitReason::TakeProfit);
        pos.transition_to(PositionStatus::Closed).unwrap();
        let result = TradeResult::from_position(&pos).unwrap();
        let cancelled = stop.with_status(OrderStatus::Cancelled);

        let first = store
            .finalize_close(&pos, &result, &[cancelled.clone()])
            .await
            .unwrap();
        let second = store.finalize_close(&pos, &result, &[cancelled]).await.unwrap();
        assert!(first);
        assert!(!second);

        let trades = store.recent_trades(10).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].pnl, dec!(30));
        assert_eq!(trades[0].outcome, TradeOutcome::Win);

        let loaded = store.get_position(&pos.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PositionStatus::Closed);
        assert_eq!(loaded.exit_reason, Some(ExitReason::TakeProfit));

        let orders = store.orders_for_position(&pos.id).await.unwrap();
        assert_eq!(orders[0].status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_recent_trades_chronological_and_limited() {
        let (store, _dir) = storage().await;
        for exit in [dec!(101000), dec!(99000), dec!(102000)] {
            let mut pos = position();
            pos.transition_to(PositionStatus::Open).unwrap();
            pos.transition_to(PositionStatus::Closing).unwrap();
            pos.record_exit(exit, ExitReason::Manual);
            pos.transition_to(PositionStatus::Closed).unwrap();
            let result = TradeResult::from_position(&pos).unwrap();
            store.finalize_close(&pos, &result, &[]).await.unwrap();
        }

        let trades = store.recent_trades(2).await.unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].exit_price, dec!(99000));
        assert_eq!(trades[1].exit_price, dec!(102000));
    }

    #[tokio::test]
    async fn test_state_roundtrip_and_reset() {
        let (store, _dir) = storage().await;
        store.save_state("adaptive", r#"{"a":1}"#).await.unwrap();
        store.save_state("adaptive", r#"{"a":2}"#).await.unwrap();
        assert_eq!(
            store.load_state("adaptive").await.unwrap().as_deref(),
            Some(r#"{"a":2}"#)
        );

        store.save_position(&position(), &[]).await.unwrap();
        store.reset().await.unwrap();
        assert!(store.load_state("adaptive").await.unwrap().is_none());
        assert!(store
            .positions_with_status(&[PositionStatus::Pending])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reopen.db").to_str().unwrap().to_string();
        let pos = position();

        {
            let store = SqliteStorage::new(SqliteStorageConfig {
                path: path.clone(),
                max_connections: 1,
            })
            .await
            .unwrap();
            store.save_position(&pos, &[]).await.unwrap();
            store.close().await.unwrap();
        }

        let store = SqliteStorage::new(SqliteStorageConfig {
            path,
            max_connections: 1,
        })
        .await
        .unwrap();
        assert!(store.get_position(&pos.id).await.unwrap().is_some());
    }
}
