//! SQLite series and watermark store.

use crate::domain::error::SyncError;
use crate::domain::minute_bar::{AssetSeries, MinuteBar};
use crate::domain::time_range::{format_timestamp, parse_timestamp};
use crate::ports::config_port::ConfigPort;
use crate::ports::series_port::SeriesStorePort;
use crate::ports::watermark_port::WatermarkPort;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

fn store_error(symbol: &str, reason: impl std::fmt::Display) -> SyncError {
    SyncError::PersistenceFailure {
        symbol: symbol.to_string(),
        reason: reason.to_string(),
    }
}

fn watermark_error(reason: impl std::fmt::Display) -> SyncError {
    SyncError::Watermark {
        reason: reason.to_string(),
    }
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SyncError> {
        let db_path = config
            .get_non_empty("sqlite", "path")
            .ok_or_else(|| SyncError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| store_error("*", e))?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, SyncError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| store_error("*", e))?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self, symbol: &str) -> Result<PooledConnection<SqliteConnectionManager>, SyncError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| store_error(symbol, e))
    }

    pub fn initialize_schema(&self) -> Result<(), SyncError> {
        let conn = self.conn("*")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS minute_bars (
                symbol TEXT NOT NULL,
                date TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (symbol, date)
            );
            CREATE TABLE IF NOT EXISTS sync_watermark (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                synced_to TEXT NOT NULL
            );",
        )
        .map_err(|e: rusqlite::Error| store_error("*", e))?;
        Ok(())
    }
}

impl SeriesStorePort for SqliteStore {
    fn read_series(&self, symbol: &str) -> Result<Option<AssetSeries>, SyncError> {
        let conn = self.conn(symbol)?;
        let mut stmt = conn
            .prepare(
                "SELECT date, open, high, low, close, volume
                 FROM minute_bars
                 WHERE symbol = ?1
                 ORDER BY date ASC",
            )
            .map_err(|e: rusqlite::Error| store_error(symbol, e))?;

        let rows = stmt
            .query_map(params![symbol], |row| {
                let date_str: String = row.get(0)?;
                let timestamp = parse_timestamp(&date_str).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        date_str.len(),
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(MinuteBar {
                    timestamp,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                })
            })
            .map_err(|e: rusqlite::Error| store_error(symbol, e))?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row.map_err(|e: rusqlite::Error| store_error(symbol, e))?);
        }

        if bars.is_empty() {
            return Ok(None);
        }
        Ok(Some(AssetSeries::new(symbol, bars)))
    }

    // Delete and re-insert in one transaction: a failure rolls back to the old
    // series.
    fn write_series(&self, series: &AssetSeries) -> Result<(), SyncError> {
        let symbol = series.symbol.as_str();
        let mut conn = self.conn(symbol)?;
        let tx = conn
            .transaction()
            .map_err(|e: rusqlite::Error| store_error(symbol, e))?;

        tx.execute("DELETE FROM minute_bars WHERE symbol = ?1", params![symbol])
            .map_err(|e: rusqlite::Error| store_error(symbol, e))?;
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO minute_bars (symbol, date, open, high, low, close, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(|e: rusqlite::Error| store_error(symbol, e))?;
            for bar in &series.bars {
                insert
                    .execute(params![
                        symbol,
                        format_timestamp(bar.timestamp),
                        bar.open,
                        bar.high,
                        bar.low,
                        bar.close,
                        bar.volume
                    ])
                    .map_err(|e: rusqlite::Error| store_error(symbol, e))?;
            }
        }

        tx.commit()
            .map_err(|e: rusqlite::Error| store_error(symbol, e))?;
        Ok(())
    }

    fn list_symbols(&self) -> Result<Vec<String>, SyncError> {
        let conn = self.conn("*")?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT symbol FROM minute_bars ORDER BY symbol")
            .map_err(|e: rusqlite::Error| store_error("*", e))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e: rusqlite::Error| store_error("*", e))?;

        let mut symbols = Vec::new();
        for row in rows {
            symbols.push(row.map_err(|e: rusqlite::Error| store_error("*", e))?);
        }
        Ok(symbols)
    }
}

impl WatermarkPort for SqliteStore {
    fn read_watermark(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        let conn = self.pool.get().map_err(watermark_error)?;
        let value: Option<String> = conn
            .query_row(
                "SELECT synced_to FROM sync_watermark WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(watermark_error)?;

        value
            .map(|s| parse_timestamp(&s).map_err(watermark_error))
            .transpose()
    }

    fn write_watermark(&self, synced_to: DateTime<Utc>) -> Result<(), SyncError> {
        let conn = self.pool.get().map_err(watermark_error)?;
        conn.execute(
            "INSERT OR REPLACE INTO sync_watermark (id, synced_to) VALUES (1, ?1)",
            params![format_timestamp(synced_to)],
        )
        .map_err(watermark_error)?;
        tracing::info!(watermark = %synced_to, "watermark advanced");
        Ok(())
    }
}
