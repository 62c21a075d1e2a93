use crate::error::{AppError, Result};
use crate::models::{HistoricalCandleRecord, PairInfoRecord, ServerStatusRecord, TradingPairRecord};
use crate::services::csv_export::ExportRow;
use crate::services::kraken::Candle;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// SQLite store for snapshot records. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open (creating if missing) the database and initialize the schema
    pub async fn connect(database_path: &Path) -> Result<Self> {
        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(options).await?;
        let db = Self { pool };
        db.init_schema().await?;

        info!(path = %database_path.display(), "SQLite database ready");
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS server_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp DATETIME NOT NULL,
                status TEXT NOT NULL,
                error TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS trading_pairs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                base TEXT NOT NULL,
                quote TEXT NOT NULL,
                last_updated DATETIME NOT NULL,
                UNIQUE(name, last_updated)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS pair_info (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pair_id INTEGER NOT NULL,
                price REAL NOT NULL,
                volume_24h REAL NOT NULL,
                high_24h REAL NOT NULL,
                low_24h REAL NOT NULL,
                timestamp DATETIME NOT NULL,
                FOREIGN KEY (pair_id) REFERENCES trading_pairs(id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS historical_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pair_id INTEGER NOT NULL,
                timestamp DATETIME NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                FOREIGN KEY (pair_id) REFERENCES trading_pairs(id)
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Append one heartbeat row; never updated or deleted afterwards
    pub async fn save_server_status(
        &self,
        timestamp: DateTime<Utc>,
        status: &str,
        error: &str,
    ) -> Result<()> {
        sqlx::query("INSERT INTO server_status (timestamp, status, error) VALUES (?1, ?2, ?3)")
            .bind(timestamp)
            .bind(status)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert the per-bucket pair reference row and return its id.
    /// Fails on a duplicate (name, last_updated) pair.
    pub async fn save_trading_pair(
        &self,
        name: &str,
        base: &str,
        quote: &str,
        last_updated: DateTime<Utc>,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO trading_pairs (name, base, quote, last_updated) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(name)
        .bind(base)
        .bind(quote)
        .bind(last_updated)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn save_pair_info(
        &self,
        pair_id: i64,
        price: f64,
        volume_24h: f64,
        high_24h: f64,
        low_24h: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pair_info (pair_id, price, volume_24h, high_24h, low_24h, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(pair_id)
        .bind(price)
        .bind(volume_24h)
        .bind(high_24h)
        .bind(low_24h)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_historical_candle(&self, pair_id: i64, candle: &Candle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO historical_data (pair_id, timestamp, open, high, low, close, volume)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(pair_id)
        .bind(candle.timestamp)
        .bind(candle.open)
        .bind(candle.high)
        .bind(candle.low)
        .bind(candle.close)
        .bind(candle.volume)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent heartbeat row, if any run has been recorded
    pub async fn latest_server_status(&self) -> Result<Option<ServerStatusRecord>> {
        let status = sqlx::query_as::<_, ServerStatusRecord>(
            "SELECT id, timestamp, status, error FROM server_status ORDER BY timestamp DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }

    /// All pair reference rows, most recent bucket first
    pub async fn get_trading_pairs(&self) -> Result<Vec<TradingPairRecord>> {
        let pairs = sqlx::query_as::<_, TradingPairRecord>(
            "SELECT id, name, base, quote, last_updated FROM trading_pairs ORDER BY last_updated DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(pairs)
    }

    pub async fn get_pair_info(&self, pair_id: i64) -> Result<Vec<PairInfoRecord>> {
        let infos = sqlx::query_as::<_, PairInfoRecord>(
            r#"
            SELECT id, pair_id, price, volume_24h, high_24h, low_24h, timestamp
            FROM pair_info WHERE pair_id = ?1 ORDER BY timestamp DESC
            "#,
        )
        .bind(pair_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(infos)
    }

    pub async fn get_historical_data(&self, pair_id: i64) -> Result<Vec<HistoricalCandleRecord>> {
        let candles = sqlx::query_as::<_, HistoricalCandleRecord>(
            r#"
            SELECT id, pair_id, timestamp, open, high, low, close, volume
            FROM historical_data WHERE pair_id = ?1 ORDER BY timestamp DESC
            "#,
        )
        .bind(pair_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(candles)
    }

    /// Bulk-load one export artifact's rows inside a single transaction.
    /// Any row failure rolls back the whole artifact. Used by the import
    /// command only; the live pipeline writes per-record, best effort.
    pub async fn import_snapshot(
        &self,
        bucket: DateTime<Utc>,
        rows: &[ExportRow],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for row in rows {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO trading_pairs (name, base, quote, last_updated)
                VALUES (?1, '', '', ?2)
                "#,
            )
            .bind(&row.pair)
            .bind(bucket)
            .execute(&mut *tx)
            .await?;

            let pair_id: i64 = sqlx::query_scalar(
                "SELECT id FROM trading_pairs WHERE name = ?1 AND last_updated = ?2",
            )
            .bind(&row.pair)
            .bind(bucket)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO historical_data (pair_id, timestamp, open, high, low, close, volume)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(pair_id)
            .bind(row.candle.timestamp)
            .bind(row.candle.open)
            .bind(row.candle.high)
            .bind(row.candle.low)
            .bind(row.candle.close)
            .bind(row.candle.volume)
            .execute(&mut *tx)
            .await?;
            inserted += 1;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Row counts and newest bucket, for the status command
    pub async fn stats(&self) -> Result<DbStats> {
        let status_rows = self.count("server_status").await?;
        let pair_rows = self.count("trading_pairs").await?;
        let info_rows = self.count("pair_info").await?;
        let candle_rows = self.count("historical_data").await?;
        let latest_bucket: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(last_updated) FROM trading_pairs")
                .fetch_one(&self.pool)
                .await?;

        Ok(DbStats {
            status_rows,
            pair_rows,
            info_rows,
            candle_rows,
            latest_bucket,
        })
    }

    async fn count(&self, table: &str) -> Result<i64> {
        // Table names come from the fixed set above, never from user input
        let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug)]
pub struct DbStats {
    pub status_rows: i64,
    pub pair_rows: i64,
    pub info_rows: i64,
    pub candle_rows: i64,
    pub latest_bucket: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    async fn test_db(dir: &tempfile::TempDir) -> Db {
        Db::connect(&dir.path().join("test.db")).await.unwrap()
    }

    fn bucket() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap()
    }

    fn candle(ts: DateTime<Utc>) -> Candle {
        Candle {
            timestamp: ts,
            open: 42000.0,
            high: 42100.0,
            low: 41900.0,
            close: 42050.0,
            volume: 1.5,
        }
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let dir = tempdir().unwrap();
        let db = test_db(&dir).await;
        db.close().await;
        let db = test_db(&dir).await;
        assert_eq!(db.stats().await.unwrap().pair_rows, 0);
        db.close().await;
    }

    #[tokio::test]
    async fn test_save_and_read_back_snapshot_rows() {
        let dir = tempdir().unwrap();
        let db = test_db(&dir).await;
        let b = bucket();

        db.save_server_status(b, "online", "[]").await.unwrap();
        let heartbeat = db.latest_server_status().await.unwrap().unwrap();
        assert_eq!(heartbeat.timestamp, b);
        assert_eq!(heartbeat.status, "online");

        let pair_id = db.save_trading_pair("XBTUSD", "XXBT", "ZUSD", b).await.unwrap();
        db.save_pair_info(pair_id, 42050.0, 123.45, 43000.0, 41000.0, b)
            .await
            .unwrap();
        db.save_historical_candle(pair_id, &candle(b)).await.unwrap();

        let pairs = db.get_trading_pairs().await.unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].name, "XBTUSD");
        assert_eq!(pairs[0].base, "XXBT");
        assert_eq!(pairs[0].last_updated, b);

        let infos = db.get_pair_info(pair_id).await.unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].price, 42050.0);
        assert_eq!(infos[0].volume_24h, 123.45);

        let candles = db.get_historical_data(pair_id).await.unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].open, 42000.0);
        assert_eq!(candles[0].timestamp, b);

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.status_rows, 1);
        assert_eq!(stats.latest_bucket, Some(b));
        db.close().await;
    }

    #[tokio::test]
    async fn test_pair_unique_per_bucket() {
        let dir = tempdir().unwrap();
        let db = test_db(&dir).await;
        let b = bucket();

        db.save_trading_pair("XBTUSD", "XXBT", "ZUSD", b).await.unwrap();
        // Same pair, same bucket: rejected
        assert!(db.save_trading_pair("XBTUSD", "XXBT", "ZUSD", b).await.is_err());
        // Same pair, next bucket: a fresh row
        let next = b + chrono::Duration::seconds(300);
        db.save_trading_pair("XBTUSD", "XXBT", "ZUSD", next).await.unwrap();
        assert_eq!(db.get_trading_pairs().await.unwrap().len(), 2);
        db.close().await;
    }

    #[tokio::test]
    async fn test_pairs_ordered_most_recent_first() {
        let dir = tempdir().unwrap();
        let db = test_db(&dir).await;
        let b = bucket();
        let next = b + chrono::Duration::seconds(300);

        db.save_trading_pair("ETHUSD", "XETH", "ZUSD", b).await.unwrap();
        db.save_trading_pair("XBTUSD", "XXBT", "ZUSD", next).await.unwrap();

        let pairs = db.get_trading_pairs().await.unwrap();
        assert_eq!(pairs[0].name, "XBTUSD");
        assert_eq!(pairs[1].name, "ETHUSD");
        db.close().await;
    }

    #[tokio::test]
    async fn test_import_snapshot_transactional_batch() {
        let dir = tempdir().unwrap();
        let db = test_db(&dir).await;
        let b = bucket();

        let rows = vec![
            ExportRow {
                pair: "XBTUSD".to_string(),
                candle: candle(b),
            },
            ExportRow {
                pair: "ETHUSD".to_string(),
                candle: candle(b),
            },
        ];

        let inserted = db.import_snapshot(b, &rows).await.unwrap();
        assert_eq!(inserted, 2);

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.pair_rows, 2);
        assert_eq!(stats.candle_rows, 2);
        db.close().await;
    }
}
