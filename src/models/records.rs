use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// One heartbeat/audit row per pipeline run; appended, never updated
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ServerStatusRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub error: String,
}

/// One row per pair per bucket, keyed unique on (name, last_updated).
/// The id is assigned on insert and referenced by the child rows below.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TradingPairRecord {
    pub id: i64,
    pub name: String,
    pub base: String,
    pub quote: String,
    pub last_updated: DateTime<Utc>,
}

/// Live ticker snapshot for one pair in one bucket
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PairInfoRecord {
    pub id: i64,
    pub pair_id: i64,
    pub price: f64,
    pub volume_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub timestamp: DateTime<Utc>,
}

/// The 5-minute candle whose timestamp matches the bucket exactly
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HistoricalCandleRecord {
    pub id: i64,
    pub pair_id: i64,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}
