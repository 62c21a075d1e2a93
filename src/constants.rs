use std::path::PathBuf;
use std::time::Duration;

/// Kraken public API base (override with KRAKENTOP_API_BASE for tests/proxies)
pub const DEFAULT_API_BASE: &str = "https://api.kraken.com/0";

/// Per-call timeout for every upstream fetch
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// How many pairs a snapshot keeps, ranked by 24h volume
pub const TOP_PAIR_COUNT: usize = 10;

/// Snapshot bucket width in seconds (one Kraken 5-minute candle)
pub const CANDLE_INTERVAL_SECS: i64 = 300;

/// Kraken OHLC interval parameter, in minutes
pub const OHLC_INTERVAL_MINUTES: u32 = 5;

/// Export artifact naming: top10_5min_highlow_<YYYYMMDD>_<HHMMSS>.csv
pub const EXPORT_FILE_PREFIX: &str = "top10_5min_highlow_";
pub const EXPORT_FILE_SUFFIX: &str = ".csv";

/// Header row of every export artifact
pub const EXPORT_HEADER: [&str; 7] = [
    "Pair", "Timestamp", "Open", "High", "Low", "Close", "Volume",
];

/// Kraken API base URL from environment variable or default
pub fn api_base() -> String {
    std::env::var("KRAKENTOP_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string())
}

/// SQLite database path from environment variable or default
pub fn database_path() -> PathBuf {
    std::env::var("KRAKENTOP_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/krakentop.db"))
}

/// CSV export directory from environment variable or default
pub fn export_dir() -> PathBuf {
    std::env::var("KRAKENTOP_EXPORT_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("csv"))
}
