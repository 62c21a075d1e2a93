pub mod candle_clock;
pub mod csv_export;
pub mod database;
pub mod kraken;
pub mod ranking;
pub mod snapshot;

pub use database::Db;
pub use kraken::{KrakenClient, MarketDataSource};
pub use ranking::select_top;
pub use snapshot::{SnapshotOutcome, Snapshotter};
