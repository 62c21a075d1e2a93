mod records;

pub use records::{HistoricalCandleRecord, PairInfoRecord, ServerStatusRecord, TradingPairRecord};
