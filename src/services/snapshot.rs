use crate::constants::{OHLC_INTERVAL_MINUTES, TOP_PAIR_COUNT};
use crate::error::Result;
use crate::services::candle_clock::{bucket_of, format_bucket};
use crate::services::csv_export::{self, ExportRow};
use crate::services::database::Db;
use crate::services::kraken::{MarketDataSource, PairListing};
use crate::services::ranking::{select_top, PairVolume};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Result of one trigger of the snapshot pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotOutcome {
    /// This trigger executed the pipeline for the bucket
    Written {
        bucket: DateTime<Utc>,
        pairs_saved: usize,
    },
    /// The bucket was already recorded; the trigger collapsed into a
    /// prior execution
    AlreadyCurrent { bucket: DateTime<Utc> },
}

impl SnapshotOutcome {
    pub fn message(&self) -> String {
        match self {
            SnapshotOutcome::Written {
                bucket,
                pairs_saved,
            } => format!(
                "Snapshot saved for bucket {} ({} pairs)",
                format_bucket(*bucket),
                pairs_saved
            ),
            SnapshotOutcome::AlreadyCurrent { bucket } => format!(
                "Snapshot already recorded for bucket {}",
                format_bucket(*bucket)
            ),
        }
    }
}

#[derive(Debug, Default)]
struct SnapshotState {
    last_completed: Option<DateTime<Utc>>,
}

/// The snapshot pipeline: rank pairs by 24h volume, align to the current
/// 5-minute bucket, and record the bucket in the CSV and SQLite sinks.
///
/// Both the periodic worker and the manual HTTP trigger go through
/// `run`. A mutex over the pipeline state serializes executions and
/// deduplicates triggers that land in the same bucket, so overlapping
/// triggers cannot double-write a bucket.
pub struct Snapshotter<S: MarketDataSource> {
    source: Arc<S>,
    db: Db,
    export_dir: PathBuf,
    state: Mutex<SnapshotState>,
}

impl<S: MarketDataSource> Snapshotter<S> {
    /// The last-completed marker is seeded from the newest export
    /// artifact so a restart within a bucket does not re-run it.
    pub fn new(source: Arc<S>, db: Db, export_dir: PathBuf) -> Self {
        let last_completed = csv_export::latest_export(&export_dir)
            .ok()
            .flatten()
            .map(|(_, bucket)| bucket);
        if let Some(bucket) = last_completed {
            info!(bucket = %format_bucket(bucket), "Seeded last completed bucket from export directory");
        }
        Self {
            source,
            db,
            export_dir,
            state: Mutex::new(SnapshotState { last_completed }),
        }
    }

    pub fn export_dir(&self) -> &PathBuf {
        &self.export_dir
    }

    /// Trigger the pipeline for the bucket enclosing the current instant
    pub async fn run(&self) -> Result<SnapshotOutcome> {
        self.run_at(Utc::now()).await
    }

    /// Single-flight entry point: holds the state lock for the whole
    /// execution, so a concurrent trigger waits and then observes the
    /// completed bucket instead of running again.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<SnapshotOutcome> {
        let mut state = self.state.lock().await;
        let bucket = bucket_of(now);
        if state.last_completed == Some(bucket) {
            debug!(bucket = %format_bucket(bucket), "Trigger collapsed into prior execution");
            return Ok(SnapshotOutcome::AlreadyCurrent { bucket });
        }

        let outcome = self.execute(now, bucket).await?;
        state.last_completed = Some(bucket);
        Ok(outcome)
    }

    /// One full pipeline execution. Status and listing fetches are fatal
    /// to the run; everything per-pair is best effort.
    async fn execute(&self, now: DateTime<Utc>, bucket: DateTime<Utc>) -> Result<SnapshotOutcome> {
        self.source.server_status().await?;
        self.db.save_server_status(now, "online", "[]").await?;

        let listings = self.source.trading_pairs().await?;
        let selection = select_top(&listings, TOP_PAIR_COUNT);
        info!(
            bucket = %format_bucket(bucket),
            candidates = listings.len(),
            selected = selection.len(),
            "Ranked trading pairs"
        );

        // Tabular sink first; its failure never aborts the relational path
        match self.write_export_if_absent(bucket, &selection).await {
            Ok(true) => info!(bucket = %format_bucket(bucket), "Export artifact created"),
            Ok(false) => info!(bucket = %format_bucket(bucket), "Export artifact already present, skipping"),
            Err(e) => error!(error = %e, "Failed to write export artifact"),
        }

        let mut pairs_saved = 0;
        for sample in &selection {
            if self.persist_pair(sample, &listings, bucket).await {
                pairs_saved += 1;
            }
        }

        Ok(SnapshotOutcome::Written {
            bucket,
            pairs_saved,
        })
    }

    /// Relational sink for one pair: reference row, then ticker info row,
    /// then exact-match candle row. Sub-step failures skip only that
    /// sub-step; nothing already written is rolled back.
    async fn persist_pair(
        &self,
        sample: &PairVolume,
        listings: &HashMap<String, PairListing>,
        bucket: DateTime<Utc>,
    ) -> bool {
        let Some(listing) = listings.get(&sample.name) else {
            return false;
        };
        let (Some(base), Some(quote)) = (listing.base.as_deref(), listing.quote.as_deref()) else {
            warn!(pair = %sample.name, "Listing is missing base/quote, skipping pair");
            return false;
        };

        let pair_id = match self.db.save_trading_pair(&sample.name, base, quote, bucket).await {
            Ok(id) => id,
            Err(e) => {
                warn!(pair = %sample.name, error = %e, "Failed to save trading pair");
                return false;
            }
        };

        match self.source.pair_ticker(&sample.name).await {
            Ok(tickers) => match tickers.get(&sample.name) {
                Some(ticker) => {
                    match (
                        ticker.price(),
                        ticker.volume_24h(),
                        ticker.high_24h(),
                        ticker.low_24h(),
                    ) {
                        (Some(price), Some(volume), Some(high), Some(low)) => {
                            if let Err(e) = self
                                .db
                                .save_pair_info(pair_id, price, volume, high, low, bucket)
                                .await
                            {
                                warn!(pair = %sample.name, error = %e, "Failed to save pair info");
                            }
                        }
                        _ => warn!(pair = %sample.name, "Ticker detail is missing fields, skipping info row"),
                    }
                }
                None => warn!(pair = %sample.name, "Ticker detail response has no entry for pair"),
            },
            Err(e) => warn!(pair = %sample.name, error = %e, "Failed to fetch ticker detail"),
        }

        match self
            .source
            .ohlc(&sample.name, OHLC_INTERVAL_MINUTES, bucket.timestamp())
            .await
        {
            Ok(candles) => match candles.iter().find(|c| c.timestamp == bucket) {
                Some(candle) => {
                    if let Err(e) = self.db.save_historical_candle(pair_id, candle).await {
                        warn!(pair = %sample.name, error = %e, "Failed to save historical candle");
                    }
                }
                None => debug!(pair = %sample.name, "No candle matches the bucket exactly"),
            },
            Err(e) => warn!(pair = %sample.name, error = %e, "Failed to fetch candle series"),
        }

        true
    }

    /// Tabular sink: skip when the newest artifact already covers this
    /// bucket; otherwise fetch each selected pair's candle series and
    /// write one row per exact-timestamp match.
    async fn write_export_if_absent(
        &self,
        bucket: DateTime<Utc>,
        selection: &[PairVolume],
    ) -> Result<bool> {
        if csv_export::is_up_to_date(&self.export_dir, bucket)? {
            return Ok(false);
        }

        let mut rows = Vec::with_capacity(selection.len());
        for sample in selection {
            match self
                .source
                .ohlc(&sample.name, OHLC_INTERVAL_MINUTES, bucket.timestamp())
                .await
            {
                Ok(candles) => match candles.into_iter().find(|c| c.timestamp == bucket) {
                    Some(candle) => rows.push(ExportRow {
                        pair: sample.name.clone(),
                        candle,
                    }),
                    None => debug!(pair = %sample.name, "No exact-match candle for export row"),
                },
                Err(e) => warn!(pair = %sample.name, error = %e, "Export row fetch failed, omitting pair"),
            }
        }

        csv_export::write_export(&self.export_dir, bucket, &rows)?;
        Ok(true)
    }
}
