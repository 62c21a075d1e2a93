use crate::constants::CANDLE_INTERVAL_SECS;
use crate::services::kraken::MarketDataSource;
use crate::services::snapshot::{SnapshotOutcome, Snapshotter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Periodic trigger: fires every 5 minutes for the lifetime of the
/// process. Each firing runs on its own task so a slow pipeline never
/// delays the next firing; the snapshotter's single-flight guard
/// collapses any overlap into one execution per bucket.
pub async fn run<S: MarketDataSource + 'static>(snapshotter: Arc<Snapshotter<S>>) {
    info!(
        interval_secs = CANDLE_INTERVAL_SECS,
        "Starting snapshot worker"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(CANDLE_INTERVAL_SECS as u64));
    // The serve command runs the first snapshot itself
    ticker.tick().await;

    let mut iteration = 0u64;
    loop {
        ticker.tick().await;
        iteration += 1;

        let snapshotter = snapshotter.clone();
        tokio::spawn(async move {
            match snapshotter.run().await {
                Ok(SnapshotOutcome::Written {
                    bucket,
                    pairs_saved,
                }) => info!(
                    worker = "Snapshot",
                    iteration,
                    bucket = %bucket,
                    pairs_saved,
                    "Periodic snapshot saved"
                ),
                Ok(SnapshotOutcome::AlreadyCurrent { bucket }) => info!(
                    worker = "Snapshot",
                    iteration,
                    bucket = %bucket,
                    "Bucket already recorded, nothing to do"
                ),
                Err(e) => error!(
                    worker = "Snapshot",
                    iteration,
                    error = %e,
                    "Periodic snapshot failed"
                ),
            }
        });
    }
}
