use crate::constants::{database_path, export_dir};
use crate::error::Result;
use crate::server::{self, AppState};
use crate::services::{Db, KrakenClient, Snapshotter};
use crate::worker;
use std::sync::Arc;
use tracing::{error, info};

/// Start the snapshot service: initial snapshot, periodic worker, HTTP API
pub async fn run(port: u16) -> Result<()> {
    let db = Db::connect(&database_path()).await?;
    let client = Arc::new(KrakenClient::new()?);
    let snapshotter = Arc::new(Snapshotter::new(client.clone(), db.clone(), export_dir()));

    info!("Running initial snapshot");
    match snapshotter.run().await {
        Ok(outcome) => info!(message = %outcome.message(), "Initial snapshot finished"),
        Err(e) => error!(error = %e, "Initial snapshot failed, continuing startup"),
    }

    let worker_snapshotter = snapshotter.clone();
    tokio::spawn(async move {
        worker::run_snapshot_worker(worker_snapshotter).await;
    });

    server::serve(
        AppState {
            client,
            db,
            snapshotter,
        },
        port,
    )
    .await
}
