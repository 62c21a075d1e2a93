use crate::constants::{database_path, export_dir};
use crate::error::Result;
use crate::services::{Db, KrakenClient, Snapshotter};
use std::sync::Arc;

/// Run the snapshot pipeline once and exit
pub async fn run() -> Result<()> {
    let db = Db::connect(&database_path()).await?;
    let client = Arc::new(KrakenClient::new()?);
    let snapshotter = Snapshotter::new(client, db.clone(), export_dir());

    let outcome = snapshotter.run().await?;
    println!("{}", outcome.message());
    db.close().await;
    Ok(())
}
