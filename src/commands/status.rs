use crate::constants::{database_path, export_dir};
use crate::error::Result;
use crate::services::csv_export::latest_export;
use crate::services::candle_clock::format_bucket;
use crate::services::Db;

/// Print database and export-directory statistics
pub async fn run() -> Result<()> {
    let db_path = database_path();
    let db = Db::connect(&db_path).await?;
    let stats = db.stats().await?;

    println!("Database: {}", db_path.display());
    println!("  status rows:     {}", stats.status_rows);
    println!("  trading pairs:   {}", stats.pair_rows);
    println!("  pair info rows:  {}", stats.info_rows);
    println!("  candle rows:     {}", stats.candle_rows);
    match stats.latest_bucket {
        Some(bucket) => println!("  latest bucket:   {}", format_bucket(bucket)),
        None => println!("  latest bucket:   (none)"),
    }
    match db.latest_server_status().await? {
        Some(status) => println!(
            "  last heartbeat:  {} ({})",
            format_bucket(status.timestamp),
            status.status
        ),
        None => println!("  last heartbeat:  (none)"),
    }

    let dir = export_dir();
    match latest_export(&dir)? {
        Some((path, bucket)) => println!(
            "Latest export: {} (bucket {})",
            path.display(),
            format_bucket(bucket)
        ),
        None => println!("Latest export: (none in {})", dir.display()),
    }

    db.close().await;
    Ok(())
}
