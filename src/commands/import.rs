use crate::constants::{database_path, export_dir};
use crate::error::Result;
use crate::services::csv_export::{list_exports, read_export_rows};
use crate::services::candle_clock::format_bucket;
use crate::services::Db;
use std::path::PathBuf;
use tracing::{error, info};

/// Bulk-load existing export artifacts into the relational store through
/// the transactional batch path. A malformed artifact is skipped whole;
/// a partially imported artifact never happens.
pub async fn run(dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(export_dir);
    let db = Db::connect(&database_path()).await?;

    let exports = list_exports(&dir)?;
    if exports.is_empty() {
        println!("No export artifacts found in {}", dir.display());
        db.close().await;
        return Ok(());
    }

    let mut imported_files = 0;
    let mut imported_rows = 0;
    for (path, bucket) in exports {
        let rows = match read_export_rows(&path) {
            Ok(rows) => rows,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Skipping unreadable artifact");
                continue;
            }
        };

        match db.import_snapshot(bucket, &rows).await {
            Ok(inserted) => {
                info!(
                    path = %path.display(),
                    bucket = %format_bucket(bucket),
                    rows = inserted,
                    "Imported artifact"
                );
                imported_files += 1;
                imported_rows += inserted;
            }
            Err(e) => error!(path = %path.display(), error = %e, "Artifact import rolled back"),
        }
    }

    println!(
        "Imported {} rows from {} artifacts in {}",
        imported_rows,
        imported_files,
        dir.display()
    );
    db.close().await;
    Ok(())
}
