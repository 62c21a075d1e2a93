use crate::constants::{EXPORT_FILE_PREFIX, EXPORT_FILE_SUFFIX, EXPORT_HEADER};
use crate::error::{AppError, Result};
use crate::services::candle_clock::{bucket_id, format_bucket, parse_bucket_id};
use crate::services::kraken::Candle;
use chrono::{DateTime, NaiveDate, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One export artifact line: a pair and its exact-match bucket candle
#[derive(Debug, Clone)]
pub struct ExportRow {
    pub pair: String,
    pub candle: Candle,
}

/// Artifact name for a bucket: `top10_5min_highlow_<YYYYMMDD>_<HHMMSS>.csv`
pub fn export_filename(bucket: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        EXPORT_FILE_PREFIX,
        bucket_id(bucket),
        EXPORT_FILE_SUFFIX
    )
}

/// Recover the bucket encoded in an artifact name; `None` for anything
/// that does not follow the naming scheme.
pub fn parse_export_filename(name: &str) -> Option<DateTime<Utc>> {
    let id = name
        .strip_prefix(EXPORT_FILE_PREFIX)?
        .strip_suffix(EXPORT_FILE_SUFFIX)?;
    parse_bucket_id(id)
}

/// All artifacts in the export directory, oldest first. A missing
/// directory is an empty listing, not an error.
pub fn list_exports(dir: &Path) -> Result<Vec<(PathBuf, DateTime<Utc>)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut exports = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(bucket) = name.to_str().and_then(parse_export_filename) {
            exports.push((entry.path(), bucket));
        }
    }
    exports.sort_by_key(|(_, bucket)| *bucket);
    Ok(exports)
}

/// Most recent artifact in the export directory, if any
pub fn latest_export(dir: &Path) -> Result<Option<(PathBuf, DateTime<Utc>)>> {
    Ok(list_exports(dir)?.into_iter().max_by_key(|(_, bucket)| *bucket))
}

/// Most recent artifact whose bucket falls on the given calendar date
pub fn export_for_date(dir: &Path, date: NaiveDate) -> Result<Option<PathBuf>> {
    Ok(list_exports(dir)?
        .into_iter()
        .filter(|(_, bucket)| bucket.date_naive() == date)
        .max_by_key(|(_, bucket)| *bucket)
        .map(|(path, _)| path))
}

/// Whether an artifact for `bucket` already exists (idempotence guard:
/// the most recent artifact's bucket equals the current one)
pub fn is_up_to_date(dir: &Path, bucket: DateTime<Utc>) -> Result<bool> {
    Ok(matches!(latest_export(dir)?, Some((_, latest)) if latest == bucket))
}

/// Write one artifact for `bucket`. The directory is created if absent;
/// an existing artifact for the same bucket is overwritten (callers
/// check `is_up_to_date` first).
pub fn write_export(dir: &Path, bucket: DateTime<Utc>, rows: &[ExportRow]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_filename(bucket));

    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(EXPORT_HEADER)?;
    for row in rows {
        writer.write_record(&[
            row.pair.clone(),
            format_bucket(row.candle.timestamp),
            format!("{:?}", row.candle.open),
            format!("{:?}", row.candle.high),
            format!("{:?}", row.candle.low),
            format!("{:?}", row.candle.close),
            format!("{:?}", row.candle.volume),
        ])?;
    }
    writer.flush().map_err(AppError::from)?;

    debug!(path = %path.display(), rows = rows.len(), "Export artifact written");
    Ok(path)
}

fn row_field<'r>(record: &'r csv::StringRecord, path: &Path, index: usize) -> Result<&'r str> {
    record.get(index).ok_or_else(|| {
        AppError::Parse(format!("{}: row has fewer than 7 fields", path.display()))
    })
}

fn row_number(record: &csv::StringRecord, path: &Path, index: usize) -> Result<f64> {
    let raw = row_field(record, path, index)?;
    raw.parse()
        .map_err(|_| AppError::Parse(format!("{}: invalid number {:?}", path.display(), raw)))
}

/// Read an artifact back into rows (used by the import command).
/// Any malformed row fails the whole artifact.
pub fn read_export_rows(path: &Path) -> Result<Vec<ExportRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        let raw_timestamp = row_field(&record, path, 1)?;
        let timestamp = chrono::NaiveDateTime::parse_from_str(raw_timestamp, "%Y-%m-%d %H:%M:%S")
            .map_err(|_| {
                AppError::Parse(format!(
                    "{}: invalid timestamp {:?}",
                    path.display(),
                    raw_timestamp
                ))
            })?
            .and_utc();

        rows.push(ExportRow {
            pair: row_field(&record, path, 0)?.to_string(),
            candle: Candle {
                timestamp,
                open: row_number(&record, path, 2)?,
                high: row_number(&record, path, 3)?,
                low: row_number(&record, path, 4)?,
                close: row_number(&record, path, 5)?,
                volume: row_number(&record, path, 6)?,
            },
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn bucket(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "Pair,Timestamp,Open,High,Low,Close,Volume\n").unwrap();
    }

    #[test]
    fn test_filename_roundtrip() {
        let b = bucket(2024, 1, 1, 0, 5);
        let name = export_filename(b);
        assert_eq!(name, "top10_5min_highlow_20240101_000500.csv");
        assert_eq!(parse_export_filename(&name), Some(b));
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert_eq!(parse_export_filename("notes.txt"), None);
        assert_eq!(parse_export_filename("top10_5min_highlow_garbage.csv"), None);
        assert_eq!(parse_export_filename("top10_5min_highlow_20240101.csv"), None);
    }

    #[test]
    fn test_latest_export_picks_newest() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "top10_5min_highlow_20240101_000000.csv");
        touch(dir.path(), "top10_5min_highlow_20240102_001500.csv");
        touch(dir.path(), "top10_5min_highlow_20240101_235500.csv");
        touch(dir.path(), "unrelated.csv");

        let (path, latest) = latest_export(dir.path()).unwrap().unwrap();
        assert_eq!(latest, bucket(2024, 1, 2, 0, 15));
        assert!(path.ends_with("top10_5min_highlow_20240102_001500.csv"));
    }

    #[test]
    fn test_latest_export_empty_or_missing_dir() {
        let dir = tempdir().unwrap();
        assert!(latest_export(dir.path()).unwrap().is_none());
        assert!(latest_export(&dir.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn test_export_for_date_filters_by_day() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "top10_5min_highlow_20240101_000500.csv");
        touch(dir.path(), "top10_5min_highlow_20240101_001000.csv");
        touch(dir.path(), "top10_5min_highlow_20240102_000500.csv");

        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let path = export_for_date(dir.path(), date).unwrap().unwrap();
        assert!(path.ends_with("top10_5min_highlow_20240101_001000.csv"));

        let missing = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        assert!(export_for_date(dir.path(), missing).unwrap().is_none());
    }

    #[test]
    fn test_is_up_to_date() {
        let dir = tempdir().unwrap();
        let b = bucket(2024, 1, 1, 0, 5);
        assert!(!is_up_to_date(dir.path(), b).unwrap());

        touch(dir.path(), &export_filename(b));
        assert!(is_up_to_date(dir.path(), b).unwrap());
        assert!(!is_up_to_date(dir.path(), bucket(2024, 1, 1, 0, 10)).unwrap());
    }

    #[test]
    fn test_write_export_contents() {
        let dir = tempdir().unwrap();
        let b = bucket(2024, 1, 1, 0, 5);
        let rows = vec![ExportRow {
            pair: "XBTUSD".to_string(),
            candle: Candle {
                timestamp: b,
                open: 42000.0,
                high: 42100.5,
                low: 41900.0,
                close: 42050.0,
                volume: 1.5,
            },
        }];

        let path = write_export(dir.path(), b, &rows).unwrap();
        let contents = fs::read_to_string(path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Pair,Timestamp,Open,High,Low,Close,Volume"
        );
        assert_eq!(
            lines.next().unwrap(),
            "XBTUSD,2024-01-01 00:05:00,42000.0,42100.5,41900.0,42050.0,1.5"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_read_export_rows_roundtrip() {
        let dir = tempdir().unwrap();
        let b = bucket(2024, 1, 1, 0, 5);
        let rows = vec![ExportRow {
            pair: "XBTUSD".to_string(),
            candle: Candle {
                timestamp: b,
                open: 42000.0,
                high: 42100.5,
                low: 41900.0,
                close: 42050.0,
                volume: 1.5,
            },
        }];

        let path = write_export(dir.path(), b, &rows).unwrap();
        let read = read_export_rows(&path).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].pair, "XBTUSD");
        assert_eq!(read[0].candle, rows[0].candle);
    }

    #[test]
    fn test_read_export_rows_rejects_malformed_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("top10_5min_highlow_20240101_000500.csv");
        fs::write(
            &path,
            "Pair,Timestamp,Open,High,Low,Close,Volume\nXBTUSD,not-a-timestamp,1,1,1,1,1\n",
        )
        .unwrap();
        assert!(read_export_rows(&path).is_err());
    }

    #[test]
    fn test_list_exports_sorted_oldest_first() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "top10_5min_highlow_20240102_000500.csv");
        touch(dir.path(), "top10_5min_highlow_20240101_000500.csv");

        let exports = list_exports(dir.path()).unwrap();
        assert_eq!(exports.len(), 2);
        assert!(exports[0].1 < exports[1].1);
    }
}
