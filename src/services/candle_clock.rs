use crate::constants::CANDLE_INTERVAL_SECS;
use chrono::{DateTime, TimeZone, Utc};

/// Align an instant to the start of its enclosing 5-minute candle.
///
/// `bucket_of(t) <= t < bucket_of(t) + 300s` for every valid instant.
pub fn bucket_of(instant: DateTime<Utc>) -> DateTime<Utc> {
    let secs = instant.timestamp();
    let aligned = secs - secs.rem_euclid(CANDLE_INTERVAL_SECS);
    // rem_euclid keeps the remainder in [0, 300), so aligned is a valid epoch second
    Utc.timestamp_opt(aligned, 0).unwrap()
}

/// Bucket identifier usable as a sortable, parseable filename fragment:
/// `YYYYMMDD_HHMMSS`
pub fn bucket_id(bucket: DateTime<Utc>) -> String {
    bucket.format("%Y%m%d_%H%M%S").to_string()
}

/// Parse a `YYYYMMDD_HHMMSS` identifier back into a bucket instant
pub fn parse_bucket_id(id: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(id, "%Y%m%d_%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Human-readable bucket timestamp used in export rows: `YYYY-MM-DD HH:MM:SS`
pub fn format_bucket(bucket: DateTime<Utc>) -> String {
    bucket.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_alignment() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 7, 30).unwrap();
        let bucket = bucket_of(t);
        assert_eq!(bucket, Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap());
    }

    #[test]
    fn test_bucket_properties() {
        let instants = [
            Utc.timestamp_opt(0, 0).unwrap(),
            Utc.timestamp_opt(1, 0).unwrap(),
            Utc.timestamp_opt(299, 0).unwrap(),
            Utc.timestamp_opt(300, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 15, 23, 59, 59).unwrap(),
            Utc.with_ymd_and_hms(1969, 12, 31, 23, 58, 31).unwrap(),
        ];
        for t in instants {
            let bucket = bucket_of(t);
            assert_eq!(bucket.timestamp().rem_euclid(CANDLE_INTERVAL_SECS), 0);
            assert!(bucket <= t);
            assert!(t < bucket + chrono::Duration::seconds(CANDLE_INTERVAL_SECS));
        }
    }

    #[test]
    fn test_bucket_on_boundary_is_identity() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        assert_eq!(bucket_of(t), t);
    }

    #[test]
    fn test_bucket_id_format() {
        let bucket = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
        assert_eq!(bucket_id(bucket), "20240101_000500");
        assert_eq!(format_bucket(bucket), "2024-01-01 00:05:00");
    }

    #[test]
    fn test_bucket_id_roundtrip() {
        let bucket = Utc.with_ymd_and_hms(2025, 12, 31, 23, 55, 0).unwrap();
        assert_eq!(parse_bucket_id(&bucket_id(bucket)), Some(bucket));
        assert_eq!(parse_bucket_id("not_a_bucket"), None);
    }

    #[test]
    fn test_bucket_ids_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 23, 55, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert!(bucket_id(earlier) < bucket_id(later));
    }
}
