//! Artifact naming: `<backup>-<unit>-<YYYYMMDD_HHMMSS>`.
//!
//! The timestamp is fixed width and zero padded, so sorting keys as strings
//! sorts them by creation time.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;

pub static TIME_FORMAT: &str = "%Y%m%d_%H%M%S";
const TIME_LEN: usize = "YYYYmmdd_HHMMSS".len();

/// Base name drivers give their raw artifacts.
#[cfg(test)]
pub fn artifact_base_name(backup_name: &str, unit: &str, dt: DateTime<Utc>) -> String {
    format!("{}-{}-{}", backup_name, unit, dt.format(TIME_FORMAT))
}

/// Extracts the UTC timestamp embedded in an artifact key such as
/// `prefix/site-www-20240102_030405.tar.gz.enc`.
pub fn timestamp_from_key(key: &str) -> Option<DateTime<Utc>> {
    let file_name = Path::new(key).file_name()?.to_str()?;
    let stem = file_name.split('.').next()?;
    if stem.len() < TIME_LEN {
        return None;
    }
    let time = stem.get(stem.len() - TIME_LEN..)?;
    NaiveDateTime::parse_from_str(time, TIME_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_base_name() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            artifact_base_name("folder-site", "site", dt),
            "folder-site-site-20240102_030405"
        );
    }

    #[test]
    fn test_timestamp_from_key() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            timestamp_from_key("backups/site/folder-site-site-20240102_030405.tar.gz.enc"),
            Some(dt)
        );
        assert_eq!(timestamp_from_key("b-20240102_000000.enc").map(|d| d.timestamp()),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap().timestamp()));
        assert_eq!(timestamp_from_key("prefix/readme.txt"), None);
        assert_eq!(timestamp_from_key("prefix/"), None);
    }

    #[test]
    fn test_lexicographic_equals_chronological() {
        let a = artifact_base_name("b", "u", Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap());
        let b = artifact_base_name("b", "u", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert!(a < b);
    }
}
