//! Temporal parsing for source text values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::{ErrorKind, SyncResult};
use crate::sync_error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S%.f";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
// The source renders zone offsets both as `+HH` and `+HH:MM`.
pub const TIMESTAMPTZ_FORMAT_HHMM: &str = "%Y-%m-%d %H:%M:%S%.f%#z";
pub const TIMESTAMPTZ_FORMAT_HH_MM: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// Open-ended range sentinels the source emits for timestamp columns,
/// pinned to the representable extremes.
pub fn timestamp_sentinel(s: &str) -> Option<NaiveDateTime> {
    match s {
        "infinity" => Some(NaiveDateTime::MAX),
        "-infinity" => Some(NaiveDateTime::MIN),
        _ => None,
    }
}

pub fn timestamptz_sentinel(s: &str) -> Option<DateTime<Utc>> {
    match s {
        "infinity" => Some(DateTime::<Utc>::MAX_UTC),
        "-infinity" => Some(DateTime::<Utc>::MIN_UTC),
        _ => None,
    }
}

pub fn parse_date(s: &str) -> SyncResult<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| {
        sync_error!(
            ErrorKind::ConversionError,
            "Invalid date value",
            format!("'{s}': {e}")
        )
    })
}

pub fn parse_time(s: &str) -> SyncResult<NaiveTime> {
    NaiveTime::parse_from_str(s, TIME_FORMAT).map_err(|e| {
        sync_error!(
            ErrorKind::ConversionError,
            "Invalid time value",
            format!("'{s}': {e}")
        )
    })
}

pub fn parse_timestamp(s: &str) -> SyncResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).map_err(|e| {
        sync_error!(
            ErrorKind::ConversionError,
            "Invalid timestamp value",
            format!("'{s}': {e}")
        )
    })
}

/// Parses a zoned timestamp and normalizes it to UTC.
pub fn parse_timestamptz(s: &str) -> SyncResult<DateTime<Utc>> {
    DateTime::parse_from_str(s, TIMESTAMPTZ_FORMAT_HHMM)
        .or_else(|_| DateTime::parse_from_str(s, TIMESTAMPTZ_FORMAT_HH_MM))
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            sync_error!(
                ErrorKind::ConversionError,
                "Invalid timestamptz value",
                format!("'{s}': {e}")
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dates() {
        let date = parse_date("2024-03-15").unwrap();
        assert_eq!(date.to_string(), "2024-03-15");
        assert!(parse_date("15/03/2024").is_err());
    }

    #[test]
    fn parses_times_with_and_without_fraction() {
        assert!(parse_time("12:34:56").is_ok());
        assert!(parse_time("12:34:56.789123").is_ok());
        assert!(parse_time("25:00:00").is_err());
    }

    #[test]
    fn parses_timestamps() {
        let ts = parse_timestamp("2024-03-15 12:34:56.5").unwrap();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "2024-03-15 12:34:56.500");
        assert!(parse_timestamp("2024-03-15T12:34:56").is_err());
    }

    #[test]
    fn parses_zoned_timestamps_to_utc() {
        let ts = parse_timestamptz("2024-03-15 12:34:56+02").unwrap();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "2024-03-15 10:34:56");

        let ts = parse_timestamptz("2024-03-15 12:34:56.25+05:30").unwrap();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "2024-03-15 07:04:56.250");
    }

    #[test]
    fn infinity_sentinels_pin_to_extremes() {
        assert_eq!(timestamp_sentinel("infinity"), Some(NaiveDateTime::MAX));
        assert_eq!(timestamp_sentinel("-infinity"), Some(NaiveDateTime::MIN));
        assert_eq!(timestamp_sentinel("Infinity"), None);
        assert_eq!(timestamptz_sentinel("infinity"), Some(DateTime::<Utc>::MAX_UTC));
        assert_eq!(timestamptz_sentinel("-infinity"), Some(DateTime::<Utc>::MIN_UTC));
    }
}
