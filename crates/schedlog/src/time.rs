// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Capture timestamps, row wall clocks and query intervals
//!
//! Exports carry time in two halves: the capture date and start time are
//! embedded in the filename (`CMAC_dlUeTtiInfo_20240311101500.csv`), and each
//! row holds only a wall-clock-of-day string (`10:15:03:250`). A full row
//! timestamp is the filename date combined with the row's wall clock.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};

/// Rows whose wall clock lags the capture start by more than this are
/// assumed to have crossed midnight.
const ROLLOVER_THRESHOLD_HOURS: i64 = 12;

/// Inclusive `[start, end]` time bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeInterval {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimeInterval {
    /// Create an interval, rejecting `start > end`
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidTimeInterval {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse both bounds from filename-style stamps (`YYYYMMDDhhmmss`) or
    /// ISO-8601 (`2024-03-11 10:15:00`, `2024-03-11T10:15:00.5`)
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let invalid = || Error::InvalidTimeInterval {
            start: start.to_string(),
            end: end.to_string(),
        };
        let s = parse_timestamp_text(start).ok_or_else(invalid)?;
        let e = parse_timestamp_text(end).ok_or_else(invalid)?;
        Self::new(s, e)
    }

    #[must_use]
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    #[must_use]
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Bounds as microseconds since the epoch, for comparisons against
    /// timestamp columns
    #[must_use]
    pub fn micros(&self) -> (i64, i64) {
        (to_micros(self.start), to_micros(self.end))
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

#[must_use]
pub fn to_micros(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_micros()
}

#[must_use]
pub fn from_micros(micros: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

fn digits(s: &str, range: std::ops::Range<usize>) -> Option<u32> {
    s.get(range)?.parse().ok()
}

/// Parse the capture timestamp suffix of an export filename.
///
/// Accepted: `YYYYMMDDhhmmss`, `YYYYMMDDhhmmssSSS`, `YYYYMMDDhhmm`, `YYYYMMDD`.
/// The error string explains why the stamp was rejected.
pub fn parse_capture_stamp(stamp: &str) -> std::result::Result<NaiveDateTime, String> {
    if stamp.is_empty() || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("capture timestamp {stamp:?} is not numeric"));
    }

    let field = |range| digits(stamp, range).ok_or_else(|| format!("bad field in {stamp:?}"));
    let (hour, minute, second, milli) = match stamp.len() {
        8 => (0, 0, 0, 0),
        12 => (field(8..10)?, field(10..12)?, 0, 0),
        14 => (field(8..10)?, field(10..12)?, field(12..14)?, 0),
        17 => (
            field(8..10)?,
            field(10..12)?,
            field(12..14)?,
            field(14..17)?,
        ),
        n => return Err(format!("capture timestamp {stamp:?} has unsupported length {n}")),
    };

    let year = i32::try_from(field(0..4)?).map_err(|e| e.to_string())?;
    NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)
        .and_then(|date| date.and_hms_milli_opt(hour, minute, second, milli))
        .ok_or_else(|| format!("capture timestamp {stamp:?} is not a valid date/time"))
}

/// Parse a user-supplied timestamp: a filename-style stamp or ISO-8601
#[must_use]
pub fn parse_timestamp_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(ts) = parse_capture_stamp(text) {
        return Some(ts);
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse a row wall clock.
///
/// The decoder writes `hh:mm:ss:mmm` with milliseconds as the fourth field,
/// sometimes padded with spaces; a fractional millisecond part carries
/// sub-millisecond resolution. `hh:mm:ss.ffffff` is accepted as well.
#[must_use]
pub fn parse_wall_clock(text: &str) -> Option<NaiveTime> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let parts: Vec<&str> = compact.split(':').collect();
    match parts.as_slice() {
        [h, m, s, ms] => {
            let millis: f64 = ms.parse().ok()?;
            if !(0.0..1000.0).contains(&millis) {
                return None;
            }
            let micros = ((millis * 1000.0).round() as u32).min(999_999);
            NaiveTime::from_hms_micro_opt(h.parse().ok()?, m.parse().ok()?, s.parse().ok()?, micros)
        }
        [_, _, _] => NaiveTime::parse_from_str(&compact, "%H:%M:%S%.f").ok(),
        _ => None,
    }
}

/// Attach a row wall clock to the capture date of its file
#[must_use]
pub fn combine(capture_start: NaiveDateTime, wall: NaiveTime) -> NaiveDateTime {
    let ts = capture_start.date().and_time(wall);
    if capture_start - ts > Duration::hours(ROLLOVER_THRESHOLD_HOURS) {
        ts + Duration::days(1)
    } else {
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp_text(s).expect("valid test timestamp")
    }

    #[test]
    fn test_capture_stamp_formats() {
        assert_eq!(
            parse_capture_stamp("20240311101500").ok(),
            Some(ts("2024-03-11 10:15:00"))
        );
        assert_eq!(
            parse_capture_stamp("20240311101500250").ok(),
            Some(ts("2024-03-11 10:15:00.250"))
        );
        assert_eq!(
            parse_capture_stamp("202403111015").ok(),
            Some(ts("2024-03-11 10:15:00"))
        );
        assert_eq!(
            parse_capture_stamp("20240311").ok(),
            Some(ts("2024-03-11 00:00:00"))
        );
    }

    #[test]
    fn test_capture_stamp_rejects() {
        assert!(parse_capture_stamp("").is_err());
        assert!(parse_capture_stamp("2024031110150x").is_err());
        assert!(parse_capture_stamp("2024031").is_err());
        assert!(parse_capture_stamp("20241311101500").is_err());
        assert!(parse_capture_stamp("20240311256000").is_err());
    }

    #[test]
    fn test_wall_clock() {
        assert_eq!(
            parse_wall_clock("10:15:03:250"),
            NaiveTime::from_hms_milli_opt(10, 15, 3, 250)
        );
        assert_eq!(
            parse_wall_clock(" 10: 15: 03: 007"),
            NaiveTime::from_hms_milli_opt(10, 15, 3, 7)
        );
        assert_eq!(
            parse_wall_clock("10:15:03:250.5"),
            NaiveTime::from_hms_micro_opt(10, 15, 3, 250_500)
        );
        assert_eq!(
            parse_wall_clock("10:15:03.125"),
            NaiveTime::from_hms_milli_opt(10, 15, 3, 125)
        );
        assert_eq!(parse_wall_clock("10:15"), None);
        assert_eq!(parse_wall_clock("10:15:03:1000"), None);
        assert_eq!(parse_wall_clock("-"), None);
    }

    #[test]
    fn test_combine_rolls_over_midnight() {
        let capture = ts("2024-03-11 23:59:58");
        let same_day = combine(capture, NaiveTime::from_hms_opt(23, 59, 59).expect("time"));
        assert_eq!(same_day, ts("2024-03-11 23:59:59"));

        let next_day = combine(capture, NaiveTime::from_hms_opt(0, 0, 1).expect("time"));
        assert_eq!(next_day, ts("2024-03-12 00:00:01"));

        // Slightly before the capture start stays on the same day
        let early = combine(capture, NaiveTime::from_hms_opt(23, 59, 50).expect("time"));
        assert_eq!(early, ts("2024-03-11 23:59:50"));
    }

    #[test]
    fn test_interval() -> Result<()> {
        let interval = TimeInterval::parse("20240311100000", "2024-03-11 10:00:10")?;
        assert!(interval.contains(ts("2024-03-11 10:00:10")));
        assert!(!interval.contains(ts("2024-03-11 10:00:10.001")));
        assert_eq!(interval.duration(), Duration::seconds(10));

        assert!(matches!(
            TimeInterval::parse("20240311100010", "20240311100000"),
            Err(Error::InvalidTimeInterval { .. })
        ));
        assert!(matches!(
            TimeInterval::parse("yesterday", "20240311100000"),
            Err(Error::InvalidTimeInterval { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_micros_roundtrip() {
        let t = ts("2024-03-11 10:15:03.250500");
        assert_eq!(from_micros(to_micros(t)), Some(t));
    }
}
