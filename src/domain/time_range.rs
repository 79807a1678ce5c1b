//! Half-open UTC time ranges and the timestamp text format used on disk.

use crate::domain::error::SyncError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

/// Text format for watermarks, series dates and CLI arguments.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `[start, end)` in UTC at second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, SyncError> {
        if start >= end {
            return Err(SyncError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Whether an epoch-seconds instant falls inside the range.
    pub fn contains_epoch(&self, secs: i64) -> bool {
        secs >= self.start.timestamp() && secs < self.end.timestamp()
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            format_timestamp(self.start),
            format_timestamp(self.end)
        )
    }
}

pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(input.trim(), TIMESTAMP_FORMAT).map(|n| n.and_utc())
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Most recent daily collection cutoff at or before `now`.
///
/// Raw files for a day are complete `cutoff_minutes` after midnight UTC, so a
/// sync never reaches past that instant.
pub fn collection_cutoff(now: DateTime<Utc>, cutoff_minutes: u32) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc();
    let today = midnight + TimeDelta::minutes(i64::from(cutoff_minutes));
    if today <= now {
        today
    } else {
        today - TimeDelta::days(1)
    }
}

/// Backtest window offered to users once data is synced up to `watermark`:
/// `(max_from, max_to)` where `max_to` is the day before the watermark date.
pub fn available_window(watermark: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
    let max_to = watermark.date_naive() - TimeDelta::days(1);
    let max_from = max_to - TimeDelta::days(1);
    (max_from, max_to)
}
