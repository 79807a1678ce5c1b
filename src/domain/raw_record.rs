//! Raw trade-aggregate rows as produced by the collector.

use crate::domain::minute_bar::{floor_to_minute, MinuteBar};
use chrono::{DateTime, Utc};

/// Columns a raw aggregate file must carry to be usable.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "symbol",
    "eventTime",
    "openPrice",
    "highPrice",
    "lowPrice",
    "price",
    "volume",
];

#[derive(Debug, Clone, PartialEq)]
pub struct RawAggregateRecord {
    pub symbol: String,
    pub event_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    /// Last traded price in the aggregate, used as the bar close.
    pub close: f64,
    pub volume: f64,
}

impl RawAggregateRecord {
    /// Minute bar with the event time floored to the minute.
    pub fn to_bar(&self) -> MinuteBar {
        MinuteBar {
            timestamp: floor_to_minute(self.event_time),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}
