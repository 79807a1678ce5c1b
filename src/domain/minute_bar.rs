//! Minute bars and per-asset series.

use chrono::{DateTime, TimeDelta, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct MinuteBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Drop seconds and sub-second precision.
pub fn floor_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    let seconds = ts.timestamp().rem_euclid(60);
    let nanos = i64::from(ts.timestamp_subsec_nanos());
    ts - TimeDelta::seconds(seconds) - TimeDelta::nanoseconds(nanos)
}

/// A stretch of missing minutes between two consecutive bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub after: DateTime<Utc>,
    pub before: DateTime<Utc>,
}

impl Gap {
    pub fn missing_minutes(&self) -> i64 {
        (self.before - self.after).num_minutes() - 1
    }
}

/// Ordered minute bars for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSeries {
    pub symbol: String,
    pub bars: Vec<MinuteBar>,
}

impl AssetSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<MinuteBar>) -> Self {
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// First and last timestamps, if any bars exist.
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.bars.first(), self.bars.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }

    pub fn is_strictly_increasing(&self) -> bool {
        self.bars
            .windows(2)
            .all(|pair| pair[0].timestamp < pair[1].timestamp)
    }

    /// True gaps: neighbours more than one minute apart. These are kept as-is
    /// in storage, never zero-filled.
    pub fn gaps(&self) -> Vec<Gap> {
        self.bars
            .windows(2)
            .filter(|pair| pair[1].timestamp - pair[0].timestamp > TimeDelta::minutes(1))
            .map(|pair| Gap {
                after: pair[0].timestamp,
                before: pair[1].timestamp,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::time_range::parse_timestamp;

    fn bar(ts: &str) -> MinuteBar {
        MinuteBar {
            timestamp: parse_timestamp(ts).unwrap(),
            open: 6400.0,
            high: 6410.0,
            low: 6395.0,
            close: 6405.0,
            volume: 12.5,
        }
    }

    #[test]
    fn floor_drops_seconds() {
        let ts = parse_timestamp("2018-11-01 00:03:59").unwrap();
        assert_eq!(
            floor_to_minute(ts),
            parse_timestamp("2018-11-01 00:03:00").unwrap()
        );
    }

    #[test]
    fn floor_drops_subsecond_precision() {
        let ts = DateTime::from_timestamp(1_541_030_427, 999_000_000).unwrap();
        assert_eq!(floor_to_minute(ts).timestamp(), 1_541_030_400);
        assert_eq!(floor_to_minute(ts).timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn floor_is_identity_on_whole_minutes() {
        let ts = parse_timestamp("2018-11-01 00:03:00").unwrap();
        assert_eq!(floor_to_minute(ts), ts);
    }

    #[test]
    fn span_of_empty_series_is_none() {
        assert!(AssetSeries::new("BTCUSDT", vec![]).span().is_none());
    }

    #[test]
    fn gaps_report_missing_minutes() {
        let series = AssetSeries::new(
            "BTCUSDT",
            vec![
                bar("2018-11-01 00:00:00"),
                bar("2018-11-01 00:01:00"),
                bar("2018-11-01 00:06:00"),
            ],
        );
        let gaps = series.gaps();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].missing_minutes(), 4);
        assert!(series.is_strictly_increasing());
    }

    #[test]
    fn duplicate_minutes_are_not_strictly_increasing() {
        let series = AssetSeries::new(
            "ETHBTC",
            vec![bar("2018-11-01 00:00:00"), bar("2018-11-01 00:00:00")],
        );
        assert!(!series.is_strictly_increasing());
    }
}
