//! CSV codecs: raw aggregate files in, persisted minute series in and out.

use crate::domain::error::SyncError;
use crate::domain::minute_bar::{AssetSeries, MinuteBar};
use crate::domain::raw_record::{RawAggregateRecord, REQUIRED_COLUMNS};
use crate::domain::time_range::{format_timestamp, parse_timestamp};
use crate::ports::aggregate_reader_port::AggregateReaderPort;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::io::{Read, Write};

/// Column order of a persisted series file.
pub const SERIES_HEADER: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

/// Epoch values at or above this are milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Reads collector output: a header row naming at least [`REQUIRED_COLUMNS`],
/// in any order, with extra columns ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvAggregateReader;

impl AggregateReaderPort for CsvAggregateReader {
    fn read_records(
        &self,
        name: &str,
        bytes: &[u8],
    ) -> Result<Vec<RawAggregateRecord>, SyncError> {
        let malformed = |reason: String| SyncError::MalformedInputFile {
            file: name.to_string(),
            reason,
        };

        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
        let headers = rdr
            .headers()
            .map_err(|e| malformed(format!("unreadable header: {e}")))?
            .clone();

        let mut index = [0usize; REQUIRED_COLUMNS.len()];
        for (slot, column) in index.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.trim() == column)
                .ok_or_else(|| malformed(format!("missing column {column}")))?;
        }
        let [symbol, event_time, open, high, low, price, volume] = index;

        let mut records = Vec::new();
        let mut bad_rows = 0usize;
        for result in rdr.records() {
            let row = match result {
                Ok(row) => row,
                Err(_) => {
                    bad_rows += 1;
                    continue;
                }
            };
            let field = |i: usize| row.get(i).map(str::trim);
            let number = |i: usize| field(i).and_then(|v| v.parse::<f64>().ok());

            let parsed = (|| {
                Some(RawAggregateRecord {
                    symbol: field(symbol).filter(|s| !s.is_empty())?.to_string(),
                    event_time: parse_event_time(field(event_time)?)?,
                    open: number(open)?,
                    high: number(high)?,
                    low: number(low)?,
                    close: number(price)?,
                    volume: number(volume)?,
                })
            })();

            match parsed {
                Some(record) => records.push(record),
                None => bad_rows += 1,
            }
        }

        if bad_rows > 0 {
            tracing::warn!(file = %name, bad_rows, kept = records.len(), "dropped unparsable rows");
        }
        Ok(records)
    }
}

/// Event times arrive as epoch seconds, epoch milliseconds, RFC 3339, or
/// `YYYY-MM-DD HH:MM:SS[.fff]` in UTC.
pub fn parse_event_time(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if let Ok(epoch) = value.parse::<i64>() {
        return if epoch.abs() >= EPOCH_MILLIS_THRESHOLD {
            DateTime::from_timestamp_millis(epoch)
        } else {
            DateTime::from_timestamp(epoch, 0)
        };
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|n| n.and_utc())
}

/// Write `series` as `date,open,high,low,close,volume`. Numbers use the
/// shortest text that parses back to the same `f64`.
pub fn write_series_csv<W: Write>(series: &AssetSeries, writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(SERIES_HEADER)?;
    for bar in &series.bars {
        wtr.write_record([
            format_timestamp(bar.timestamp),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Parse a persisted series file. Rows are expected in ascending date order.
pub fn read_series_csv<R: Read>(symbol: &str, reader: R) -> Result<AssetSeries, String> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut bars = Vec::new();

    for (line, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| format!("CSV parse error: {e}"))?;
        let row = line + 2;

        let date_str = record
            .get(0)
            .ok_or_else(|| format!("row {row}: missing date column"))?;
        let timestamp = parse_timestamp(date_str)
            .map_err(|e| format!("row {row}: invalid date '{date_str}': {e}"))?;

        let mut values = [0.0f64; 5];
        for (offset, slot) in values.iter_mut().enumerate() {
            let column = SERIES_HEADER[offset + 1];
            *slot = record
                .get(offset + 1)
                .ok_or_else(|| format!("row {row}: missing {column} column"))?
                .trim()
                .parse()
                .map_err(|e| format!("row {row}: invalid {column} value: {e}"))?;
        }
        let [open, high, low, close, volume] = values;

        bars.push(MinuteBar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    Ok(AssetSeries::new(symbol, bars))
}
