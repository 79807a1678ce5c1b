#![allow(dead_code)]

use barsync::domain::error::SyncError;
use barsync::domain::minute_bar::{AssetSeries, MinuteBar};
use barsync::domain::sync::SyncSettings;
use barsync::domain::time_range::{parse_timestamp, TimeRange};
use barsync::ports::object_store_port::{ObjectHandle, ObjectStorePort};
use barsync::ports::series_port::SeriesStorePort;
use barsync::ports::watermark_port::WatermarkPort;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct MemoryObjectStore {
    pub objects: BTreeMap<String, Vec<u8>>,
    pub fail_listing: bool,
    pub fail_download: HashSet<String>,
    pub downloads: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            fail_listing: false,
            fail_download: HashSet::new(),
            downloads: AtomicUsize::new(0),
        }
    }

    pub fn with_object(mut self, key: &str, bytes: Vec<u8>) -> Self {
        self.objects.insert(key.to_string(), bytes);
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn failing_download(mut self, key: &str) -> Self {
        self.fail_download.insert(key.to_string());
        self
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl ObjectStorePort for MemoryObjectStore {
    fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectHandle>, SyncError> {
        if self.fail_listing {
            return Err(SyncError::ObjectStoreUnavailable {
                reason: "listing refused".into(),
            });
        }
        Ok(self
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, bytes)| ObjectHandle {
                key: key.clone(),
                size: Some(bytes.len() as u64),
            })
            .collect())
    }

    fn download_object(&self, handle: &ObjectHandle) -> Result<Vec<u8>, SyncError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_download.contains(&handle.key) {
            return Err(SyncError::ObjectStoreUnavailable {
                reason: format!("download of {} refused", handle.key),
            });
        }
        self.objects
            .get(&handle.key)
            .cloned()
            .ok_or_else(|| SyncError::ObjectStoreUnavailable {
                reason: format!("no such object {}", handle.key),
            })
    }
}

pub struct MemorySeriesStore {
    pub series: Mutex<BTreeMap<String, AssetSeries>>,
    pub fail_on: Option<String>,
}

impl MemorySeriesStore {
    pub fn new() -> Self {
        Self {
            series: Mutex::new(BTreeMap::new()),
            fail_on: None,
        }
    }

    pub fn with_series(self, series: AssetSeries) -> Self {
        self.series
            .lock()
            .unwrap()
            .insert(series.symbol.clone(), series);
        self
    }

    pub fn failing_on(mut self, symbol: &str) -> Self {
        self.fail_on = Some(symbol.to_string());
        self
    }

    pub fn get(&self, symbol: &str) -> Option<AssetSeries> {
        self.series.lock().unwrap().get(symbol).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, AssetSeries> {
        self.series.lock().unwrap().clone()
    }
}

impl SeriesStorePort for MemorySeriesStore {
    fn read_series(&self, symbol: &str) -> Result<Option<AssetSeries>, SyncError> {
        Ok(self.get(symbol))
    }

    fn write_series(&self, series: &AssetSeries) -> Result<(), SyncError> {
        if self.fail_on.as_deref() == Some(series.symbol.as_str()) {
            return Err(SyncError::PersistenceFailure {
                symbol: series.symbol.clone(),
                reason: "disk full".into(),
            });
        }
        self.series
            .lock()
            .unwrap()
            .insert(series.symbol.clone(), series.clone());
        Ok(())
    }

    fn list_symbols(&self) -> Result<Vec<String>, SyncError> {
        Ok(self.series.lock().unwrap().keys().cloned().collect())
    }
}

pub struct MemoryWatermark(pub Mutex<Option<DateTime<Utc>>>);

impl MemoryWatermark {
    pub fn empty() -> Self {
        Self(Mutex::new(None))
    }

    pub fn at(ts: &str) -> Self {
        Self(Mutex::new(Some(ts_at(ts))))
    }

    pub fn get(&self) -> Option<DateTime<Utc>> {
        *self.0.lock().unwrap()
    }
}

impl WatermarkPort for MemoryWatermark {
    fn read_watermark(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(self.get())
    }

    fn write_watermark(&self, synced_to: DateTime<Utc>) -> Result<(), SyncError> {
        *self.0.lock().unwrap() = Some(synced_to);
        Ok(())
    }
}

pub fn ts_at(s: &str) -> DateTime<Utc> {
    parse_timestamp(s).unwrap()
}

pub fn range(start: &str, end: &str) -> TimeRange {
    TimeRange::new(ts_at(start), ts_at(end)).unwrap()
}

pub fn bar(ts: &str, close: f64) -> MinuteBar {
    MinuteBar {
        timestamp: ts_at(ts),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 10.0,
    }
}

pub fn settings(symbols: &[&str]) -> SyncSettings {
    SyncSettings {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        download_workers: 2,
        ..SyncSettings::default()
    }
}

/// Raw aggregate CSV with one row per `(symbol, event time, close)`.
pub fn aggregate_csv(rows: &[(&str, &str, f64)]) -> Vec<u8> {
    let mut out = String::from("symbol,eventTime,openPrice,highPrice,lowPrice,price,volume\n");
    for (symbol, event_time, close) in rows {
        out.push_str(&format!(
            "{symbol},{event_time},{close},{},{},{close},10\n",
            close + 1.0,
            close - 1.0
        ));
    }
    out.into_bytes()
}

/// Object key for a raw file collected at `ts`.
pub fn object_key(ts: &str, tag: &str) -> String {
    format!("{}-{tag}-aggregates.csv", ts_at(ts).timestamp())
}

pub fn closes(series: &AssetSeries) -> Vec<f64> {
    series.bars.iter().map(|b| b.close).collect()
}

pub fn minutes(series: &AssetSeries) -> Vec<String> {
    series
        .bars
        .iter()
        .map(|b| b.timestamp.format("%H:%M").to_string())
        .collect()
}
