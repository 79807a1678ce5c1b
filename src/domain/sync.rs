//! Incremental sync: discover new raw files, merge them into each asset's
//! minute series, then advance the watermark.
//!
//! A sync attempt either completes for every asset and moves the watermark to
//! the end of its range, or fails and leaves the watermark where it was. The
//! merge is idempotent, so a failed attempt is simply re-run over the same
//! window.

use crate::domain::error::SyncError;
use crate::domain::merge::merge_series;
use crate::domain::minute_bar::MinuteBar;
use crate::domain::prefix::{key_timestamp, PrefixScheme};
use crate::domain::raw_record::RawAggregateRecord;
use crate::domain::repair::{repair_timestamps, RepairStats};
use crate::domain::route::route_records;
use crate::domain::time_range::{collection_cutoff, TimeRange};
use crate::ports::aggregate_reader_port::AggregateReaderPort;
use crate::ports::object_store_port::{ObjectHandle, ObjectStorePort};
use crate::ports::series_port::SeriesStorePort;
use crate::ports::watermark_port::WatermarkPort;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};

pub const DEFAULT_KEY_SUFFIX: &str = "aggregates.csv";
pub const DEFAULT_CUTOFF_MINUTES: u32 = 20;
pub const DEFAULT_DOWNLOAD_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub symbols: Vec<String>,
    pub scheme: PrefixScheme,
    /// Only keys ending with this suffix are raw aggregate files.
    pub key_suffix: String,
    pub cutoff_minutes: u32,
    pub download_workers: usize,
    /// Starting point when no watermark has been stored yet.
    pub initial_watermark: Option<DateTime<Utc>>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            scheme: PrefixScheme::default(),
            key_suffix: DEFAULT_KEY_SUFFIX.to_string(),
            cutoff_minutes: DEFAULT_CUTOFF_MINUTES,
            download_workers: DEFAULT_DOWNLOAD_WORKERS,
            initial_watermark: None,
        }
    }
}

/// A downloaded raw file.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub key: String,
    pub bytes: Vec<u8>,
}

/// Objects selected for a range, before download.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub range: TimeRange,
    pub prefixes: Vec<String>,
    /// Every object returned by the prefix listings.
    pub listed: usize,
    pub objects: Vec<ObjectHandle>,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct AssetUpdate {
    pub symbol: String,
    pub bars: usize,
    pub appended: usize,
    pub trimmed: usize,
    pub created: bool,
    pub repair: RepairStats,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub range: TimeRange,
    pub new_watermark: DateTime<Utc>,
    pub prefixes: usize,
    pub files_listed: usize,
    pub files_processed: usize,
    pub skipped_files: Vec<SkippedFile>,
    /// Symbols with no rows in this batch; their series are untouched.
    pub skipped_symbols: Vec<String>,
    pub updates: Vec<AssetUpdate>,
}

impl SyncReport {
    pub fn assets_updated(&self) -> BTreeSet<String> {
        self.updates.iter().map(|u| u.symbol.clone()).collect()
    }

    pub fn ambiguous_repairs(&self) -> usize {
        self.updates.iter().map(|u| u.repair.ambiguous).sum()
    }
}

#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// The watermark already covers the latest collection cutoff.
    UpToDate { watermark: DateTime<Utc> },
    Synced(SyncReport),
}

pub struct SyncEngine<'a> {
    object_store: &'a dyn ObjectStorePort,
    reader: &'a dyn AggregateReaderPort,
    series_store: &'a dyn SeriesStorePort,
    watermark: &'a dyn WatermarkPort,
    settings: SyncSettings,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        object_store: &'a dyn ObjectStorePort,
        reader: &'a dyn AggregateReaderPort,
        series_store: &'a dyn SeriesStorePort,
        watermark: &'a dyn WatermarkPort,
        settings: SyncSettings,
    ) -> Self {
        Self {
            object_store,
            reader,
            series_store,
            watermark,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Stored watermark, or the configured initial one on a first run.
    pub fn current_watermark(&self) -> Result<DateTime<Utc>, SyncError> {
        match self.watermark.read_watermark()? {
            Some(ts) => Ok(ts),
            None => self
                .settings
                .initial_watermark
                .ok_or_else(|| SyncError::Watermark {
                    reason: "no watermark stored and no initial watermark configured".into(),
                }),
        }
    }

    /// Range from the watermark to the latest collection cutoff, `None` when
    /// there is nothing new to fetch.
    pub fn pending_range(&self, now: DateTime<Utc>) -> Result<Option<TimeRange>, SyncError> {
        let start = self.current_watermark()?;
        let end = collection_cutoff(now, self.settings.cutoff_minutes);
        if end <= start {
            return Ok(None);
        }
        TimeRange::new(start, end).map(Some)
    }

    pub fn sync_since_watermark(&self, now: DateTime<Utc>) -> Result<SyncOutcome, SyncError> {
        match self.pending_range(now)? {
            Some(range) => self.sync(range).map(SyncOutcome::Synced),
            None => {
                let watermark = self.current_watermark()?;
                tracing::info!(watermark = %watermark, "data is already up to date");
                Ok(SyncOutcome::UpToDate { watermark })
            }
        }
    }

    /// List every prefix for `range` and keep raw files stamped inside it.
    pub fn discover(&self, range: &TimeRange) -> Result<SyncPlan, SyncError> {
        let prefixes = self.settings.scheme.prefixes(range);
        let mut seen = HashSet::new();
        let mut objects = Vec::new();
        let mut listed = 0;

        for prefix in &prefixes {
            for handle in self.object_store.list_objects(prefix)? {
                listed += 1;
                if !handle.key.ends_with(&self.settings.key_suffix) {
                    continue;
                }
                match key_timestamp(&handle.key) {
                    Some(secs) if range.contains_epoch(secs) => {}
                    Some(_) => continue,
                    None => {
                        tracing::warn!(
                            key = %handle.key,
                            "object key has no leading timestamp, skipping"
                        );
                        continue;
                    }
                }
                if seen.insert(handle.key.clone()) {
                    objects.push(handle);
                }
            }
        }

        tracing::debug!(
            prefixes = prefixes.len(),
            listed,
            selected = objects.len(),
            "discovered raw files"
        );
        Ok(SyncPlan {
            range: *range,
            prefixes,
            listed,
            objects,
        })
    }

    /// Download objects on up to `download_workers` threads. Listing order is
    /// preserved; the first failure aborts the whole batch.
    pub fn download(&self, objects: &[ObjectHandle]) -> Result<Vec<RawFile>, SyncError> {
        let workers = self.settings.download_workers.max(1);
        let chunk_size = objects.len().div_ceil(workers).max(1);

        std::thread::scope(|scope| -> Result<Vec<RawFile>, SyncError> {
            let handles: Vec<_> = objects
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|handle| {
                                self.object_store
                                    .download_object(handle)
                                    .map(|bytes| RawFile {
                                        key: handle.key.clone(),
                                        bytes,
                                    })
                            })
                            .collect::<Result<Vec<_>, _>>()
                    })
                })
                .collect();

            let mut files = Vec::with_capacity(objects.len());
            for handle in handles {
                let part = handle
                    .join()
                    .map_err(|_| SyncError::ObjectStoreUnavailable {
                        reason: "download worker panicked".into(),
                    })??;
                files.extend(part);
            }
            Ok(files)
        })
    }

    /// Full pipeline over `range`: discover, download, merge, persist, advance.
    pub fn sync(&self, range: TimeRange) -> Result<SyncReport, SyncError> {
        let _span = tracing::info_span!("sync", range = %range).entered();

        let plan = self.discover(&range)?;
        let files = self.download(&plan.objects)?;
        let mut report = self.sync_files(range, files)?;
        report.prefixes = plan.prefixes.len();
        report.files_listed = plan.listed;
        Ok(report)
    }

    /// Merge already downloaded raw files and advance the watermark to
    /// `range.end()` once every asset is persisted.
    pub fn sync_files(
        &self,
        range: TimeRange,
        files: Vec<RawFile>,
    ) -> Result<SyncReport, SyncError> {
        // An unreadable watermark is replaced by the write below.
        let previous = match self.watermark.read_watermark() {
            Ok(previous) => previous,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "stored watermark unreadable, it will be overwritten"
                );
                None
            }
        };

        let mut skipped_files = Vec::new();
        let mut parsed: Vec<Vec<RawAggregateRecord>> = Vec::with_capacity(files.len());

        for file in &files {
            match self.reader.read_records(&file.key, &file.bytes) {
                Ok(records) => parsed.push(records),
                Err(err) if err.is_soft() => {
                    tracing::warn!(file = %file.key, error = %err, "skipping raw file");
                    skipped_files.push(SkippedFile {
                        key: file.key.clone(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        let routed = route_records(&self.settings.symbols, parsed.iter().map(Vec::as_slice));

        let mut skipped_symbols = Vec::new();
        let mut batches = Vec::new();
        for (symbol, mut bars) in routed {
            if bars.is_empty() {
                let err = SyncError::EmptyMergeSet {
                    symbol: symbol.clone(),
                };
                tracing::info!(symbol = %symbol, "{err}, leaving series untouched");
                skipped_symbols.push(symbol);
                continue;
            }
            let repair = repair_timestamps(&mut bars);
            if repair.ambiguous > 0 {
                tracing::warn!(
                    symbol = %symbol,
                    ambiguous = repair.ambiguous,
                    duplicates = repair.duplicates,
                    "source timestamps needed repair"
                );
            }
            batches.push((symbol, bars, repair));
        }

        let updates = self.merge_all(batches)?;

        // The stored series now ends inside this range, so a watermark ahead of
        // it has to come back to keep later windows re-syncable.
        if let Some(previous) = previous.filter(|p| *p > range.end()) {
            tracing::warn!(
                previous = %previous,
                new = %range.end(),
                "watermark moves backwards, later windows will be synced again"
            );
        }
        self.watermark.write_watermark(range.end())?;
        tracing::info!(
            assets = updates.len(),
            files = parsed.len(),
            skipped_files = skipped_files.len(),
            watermark = %range.end(),
            "sync complete"
        );

        Ok(SyncReport {
            range,
            new_watermark: range.end(),
            prefixes: 0,
            files_listed: files.len(),
            files_processed: parsed.len(),
            skipped_files,
            skipped_symbols,
            updates,
        })
    }

    // Each symbol merges and persists on its own thread; all are joined before
    // the caller may touch the watermark.
    fn merge_all(
        &self,
        batches: Vec<(String, Vec<MinuteBar>, RepairStats)>,
    ) -> Result<Vec<AssetUpdate>, SyncError> {
        let results: Vec<Result<AssetUpdate, SyncError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = batches
                .into_iter()
                .map(|(symbol, bars, repair)| {
                    let name = symbol.clone();
                    let handle =
                        scope.spawn(move || self.merge_and_persist(symbol, bars, repair));
                    (name, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(symbol, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(SyncError::PersistenceFailure {
                            symbol,
                            reason: "merge worker panicked".into(),
                        })
                    })
                })
                .collect()
        });

        let mut updates = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(update) => updates.push(update),
                Err(err) => {
                    tracing::error!(error = %err, "asset merge failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(updates),
        }
    }

    fn merge_and_persist(
        &self,
        symbol: String,
        bars: Vec<MinuteBar>,
        repair: RepairStats,
    ) -> Result<AssetUpdate, SyncError> {
        let existing = self.series_store.read_series(&symbol)?;
        let outcome = merge_series(&symbol, existing, bars);
        self.series_store.write_series(&outcome.series)?;

        tracing::info!(
            symbol = %symbol,
            bars = outcome.series.len(),
            appended = outcome.appended,
            trimmed = outcome.trimmed,
            created = outcome.created,
            "asset series updated"
        );
        Ok(AssetUpdate {
            bars: outcome.series.len(),
            appended: outcome.appended,
            trimmed: outcome.trimmed,
            created: outcome.created,
            repair,
            symbol,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::minute_bar::AssetSeries;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct NoObjects;

    impl ObjectStorePort for NoObjects {
        fn list_objects(&self, _prefix: &str) -> Result<Vec<ObjectHandle>, SyncError> {
            Ok(Vec::new())
        }
        fn download_object(&self, handle: &ObjectHandle) -> Result<Vec<u8>, SyncError> {
            Err(SyncError::ObjectStoreUnavailable {
                reason: format!("{} not found", handle.key),
            })
        }
    }

    struct FixedReader(Vec<RawAggregateRecord>);

    impl AggregateReaderPort for FixedReader {
        fn read_records(
            &self,
            name: &str,
            _bytes: &[u8],
        ) -> Result<Vec<RawAggregateRecord>, SyncError> {
            if name.starts_with("bad") {
                return Err(SyncError::MalformedInputFile {
                    file: name.to_string(),
                    reason: "missing column price".into(),
                });
            }
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct MapStore(Mutex<HashMap<String, AssetSeries>>);

    impl SeriesStorePort for MapStore {
        fn read_series(&self, symbol: &str) -> Result<Option<AssetSeries>, SyncError> {
            Ok(self.0.lock().unwrap().get(symbol).cloned())
        }
        fn write_series(&self, series: &AssetSeries) -> Result<(), SyncError> {
            self.0
                .lock()
                .unwrap()
                .insert(series.symbol.clone(), series.clone());
            Ok(())
        }
        fn list_symbols(&self) -> Result<Vec<String>, SyncError> {
            Ok(self.0.lock().unwrap().keys().cloned().collect())
        }
    }

    #[derive(Default)]
    struct CellWatermark(Mutex<Option<DateTime<Utc>>>);

    impl WatermarkPort for CellWatermark {
        fn read_watermark(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
            Ok(*self.0.lock().unwrap())
        }
        fn write_watermark(&self, synced_to: DateTime<Utc>) -> Result<(), SyncError> {
            *self.0.lock().unwrap() = Some(synced_to);
            Ok(())
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn record(symbol: &str, secs: i64) -> RawAggregateRecord {
        RawAggregateRecord {
            symbol: symbol.into(),
            event_time: at(secs),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        }
    }

    fn settings(symbols: &[&str]) -> SyncSettings {
        SyncSettings {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            ..SyncSettings::default()
        }
    }

    #[test]
    fn sync_files_skips_malformed_and_empty() {
        let reader = FixedReader(vec![record("BTCUSDT", 1_541_030_400)]);
        let store = MapStore::default();
        let watermark = CellWatermark::default();
        let engine = SyncEngine::new(
            &NoObjects,
            &reader,
            &store,
            &watermark,
            settings(&["BTCUSDT", "ETHBTC"]),
        );
        let range = TimeRange::new(at(1_541_030_400), at(1_541_118_000)).unwrap();
        let files = vec![
            RawFile {
                key: "1541030427-aggregates.csv".into(),
                bytes: Vec::new(),
            },
            RawFile {
                key: "bad-aggregates.csv".into(),
                bytes: Vec::new(),
            },
        ];

        let report = engine.sync_files(range, files).unwrap();

        assert_eq!(report.files_processed, 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(report.skipped_symbols, vec!["ETHBTC".to_string()]);
        assert!(report.assets_updated().contains("BTCUSDT"));
        assert_eq!(watermark.read_watermark().unwrap(), Some(at(1_541_118_000)));
    }

    #[test]
    fn pending_range_requires_a_starting_point() {
        let reader = FixedReader(Vec::new());
        let store = MapStore::default();
        let watermark = CellWatermark::default();
        let engine =
            SyncEngine::new(&NoObjects, &reader, &store, &watermark, settings(&["BTCUSDT"]));
        assert!(matches!(
            engine.pending_range(at(1_541_118_000)),
            Err(SyncError::Watermark { .. })
        ));
    }

    #[test]
    fn up_to_date_when_watermark_reaches_cutoff() {
        let reader = FixedReader(Vec::new());
        let store = MapStore::default();
        let watermark = CellWatermark::default();
        watermark.write_watermark(at(1_541_118_000)).unwrap();
        let engine =
            SyncEngine::new(&NoObjects, &reader, &store, &watermark, settings(&["BTCUSDT"]));

        // 2018-11-02 12:00:00, cutoff is still 2018-11-02 00:20:00
        let outcome = engine.sync_since_watermark(at(1_541_160_000)).unwrap();
        assert!(matches!(outcome, SyncOutcome::UpToDate { .. }));
    }

    /// Watermark whose stored value cannot be parsed; writes still land.
    #[derive(Default)]
    struct CorruptWatermark(Mutex<Option<DateTime<Utc>>>);

    impl WatermarkPort for CorruptWatermark {
        fn read_watermark(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
            Err(SyncError::Watermark {
                reason: "invalid watermark 'garbage'".into(),
            })
        }
        fn write_watermark(&self, synced_to: DateTime<Utc>) -> Result<(), SyncError> {
            *self.0.lock().unwrap() = Some(synced_to);
            Ok(())
        }
    }

    #[test]
    fn unreadable_watermark_is_overwritten_after_merge() {
        let reader = FixedReader(vec![record("BTCUSDT", 1_541_030_400)]);
        let store = MapStore::default();
        let watermark = CorruptWatermark::default();
        let engine =
            SyncEngine::new(&NoObjects, &reader, &store, &watermark, settings(&["BTCUSDT"]));
        let range = TimeRange::new(at(1_541_030_400), at(1_541_118_000)).unwrap();
        let files = vec![RawFile {
            key: "1541030427-aggregates.csv".into(),
            bytes: Vec::new(),
        }];

        let report = engine.sync_files(range, files).unwrap();

        assert_eq!(report.updates.len(), 1);
        assert_eq!(*watermark.0.lock().unwrap(), Some(at(1_541_118_000)));
    }

    #[test]
    fn download_of_nothing_is_empty() {
        let reader = FixedReader(Vec::new());
        let store = MapStore::default();
        let watermark = CellWatermark::default();
        let engine = SyncEngine::new(&NoObjects, &reader, &store, &watermark, settings(&[]));
        assert!(engine.download(&[]).unwrap().is_empty());
    }
}
