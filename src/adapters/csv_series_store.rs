//! Directory of per-symbol series CSV files.

use crate::adapters::csv_adapter::{read_series_csv, write_series_csv};
use crate::domain::error::SyncError;
use crate::domain::minute_bar::AssetSeries;
use crate::ports::series_port::SeriesStorePort;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Stores each series as `<dir>/<SYMBOL>.csv`.
pub struct CsvSeriesStore {
    base_path: PathBuf,
}

impl CsvSeriesStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn series_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }
}

fn persistence_failure(symbol: &str, reason: impl std::fmt::Display) -> SyncError {
    SyncError::PersistenceFailure {
        symbol: symbol.to_string(),
        reason: reason.to_string(),
    }
}

impl SeriesStorePort for CsvSeriesStore {
    fn read_series(&self, symbol: &str) -> Result<Option<AssetSeries>, SyncError> {
        let path = self.series_path(symbol);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(persistence_failure(
                    symbol,
                    format!("failed to read {}: {e}", path.display()),
                ));
            }
        };
        read_series_csv(symbol, file)
            .map(Some)
            .map_err(|e| persistence_failure(symbol, format!("{}: {e}", path.display())))
    }

    // Written next to the target and renamed over it, so readers never see a
    // half-written series.
    fn write_series(&self, series: &AssetSeries) -> Result<(), SyncError> {
        let symbol = series.symbol.as_str();
        fs::create_dir_all(&self.base_path).map_err(|e| persistence_failure(symbol, e))?;

        let tmp =
            NamedTempFile::new_in(&self.base_path).map_err(|e| persistence_failure(symbol, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            write_series_csv(series, &mut writer).map_err(|e| persistence_failure(symbol, e))?;
            writer.flush().map_err(|e| persistence_failure(symbol, e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| persistence_failure(symbol, e))?;
        tmp.persist(self.series_path(symbol))
            .map_err(|e| persistence_failure(symbol, e.error))?;

        tracing::debug!(
            symbol,
            bars = series.len(),
            path = %self.series_path(symbol).display(),
            "series written"
        );
        Ok(())
    }

    fn list_symbols(&self) -> Result<Vec<String>, SyncError> {
        let entries = match fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(persistence_failure(
                    "*",
                    format!("failed to read directory {}: {e}", self.base_path.display()),
                ));
            }
        };

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| persistence_failure("*", e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(symbol) = name.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::minute_bar::MinuteBar;
    use crate::domain::time_range::parse_timestamp;
    use tempfile::TempDir;

    fn series(symbol: &str, stamps: &[&str]) -> AssetSeries {
        AssetSeries::new(
            symbol,
            stamps
                .iter()
                .map(|ts| MinuteBar {
                    timestamp: parse_timestamp(ts).unwrap(),
                    open: 0.03170,
                    high: 0.03172,
                    low: 0.03169,
                    close: 0.03171,
                    volume: 55.0,
                })
                .collect(),
        )
    }

    #[test]
    fn missing_series_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = CsvSeriesStore::new(dir.path().to_path_buf());
        assert!(store.read_series("ETHBTC").unwrap().is_none());
    }

    #[test]
    fn write_then_read_back() {
        let dir = TempDir::new().unwrap();
        let store = CsvSeriesStore::new(dir.path().join("minute"));
        let written = series("ETHBTC", &["2018-11-01 00:00:00", "2018-11-01 00:01:00"]);

        store.write_series(&written).unwrap();

        assert_eq!(store.read_series("ETHBTC").unwrap(), Some(written));
        assert!(store.series_path("ETHBTC").exists());
    }

    #[test]
    fn rewrite_replaces_whole_file() {
        let dir = TempDir::new().unwrap();
        let store = CsvSeriesStore::new(dir.path().to_path_buf());
        store
            .write_series(&series("ETHBTC", &["2018-11-01 00:00:00", "2018-11-01 00:01:00"]))
            .unwrap();
        store
            .write_series(&series("ETHBTC", &["2018-11-01 00:00:00"]))
            .unwrap();
        assert_eq!(store.read_series("ETHBTC").unwrap().unwrap().len(), 1);
    }

    #[test]
    fn list_symbols_is_sorted_and_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        let store = CsvSeriesStore::new(dir.path().to_path_buf());
        store.write_series(&series("XRPBTC", &["2018-11-01 00:00:00"])).unwrap();
        store.write_series(&series("BTCUSDT", &["2018-11-01 00:00:00"])).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(store.list_symbols().unwrap(), vec!["BTCUSDT", "XRPBTC"]);
    }

    #[test]
    fn corrupt_series_is_a_persistence_failure() {
        let dir = TempDir::new().unwrap();
        let store = CsvSeriesStore::new(dir.path().to_path_buf());
        fs::write(store.series_path("BTCUSDT"), "date,open,high,low,close,volume\nbad,1,1,1,1,1\n")
            .unwrap();
        assert!(matches!(
            store.read_series("BTCUSDT"),
            Err(SyncError::PersistenceFailure { symbol, .. }) if symbol == "BTCUSDT"
        ));
    }
}
