//! Watermark kept as a one-line text file (`YYYY-MM-DD HH:MM:SS`).

use crate::domain::error::SyncError;
use crate::domain::time_range::{format_timestamp, parse_timestamp};
use crate::ports::watermark_port::WatermarkPort;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const TIMESTAMP_LEN: usize = "YYYY-MM-DD HH:MM:SS".len();

pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn watermark_error(reason: String) -> SyncError {
    SyncError::Watermark { reason }
}

impl WatermarkPort for FileWatermarkStore {
    fn read_watermark(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(watermark_error(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        // Trailing newlines and anything after the timestamp are ignored.
        let head: String = content.trim_start().chars().take(TIMESTAMP_LEN).collect();
        parse_timestamp(&head).map(Some).map_err(|e| {
            watermark_error(format!(
                "invalid watermark '{head}' in {}: {e}",
                self.path.display()
            ))
        })
    }

    fn write_watermark(&self, synced_to: DateTime<Utc>) -> Result<(), SyncError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let io_err = |e: std::io::Error| {
            watermark_error(format!("failed to write {}: {e}", self.path.display()))
        };

        fs::create_dir_all(&dir).map_err(io_err)?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        writeln!(tmp, "{}", format_timestamp(synced_to)).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        tracing::info!(watermark = %synced_to, path = %self.path.display(), "watermark advanced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absent_file_means_no_watermark() {
        let dir = TempDir::new().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("last_ingest.txt"));
        assert_eq!(store.read_watermark().unwrap(), None);
    }

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("state").join("last_ingest.txt"));
        let ts = parse_timestamp("2018-11-02 00:20:00").unwrap();

        store.write_watermark(ts).unwrap();

        assert_eq!(store.read_watermark().unwrap(), Some(ts));
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "2018-11-02 00:20:00\n"
        );
    }

    #[test]
    fn tolerates_trailing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_ingest.txt");
        fs::write(&path, "2018-11-02 00:20:00\r\n\n").unwrap();
        let store = FileWatermarkStore::new(path);
        assert_eq!(
            store.read_watermark().unwrap(),
            Some(parse_timestamp("2018-11-02 00:20:00").unwrap())
        );
    }

    #[test]
    fn garbage_is_a_watermark_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("last_ingest.txt");
        fs::write(&path, "yesterday\n").unwrap();
        let store = FileWatermarkStore::new(path);
        assert!(matches!(
            store.read_watermark(),
            Err(SyncError::Watermark { .. })
        ));
    }
}
