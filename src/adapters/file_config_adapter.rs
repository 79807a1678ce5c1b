//! INI file configuration adapter.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_sync_sections() {
        let adapter = FileConfigAdapter::from_string(
            r#"
[sync]
symbols = BTCUSDT,ETHBTC
cutoff_minutes = 20

[watermark]
initial = 2018-11-01 00:00:00
"#,
        )
        .unwrap();
        assert_eq!(
            adapter.get_string("sync", "symbols"),
            Some("BTCUSDT,ETHBTC".to_string())
        );
        assert_eq!(adapter.get_int("sync", "cutoff_minutes", 0), 20);
        assert_eq!(
            adapter.get_string("watermark", "initial"),
            Some("2018-11-01 00:00:00".to_string())
        );
    }

    #[test]
    fn missing_keys_fall_back() {
        let adapter = FileConfigAdapter::from_string("[sync]\n").unwrap();
        assert_eq!(adapter.get_string("sync", "symbols"), None);
        assert_eq!(adapter.get_string("nope", "symbols"), None);
        assert_eq!(adapter.get_int("sync", "download_workers", 4), 4);
        assert!(adapter.get_bool("sync", "dry_run", true));
    }

    #[test]
    fn non_numeric_int_falls_back() {
        let adapter = FileConfigAdapter::from_string("[sync]\ncutoff_minutes = soon\n").unwrap();
        assert_eq!(adapter.get_int("sync", "cutoff_minutes", 20), 20);
    }

    #[test]
    fn bools_accept_common_spellings() {
        let adapter =
            FileConfigAdapter::from_string("[x]\na = yes\nb = off\nc = 1\nd = maybe\n").unwrap();
        assert!(adapter.get_bool("x", "a", false));
        assert!(!adapter.get_bool("x", "b", true));
        assert!(adapter.get_bool("x", "c", false));
        assert!(!adapter.get_bool("x", "d", false));
    }

    #[test]
    fn blank_values_count_as_absent() {
        let adapter = FileConfigAdapter::from_string("[store]\npath =   \n").unwrap();
        assert_eq!(adapter.get_non_empty("store", "path"), None);
    }

    #[test]
    fn from_file_reads_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[source]\npath = /data/idp_crypto\n").unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("source", "path"),
            Some("/data/idp_crypto".to_string())
        );
    }

    #[test]
    fn from_file_missing_is_error() {
        assert!(FileConfigAdapter::from_file("/nonexistent/barsync.ini").is_err());
    }
}
