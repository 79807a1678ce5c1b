//! Configuration validation, run before any store is opened.

use crate::domain::error::SyncError;
use crate::domain::prefix::PrefixScheme;
use crate::domain::symbols::parse_symbols;
use crate::domain::time_range::parse_timestamp;
use crate::ports::config_port::ConfigPort;

pub const MAX_DOWNLOAD_WORKERS: i64 = 64;

pub fn validate_sync_config(config: &dyn ConfigPort) -> Result<(), SyncError> {
    validate_symbols(config)?;
    validate_prefix_scheme(config)?;
    validate_cutoff(config)?;
    validate_download_workers(config)?;
    validate_source(config)?;
    validate_store(config)?;
    validate_initial_watermark(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> SyncError {
    SyncError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> SyncError {
    SyncError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn validate_symbols(config: &dyn ConfigPort) -> Result<(), SyncError> {
    if let Some(value) = config.get_non_empty("sync", "symbols") {
        parse_symbols(&value).map_err(|e| invalid("sync", "symbols", e.to_string()))?;
    }
    Ok(())
}

fn validate_prefix_scheme(config: &dyn ConfigPort) -> Result<(), SyncError> {
    if let Some(value) = config.get_non_empty("sync", "prefix_scheme") {
        value
            .parse::<PrefixScheme>()
            .map_err(|e| invalid("sync", "prefix_scheme", e))?;
    }
    Ok(())
}

fn validate_cutoff(config: &dyn ConfigPort) -> Result<(), SyncError> {
    let value = config.get_int("sync", "cutoff_minutes", 20);
    if !(0..1440).contains(&value) {
        return Err(invalid(
            "sync",
            "cutoff_minutes",
            "cutoff_minutes must be between 0 and 1439",
        ));
    }
    Ok(())
}

fn validate_download_workers(config: &dyn ConfigPort) -> Result<(), SyncError> {
    let value = config.get_int("sync", "download_workers", 4);
    if !(1..=MAX_DOWNLOAD_WORKERS).contains(&value) {
        return Err(invalid(
            "sync",
            "download_workers",
            format!("download_workers must be between 1 and {MAX_DOWNLOAD_WORKERS}"),
        ));
    }
    Ok(())
}

fn validate_source(config: &dyn ConfigPort) -> Result<(), SyncError> {
    config
        .get_non_empty("source", "path")
        .map(|_| ())
        .ok_or_else(|| missing("source", "path"))
}

fn validate_store(config: &dyn ConfigPort) -> Result<(), SyncError> {
    let backend = config
        .get_non_empty("store", "backend")
        .unwrap_or_else(|| "csv".to_string())
        .to_lowercase();
    match backend.as_str() {
        "csv" => {
            config
                .get_non_empty("store", "path")
                .ok_or_else(|| missing("store", "path"))?;
            config
                .get_non_empty("watermark", "path")
                .ok_or_else(|| missing("watermark", "path"))?;
        }
        "sqlite" => {
            config
                .get_non_empty("sqlite", "path")
                .ok_or_else(|| missing("sqlite", "path"))?;
            if config.get_int("sqlite", "pool_size", 4) < 1 {
                return Err(invalid("sqlite", "pool_size", "pool_size must be at least 1"));
            }
        }
        other => {
            return Err(invalid(
                "store",
                "backend",
                format!("unknown backend '{other}' (expected csv or sqlite)"),
            ));
        }
    }
    Ok(())
}

fn validate_initial_watermark(config: &dyn ConfigPort) -> Result<(), SyncError> {
    if let Some(value) = config.get_non_empty("watermark", "initial") {
        parse_timestamp(&value).map_err(|_| {
            invalid(
                "watermark",
                "initial",
                "invalid timestamp, expected YYYY-MM-DD HH:MM:SS",
            )
        })?;
    }
    Ok(())
}

fn validate_logging(config: &dyn ConfigPort) -> Result<(), SyncError> {
    if let Some(format) = config.get_non_empty("logging", "format") {
        match format.to_lowercase().as_str() {
            "text" | "json" => {}
            _ => return Err(invalid("logging", "format", "format must be text or json")),
        }
    }
    Ok(())
}
