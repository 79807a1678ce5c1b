//! CLI definition and dispatch.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{write_series_csv, CsvAggregateReader};
use crate::adapters::csv_series_store::CsvSeriesStore;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::file_watermark_adapter::FileWatermarkStore;
use crate::adapters::local_object_store::LocalObjectStore;
use crate::adapters::lock_file::SyncLock;
use crate::domain::config_validation::validate_sync_config;
use crate::domain::error::SyncError;
use crate::domain::prefix::PrefixScheme;
use crate::domain::symbols::{default_symbols, parse_symbols};
use crate::domain::sync::{
    SyncEngine, SyncOutcome, SyncReport, SyncSettings, DEFAULT_CUTOFF_MINUTES,
    DEFAULT_DOWNLOAD_WORKERS, DEFAULT_KEY_SUFFIX,
};
use crate::domain::time_range::{
    available_window, collection_cutoff, format_timestamp, parse_timestamp, TimeRange,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::series_port::SeriesStorePort;
use crate::ports::watermark_port::WatermarkPort;

/// Environment variable overriding `[logging] level`.
pub const LOG_ENV: &str = "BARSYNC_LOG";

#[derive(Parser, Debug)]
#[command(name = "barsync", about = "Incremental minute-bar sync from a raw aggregate bucket")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Merge raw files created since the last sync into the asset series
    Sync {
        #[arg(short, long)]
        config: PathBuf,
        /// Override the range start (YYYY-MM-DD HH:MM:SS, UTC)
        #[arg(long)]
        start: Option<String>,
        /// Override the range end (YYYY-MM-DD HH:MM:SS, UTC)
        #[arg(long)]
        end: Option<String>,
        /// List the files that would be merged without downloading them
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the key prefixes listed for a time range
    Prefixes {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, default_value = "three_tier")]
        scheme: String,
    },
    /// Show the watermark and stored series
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Write a stored series as CSV
    Export {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Sync {
            config,
            start,
            end,
            dry_run,
        } => run_sync(&config, start.as_deref(), end.as_deref(), dry_run),
        Command::Prefixes { start, end, scheme } => run_prefixes(&start, &end, &scheme),
        Command::Info { config, symbol } => run_info(&config, symbol.as_deref()),
        Command::Export {
            config,
            symbol,
            output,
        } => run_export(&config, &symbol, output.as_ref()),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(err: SyncError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SyncError> {
    FileConfigAdapter::from_file(path).map_err(|e| SyncError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Load and validate a config file, then start logging from its `[logging]`
/// section.
pub fn prepare(path: &Path) -> Result<FileConfigAdapter, SyncError> {
    let config = load_config(path)?;
    validate_sync_config(&config)?;
    init_logging(&config);
    Ok(config)
}

/// Install the global tracing subscriber. Later calls are no-ops.
pub fn init_logging(config: &dyn ConfigPort) {
    let level = config
        .get_non_empty("logging", "level")
        .unwrap_or_else(|| "info".to_string());
    let filter = std::env::var(LOG_ENV).unwrap_or(level);
    let env_filter = tracing_subscriber::EnvFilter::try_new(&filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = config
        .get_non_empty("logging", "format")
        .is_some_and(|f| f.eq_ignore_ascii_case("json"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

pub fn build_sync_settings(config: &dyn ConfigPort) -> Result<SyncSettings, SyncError> {
    let symbols = match config.get_non_empty("sync", "symbols") {
        Some(s) => parse_symbols(&s).map_err(|e| SyncError::ConfigInvalid {
            section: "sync".into(),
            key: "symbols".into(),
            reason: e.to_string(),
        })?,
        None => default_symbols(),
    };

    let scheme = match config.get_non_empty("sync", "prefix_scheme") {
        Some(s) => s.parse().map_err(|reason| SyncError::ConfigInvalid {
            section: "sync".into(),
            key: "prefix_scheme".into(),
            reason,
        })?,
        None => PrefixScheme::default(),
    };

    let initial_watermark = match config.get_non_empty("watermark", "initial") {
        Some(s) => Some(parse_timestamp(&s).map_err(|_| SyncError::ConfigInvalid {
            section: "watermark".into(),
            key: "initial".into(),
            reason: "invalid timestamp, expected YYYY-MM-DD HH:MM:SS".into(),
        })?),
        None => None,
    };

    let cutoff = config.get_int("sync", "cutoff_minutes", i64::from(DEFAULT_CUTOFF_MINUTES));
    let workers = config.get_int("sync", "download_workers", DEFAULT_DOWNLOAD_WORKERS as i64);

    Ok(SyncSettings {
        symbols,
        scheme,
        key_suffix: config
            .get_string("sync", "key_suffix")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_KEY_SUFFIX.to_string()),
        cutoff_minutes: cutoff.clamp(0, 1439) as u32,
        download_workers: workers.max(1) as usize,
        initial_watermark,
    })
}

enum Backend {
    Csv {
        series: CsvSeriesStore,
        watermark: FileWatermarkStore,
    },
    #[cfg(feature = "sqlite")]
    Sqlite(crate::adapters::sqlite_adapter::SqliteStore),
}

/// The configured series and watermark stores.
pub struct Stores {
    backend: Backend,
    lock_path: PathBuf,
}

impl Stores {
    pub fn open(config: &dyn ConfigPort) -> Result<Self, SyncError> {
        let backend = config
            .get_non_empty("store", "backend")
            .unwrap_or_else(|| "csv".to_string())
            .to_lowercase();

        match backend.as_str() {
            "csv" => {
                let series_path = required_path(config, "store", "path")?;
                let watermark_path = required_path(config, "watermark", "path")?;
                Ok(Self {
                    lock_path: SyncLock::path_for(&watermark_path),
                    backend: Backend::Csv {
                        series: CsvSeriesStore::new(series_path),
                        watermark: FileWatermarkStore::new(watermark_path),
                    },
                })
            }
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let db_path = required_path(config, "sqlite", "path")?;
                let store = crate::adapters::sqlite_adapter::SqliteStore::from_config(config)?;
                Ok(Self {
                    lock_path: SyncLock::path_for(&db_path),
                    backend: Backend::Sqlite(store),
                })
            }
            other => Err(SyncError::ConfigInvalid {
                section: "store".into(),
                key: "backend".into(),
                reason: format!("backend '{other}' is not available in this build"),
            }),
        }
    }

    pub fn series(&self) -> &dyn SeriesStorePort {
        match &self.backend {
            Backend::Csv { series, .. } => series,
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(store) => store,
        }
    }

    pub fn watermark(&self) -> &dyn WatermarkPort {
        match &self.backend {
            Backend::Csv { watermark, .. } => watermark,
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(store) => store,
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

fn required_path(config: &dyn ConfigPort, section: &str, key: &str) -> Result<PathBuf, SyncError> {
    config
        .get_non_empty(section, key)
        .map(PathBuf::from)
        .ok_or_else(|| SyncError::ConfigMissing {
            section: section.into(),
            key: key.into(),
        })
}

fn parse_arg_timestamp(value: &str, name: &str) -> Result<DateTime<Utc>, SyncError> {
    parse_timestamp(value).map_err(|_| SyncError::ConfigInvalid {
        section: "cli".into(),
        key: name.into(),
        reason: format!("invalid timestamp '{value}', expected YYYY-MM-DD HH:MM:SS"),
    })
}

/// Resolve `--start/--end` overrides against the watermark and the collection
/// cutoff. `None` means nothing is pending.
pub fn resolve_range(
    engine: &SyncEngine<'_>,
    start: Option<&str>,
    end: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<TimeRange>, SyncError> {
    if start.is_none() && end.is_none() {
        return engine.pending_range(now);
    }
    let start = match start {
        Some(s) => parse_arg_timestamp(s, "start")?,
        None => engine.current_watermark()?,
    };
    let end = match end {
        Some(s) => parse_arg_timestamp(s, "end")?,
        None => collection_cutoff(now, engine.settings().cutoff_minutes),
    };
    TimeRange::new(start, end).map(Some)
}

fn run_sync(config_path: &Path, start: Option<&str>, end: Option<&str>, dry_run: bool) -> ExitCode {
    match sync_command(config_path, start, end, dry_run, Utc::now()) {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

/// Body of `barsync sync`, returning the text printed on success.
pub fn sync_command(
    config_path: &Path,
    start: Option<&str>,
    end: Option<&str>,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<String, SyncError> {
    let config = prepare(config_path)?;
    let settings = build_sync_settings(&config)?;
    let stores = Stores::open(&config)?;
    let object_store = LocalObjectStore::new(required_path(&config, "source", "path")?);
    let reader = CsvAggregateReader;

    let engine = SyncEngine::new(
        &object_store,
        &reader,
        stores.series(),
        stores.watermark(),
        settings,
    );

    if dry_run {
        let Some(range) = resolve_range(&engine, start, end, now)? else {
            return Ok("up to date: nothing to sync".to_string());
        };
        let plan = engine.discover(&range)?;
        let mut out = format!(
            "range {range}\n{} prefixes, {} objects listed, {} selected\n",
            plan.prefixes.len(),
            plan.listed,
            plan.objects.len()
        );
        for handle in &plan.objects {
            out.push_str(&handle.key);
            out.push('\n');
        }
        return Ok(out.trim_end().to_string());
    }

    let _lock = SyncLock::acquire(stores.lock_path())?;
    let outcome = if start.is_some() || end.is_some() {
        match resolve_range(&engine, start, end, now)? {
            Some(range) => SyncOutcome::Synced(engine.sync(range)?),
            None => SyncOutcome::UpToDate {
                watermark: engine.current_watermark()?,
            },
        }
    } else {
        engine.sync_since_watermark(now)?
    };

    Ok(match outcome {
        SyncOutcome::UpToDate { watermark } => {
            format!("up to date: synced to {}", format_timestamp(watermark))
        }
        SyncOutcome::Synced(report) => format_report(&report),
    })
}

pub fn format_report(report: &SyncReport) -> String {
    let mut out = format!(
        "synced {}: {} files ({} listed, {} prefixes), watermark {}\n",
        report.range,
        report.files_processed,
        report.files_listed,
        report.prefixes,
        format_timestamp(report.new_watermark)
    );
    for update in &report.updates {
        out.push_str(&format!(
            "  {}: {} bars (+{}, trimmed {}, repaired {} duplicate / {} ambiguous){}\n",
            update.symbol,
            update.bars,
            update.appended,
            update.trimmed,
            update.repair.duplicates,
            update.repair.ambiguous,
            if update.created { " [new]" } else { "" }
        ));
    }
    for symbol in &report.skipped_symbols {
        out.push_str(&format!("  {symbol}: no new rows\n"));
    }
    for skipped in &report.skipped_files {
        out.push_str(&format!("  skipped {}: {}\n", skipped.key, skipped.reason));
    }
    out.trim_end().to_string()
}

fn run_prefixes(start: &str, end: &str, scheme: &str) -> ExitCode {
    let result = (|| {
        let scheme: PrefixScheme = scheme.parse().map_err(|reason| SyncError::ConfigInvalid {
            section: "cli".into(),
            key: "scheme".into(),
            reason,
        })?;
        let range = TimeRange::new(
            parse_arg_timestamp(start, "start")?,
            parse_arg_timestamp(end, "end")?,
        )?;
        Ok::<_, SyncError>(scheme.prefixes(&range))
    })();

    match result {
        Ok(prefixes) => {
            for prefix in prefixes {
                println!("{prefix}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_info(config_path: &Path, symbol: Option<&str>) -> ExitCode {
    match info_command(config_path, symbol) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

/// Body of `barsync info`.
pub fn info_command(config_path: &Path, symbol: Option<&str>) -> Result<String, SyncError> {
    let config = prepare(config_path)?;
    let stores = Stores::open(&config)?;

    let mut out = String::new();
    match stores.watermark().read_watermark()? {
        Some(watermark) => {
            let (from, to) = available_window(watermark);
            out.push_str(&format!(
                "watermark: {}\navailable: {from} .. {to}\n",
                format_timestamp(watermark)
            ));
        }
        None => out.push_str("watermark: none (never synced)\n"),
    }

    let symbols = match symbol {
        Some(s) => vec![s.trim().to_uppercase()],
        None => stores.series().list_symbols()?,
    };
    for symbol in symbols {
        match stores.series().read_series(&symbol)? {
            Some(series) => {
                let (first, last) = series
                    .span()
                    .map(|(f, l)| (format_timestamp(f), format_timestamp(l)))
                    .unwrap_or_default();
                out.push_str(&format!(
                    "{symbol}: {} bars, {first} .. {last}, {} gaps\n",
                    series.len(),
                    series.gaps().len()
                ));
            }
            None => out.push_str(&format!("{symbol}: no data\n")),
        }
    }

    Ok(out.trim_end().to_string())
}

fn run_export(config_path: &Path, symbol: &str, output: Option<&PathBuf>) -> ExitCode {
    match export_command(config_path, symbol, output.map(PathBuf::as_path)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

/// Body of `barsync export`: the stored series as CSV, to a file or stdout.
pub fn export_command(
    config_path: &Path,
    symbol: &str,
    output: Option<&Path>,
) -> Result<(), SyncError> {
    let config = prepare(config_path)?;
    let stores = Stores::open(&config)?;
    let symbol = symbol.trim().to_uppercase();

    let series = stores
        .series()
        .read_series(&symbol)?
        .ok_or_else(|| SyncError::PersistenceFailure {
            symbol: symbol.clone(),
            reason: "no stored series".into(),
        })?;

    let to_io = |e: csv::Error| SyncError::Io(io::Error::other(e));
    match output {
        Some(path) => {
            let file = fs::File::create(path)?;
            let mut writer = BufWriter::new(file);
            write_series_csv(&series, &mut writer).map_err(to_io)?;
            writer.flush()?;
            tracing::info!(
                symbol = %symbol,
                path = %path.display(),
                bars = series.len(),
                "series exported"
            );
        }
        None => {
            let stdout = io::stdout();
            write_series_csv(&series, stdout.lock()).map_err(to_io)?;
        }
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    if let Err(e) = validate_sync_config(&config) {
        return fail(e);
    }
    println!("Configuration is valid");
    ExitCode::SUCCESS
}
