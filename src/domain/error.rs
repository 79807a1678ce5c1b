//! Error types for the synchronization pipeline.

use chrono::{DateTime, Utc};

/// Top-level error type for barsync.
///
/// `MalformedInputFile` and `EmptyMergeSet` are soft: the engine records them
/// in the sync report and carries on. Everything else aborts the attempt
/// before the watermark moves.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("malformed input file {file}: {reason}")]
    MalformedInputFile { file: String, reason: String },

    #[error("no rows for {symbol} in this batch")]
    EmptyMergeSet { symbol: String },

    #[error("failed to persist series for {symbol}: {reason}")]
    PersistenceFailure { symbol: String, reason: String },

    #[error("object store unavailable: {reason}")]
    ObjectStoreUnavailable { reason: String },

    #[error("watermark error: {reason}")]
    Watermark { reason: String },

    #[error("invalid time range: start {start} is not before end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("another sync holds the lock at {path} (delete it if no sync is running)")]
    Locked { path: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Soft errors are absorbed at the file or symbol level.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            SyncError::MalformedInputFile { .. } | SyncError::EmptyMergeSet { .. }
        )
    }
}

impl From<&SyncError> for std::process::ExitCode {
    fn from(err: &SyncError) -> Self {
        let code: u8 = match err {
            SyncError::Io(_) => 1,
            SyncError::ConfigParse { .. }
            | SyncError::ConfigMissing { .. }
            | SyncError::ConfigInvalid { .. }
            | SyncError::InvalidRange { .. } => 2,
            SyncError::PersistenceFailure { .. } | SyncError::Watermark { .. } => 3,
            SyncError::ObjectStoreUnavailable { .. } => 4,
            SyncError::MalformedInputFile { .. } | SyncError::EmptyMergeSet { .. } => 5,
            SyncError::Locked { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
