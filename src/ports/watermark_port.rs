//! Sync watermark port.

use crate::domain::error::SyncError;
use chrono::{DateTime, Utc};

pub trait WatermarkPort: Send + Sync {
    /// Instant the last successful sync reached, `None` before the first one.
    fn read_watermark(&self) -> Result<Option<DateTime<Utc>>, SyncError>;

    fn write_watermark(&self, synced_to: DateTime<Utc>) -> Result<(), SyncError>;
}
