//! Raw aggregate file parsing port.

use crate::domain::error::SyncError;
use crate::domain::raw_record::RawAggregateRecord;

pub trait AggregateReaderPort: Send + Sync {
    /// Parse one downloaded file. A file missing required columns yields
    /// [`SyncError::MalformedInputFile`], which the engine treats as a skip.
    fn read_records(&self, name: &str, bytes: &[u8])
    -> Result<Vec<RawAggregateRecord>, SyncError>;
}
