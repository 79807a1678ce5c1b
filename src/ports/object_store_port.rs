//! Object store listing and download port.

use crate::domain::error::SyncError;

/// A listed object. `key` is the full object name, e.g.
/// `1541030427-BTCUSDT-aggregates.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub key: String,
    pub size: Option<u64>,
}

impl ObjectHandle {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: None,
        }
    }
}

/// Prefix-listing object store. Implementations own retries and timeouts;
/// failures surface as [`SyncError::ObjectStoreUnavailable`].
pub trait ObjectStorePort: Send + Sync {
    /// Objects whose key starts with `prefix`, in key order.
    fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectHandle>, SyncError>;

    fn download_object(&self, handle: &ObjectHandle) -> Result<Vec<u8>, SyncError>;
}
