//! Object store backed by a local directory, e.g. a mounted bucket mirror.

use crate::domain::error::SyncError;
use crate::ports::object_store_port::{ObjectHandle, ObjectStorePort};
use std::fs;
use std::path::PathBuf;

/// Each regular file directly under `root` is one object; its file name is the
/// key.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

fn unavailable(reason: String) -> SyncError {
    SyncError::ObjectStoreUnavailable { reason }
}

impl ObjectStorePort for LocalObjectStore {
    fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectHandle>, SyncError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| unavailable(format!("failed to list {}: {e}", self.root.display())))?;

        let mut handles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| unavailable(format!("directory entry error: {e}")))?;
            let name = entry.file_name();
            let Some(key) = name.to_str() else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            let metadata = entry
                .metadata()
                .map_err(|e| unavailable(format!("failed to stat {key}: {e}")))?;
            if !metadata.is_file() {
                continue;
            }
            handles.push(ObjectHandle {
                key: key.to_string(),
                size: Some(metadata.len()),
            });
        }

        handles.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(handles)
    }

    fn download_object(&self, handle: &ObjectHandle) -> Result<Vec<u8>, SyncError> {
        if handle.key.contains(['/', '\\']) || handle.key.starts_with('.') {
            return Err(unavailable(format!("refusing object key {}", handle.key)));
        }
        let path = self.root.join(&handle.key);
        fs::read(&path).map_err(|e| unavailable(format!("failed to read {}: {e}", path.display())))
    }
}
