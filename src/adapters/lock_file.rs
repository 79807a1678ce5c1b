//! Exclusive lock file serialising sync runs.

use crate::domain::error::SyncError;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Held for the duration of a sync; the file is removed on drop.
#[derive(Debug)]
pub struct SyncLock {
    path: PathBuf,
}

impl SyncLock {
    /// Take the lock at `path`. A lock left by a process that no longer runs
    /// is removed and taken over once.
    pub fn acquire(path: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        match Self::create(path)? {
            Some(lock) => Ok(lock),
            None if holder_is_dead(path) => {
                tracing::warn!(path = %path.display(), "removing stale sync lock");
                fs::remove_file(path)?;
                Self::create(path)?.ok_or_else(|| locked(path))
            }
            None => Err(locked(path)),
        }
    }

    fn create(path: &Path) -> Result<Option<Self>, SyncError> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(SyncError::Io(e)),
        };
        writeln!(file, "{}", std::process::id())?;
        Ok(Some(Self {
            path: path.to_path_buf(),
        }))
    }

    /// Lock path used next to a watermark file.
    pub fn path_for(watermark: &Path) -> PathBuf {
        let mut name = watermark
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "barsync".into());
        name.push(".lock");
        watermark.with_file_name(name)
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove sync lock");
        }
    }
}

fn locked(path: &Path) -> SyncError {
    SyncError::Locked {
        path: path.display().to_string(),
    }
}

/// Pid recorded in the lock file, if readable.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn holder_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

// Only answers "dead" when the pid is known and the process table says so;
// anything uncertain keeps the lock.
#[cfg(target_os = "linux")]
fn holder_is_dead(path: &Path) -> bool {
    match holder_pid(path) {
        Some(pid) => !Path::new("/proc").join(pid.to_string()).exists(),
        None => false,
    }
}

#[cfg(not(target_os = "linux"))]
fn holder_is_dead(_path: &Path) -> bool {
    false
}
