// SPDX-License-Identifier: MIT

//! Atomic rendezvous file I/O.
//!
//! Every piece of cross-process state in this system is either a POSIX
//! signal or a small JSON file under the working directory. Writes go
//! through a temp file + rename so a reader never observes a partial
//! payload; deletion is the completion signal, so `remove` reports whether
//! the file was actually there.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RendezvousError {
    #[error("rendezvous I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed rendezvous payload at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot lock, file already locked: {path}")]
    AlreadyLocked { path: PathBuf },

    #[error("cannot unlock, file is not locked: {path}")]
    NotLocked { path: PathBuf },
}

fn io_err(path: &Path, source: std::io::Error) -> RendezvousError {
    RendezvousError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `value` as JSON to `path` atomically (temp file + rename).
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), RendezvousError> {
    let payload = serde_json::to_vec(value).map_err(|source| RendezvousError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let tmp = tmp_path(path);
    let mut file = File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
    file.write_all(&payload).map_err(|e| io_err(&tmp, e))?;
    file.sync_all().map_err(|e| io_err(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

/// Read a JSON payload from `path`. Returns `None` when the file is absent.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, RendezvousError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path, e)),
    };
    let value = serde_json::from_slice(&bytes).map_err(|source| RendezvousError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(value))
}

/// Delete `path`. Returns `Ok(true)` when a file was removed, `Ok(false)`
/// when it was already gone.
pub fn remove(path: &Path) -> Result<bool, RendezvousError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Create an empty stub at `path` (the graceful-drain progress marker).
///
/// Truncates an existing file; the content is never read, only existence
/// matters.
pub fn touch(path: &Path) -> Result<(), RendezvousError> {
    File::create(path).map_err(|e| io_err(path, e))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Exclusive advisory locks with cached file descriptors.
///
/// `lock` opens (creating if needed) and flocks the path, caching the open
/// file until `unlock` releases and closes it. Unlocking a path that was
/// never locked is an error; locking is not reentrant.
#[derive(Default)]
pub struct LockTable {
    held: Mutex<HashMap<PathBuf, File>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire an exclusive advisory lock on `path`, blocking until held.
    pub fn lock(&self, path: &Path) -> Result<(), RendezvousError> {
        let mut held = self.held.lock();
        if held.contains_key(path) {
            return Err(RendezvousError::AlreadyLocked {
                path: path.to_path_buf(),
            });
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| io_err(path, e))?;
        file.lock_exclusive().map_err(|e| io_err(path, e))?;
        held.insert(path.to_path_buf(), file);
        Ok(())
    }

    /// Release the lock on `path` and close its cached descriptor.
    pub fn unlock(&self, path: &Path) -> Result<(), RendezvousError> {
        let mut held = self.held.lock();
        let file = held.remove(path).ok_or_else(|| RendezvousError::NotLocked {
            path: path.to_path_buf(),
        })?;
        fs2::FileExt::unlock(&file).map_err(|e| io_err(path, e))?;
        Ok(())
    }

    /// Whether this table currently holds a lock on `path`.
    pub fn is_locked(&self, path: &Path) -> bool {
        self.held.lock().contains_key(path)
    }
}

#[cfg(test)]
#[path = "rendezvous_tests.rs"]
mod tests;
