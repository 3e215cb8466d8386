// SPDX-License-Identifier: MIT

//! Process-wide runtime context.
//!
//! Gathers what used to be ambient state (working directory, process name,
//! stderr destination) into one value constructed by the facade and passed
//! explicitly to the master, workers, controller, and output sinks.

use std::path::{Path, PathBuf};

use crate::hash::ProcessHash;

/// Master pid file, relative to the working directory.
pub const PID_FILE: &str = "process.pid";
/// Hash list written by the master on a status request.
pub const STATUS_FILE: &str = "status.workerman";
/// Hash list written by the master when a graceful stop/reload begins.
pub const SHUTDOWN_FILE: &str = "shutdown.workerman";
/// Timestamp written by the master after a reload completes.
pub const RESTART_FILE: &str = "restart.workerman";

/// Immutable per-run configuration shared by every process role.
///
/// All rendezvous paths derive from the working directory; no process
/// reads any other ambient state.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    root: PathBuf,
    name: Option<String>,
    std_err_path: Option<PathBuf>,
}

impl RuntimeContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            name: None,
            std_err_path: None,
        }
    }

    /// Set the human-visible server name (used in process titles).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the file stderr is redirected to on `start`.
    pub fn with_std_err_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.std_err_path = Some(path.into());
        self
    }

    /// Working directory holding every rendezvous file.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Server name, defaulting to `"Workerman"`.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Workerman")
    }

    /// Process title for the master: `"<name> master"`.
    pub fn master_title(&self) -> String {
        format!("{} master", self.display_name())
    }

    pub fn std_err_path(&self) -> Option<&Path> {
        self.std_err_path.as_deref()
    }

    pub fn pid_path(&self) -> PathBuf {
        self.root.join(PID_FILE)
    }

    pub fn status_path(&self) -> PathBuf {
        self.root.join(STATUS_FILE)
    }

    pub fn shutdown_path(&self) -> PathBuf {
        self.root.join(SHUTDOWN_FILE)
    }

    pub fn restart_path(&self) -> PathBuf {
        self.root.join(RESTART_FILE)
    }

    /// Rendezvous file owned by one process, named after its hash.
    pub fn hash_path(&self, hash: &ProcessHash) -> PathBuf {
        self.root.join(hash.as_str())
    }

    /// The four well-known rendezvous files, in a fixed order.
    ///
    /// The master removes all of these at startup (stale-run hygiene) and
    /// again on clean exit.
    pub fn well_known_paths(&self) -> [PathBuf; 4] {
        [
            self.pid_path(),
            self.status_path(),
            self.shutdown_path(),
            self.restart_path(),
        ]
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
