// SPDX-License-Identifier: MIT

//! Typed rendezvous-directory watcher.
//!
//! The controller never sleeps blindly: it blocks on file-system events
//! for the working directory (inotify/kqueue/FSEvents via `notify`) with a
//! 200 ms polling fallback, and re-checks its predicate on every wakeup.

use std::path::Path;
use std::sync::mpsc::{channel, Receiver};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;

/// Fallback tick when the platform watcher delivers nothing.
const POLL_FALLBACK: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: String,
        #[source]
        source: notify::Error,
    },
}

pub struct RendezvousWatcher {
    // Held for its side effect; dropping it stops the event stream.
    _watcher: RecommendedWatcher,
    events: Receiver<()>,
}

impl RendezvousWatcher {
    /// Watch `dir` (non-recursively) for file creation/removal/renames.
    pub fn new(dir: &Path) -> Result<Self, WatchError> {
        let (tx, events) = channel();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(_)
                ) {
                    let _ = tx.send(());
                }
            }
        })
        .map_err(|source| WatchError::Watch {
            path: dir.display().to_string(),
            source,
        })?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Watch {
                path: dir.display().to_string(),
                source,
            })?;
        Ok(Self {
            _watcher: watcher,
            events,
        })
    }

    /// Block until a directory event arrives or the fallback tick elapses,
    /// then drain coalesced events.
    pub fn tick(&self) {
        let _ = self.events.recv_timeout(POLL_FALLBACK);
        while self.events.try_recv().is_ok() {}
    }

    /// Wait until `path` exists. `deadline: None` waits forever.
    /// Returns whether the predicate held before the deadline.
    pub fn wait_present(&self, path: &Path, deadline: Option<Duration>) -> bool {
        self.wait_until(deadline, || path.exists())
    }

    /// Wait until `path` is gone. `deadline: None` waits forever.
    pub fn wait_removed(&self, path: &Path, deadline: Option<Duration>) -> bool {
        self.wait_until(deadline, || !path.exists())
    }

    /// Re-check `predicate` after every directory event or fallback tick.
    pub fn wait_until(&self, deadline: Option<Duration>, predicate: impl Fn() -> bool) -> bool {
        let started = Instant::now();
        loop {
            if predicate() {
                return true;
            }
            if let Some(limit) = deadline {
                if started.elapsed() >= limit {
                    return false;
                }
            }
            self.tick();
        }
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
