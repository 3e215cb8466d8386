// SPDX-License-Identifier: MIT

//! CLI-side command driver.
//!
//! Runs in the short-lived operator process. Shares no memory with the
//! master: it discovers the running master through `process.pid`, sends
//! control signals, and watches rendezvous files for progress and results.

use std::os::fd::AsRawFd;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nix::sys::signal::Signal;
use nix::unistd::{fork, setsid, ForkResult};
use thiserror::Error;

use workerman_core::rendezvous::{self, RendezvousError};
use workerman_core::{OutputHub, RuntimeContext, StatusRow};
use workerman_supervisor::listener::Listener;
use workerman_supervisor::master::{Master, MasterError};
use workerman_supervisor::proc_title::set_process_title;
use workerman_supervisor::signal::{self, SignalError};

use crate::watcher::{RendezvousWatcher, WatchError};

/// Daemonize verification: 10 × 500 ms.
const DAEMONIZE_POLL_STEPS: u32 = 10;
const DAEMONIZE_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Cannot start workerman, workerman already running.")]
    AlreadyRunning,

    #[error("Cannot {action}, workerman is not running.")]
    NotRunning { action: &'static str },

    #[error("Cannot restart workerman, the reload stamp on disk is stale.")]
    StaleRestartStamp,

    #[error("daemonized master never wrote its pid file")]
    DaemonizeFailed,

    #[error("fork failed: {source}")]
    Fork {
        #[source]
        source: nix::Error,
    },

    #[error("failed to redirect stderr: {source}")]
    StderrRedirect {
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Rendezvous(#[from] RendezvousError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    Master(#[from] MasterError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControlError {
    /// Operator mistakes get a short message; everything else gets the
    /// full error chain.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning | Self::NotRunning { .. } | Self::StaleRestartStamp
        )
    }
}

pub struct Controller {
    ctx: RuntimeContext,
    output: OutputHub,
}

impl Controller {
    pub fn new(ctx: RuntimeContext, output: OutputHub) -> Self {
        Self { ctx, output }
    }

    /// Start the master (foreground, or detached with `daemon`).
    pub fn start(&mut self, listeners: Vec<Listener>, daemon: bool) -> Result<(), ControlError> {
        std::fs::create_dir_all(self.ctx.root())?;
        if self.ctx.pid_path().exists() {
            return Err(ControlError::AlreadyRunning);
        }

        self.redirect_stderr(daemon)?;
        set_process_title(&self.ctx.master_title());

        if daemon {
            match self.daemonize()? {
                Daemonized::Verified => return Ok(()),
                Daemonized::Supervise => self.output.daemonize(),
            }
        } else {
            self.output.info(&format!(
                "{} started; press Ctrl+C to stop",
                self.ctx.display_name()
            ));
        }

        let mut master = Master::new(self.ctx.clone(), listeners, daemon);
        master.run()?;
        Ok(())
    }

    /// Stop the running master, optionally draining connections first.
    pub fn stop(&mut self, graceful: bool) -> Result<(), ControlError> {
        let pid = self.master_pid("stop workerman")?;
        let watcher = RendezvousWatcher::new(self.ctx.root())?;

        if graceful {
            // The hash list on disk is per-request; a leftover from an
            // earlier drain must not be mistaken for this one.
            rendezvous::remove(&self.ctx.shutdown_path())?;
            signal::deliver(pid, Signal::SIGQUIT)?;
            self.watch_drain(&watcher)?;
        } else {
            signal::deliver(pid, Signal::SIGINT)?;
        }

        watcher.wait_removed(&self.ctx.pid_path(), None);
        self.output.success("Workerman stopped.");
        Ok(())
    }

    /// Fork-replace every worker, optionally draining first.
    pub fn restart(&mut self, graceful: bool) -> Result<(), ControlError> {
        let pid = self.master_pid("restart workerman")?;
        let watcher = RendezvousWatcher::new(self.ctx.root())?;

        rendezvous::remove(&self.ctx.restart_path())?;
        if graceful {
            rendezvous::remove(&self.ctx.shutdown_path())?;
        }

        let sent_at = unix_now();
        signal::deliver(
            pid,
            if graceful {
                Signal::SIGUSR2
            } else {
                Signal::SIGUSR1
            },
        )?;

        if graceful {
            self.watch_drain(&watcher)?;
        }

        watcher.wait_present(&self.ctx.restart_path(), None);
        let stamp: u64 = rendezvous::read_json(&self.ctx.restart_path())?.unwrap_or(0);
        if stamp < sent_at {
            return Err(ControlError::StaleRestartStamp);
        }
        self.output.success("Workerman restarted.");
        Ok(())
    }

    /// Collect one status row per process (master first).
    ///
    /// Leaves the rendezvous directory exactly as it found it: every hash
    /// file and the hash list are consumed.
    pub fn status(&mut self) -> Result<Vec<StatusRow>, ControlError> {
        let pid = self.master_pid("collect worker status")?;
        let watcher = RendezvousWatcher::new(self.ctx.root())?;

        rendezvous::remove(&self.ctx.status_path())?;
        signal::deliver(pid, Signal::SIGABRT)?;

        watcher.wait_present(&self.ctx.status_path(), None);
        let hashes: Vec<String> =
            rendezvous::read_json(&self.ctx.status_path())?.unwrap_or_default();

        let mut rows = Vec::with_capacity(hashes.len());
        for hash in &hashes {
            let path = self.ctx.root().join(hash);
            let row = self.read_row(&watcher, &path)?;
            rows.push(row);
            rendezvous::remove(&path)?;
        }
        rendezvous::remove(&self.ctx.status_path())?;
        Ok(rows)
    }

    /// Wait for a hash file to hold a parseable row.
    fn read_row(
        &self,
        watcher: &RendezvousWatcher,
        path: &Path,
    ) -> Result<StatusRow, ControlError> {
        loop {
            if let Some(row) = rendezvous::read_json(path)? {
                return Ok(row);
            }
            watcher.tick();
        }
    }

    /// Watch the drain stubs disappear, ticking the progress bar.
    fn watch_drain(&mut self, watcher: &RendezvousWatcher) -> Result<(), ControlError> {
        let shutdown_path = self.ctx.shutdown_path();
        let pid_path = self.ctx.pid_path();
        // A drain with no connections can finish (and the master clean up)
        // before we start watching; the vanished pid file is the tell.
        watcher.wait_until(None, || shutdown_path.exists() || !pid_path.exists());
        let hashes: Vec<String> = rendezvous::read_json(&shutdown_path)?.unwrap_or_default();
        if hashes.is_empty() {
            return Ok(());
        }
        let total = hashes.len() as u64;

        let mut done = 0;
        self.output.progress_bar(total, done);
        while done < total {
            let remaining = hashes
                .iter()
                .filter(|hash| self.ctx.root().join(hash.as_str()).exists())
                .count() as u64;
            let finished = total - remaining;
            if finished != done {
                done = finished;
                self.output.progress_bar(total, done);
            }
            if done < total {
                watcher.tick();
            }
        }
        Ok(())
    }

    fn master_pid(&self, action: &'static str) -> Result<nix::unistd::Pid, ControlError> {
        let pid: Option<i32> = match rendezvous::read_json(&self.ctx.pid_path()) {
            Ok(pid) => pid,
            Err(_) => None,
        };
        pid.map(nix::unistd::Pid::from_raw)
            .ok_or(ControlError::NotRunning { action })
    }

    /// Point fd 2 at the configured stderr file. Without a configured
    /// path a daemonized master's stderr goes to /dev/null, with a
    /// warning while the terminal is still attached.
    fn redirect_stderr(&mut self, daemon: bool) -> Result<(), ControlError> {
        let target = match self.ctx.std_err_path() {
            Some(path) => path.to_path_buf(),
            None => {
                if !daemon {
                    return Ok(());
                }
                self.output
                    .warning("No stderr path configured; daemon stderr is discarded.");
                std::path::PathBuf::from("/dev/null")
            }
        };

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&target)
            .map_err(|source| ControlError::StderrRedirect { source })?;
        nix::unistd::dup2(file.as_raw_fd(), std::io::stderr().as_raw_fd()).map_err(|e| {
            ControlError::StderrRedirect {
                source: std::io::Error::from(e),
            }
        })?;
        Ok(())
    }

    /// Point the daemonized master's stdin/stdout at /dev/null so it
    /// holds no pipe or terminal fds from the invoking shell. stderr was
    /// already redirected before the fork.
    fn detach_stdio(&self) -> Result<(), ControlError> {
        let devnull = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/null")
            .map_err(|source| ControlError::StderrRedirect { source })?;
        for fd in [0, 1] {
            nix::unistd::dup2(devnull.as_raw_fd(), fd).map_err(|e| {
                ControlError::StderrRedirect {
                    source: std::io::Error::from(e),
                }
            })?;
        }
        Ok(())
    }

    /// Detach via double fork. The original process verifies the master
    /// came up (pid file, 10 × 500 ms) and reports to the operator; the
    /// grandchild continues as the master.
    fn daemonize(&mut self) -> Result<Daemonized, ControlError> {
        // SAFETY: the CLI is single-threaded at this point.
        match unsafe { fork() }.map_err(|source| ControlError::Fork { source })? {
            ForkResult::Parent { child } => {
                // The intermediate exits immediately; reap it.
                let _ = nix::sys::wait::waitpid(child, None);
                for _ in 0..DAEMONIZE_POLL_STEPS {
                    if self.ctx.pid_path().exists() {
                        self.output.success("Workerman started in daemon mode.");
                        return Ok(Daemonized::Verified);
                    }
                    std::thread::sleep(DAEMONIZE_POLL_INTERVAL);
                }
                Err(ControlError::DaemonizeFailed)
            }
            ForkResult::Child => {
                setsid().map_err(|source| ControlError::Fork { source })?;
                // SAFETY: still single-threaded; the parent half exits
                // without touching shared state.
                match unsafe { fork() }.map_err(|source| ControlError::Fork { source })? {
                    ForkResult::Parent { .. } => std::process::exit(0),
                    ForkResult::Child => {
                        self.detach_stdio()?;
                        Ok(Daemonized::Supervise)
                    }
                }
            }
        }
    }
}

/// Which side of the double fork this process ended up on.
enum Daemonized {
    /// Original process; the master is up and verified.
    Verified,
    /// Grandchild; continue as the master.
    Supervise,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
