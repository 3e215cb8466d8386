// SPDX-License-Identifier: MIT

//! Master process: forks workers, reaps them, and answers control signals.
//!
//! The monitor loop alternates a cooperative signal drain with a blocking
//! `waitpid`. All bookkeeping lives in [`state::MasterState`]; this module
//! executes its decisions against the operating system.

pub mod state;

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, getpid, ForkResult, Pid};
use thiserror::Error;
use tracing::{debug, error, info};

use workerman_core::rendezvous::{self, RendezvousError};
use workerman_core::status::{format_connections, format_memory_mb, format_start_time};
use workerman_core::{ProcessHash, RuntimeContext, StatusRow};

use crate::listener::{Listener, ListenerError};
use crate::memory;
use crate::signal::{self, SignalBus, SignalError, CONTROL_SIGNALS};
use crate::worker::Worker;
use state::{MasterState, WorkerRecord};

#[derive(Debug, Error)]
pub enum MasterError {
    #[error("fork failed: {source}")]
    Fork {
        #[source]
        source: nix::Error,
    },

    #[error("waitpid failed: {source}")]
    Wait {
        #[source]
        source: nix::Error,
    },

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Rendezvous(#[from] RendezvousError),

    #[error(transparent)]
    Signal(#[from] SignalError),
}

/// Operator commands, decoded from control signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlAction {
    HardStop,
    GracefulStop,
    HardReload,
    GracefulReload,
    Status,
}

fn control_action(sig: Signal) -> Option<ControlAction> {
    match sig {
        Signal::SIGINT | Signal::SIGTERM | Signal::SIGHUP | Signal::SIGTSTP => {
            Some(ControlAction::HardStop)
        }
        Signal::SIGQUIT => Some(ControlAction::GracefulStop),
        Signal::SIGUSR1 => Some(ControlAction::HardReload),
        Signal::SIGUSR2 => Some(ControlAction::GracefulReload),
        Signal::SIGABRT => Some(ControlAction::Status),
        _ => None,
    }
}

pub struct Master {
    ctx: RuntimeContext,
    listeners: Vec<Listener>,
    state: MasterState,
    hash: ProcessHash,
    start_time: Instant,
    daemon: bool,
    signals: Option<SignalBus>,
}

impl Master {
    pub fn new(ctx: RuntimeContext, listeners: Vec<Listener>, daemon: bool) -> Self {
        Self {
            ctx,
            listeners,
            state: MasterState::new(),
            hash: ProcessHash::generate(),
            start_time: Instant::now(),
            daemon,
            signals: None,
        }
    }

    /// Run the master to completion: bind, fork the worker pool, supervise.
    pub fn run(&mut self) -> Result<(), MasterError> {
        // A previous run may have died without cleaning up.
        for path in self.ctx.well_known_paths() {
            rendezvous::remove(&path)?;
        }

        // Handlers go in before the pid file: the pid file is how the
        // controller discovers this master, and a control signal must
        // never find a default disposition.
        self.signals = Some(SignalBus::install(&CONTROL_SIGNALS)?);

        for listener in &mut self.listeners {
            if !listener.reuse_port() {
                listener.build()?;
            }
        }

        rendezvous::write_json(&self.ctx.pid_path(), &getpid().as_raw())?;

        for index in 0..self.listeners.len() {
            for _ in 0..self.listeners[index].worker_count() {
                let record = WorkerRecord {
                    id: self.state.allocate_id(),
                    listener_index: index,
                    hash: ProcessHash::generate(),
                    restart_count: 0,
                    start_time: SystemTime::now(),
                };
                self.spawn_worker(record)?;
            }
        }

        info!(
            pid = getpid().as_raw(),
            workers = self.state.workers_len(),
            "master started"
        );

        self.monitor_loop()?;

        // Controlled exit: the last planned stop was reaped.
        self.cleanup_rendezvous();
        info!("master stopped");
        Ok(())
    }

    fn monitor_loop(&mut self) -> Result<(), MasterError> {
        while self.state.run {
            let pending = match &self.signals {
                Some(bus) => bus.drain(),
                None => Vec::new(),
            };
            for sig in pending {
                self.handle_control(sig);
                if !self.state.run {
                    return Ok(());
                }
            }

            match waitpid(None::<Pid>, Some(WaitPidFlag::WUNTRACED)) {
                Ok(WaitStatus::Exited(pid, code)) => self.on_reaped(pid, code)?,
                Ok(WaitStatus::Signaled(pid, sig, _)) => {
                    self.on_reaped(pid, 128 + sig as i32)?;
                }
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => {
                    // No children to reap; wait for the next signal.
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
                Err(source) => return Err(MasterError::Wait { source }),
            }
        }
        Ok(())
    }

    /// Execute one reap decision. `UnexpectedExit` is logged, never
    /// propagated — the supervisor stays alive.
    fn on_reaped(&mut self, pid: Pid, status: i32) -> Result<(), MasterError> {
        let decision = self.state.on_reaped(pid, status);

        if let Some(unexpected) = decision.unexpected {
            error!(
                worker_id = unexpected.worker_id,
                pid = pid.as_raw(),
                status = unexpected.status,
                "worker exited unexpectedly"
            );
        }

        if let Some(record) = decision.revive {
            info!(worker_id = record.id, "reviving worker");
            self.spawn_worker(record)?;
        }

        if decision.reload_complete {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            if let Err(e) = rendezvous::write_json(&self.ctx.restart_path(), &now) {
                error!(error = %e, "failed to stamp reload completion");
            }
            info!("reload complete");
        }

        Ok(())
    }

    /// Fork one worker from `record`. The child never returns.
    fn spawn_worker(&mut self, record: WorkerRecord) -> Result<(), MasterError> {
        // SAFETY: the master is single-threaded; the child immediately
        // becomes a worker and exits without returning here.
        match unsafe { fork() }.map_err(|source| MasterError::Fork { source })? {
            ForkResult::Child => self.enter_worker(record),
            ForkResult::Parent { child } => {
                debug!(pid = child.as_raw(), worker_id = record.id, "forked worker");
                self.state.insert_worker(child, record);
                Ok(())
            }
        }
    }

    /// Child-side continuation of a fork: shed master state and become the
    /// worker described by `record`.
    fn enter_worker(&mut self, record: WorkerRecord) -> ! {
        self.state.run = false;
        self.state.shutdown_disabled = true;
        // The master's dispatch loop is gone in this process; the
        // installed handlers stay so a signal landing before the worker
        // re-installs its own set is queued, not fatal.
        self.signals.take();

        let listeners = std::mem::take(&mut self.listeners);
        let code = match Worker::start(
            self.ctx.clone(),
            record.id,
            record.hash,
            record.restart_count,
            listeners,
            record.listener_index,
            self.daemon,
        ) {
            Ok(()) => 0,
            Err(e) => {
                error!(worker_id = record.id, error = %e, "worker failed");
                250
            }
        };
        std::process::exit(code);
    }

    fn handle_control(&mut self, sig: Signal) {
        let Some(action) = control_action(sig) else {
            return;
        };
        debug!(signal = %sig, ?action, "control signal");
        match action {
            ControlAction::HardStop => {
                info!("stopping all workers");
                self.state.begin_stop(false);
                self.fan_out(false);
                self.finish_if_empty();
            }
            ControlAction::GracefulStop => {
                info!("gracefully stopping all workers");
                self.state.begin_stop(true);
                self.fan_out(true);
                self.finish_if_empty();
            }
            ControlAction::HardReload => {
                info!("reloading all workers");
                self.state.begin_reload();
                self.fan_out(false);
            }
            ControlAction::GracefulReload => {
                info!("gracefully reloading all workers");
                self.state.begin_reload();
                self.fan_out(true);
            }
            ControlAction::Status => self.collect_status(),
        }
    }

    /// A stop with an already-empty pool has nothing to reap; leave the
    /// monitor loop directly.
    fn finish_if_empty(&mut self) {
        if self.state.workers_is_empty() {
            self.state.run = false;
            self.state.shutdown_disabled = true;
        }
    }

    /// Send the stop signal to every worker. For graceful drains the hash
    /// list and the per-hash stub files go to disk first, so the
    /// controlling CLI can watch the stubs disappear as workers exit.
    fn fan_out(&mut self, graceful: bool) {
        if graceful {
            let hashes = self.state.worker_hashes();
            let names: Vec<String> = hashes.iter().map(|h| h.as_str().to_string()).collect();
            if let Err(e) = rendezvous::write_json(&self.ctx.shutdown_path(), &names) {
                error!(error = %e, "failed to write shutdown hash list");
            }
            for hash in &hashes {
                if let Err(e) = rendezvous::touch(&self.ctx.hash_path(hash)) {
                    error!(hash = hash.as_str(), error = %e, "failed to create drain stub");
                }
            }
        }

        let sig = if graceful {
            Signal::SIGQUIT
        } else {
            Signal::SIGINT
        };
        for pid in self.state.worker_pids() {
            if let Err(e) = signal::deliver(pid, sig) {
                // Per-pid failures never abort the fanout.
                error!(pid = pid.as_raw(), error = %e, "signal delivery failed");
            }
        }
    }

    /// Answer a status request: write the master row and the hash list,
    /// then ask every worker for its own row.
    fn collect_status(&mut self) {
        let row = self.status_row();
        if let Err(e) = rendezvous::write_json(&self.ctx.hash_path(&self.hash), &row) {
            error!(error = %e, "failed to write master status row");
        }

        let mut names = vec![self.hash.as_str().to_string()];
        names.extend(
            self.state
                .worker_hashes()
                .iter()
                .map(|h| h.as_str().to_string()),
        );
        if let Err(e) = rendezvous::write_json(&self.ctx.status_path(), &names) {
            error!(error = %e, "failed to write status hash list");
        }

        for pid in self.state.worker_pids() {
            if let Err(e) = signal::deliver(pid, Signal::SIGABRT) {
                error!(pid = pid.as_raw(), error = %e, "signal delivery failed");
            }
        }
    }

    fn status_row(&self) -> StatusRow {
        let usage = memory::sample();
        StatusRow {
            id: "M".to_string(),
            listen: "N/A".to_string(),
            name: self.ctx.display_name().to_string(),
            memory: format_memory_mb(usage.current),
            peak_memory: format_memory_mb(usage.peak),
            start_time: format_start_time(0, self.start_time.elapsed().as_secs()),
            connections: format_connections(0, 0),
            timers: 0,
        }
    }

    /// Remove every rendezvous file this run created.
    fn cleanup_rendezvous(&mut self) {
        for path in self.ctx.well_known_paths() {
            let _ = rendezvous::remove(&path);
        }
        let _ = rendezvous::remove(&self.ctx.hash_path(&self.hash));
        for hash in self.state.worker_hashes() {
            let _ = rendezvous::remove(&self.ctx.hash_path(&hash));
        }
    }
}

impl Drop for Master {
    /// Last-resort teardown for every exit path other than the controlled
    /// one: kill the pool and clear the rendezvous directory so the next
    /// `start` succeeds.
    fn drop(&mut self) {
        if self.state.shutdown_disabled {
            return;
        }
        error!("master exiting unexpectedly; killing workers");
        for pid in self.state.worker_pids() {
            let _ = signal::deliver(pid, Signal::SIGKILL);
        }
        self.cleanup_rendezvous();
    }
}

#[cfg(test)]
#[path = "master_tests.rs"]
mod tests;
