// SPDX-License-Identifier: MIT

//! Cooperative signal queue.
//!
//! Signal handlers must not touch locks or allocate, so the handler only
//! pushes the raw signal number onto a fixed ring of atomics. The owning
//! process (master or worker) drains the ring from its main loop and
//! dispatches there. Handlers are installed without `SA_RESTART` so that a
//! blocking `waitpid`/`poll` wakes with `EINTR` when a signal lands.

use std::os::raw::c_int;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;
use thiserror::Error;

/// Signals a master reacts to (operator control surface).
pub const CONTROL_SIGNALS: [Signal; 8] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGHUP,
    Signal::SIGTSTP,
    Signal::SIGQUIT,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGABRT,
];

/// Signals a worker reacts to (same set, worker semantics).
pub const WORKER_SIGNALS: [Signal; 8] = CONTROL_SIGNALS;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("failed to install handler for {signal}: {source}")]
    Install {
        signal: Signal,
        #[source]
        source: nix::Error,
    },

    #[error("failed to deliver {signal} to pid {pid}: {source}")]
    Delivery {
        signal: Signal,
        pid: i32,
        #[source]
        source: nix::Error,
    },
}

const QUEUE_LEN: usize = 64;

// Single queue per process: signal dispositions are process-global, so a
// second bus in the same process would race the first. The fork child
// clears this before installing its own handlers.
static SLOTS: [AtomicI32; QUEUE_LEN] = [const { AtomicI32::new(0) }; QUEUE_LEN];
static TAIL: AtomicUsize = AtomicUsize::new(0);
static HEAD: AtomicUsize = AtomicUsize::new(0);

extern "C" fn enqueue_signal(signo: c_int) {
    let slot = TAIL.fetch_add(1, Ordering::AcqRel) % QUEUE_LEN;
    SLOTS[slot].store(signo, Ordering::Release);
}

/// Installed signal set plus the drain side of the process-global queue.
pub struct SignalBus {
    installed: Vec<Signal>,
}

impl SignalBus {
    /// Install the queueing handler for every signal in `signals`.
    pub fn install(signals: &[Signal]) -> Result<Self, SignalError> {
        let action = SigAction::new(
            SigHandler::Handler(enqueue_signal),
            SaFlags::empty(),
            SigSet::empty(),
        );
        for &signal in signals {
            // SAFETY: enqueue_signal is async-signal-safe (atomics only).
            unsafe { sigaction(signal, &action) }.map_err(|source| SignalError::Install {
                signal,
                source,
            })?;
        }
        Ok(Self {
            installed: signals.to_vec(),
        })
    }

    /// Pop every queued signal, oldest first.
    pub fn drain(&self) -> Vec<Signal> {
        let mut out = Vec::new();
        loop {
            let head = HEAD.load(Ordering::Acquire);
            if head == TAIL.load(Ordering::Acquire) {
                break;
            }
            let signo = SLOTS[head % QUEUE_LEN].swap(0, Ordering::AcqRel);
            if signo == 0 {
                // Producer reserved the slot but hasn't stored yet; retry
                // on the next drain.
                break;
            }
            HEAD.store(head + 1, Ordering::Release);
            if let Ok(signal) = Signal::try_from(signo) {
                out.push(signal);
            }
        }
        out
    }

    /// Restore the default disposition for every installed signal.
    ///
    /// A forked worker calls this on the inherited master bus before
    /// installing its own handlers.
    pub fn uninstall(self) -> Result<(), SignalError> {
        let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        for &signal in &self.installed {
            // SAFETY: resetting to SigDfl installs no user code.
            unsafe { sigaction(signal, &action) }.map_err(|source| SignalError::Install {
                signal,
                source,
            })?;
        }
        Ok(())
    }
}

/// Discard anything still queued (fork children inherit the parent's
/// pending entries).
pub fn clear_queue() {
    HEAD.store(TAIL.load(Ordering::Acquire), Ordering::Release);
    for slot in &SLOTS {
        slot.store(0, Ordering::Release);
    }
}

/// Deliver `signal` to `pid`.
pub fn deliver(pid: Pid, signal: Signal) -> Result<(), SignalError> {
    nix::sys::signal::kill(pid, signal).map_err(|source| SignalError::Delivery {
        signal,
        pid: pid.as_raw(),
        source,
    })
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
