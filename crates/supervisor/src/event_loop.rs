// SPDX-License-Identifier: MIT

//! Single-threaded `poll(2)` event loop.
//!
//! Workers drive everything through this reactor: listener readability,
//! per-connection readability and writability (for buffered outbound
//! data), one-shot timers, and cooperative signal dispatch. The loop is
//! constructed by the worker and passed explicitly; there is no
//! process-global loop instance.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::os::fd::{BorrowedFd, RawFd};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::Signal;
use thiserror::Error;

use crate::signal::SignalBus;

/// Opaque dispatch key chosen by the handler when registering interest.
pub type Token = u64;

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("poll failed: {0}")]
    Poll(#[source] nix::Error),
}

/// The narrow capability handlers get to drive the loop.
pub trait EventLoop {
    /// Register read interest on `fd`; readiness dispatches `token`.
    fn watch_read(&mut self, fd: RawFd, token: Token);
    /// Drop read interest on `fd`.
    fn unwatch_read(&mut self, fd: RawFd);
    /// Register write interest on `fd` (buffered output pending).
    fn watch_write(&mut self, fd: RawFd, token: Token);
    /// Drop write interest on `fd`.
    fn unwatch_write(&mut self, fd: RawFd);
    /// Arm a one-shot timer; expiry dispatches `token`.
    fn add_timer(&mut self, delay: Duration, token: Token);
    /// Number of timers currently pending.
    fn timer_count(&self) -> usize;
    /// Make `run` return after the current dispatch completes.
    fn stop(&mut self);
}

/// Receives loop events. One handler drives one loop.
pub trait EventHandler {
    fn on_readable(&mut self, ev: &mut dyn EventLoop, token: Token);
    fn on_timer(&mut self, ev: &mut dyn EventLoop, token: Token);
    fn on_signal(&mut self, ev: &mut dyn EventLoop, signal: Signal);
    /// Only delivered while write interest is registered.
    fn on_writable(&mut self, _ev: &mut dyn EventLoop, _token: Token) {}
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct TimerEntry {
    at: Instant,
    token: Token,
}

/// Registered interest on one fd.
struct Interest {
    fd: RawFd,
    token: Token,
    read: bool,
    write: bool,
}

impl Interest {
    fn events(&self) -> PollFlags {
        let mut flags = PollFlags::empty();
        if self.read {
            flags |= PollFlags::POLLIN;
        }
        if self.write {
            flags |= PollFlags::POLLOUT;
        }
        flags
    }
}

/// `poll(2)`-backed [`EventLoop`] implementation.
pub struct PollLoop {
    signals: SignalBus,
    interest: Vec<Interest>,
    timers: BinaryHeap<Reverse<TimerEntry>>,
    running: bool,
}

impl PollLoop {
    /// Build a loop draining `signals` cooperatively each turn.
    pub fn new(signals: SignalBus) -> Self {
        Self {
            signals,
            interest: Vec::new(),
            timers: BinaryHeap::new(),
            running: false,
        }
    }

    /// Dispatch events to `handler` until [`EventLoop::stop`] is called.
    ///
    /// Order within a turn: queued signals, due timers, then fd readiness.
    pub fn run(&mut self, handler: &mut dyn EventHandler) -> Result<(), LoopError> {
        self.running = true;
        while self.running {
            for signal in self.signals.drain() {
                handler.on_signal(self, signal);
                if !self.running {
                    return Ok(());
                }
            }

            self.dispatch_due_timers(handler);
            if !self.running {
                return Ok(());
            }

            let timeout = self.next_timeout();
            let mut fds: Vec<PollFd> = self
                .interest
                .iter()
                // SAFETY: every fd here is owned by the handler and stays
                // open until it drops its interest.
                .map(|i| PollFd::new(unsafe { BorrowedFd::borrow_raw(i.fd) }, i.events()))
                .collect();

            let ready_count = match poll(&mut fds, timeout) {
                Ok(n) => n,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(LoopError::Poll(e)),
            };
            if ready_count == 0 {
                continue;
            }

            let read_wake = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
            let write_wake = PollFlags::POLLOUT | PollFlags::POLLERR;
            let ready: Vec<(RawFd, Token, bool, bool)> = fds
                .iter()
                .zip(self.interest.iter())
                .filter_map(|(pollfd, interest)| {
                    let revents = pollfd.revents()?;
                    let readable = interest.read && revents.intersects(read_wake);
                    let writable = interest.write && revents.intersects(write_wake);
                    (readable || writable)
                        .then_some((interest.fd, interest.token, readable, writable))
                })
                .collect();
            drop(fds);

            for (fd, token, readable, writable) in ready {
                // A callback earlier in this batch may have dropped the fd.
                if readable && self.has_interest(fd, |i| i.read) {
                    handler.on_readable(self, token);
                    if !self.running {
                        return Ok(());
                    }
                }
                if writable && self.has_interest(fd, |i| i.write) {
                    handler.on_writable(self, token);
                    if !self.running {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// Give the signal bus back (worker teardown restores dispositions).
    pub fn into_signals(self) -> SignalBus {
        self.signals
    }

    fn has_interest(&self, fd: RawFd, flag: impl Fn(&Interest) -> bool) -> bool {
        self.interest.iter().any(|i| i.fd == fd && flag(i))
    }

    fn set_interest(&mut self, fd: RawFd, token: Token, write: bool) {
        if let Some(entry) = self.interest.iter_mut().find(|i| i.fd == fd) {
            entry.token = token;
            if write {
                entry.write = true;
            } else {
                entry.read = true;
            }
        } else {
            self.interest.push(Interest {
                fd,
                token,
                read: !write,
                write,
            });
        }
    }

    fn clear_interest(&mut self, fd: RawFd, write: bool) {
        if let Some(entry) = self.interest.iter_mut().find(|i| i.fd == fd) {
            if write {
                entry.write = false;
            } else {
                entry.read = false;
            }
        }
        self.interest.retain(|i| i.read || i.write);
    }

    fn dispatch_due_timers(&mut self, handler: &mut dyn EventHandler) {
        let now = Instant::now();
        while let Some(Reverse(entry)) = self.timers.peek() {
            if entry.at > now {
                break;
            }
            let token = entry.token;
            self.timers.pop();
            handler.on_timer(self, token);
            if !self.running {
                return;
            }
        }
    }

    fn next_timeout(&self) -> PollTimeout {
        match self.timers.peek() {
            Some(Reverse(entry)) => {
                let remaining = entry.at.saturating_duration_since(Instant::now());
                // +1 so we wake just past the deadline, capped for u16.
                let ms = remaining.as_millis().saturating_add(1).min(u128::from(u16::MAX));
                PollTimeout::from(ms as u16)
            }
            None => PollTimeout::NONE,
        }
    }
}

impl EventLoop for PollLoop {
    fn watch_read(&mut self, fd: RawFd, token: Token) {
        self.set_interest(fd, token, false);
    }

    fn unwatch_read(&mut self, fd: RawFd) {
        self.clear_interest(fd, false);
    }

    fn watch_write(&mut self, fd: RawFd, token: Token) {
        self.set_interest(fd, token, true);
    }

    fn unwatch_write(&mut self, fd: RawFd) {
        self.clear_interest(fd, true);
    }

    fn add_timer(&mut self, delay: Duration, token: Token) {
        self.timers.push(Reverse(TimerEntry {
            at: Instant::now() + delay,
            token,
        }));
    }

    fn timer_count(&self) -> usize {
        self.timers.len()
    }

    fn stop(&mut self) {
        self.running = false;
    }
}

#[cfg(test)]
#[path = "event_loop_tests.rs"]
mod tests;
