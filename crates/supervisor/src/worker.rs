// SPDX-License-Identifier: MIT

//! Worker child process.
//!
//! One worker serves one listener: it accepts connections, forwards bytes
//! to the application callbacks, answers control signals, and writes its
//! status row on demand. The whole worker is one `PollLoop` turn after
//! another; nothing here blocks except the poll itself.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use workerman_core::rendezvous::{self, RendezvousError};
use workerman_core::status::{format_connections, format_memory_mb, format_start_time};
use workerman_core::{ProcessHash, RuntimeContext, StatusRow};

use crate::connection::ConnectionId;
use crate::event_loop::{EventHandler, EventLoop, LoopError, PollLoop, Token};
use crate::listener::{Listener, ListenerError, Transport};
use crate::memory;
use crate::proc_title::set_process_title;
use crate::signal::{SignalBus, SignalError, WORKER_SIGNALS};
use nix::sys::signal::Signal;

const ACCEPT_TOKEN: Token = 0;
const DRAIN_TIMER_TOKEN: Token = 1;
const CONN_TOKEN_BASE: Token = 16;

/// Level-triggered drain re-check interval.
const DRAIN_RETRY: Duration = Duration::from_secs(1);
const READ_BUF_LEN: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Loop(#[from] LoopError),

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    Rendezvous(#[from] RendezvousError),
}

/// Removes the worker's hash file on every exit path, including panics.
struct HashFileGuard {
    path: std::path::PathBuf,
}

impl Drop for HashFileGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub struct Worker {
    ctx: RuntimeContext,
    id: u32,
    hash: ProcessHash,
    restart_count: u32,
    daemon: bool,
    listener: Listener,
    start_time: Instant,
    connections: HashMap<ConnectionId, crate::connection::Connection>,
    total_connections: u64,
    next_conn_id: ConnectionId,
    draining: bool,
    read_buf: Vec<u8>,
}

impl Worker {
    /// Run a worker to completion in the current (freshly forked) process.
    ///
    /// `listeners` is the full inherited set; everything but
    /// `listeners[claimed]` is released so only the assigned worker
    /// accepts on each socket.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        ctx: RuntimeContext,
        id: u32,
        hash: ProcessHash,
        restart_count: u32,
        mut listeners: Vec<Listener>,
        claimed: usize,
        daemon: bool,
    ) -> Result<(), WorkerError> {
        let start_time = Instant::now();
        let _hash_guard = HashFileGuard {
            path: ctx.hash_path(&hash),
        };

        // The queue inherited at fork is kept: anything enqueued between
        // the fork and the install below (a status request, a drain) must
        // reach this worker's dispatch, not vanish. Timer state never
        // crosses the fork; the loop below starts empty.

        if listeners[claimed].reuse_port() {
            listeners[claimed].build_in_worker()?;
        }
        Listener::drop_competing_state(&mut listeners, claimed);
        let listener = listeners.swap_remove(claimed);

        set_process_title(&format!("{} worker ({})", listener.name(), id));

        let bus = SignalBus::install(&WORKER_SIGNALS)?;
        let mut event_loop = PollLoop::new(bus);

        let mut worker = Worker {
            ctx,
            id,
            hash,
            restart_count,
            daemon,
            listener,
            start_time,
            connections: HashMap::new(),
            total_connections: 0,
            next_conn_id: 0,
            draining: false,
            read_buf: vec![0u8; READ_BUF_LEN],
        };
        worker
            .listener
            .resume_accept(&mut event_loop, ACCEPT_TOKEN)?;

        info!(
            worker_id = worker.id,
            pid = nix::unistd::getpid().as_raw(),
            listen = worker.listener.local_addr(),
            daemon = worker.daemon,
            "worker started"
        );

        event_loop.run(&mut worker)?;
        event_loop.into_signals().uninstall()?;
        Ok(())
    }

    fn accept_one(&mut self, ev: &mut dyn EventLoop) {
        if self.listener.transport() == Transport::Udp {
            let buf = &mut self.read_buf;
            if let Err(e) = self.listener.recv_datagram(buf) {
                warn!(worker_id = self.id, error = %e, "datagram read failed");
            }
            return;
        }

        let id = self.next_conn_id;
        match self.listener.accept(id) {
            Ok(Some(mut conn)) => {
                self.next_conn_id += 1;
                self.total_connections += 1;
                if let Some(cb) = self.listener.connect_callback() {
                    cb(&mut conn);
                }
                ev.watch_read(conn.raw_fd(), CONN_TOKEN_BASE + id);
                if conn.has_outbound() {
                    ev.watch_write(conn.raw_fd(), CONN_TOKEN_BASE + id);
                }
                self.connections.insert(id, conn);
            }
            // Lost the accept race to a sibling on a shared socket.
            Ok(None) => {}
            Err(e) => warn!(worker_id = self.id, error = %e, "accept failed"),
        }
    }

    fn read_connection(&mut self, ev: &mut dyn EventLoop, id: ConnectionId) {
        let (closed, fd, backed_up) = {
            let Some(conn) = self.connections.get_mut(&id) else {
                return;
            };
            let buf = &mut self.read_buf;
            let closed = match conn.read(buf) {
                Ok(0) => true,
                Ok(n) => {
                    if let Some(cb) = self.listener.message_callback() {
                        cb(conn, &buf[..n]);
                    }
                    false
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
                Err(e) => {
                    debug!(worker_id = self.id, conn = id, error = %e, "connection error");
                    true
                }
            };
            (closed, conn.raw_fd(), conn.has_outbound())
        };

        if closed {
            self.close_connection(ev, id);
        } else if backed_up {
            // The callback wrote more than the socket took; flush the
            // rest when the fd polls writable.
            ev.watch_write(fd, CONN_TOKEN_BASE + id);
        }
    }

    /// Push buffered output out; closes the connection on a write error.
    fn flush_connection(&mut self, ev: &mut dyn EventLoop, id: ConnectionId) {
        let flushed = {
            let Some(conn) = self.connections.get_mut(&id) else {
                return;
            };
            match conn.flush_outbound() {
                Ok(()) => Some((conn.raw_fd(), conn.has_outbound())),
                Err(e) => {
                    debug!(worker_id = self.id, conn = id, error = %e, "flush failed");
                    None
                }
            }
        };
        match flushed {
            Some((fd, false)) => ev.unwatch_write(fd),
            Some((_, true)) => {}
            None => self.close_connection(ev, id),
        }
    }

    fn close_connection(&mut self, ev: &mut dyn EventLoop, id: ConnectionId) {
        if let Some(mut conn) = self.connections.remove(&id) {
            ev.unwatch_read(conn.raw_fd());
            ev.unwatch_write(conn.raw_fd());
            conn.force_close();
        }
        if self.draining && self.connections.is_empty() {
            self.finish_drain(ev);
        }
    }

    /// Tear everything down immediately and leave the loop.
    fn hard_stop(&mut self, ev: &mut dyn EventLoop) {
        info!(worker_id = self.id, "worker stopping");
        self.listener.pause_accept(ev);
        self.listener.teardown();
        for conn in self.connections.values_mut() {
            conn.force_close();
        }
        self.connections.clear();
        ev.stop();
    }

    /// Stop accepting and wait for open connections to close themselves.
    ///
    /// Re-entered every second until the last connection is gone; there is
    /// no timeout — a refusing connection is the operator's problem to
    /// hard-stop.
    fn graceful_stop(&mut self, ev: &mut dyn EventLoop) {
        self.draining = true;
        if self.listener.is_accepting() {
            self.listener.pause_accept(ev);
        }
        if self.connections.is_empty() {
            self.finish_drain(ev);
        } else {
            ev.add_timer(DRAIN_RETRY, DRAIN_TIMER_TOKEN);
        }
    }

    fn finish_drain(&mut self, ev: &mut dyn EventLoop) {
        info!(worker_id = self.id, "worker drained");
        self.listener.teardown();
        ev.stop();
    }

    /// Serialize the status row into this worker's hash file.
    fn write_status(&self, ev: &dyn EventLoop) {
        let usage = memory::sample();
        let row = StatusRow {
            id: self.id.to_string(),
            listen: self.listener.local_addr().to_string(),
            name: self.listener.name().to_string(),
            memory: format_memory_mb(usage.current),
            peak_memory: format_memory_mb(usage.peak),
            start_time: format_start_time(self.restart_count, self.start_time.elapsed().as_secs()),
            connections: format_connections(self.connections.len(), self.total_connections),
            timers: ev.timer_count() as u64,
        };
        if let Err(e) = rendezvous::write_json(&self.ctx.hash_path(&self.hash), &row) {
            error!(worker_id = self.id, error = %e, "failed to write status row");
        }
    }
}

impl EventHandler for Worker {
    fn on_readable(&mut self, ev: &mut dyn EventLoop, token: Token) {
        match token {
            ACCEPT_TOKEN => self.accept_one(ev),
            t if t >= CONN_TOKEN_BASE => self.read_connection(ev, t - CONN_TOKEN_BASE),
            _ => {}
        }
    }

    fn on_timer(&mut self, ev: &mut dyn EventLoop, token: Token) {
        if token == DRAIN_TIMER_TOKEN && self.draining {
            self.graceful_stop(ev);
        }
    }

    fn on_writable(&mut self, ev: &mut dyn EventLoop, token: Token) {
        if token >= CONN_TOKEN_BASE {
            self.flush_connection(ev, token - CONN_TOKEN_BASE);
        }
    }

    fn on_signal(&mut self, ev: &mut dyn EventLoop, sig: Signal) {
        match sig {
            Signal::SIGINT
            | Signal::SIGTERM
            | Signal::SIGHUP
            | Signal::SIGTSTP
            | Signal::SIGUSR1 => self.hard_stop(ev),
            Signal::SIGQUIT | Signal::SIGUSR2 => self.graceful_stop(ev),
            Signal::SIGABRT => self.write_status(ev),
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
