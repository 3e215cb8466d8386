// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! workerman-supervisor: the master/worker process engine.
//!
//! A master process binds the configured listeners, forks one worker per
//! listener slot, and supervises them: reaping, reviving crashed workers,
//! and fanning out operator commands (stop, reload, status) delivered as
//! POSIX signals. Each worker is a single-threaded `poll(2)` event loop
//! accepting connections on its listener.
//!
//! Cross-process coordination is limited to signals and the rendezvous
//! files from `workerman-core`; nothing here shares memory across `fork`.

pub mod connection;
pub mod event_loop;
pub mod listener;
pub mod master;
pub mod memory;
pub mod proc_title;
pub mod signal;
pub mod worker;

pub use connection::{Connection, ConnectionId};
pub use event_loop::{EventHandler, EventLoop, LoopError, PollLoop, Token};
pub use listener::{Listener, ListenerError, ProtocolTag, SocketContext, Transport};
pub use master::{Master, MasterError};
pub use signal::{SignalBus, SignalError};
pub use worker::{Worker, WorkerError};
