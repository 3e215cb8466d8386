// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! workerman-core: shared types for the workerman supervisor.
//!
//! Everything the master, workers, and the controlling CLI agree on lives
//! here: the runtime context and its rendezvous file paths, process hashes,
//! atomic rendezvous file I/O, the status row schema, and the output sink
//! capability.

pub mod context;
pub mod hash;
pub mod output;
pub mod rendezvous;
pub mod status;
pub mod time_fmt;

pub use context::RuntimeContext;
pub use hash::ProcessHash;
pub use output::{OutputHub, OutputSink, PrefixedSink};
pub use rendezvous::{LockTable, RendezvousError};
pub use status::StatusRow;
pub use time_fmt::format_uptime;
