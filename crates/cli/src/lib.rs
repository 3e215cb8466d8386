// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! workerman: socket-server supervisor CLI and facade.
//!
//! The [`Workerman`] facade is the embedding surface: configure listeners,
//! hand it one of the four commands, and it either becomes the master
//! (`start`) or drives a running one through signals and rendezvous files
//! (`stop`, `restart`, `status`).

pub mod color;
pub mod console;
pub mod controller;
pub mod facade;
pub mod progress;
pub mod table;
pub mod watcher;

pub use controller::{ControlError, Controller};
pub use facade::{Command, Config, Workerman};
