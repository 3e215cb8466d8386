// SPDX-License-Identifier: MIT

//! Concrete output sinks.
//!
//! `ConsoleSink` talks to the operator's terminal; `TracingSink` forwards
//! everything to the tracing subscriber and is what the hub swaps to once
//! the master daemonizes and the terminal is gone.

use std::io::Write;

use workerman_core::OutputSink;

use crate::color::{paint, Tint};
use crate::progress;

/// Terminal sink: info/success/progress to stdout, problems to stderr.
#[derive(Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
    fn debug(&self, msg: &str) {
        println!("{}", paint(Tint::Muted, msg));
    }

    fn info(&self, msg: &str) {
        println!("{msg}");
    }

    fn warning(&self, msg: &str) {
        eprintln!("{}", paint(Tint::Yellow, msg));
    }

    fn error(&self, msg: &str) {
        eprintln!("{}", paint(Tint::Red, msg));
    }

    fn success(&self, msg: &str) {
        println!("{}", paint(Tint::Green, msg));
    }

    fn exception(&self, msg: &str) {
        eprintln!("{}", paint(Tint::Red, msg));
    }

    fn progress_bar(&self, total: u64, done: u64) {
        let bar = progress::render_bar(total, done);
        print!("\r{bar}");
        if done >= total {
            println!();
        }
        let _ = std::io::stdout().flush();
    }
}

/// Post-daemonize sink: events become tracing records on the redirected
/// stderr. Progress bars are meaningless without a terminal and are
/// dropped.
#[derive(Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn warning(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    fn success(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn exception(&self, msg: &str) {
        tracing::error!("{msg}");
    }
}
