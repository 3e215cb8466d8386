// SPDX-License-Identifier: MIT

//! Status table rendering.
//!
//! The table knows the status schema outright, so there is no generic
//! column model: widths are folded per field over the collected rows and
//! every line goes through one format string. Only the header line is
//! tinted; cells stay plain so padding never has to account for escapes.

use std::io::Write;

use workerman_core::StatusRow;

use crate::color::{self, Tint};

/// Per-field display widths, seeded with the header lengths.
struct Widths {
    id: usize,
    listen: usize,
    name: usize,
    memory: usize,
    peak: usize,
    started: usize,
    connections: usize,
}

impl Widths {
    fn fit(rows: &[StatusRow]) -> Self {
        let mut w = Self {
            id: "ID".len(),
            listen: "LISTEN".len(),
            name: "NAME".len(),
            memory: "MEMORY".len(),
            peak: "PEAK".len(),
            started: "STARTED".len(),
            connections: "CONNECTIONS".len(),
        };
        for row in rows {
            w.id = w.id.max(row.id.len());
            w.listen = w.listen.max(row.listen.len());
            w.name = w.name.max(row.name.len());
            w.memory = w.memory.max(row.memory.len());
            w.peak = w.peak.max(row.peak_memory.len());
            w.started = w.started.max(row.start_time.len());
            w.connections = w.connections.max(row.connections.len());
        }
        w
    }
}

/// Renderer for the aggregated master/worker status view.
pub struct StatusTable {
    rows: Vec<StatusRow>,
    colorize: bool,
}

impl StatusTable {
    pub fn new(rows: Vec<StatusRow>) -> Self {
        Self {
            rows,
            colorize: color::enabled(),
        }
    }

    /// A renderer that never emits escape codes.
    #[cfg(test)]
    fn plain(rows: Vec<StatusRow>) -> Self {
        Self {
            rows,
            colorize: false,
        }
    }

    /// Write the header and one line per row. Nothing is printed for an
    /// empty row set.
    pub fn render(&self, out: &mut impl Write) {
        if self.rows.is_empty() {
            return;
        }

        let w = Widths::fit(&self.rows);

        let header = line(
            &w,
            "ID",
            "LISTEN",
            "NAME",
            "MEMORY",
            "PEAK",
            "STARTED",
            "CONNECTIONS",
            "TIMERS",
        );
        let header = if self.colorize {
            color::paint_always(Tint::Header, &header)
        } else {
            header
        };
        let _ = writeln!(out, "{header}");

        for row in &self.rows {
            let _ = writeln!(
                out,
                "{}",
                line(
                    &w,
                    &row.id,
                    &row.listen,
                    &row.name,
                    &row.memory,
                    &row.peak_memory,
                    &row.start_time,
                    &row.connections,
                    &row.timers.to_string(),
                )
            );
        }
    }
}

/// One table line. Numeric-ish fields are right-aligned, text fields
/// left; the trailing TIMERS field carries no padding.
#[allow(clippy::too_many_arguments)]
fn line(
    w: &Widths,
    id: &str,
    listen: &str,
    name: &str,
    memory: &str,
    peak: &str,
    started: &str,
    connections: &str,
    timers: &str,
) -> String {
    format!(
        "{id:>idw$}  {listen:<lsw$}  {name:<nmw$}  {memory:>mew$}  {peak:>pkw$}  {started:<stw$}  {connections:>cnw$}  {timers}",
        idw = w.id,
        lsw = w.listen,
        nmw = w.name,
        mew = w.memory,
        pkw = w.peak,
        stw = w.started,
        cnw = w.connections,
    )
}

/// Column legend for `status --info`.
pub const STATUS_LEGEND: &[(&str, &str)] = &[
    ("ID", "worker id, or M for the master"),
    ("LISTEN", "bound address (N/A for the master)"),
    ("NAME", "listener name"),
    ("MEMORY", "current resident memory, MB"),
    ("PEAK", "peak resident memory, MB"),
    ("STARTED", "(revive count) uptime"),
    ("CONNECTIONS", "active/total accepted connections"),
    ("TIMERS", "pending event-loop timers"),
];

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
