// SPDX-License-Identifier: MIT

//! Status row schema shared by workers, master, and the CLI table.

use serde::{Deserialize, Serialize};

use crate::time_fmt::format_uptime;

/// One row of the aggregated status view.
///
/// Workers serialize a row into their hash file on demand; the master
/// writes its own row under its hash with `id = "M"`. The CLI collects and
/// renders them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRow {
    /// Decimal worker id, or `"M"` for the master.
    pub id: String,
    /// Bound address, or `"N/A"` for the master.
    pub listen: String,
    pub name: String,
    /// Current memory, MB with two decimals and an `M` suffix.
    pub memory: String,
    /// Peak memory, same format.
    pub peak_memory: String,
    /// `"(<restart_count>) <uptime>"`.
    pub start_time: String,
    /// `"<active>/<total>"`.
    pub connections: String,
    /// Pending event-loop timers.
    pub timers: u64,
}

/// Format a byte count as MB with two decimals: `"12.34M"`.
pub fn format_memory_mb(bytes: u64) -> String {
    format!("{:.2}M", bytes as f64 / (1024.0 * 1024.0))
}

/// Format the `start_time` cell: `"(<restart_count>) <uptime>"`.
pub fn format_start_time(restart_count: u32, uptime_secs: u64) -> String {
    format!("({}) {}", restart_count, format_uptime(uptime_secs))
}

/// Format the `connections` cell: `"<active>/<total>"`.
pub fn format_connections(active: usize, total: u64) -> String {
    format!("{}/{}", active, total)
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
