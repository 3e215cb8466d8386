// SPDX-License-Identifier: MIT

//! Process memory probe for status rows.

use nix::sys::resource::{getrusage, UsageWho};

/// Current and peak resident set size, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub current: u64,
    pub peak: u64,
}

/// Sample this process's memory usage.
///
/// Reads `/proc/self/status` on Linux (`VmRSS`/`VmHWM`); elsewhere falls
/// back to `getrusage`, where only the peak is available and stands in
/// for both values.
pub fn sample() -> MemoryUsage {
    proc_status().unwrap_or_else(rusage_fallback)
}

#[cfg(target_os = "linux")]
fn proc_status() -> Option<MemoryUsage> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let current = parse_kb_line(&status, "VmRSS:")?;
    let peak = parse_kb_line(&status, "VmHWM:")?;
    Some(MemoryUsage {
        current: current * 1024,
        peak: peak * 1024,
    })
}

#[cfg(not(target_os = "linux"))]
fn proc_status() -> Option<MemoryUsage> {
    None
}

/// Extract the kB figure from a `/proc/self/status` line like
/// `VmRSS:      1234 kB`.
fn parse_kb_line(status: &str, key: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with(key))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

fn rusage_fallback() -> MemoryUsage {
    let peak = match getrusage(UsageWho::RUSAGE_SELF) {
        Ok(usage) => {
            let max_rss = usage.max_rss().max(0) as u64;
            // ru_maxrss is kilobytes on Linux, bytes on macOS.
            if cfg!(target_os = "macos") {
                max_rss
            } else {
                max_rss * 1024
            }
        }
        Err(_) => 0,
    };
    MemoryUsage {
        current: peak,
        peak,
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
