// SPDX-License-Identifier: MIT

//! Drain progress bar rendering.

const BAR_WIDTH: usize = 30;

/// Render a fixed-width bar: `[=========>          ] 1/2`.
///
/// At `done == total` the arrow head is dropped and the bar is full.
pub fn render_bar(total: u64, done: u64) -> String {
    if total == 0 {
        return format!("[{}] 0/0", "=".repeat(BAR_WIDTH));
    }
    let done = done.min(total);
    let filled = (done as usize * BAR_WIDTH) / total as usize;
    if done == total {
        format!("[{}] {}/{}", "=".repeat(BAR_WIDTH), done, total)
    } else {
        let head = 1;
        let rest = BAR_WIDTH - filled - head;
        format!("[{}>{}] {}/{}", "=".repeat(filled), " ".repeat(rest), done, total)
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
