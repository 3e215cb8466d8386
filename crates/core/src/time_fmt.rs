// SPDX-License-Identifier: MIT

//! Uptime formatting for status rows.

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Format an uptime as its two most significant units, dropping a zero
/// remainder: `"42s"`, `"3m10s"`, `"2h"`, `"2h15m"`, `"5d2h"`.
pub fn format_uptime(secs: u64) -> String {
    let (big, big_unit, rest, rest_unit) = if secs >= DAY {
        (secs / DAY, "d", (secs % DAY) / HOUR, "h")
    } else if secs >= HOUR {
        (secs / HOUR, "h", (secs % HOUR) / MINUTE, "m")
    } else if secs >= MINUTE {
        (secs / MINUTE, "m", secs % MINUTE, "s")
    } else {
        return format!("{secs}s");
    };

    if rest == 0 {
        format!("{big}{big_unit}")
    } else {
        format!("{big}{big_unit}{rest}{rest_unit}")
    }
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
