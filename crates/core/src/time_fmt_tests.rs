// SPDX-License-Identifier: MIT

use super::format_uptime;

#[yare::parameterized(
    zero_seconds      = { 0,      "0s" },
    max_seconds       = { 59,     "59s" },
    one_minute        = { 60,     "1m" },
    minute_and_change = { 90,     "1m30s" },
    max_minutes       = { 3599,   "59m59s" },
    one_hour          = { 3600,   "1h" },
    hour_and_minute   = { 3660,   "1h1m" },
    two_hours_flat    = { 7200,   "2h" },
    almost_a_day      = { 86399,  "23h59m" },
    one_day           = { 86400,  "1d" },
    day_and_hours     = { 93600,  "1d2h" },
    two_days_flat     = { 172800, "2d" },
)]
fn uptime(secs: u64, expected: &str) {
    assert_eq!(format_uptime(secs), expected);
}
