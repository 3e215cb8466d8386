// SPDX-License-Identifier: MIT

//! ANSI coloring for terminal output.
//!
//! One painter, parametrized by [`Tint`]; callers never touch escape
//! codes. `paint` consults the environment, `paint_always` is for text
//! that was padded first (table cells), where the caller already decided.

use std::io::IsTerminal;

/// The palette. Header and muted are 256-color greys/blues matching the
/// rest of the tooling; the traffic-light trio is plain ANSI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    /// Table headers: steel blue.
    Header,
    /// Secondary text: dark grey.
    Muted,
    Green,
    Yellow,
    Red,
}

impl Tint {
    fn sgr(self) -> &'static str {
        match self {
            Tint::Header => "38;5;74",
            Tint::Muted => "38;5;240",
            Tint::Green => "32",
            Tint::Yellow => "33",
            Tint::Red => "31",
        }
    }
}

/// Whether escape codes should be emitted at all.
///
/// `NO_COLOR=1` wins over `COLOR=1`, which wins over the TTY check.
pub fn enabled() -> bool {
    match (std::env::var_os("NO_COLOR"), std::env::var_os("COLOR")) {
        (Some(v), _) if v == "1" => false,
        (_, Some(v)) if v == "1" => true,
        _ => std::io::stdout().is_terminal(),
    }
}

/// Color `text` when the environment allows it.
pub fn paint(tint: Tint, text: &str) -> String {
    if enabled() {
        paint_always(tint, text)
    } else {
        text.to_string()
    }
}

/// Color `text` unconditionally (for already-padded cells whose caller
/// made the decision once up front).
pub fn paint_always(tint: Tint, text: &str) -> String {
    format!("\x1b[{}m{}\x1b[0m", tint.sgr(), text)
}

#[cfg(test)]
#[path = "color_tests.rs"]
mod tests;
