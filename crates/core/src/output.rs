// SPDX-License-Identifier: MIT

//! Structured output capability.
//!
//! The supervisor core never prints; it hands operator-facing events to an
//! [`OutputHub`] holding two sink lists: the general one, and the one that
//! takes over after the master daemonizes (when the terminal is gone).
//! After the swap, `debug` events are dropped.

/// Sink for operator-facing events.
///
/// `progress_bar` is a redraw-style call: `done` out of `total` steps are
/// complete. Sinks with no sensible bar rendering keep the default no-op.
pub trait OutputSink {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn warning(&self, msg: &str);
    fn error(&self, msg: &str);
    fn success(&self, msg: &str);
    /// An error with enough context to be actionable (class, message,
    /// origin); rendered more loudly than `error`.
    fn exception(&self, msg: &str);
    fn progress_bar(&self, _total: u64, _done: u64) {}
}

/// Decorator that prepends a process-scoped label to every event.
pub struct PrefixedSink {
    prefix: String,
    inner: Box<dyn OutputSink>,
}

impl PrefixedSink {
    pub fn new(prefix: impl Into<String>, inner: Box<dyn OutputSink>) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    fn tag(&self, msg: &str) -> String {
        format!("[{}] {}", self.prefix, msg)
    }
}

impl OutputSink for PrefixedSink {
    fn debug(&self, msg: &str) {
        self.inner.debug(&self.tag(msg));
    }

    fn info(&self, msg: &str) {
        self.inner.info(&self.tag(msg));
    }

    fn warning(&self, msg: &str) {
        self.inner.warning(&self.tag(msg));
    }

    fn error(&self, msg: &str) {
        self.inner.error(&self.tag(msg));
    }

    fn success(&self, msg: &str) {
        self.inner.success(&self.tag(msg));
    }

    fn exception(&self, msg: &str) {
        self.inner.exception(&self.tag(msg));
    }

    fn progress_bar(&self, total: u64, done: u64) {
        self.inner.progress_bar(total, done);
    }
}

/// Fan-out over the active sink list.
pub struct OutputHub {
    general: Vec<Box<dyn OutputSink>>,
    post_daemonize: Vec<Box<dyn OutputSink>>,
    daemonized: bool,
}

impl OutputHub {
    pub fn new(general: Vec<Box<dyn OutputSink>>, post_daemonize: Vec<Box<dyn OutputSink>>) -> Self {
        Self {
            general,
            post_daemonize,
            daemonized: false,
        }
    }

    /// Swap to the post-daemonize sink list and mute `debug`.
    pub fn daemonize(&mut self) {
        self.general = std::mem::take(&mut self.post_daemonize);
        self.daemonized = true;
    }

    pub fn is_daemonized(&self) -> bool {
        self.daemonized
    }

    fn active(&self) -> &[Box<dyn OutputSink>] {
        &self.general
    }

    pub fn debug(&self, msg: &str) {
        if self.daemonized {
            return;
        }
        for sink in self.active() {
            sink.debug(msg);
        }
    }

    pub fn info(&self, msg: &str) {
        for sink in self.active() {
            sink.info(msg);
        }
    }

    pub fn warning(&self, msg: &str) {
        for sink in self.active() {
            sink.warning(msg);
        }
    }

    pub fn error(&self, msg: &str) {
        for sink in self.active() {
            sink.error(msg);
        }
    }

    pub fn success(&self, msg: &str) {
        for sink in self.active() {
            sink.success(msg);
        }
    }

    pub fn exception(&self, msg: &str) {
        for sink in self.active() {
            sink.exception(msg);
        }
    }

    pub fn progress_bar(&self, total: u64, done: u64) {
        for sink in self.active() {
            sink.progress_bar(total, done);
        }
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
