// SPDX-License-Identifier: MIT

//! The `Workerman` facade.
//!
//! Wires the operator-supplied configuration (listener set, process name,
//! stderr destination, output sinks) into a [`RuntimeContext`] and
//! dispatches exactly one of the four commands.

use std::path::PathBuf;

use workerman_core::{OutputHub, OutputSink, RuntimeContext};
use workerman_supervisor::listener::Listener;

use crate::console::{ConsoleSink, TracingSink};
use crate::controller::{ControlError, Controller};
use crate::table;

/// Operator-facing configuration.
#[derive(Debug, Default)]
pub struct Config {
    /// Working directory for rendezvous files.
    pub root: PathBuf,
    /// Server name; appears in process titles and status rows.
    pub name: Option<String>,
    /// Where master/worker stderr goes after `start`.
    pub std_err_path: Option<PathBuf>,
}

/// One of the four operator commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start { daemon: bool },
    Stop { graceful: bool },
    Restart { graceful: bool },
    Status { info: bool },
}

pub struct Workerman {
    ctx: RuntimeContext,
    listeners: Vec<Listener>,
    output: OutputHub,
}

impl Workerman {
    pub fn new(config: Config) -> Self {
        let mut ctx = RuntimeContext::new(config.root);
        if let Some(name) = config.name {
            ctx = ctx.with_name(name);
        }
        if let Some(path) = config.std_err_path {
            ctx = ctx.with_std_err_path(path);
        }

        let general: Vec<Box<dyn OutputSink>> = vec![Box::new(ConsoleSink)];
        let post_daemonize: Vec<Box<dyn OutputSink>> = vec![Box::new(TracingSink)];

        Self {
            ctx,
            listeners: Vec::new(),
            output: OutputHub::new(general, post_daemonize),
        }
    }

    /// Replace the default console/tracing sink lists.
    pub fn with_sinks(
        mut self,
        general: Vec<Box<dyn OutputSink>>,
        post_daemonize: Vec<Box<dyn OutputSink>>,
    ) -> Self {
        self.output = OutputHub::new(general, post_daemonize);
        self
    }

    /// Register a listener; order determines worker-id assignment.
    pub fn listener(mut self, listener: Listener) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Dispatch one command. `start` only returns once the master (or the
    /// daemonize verification) is done.
    pub fn run(self, command: Command) -> Result<(), ControlError> {
        init_tracing();
        let mut controller = Controller::new(self.ctx, self.output);
        match command {
            Command::Start { daemon } => controller.start(self.listeners, daemon),
            Command::Stop { graceful } => controller.stop(graceful),
            Command::Restart { graceful } => controller.restart(graceful),
            Command::Status { info: true } => {
                print_status_legend();
                Ok(())
            }
            Command::Status { info: false } => {
                let rows = controller.status()?;
                table::StatusTable::new(rows).render(&mut std::io::stdout());
                Ok(())
            }
        }
    }
}

/// Explain the status columns without contacting a master.
fn print_status_legend() {
    for (name, desc) in table::STATUS_LEGEND {
        println!("{name:<12} {desc}");
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
#[path = "facade_tests.rs"]
mod tests;
