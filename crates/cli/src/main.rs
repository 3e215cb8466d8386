// SPDX-License-Identifier: MIT

//! workerman - socket server supervisor CLI
//!
//! Ships a ready-to-run echo server: every `--listen` address echoes
//! inbound bytes back to the peer. Embedders use the [`workerman`] library
//! facade directly and install their own callbacks instead.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use workerman::{Command, Config, ControlError, Workerman};
use workerman_supervisor::listener::{Listener, ProtocolTag, Transport};

#[derive(Parser)]
#[command(
    name = "workerman",
    version,
    about = "Multi-process socket server supervisor"
)]
struct Cli {
    /// Working directory for pid and rendezvous files
    #[arg(long = "path", global = true, value_name = "DIR", default_value = ".")]
    path: PathBuf,

    /// Server name (process titles, status rows)
    #[arg(long, global = true)]
    name: Option<String>,

    /// Redirect master/worker stderr to this file
    #[arg(long = "stderr", global = true, value_name = "FILE")]
    std_err_path: Option<PathBuf>,

    /// Listen address, e.g. tcp://127.0.0.1:8080 (repeatable)
    #[arg(long = "listen", global = true, value_name = "URI")]
    listen: Vec<String>,

    /// Worker processes per listener
    #[arg(long, global = true, default_value_t = 1)]
    workers: u32,

    /// Protocol tag: frame|text|http|websocket|raw
    #[arg(long, global = true, default_value = "raw")]
    protocol: String,

    /// Bind per worker with SO_REUSEPORT instead of once in the master
    #[arg(long = "reuse-port", global = true)]
    reuse_port: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the master and its worker pool
    Start {
        /// Detach from the terminal
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running master and its workers
    Stop {
        /// Drain connections before exiting
        #[arg(short = 'g', long)]
        graceful: bool,
    },
    /// Fork-replace every worker
    Restart {
        /// Drain each worker before replacing it
        #[arg(short = 'g', long)]
        graceful: bool,
    },
    /// Collect and render worker status
    Status {
        /// Show column descriptions instead of querying a live master
        #[arg(short = 'i', long)]
        info: bool,
    },
}

fn main() {
    if let Err(e) = run() {
        if let Some(control) = e.downcast_ref::<ControlError>() {
            if control.is_lifecycle() {
                eprintln!("{control}");
                std::process::exit(1);
            }
        }
        eprintln!("Error: {}", format_error(&e));
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Start { daemon } => Command::Start { daemon },
        Commands::Stop { graceful } => Command::Stop { graceful },
        Commands::Restart { graceful } => Command::Restart { graceful },
        Commands::Status { info } => Command::Status { info },
    };

    let mut workerman = Workerman::new(Config {
        root: cli.path,
        name: cli.name.clone(),
        std_err_path: cli.std_err_path,
    });

    if matches!(command, Command::Start { .. }) {
        if cli.listen.is_empty() {
            anyhow::bail!("start requires at least one --listen address");
        }
        let protocol = ProtocolTag::from_name(&cli.protocol)
            .ok_or_else(|| anyhow::anyhow!("unknown protocol: {}", cli.protocol))?;
        for spec in &cli.listen {
            workerman = workerman.listener(echo_listener(
                spec,
                cli.name.as_deref(),
                cli.workers,
                protocol,
                cli.reuse_port,
            )?);
        }
    }

    workerman.run(command)?;
    Ok(())
}

/// Build a listener from `scheme://address` that echoes inbound bytes.
fn echo_listener(
    spec: &str,
    name: Option<&str>,
    workers: u32,
    protocol: ProtocolTag,
    reuse_port: bool,
) -> Result<Listener> {
    let (scheme, address) = spec
        .split_once("://")
        .ok_or_else(|| anyhow::anyhow!("invalid listen spec (want scheme://address): {spec}"))?;
    let transport = Transport::from_scheme(scheme)
        .ok_or_else(|| anyhow::anyhow!("unknown transport: {scheme}"))?;

    let mut listener = Listener::new(transport, address)
        .with_workers(workers)
        .with_protocol(protocol)
        .with_reuse_port(reuse_port)
        .on_message(Box::new(|conn, data| {
            // send() buffers under backpressure; an error here means the
            // peer is gone and the read side will reap the connection.
            if let Err(e) = conn.send(data) {
                tracing::debug!(conn = conn.id(), error = %e, "echo write failed");
            }
        }))
        .on_datagram(Box::new(|socket, peer, data| {
            let _ = socket.send_to(data, peer);
        }));
    if let Some(name) = name {
        listener = listener.with_name(name);
    }
    Ok(listener)
}

/// Format an anyhow error, deduplicating the chain.
///
/// If the top-level Display already contains the source error text, the
/// "Caused by" chain is skipped to avoid noisy duplicate output (common
/// when thiserror variants use `#[error("... {0}")]` with `#[from]`).
fn format_error(err: &anyhow::Error) -> String {
    let top = err.to_string();

    let chain_redundant = err
        .chain()
        .skip(1)
        .all(|cause| top.contains(&cause.to_string()));
    if chain_redundant {
        return top;
    }

    let mut buf = top;
    for (i, cause) in err.chain().skip(1).enumerate() {
        buf.push_str(&format!("\n\nCaused by:\n    {}: {}", i, cause));
    }
    buf
}
