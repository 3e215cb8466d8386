//! Start/stop/status lifecycle specs.

use crate::prelude::*;
use serial_test::serial;

/// Daemon start then status: one master row plus one row per worker, with
/// the workers sharing the bound address.
#[test]
#[serial]
fn daemon_start_then_status_lists_master_and_workers() {
    let server = Server::new("echo", 2);
    server.start_daemon();

    let pid = server.master_pid();
    assert!(pid > 0);
    assert!(process_exists(pid));

    let rows = server.status_rows(3);
    let ids: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(ids, vec!["M", "1", "2"]);

    assert_eq!(rows[0][1], "N/A");
    assert!(rows[1][1].starts_with("127.0.0.1:"));
    assert_eq!(rows[1][1], rows[2][1]);

    // Every row carries the configured name.
    for row in &rows {
        assert_eq!(row[2], "echo");
    }

    let out = server.run(&["stop"]);
    assert!(out.status.success());
}

/// Status is idempotent: repeated calls leave the rendezvous directory as
/// they found it.
#[test]
#[serial]
fn status_leaves_the_rendezvous_directory_clean() {
    let server = Server::new("echo", 1);
    server.start_daemon();

    for _ in 0..3 {
        server.status_rows(2);
    }

    server.wait_for("status files to be consumed", || {
        server
            .rendezvous_files()
            .iter()
            .all(|name| name == "process.pid")
    });

    let out = server.run(&["stop"]);
    assert!(out.status.success());
}

/// A hard stop removes every rendezvous file.
#[test]
#[serial]
fn stop_clears_the_rendezvous_directory() {
    let server = Server::new("echo", 2);
    server.start_daemon();

    let out = server.run(&["stop"]);
    assert!(out.status.success());

    server.wait_for("rendezvous files to disappear", || {
        server.rendezvous_files().is_empty()
    });
}

/// Stopping twice reports "not running" on the second call.
#[test]
#[serial]
fn second_stop_is_a_lifecycle_error() {
    let server = Server::new("echo", 1);
    server.start_daemon();

    assert!(server.run(&["stop"]).status.success());

    let out = server.run(&["stop"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr)
        .contains("Cannot stop workerman, workerman is not running."));
}

/// Starting while a master is running is refused.
#[test]
#[serial]
fn start_while_running_is_refused() {
    let server = Server::new("echo", 2);
    server.start_daemon();

    let out = server.run(&["start"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr)
        .contains("Cannot start workerman, workerman already running."));

    assert!(server.run(&["stop"]).status.success());
}

/// Status against a fresh directory is refused.
#[test]
#[serial]
fn status_without_a_master_is_refused() {
    let server = Server::new("echo", 1);

    let out = server.run(&["status"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr)
        .contains("Cannot collect worker status, workerman is not running."));
}

/// `status --info` explains the columns without contacting a master.
#[test]
#[serial]
fn status_info_prints_the_column_legend() {
    let server = Server::new("echo", 1);

    let out = server.run(&["status", "--info"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    for column in ["ID", "LISTEN", "MEMORY", "CONNECTIONS", "TIMERS"] {
        assert!(stdout.contains(column), "legend missing {column}");
    }
}
