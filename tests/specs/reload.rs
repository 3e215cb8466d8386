//! Reload (fork-replace) specs.

use crate::prelude::*;
use serial_test::serial;

/// A hard reload replaces every worker process while keeping ids stable
/// and restart counts at zero.
#[test]
#[serial]
fn hard_reload_replaces_worker_processes() {
    let server = Server::new("echo", 2);
    server.start_daemon();

    server.wait_for("both workers to fork", || server.worker_pids().len() == 2);
    let before = server.worker_pids();

    let out = server.run(&["restart"]);
    assert!(
        out.status.success(),
        "restart failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(String::from_utf8_lossy(&out.stdout).contains("Workerman restarted."));

    server.wait_for("replacement workers to fork", || {
        let now = server.worker_pids();
        now.len() == 2 && now.iter().all(|pid| !before.contains(pid))
    });

    // Same ids, reload does not count as a revive.
    let rows = server.status_rows(3);
    let ids: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(ids, vec!["M", "1", "2"]);
    for row in &rows[1..] {
        assert!(
            row.iter().any(|token| token == "(0)"),
            "restart_count drifted: {row:?}"
        );
    }

    assert!(server.run(&["stop"]).status.success());
}

/// Graceful reload drains and replaces; the command succeeds and the
/// worker set is fresh.
#[test]
#[serial]
fn graceful_reload_replaces_worker_processes() {
    let server = Server::new("echo", 2);
    server.start_daemon();

    server.wait_for("both workers to fork", || server.worker_pids().len() == 2);
    let before = server.worker_pids();

    let out = server.run(&["restart", "-g"]);
    assert!(
        out.status.success(),
        "graceful restart failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    server.wait_for("replacement workers to fork", || {
        let now = server.worker_pids();
        now.len() == 2 && now.iter().all(|pid| !before.contains(pid))
    });

    assert!(server.run(&["stop"]).status.success());
}

/// Back-to-back reloads both succeed (the completion stamp is
/// per-request, not a stale leftover).
#[test]
#[serial]
fn reload_twice_in_a_row() {
    let server = Server::new("echo", 1);
    server.start_daemon();

    assert!(server.run(&["restart"]).status.success());
    assert!(server.run(&["restart"]).status.success());

    let rows = server.status_rows(2);
    assert_eq!(rows[1][0], "1");

    assert!(server.run(&["stop"]).status.success());
}
