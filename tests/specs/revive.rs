//! Crash-revival specs.

use crate::prelude::*;
use serial_test::serial;
use std::process::Command;

fn kill9(pid: i32) {
    Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status()
        .unwrap();
}

/// A killed worker is revived with the same id, a new pid, and a bumped
/// restart count.
#[test]
#[serial]
fn killed_worker_is_revived() {
    let server = Server::new("echo", 2);
    server.start_daemon();

    server.wait_for("both workers to fork", || server.worker_pids().len() == 2);
    let before = server.worker_pids();
    let victim = before[0];

    kill9(victim);

    server.wait_for("the worker to be revived", || {
        let now = server.worker_pids();
        now.len() == 2 && !now.contains(&victim)
    });

    // Both ids still present; exactly one row shows a revive.
    let rows = server.status_rows(3);
    let ids: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(ids, vec!["M", "1", "2"]);

    let revived = rows[1..]
        .iter()
        .filter(|row| row.iter().any(|token| token == "(1)"))
        .count();
    assert_eq!(revived, 1, "expected exactly one revived row: {rows:?}");

    assert!(server.run(&["stop"]).status.success());
}

/// Revival preserves service: the new worker accepts connections.
#[test]
#[serial]
fn revived_worker_still_serves() {
    use std::io::{Read, Write};

    let server = Server::new("echo", 1);
    server.start_daemon();
    let addr = server.bound_addr();

    server.wait_for("the worker to fork", || server.worker_pids().len() == 1);
    let victim = server.worker_pids()[0];
    kill9(victim);

    server.wait_for("the worker to be revived", || {
        let now = server.worker_pids();
        now.len() == 1 && now[0] != victim
    });

    let mut conn = std::net::TcpStream::connect(&addr).unwrap();
    conn.set_read_timeout(Some(std::time::Duration::from_secs(5)))
        .unwrap();
    conn.write_all(b"back").unwrap();
    let mut buf = [0u8; 4];
    conn.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"back");

    drop(conn);
    assert!(server.run(&["stop"]).status.success());
}
