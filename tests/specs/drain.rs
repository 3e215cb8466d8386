//! Graceful-drain specs.

use crate::prelude::*;
use serial_test::serial;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Graceful stop waits for an open connection to close itself, then
/// finishes and leaves no rendezvous files behind.
#[test]
#[serial]
fn graceful_stop_waits_for_an_idle_connection() {
    let server = Server::new("echo", 2);
    server.start_daemon();
    let addr = server.bound_addr();

    let conn = TcpStream::connect(&addr).unwrap();

    let mut stop = server.spawn(&["stop", "-g"]);

    // The drain must not finish while the connection is open.
    std::thread::sleep(Duration::from_secs(1));
    assert!(stop.try_wait().unwrap().is_none(), "stop finished early");

    drop(conn);

    server.wait_for("graceful stop to finish", || {
        matches!(stop.try_wait(), Ok(Some(_)))
    });
    let out = stop.wait_with_output().unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("2/2"), "progress never completed: {stdout}");
    assert!(stdout.contains("Workerman stopped."));

    server.wait_for("rendezvous files to disappear", || {
        server.rendezvous_files().is_empty()
    });
}

/// With no connections open, a graceful stop completes promptly.
#[test]
#[serial]
fn graceful_stop_with_no_connections_is_quick() {
    let server = Server::new("echo", 2);
    server.start_daemon();

    let out = server.run(&["stop", "-g"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("Workerman stopped."));

    server.wait_for("rendezvous files to disappear", || {
        server.rendezvous_files().is_empty()
    });
}

/// The echo callback answers on the accepted connection.
#[test]
#[serial]
fn echo_round_trip() {
    let server = Server::new("echo", 1);
    server.start_daemon();
    let addr = server.bound_addr();

    let mut conn = TcpStream::connect(&addr).unwrap();
    conn.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    conn.write_all(b"ping").unwrap();

    let mut buf = [0u8; 4];
    conn.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ping");

    drop(conn);
    assert!(server.run(&["stop"]).status.success());
}

/// Status accounting survives connection churn: active/total reflects a
/// closed connection.
#[test]
#[serial]
fn status_counts_total_connections() {
    let server = Server::new("echo", 1);
    server.start_daemon();
    let addr = server.bound_addr();

    {
        let mut conn = TcpStream::connect(&addr).unwrap();
        conn.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        conn.write_all(b"x").unwrap();
        let mut buf = [0u8; 1];
        conn.read_exact(&mut buf).unwrap();
    }

    server.wait_for("the connection to be reaped", || {
        let rows = server.status_rows(2);
        rows[1].iter().any(|token| token == "0/1")
    });

    assert!(server.run(&["stop"]).status.success());
}
