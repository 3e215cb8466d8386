// SPDX-License-Identifier: MIT

use super::*;
use tempfile::TempDir;
use workerman_core::OutputHub;

fn controller(dir: &TempDir) -> Controller {
    let ctx = RuntimeContext::new(dir.path()).with_name("echo");
    Controller::new(ctx, OutputHub::new(vec![], vec![]))
}

#[test]
fn start_fails_when_pid_file_exists() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("process.pid"), b"12345").unwrap();

    let mut ctrl = controller(&dir);
    let err = ctrl.start(Vec::new(), false).unwrap_err();

    assert!(matches!(err, ControlError::AlreadyRunning));
    assert_eq!(
        err.to_string(),
        "Cannot start workerman, workerman already running."
    );
    assert!(err.is_lifecycle());
}

#[test]
fn stop_fails_when_nothing_is_running() {
    let dir = TempDir::new().unwrap();
    let mut ctrl = controller(&dir);

    let err = ctrl.stop(false).unwrap_err();

    assert_eq!(
        err.to_string(),
        "Cannot stop workerman, workerman is not running."
    );
    assert!(err.is_lifecycle());
}

#[test]
fn restart_fails_when_nothing_is_running() {
    let dir = TempDir::new().unwrap();
    let mut ctrl = controller(&dir);

    let err = ctrl.restart(true).unwrap_err();

    assert_eq!(
        err.to_string(),
        "Cannot restart workerman, workerman is not running."
    );
}

#[test]
fn status_fails_when_nothing_is_running() {
    let dir = TempDir::new().unwrap();
    let mut ctrl = controller(&dir);

    let err = ctrl.status().unwrap_err();

    assert_eq!(
        err.to_string(),
        "Cannot collect worker status, workerman is not running."
    );
    assert!(err.is_lifecycle());
}

#[test]
fn unreadable_pid_file_counts_as_not_running() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("process.pid"), b"not a pid").unwrap();

    let mut ctrl = controller(&dir);
    let err = ctrl.stop(false).unwrap_err();

    assert!(matches!(err, ControlError::NotRunning { .. }));
}

#[test]
fn non_lifecycle_errors_are_flagged_for_full_rendering() {
    let err = ControlError::DaemonizeFailed;
    assert!(!err.is_lifecycle());
}
