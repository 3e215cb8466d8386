// SPDX-License-Identifier: MIT

use super::*;
use tempfile::TempDir;

#[test]
fn write_then_read_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status.workerman");

    let hashes = vec!["aaa".to_string(), "bbb".to_string()];
    write_json(&path, &hashes).unwrap();

    let back: Vec<String> = read_json(&path).unwrap().unwrap();
    assert_eq!(back, hashes);
}

#[test]
fn write_leaves_no_temp_file_behind() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("restart.workerman");
    write_json(&path, &42u64).unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("restart.workerman")]);
}

#[test]
fn read_absent_file_is_none() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing");
    let result: Option<u64> = read_json(&path).unwrap();
    assert!(result.is_none());
}

#[test]
fn read_malformed_payload_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad");
    std::fs::write(&path, b"not json").unwrap();

    let result: Result<Option<u64>, _> = read_json(&path);
    assert!(matches!(result, Err(RendezvousError::Json { .. })));
}

#[test]
fn remove_reports_whether_file_existed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stub");
    touch(&path).unwrap();

    assert!(remove(&path).unwrap());
    assert!(!remove(&path).unwrap());
}

#[test]
fn touch_creates_an_empty_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hashstub");
    touch(&path).unwrap();

    assert!(path.exists());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
}

#[test]
fn lock_then_unlock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("locked");
    let table = LockTable::new();

    table.lock(&path).unwrap();
    assert!(table.is_locked(&path));
    table.unlock(&path).unwrap();
    assert!(!table.is_locked(&path));
}

#[test]
fn lock_is_not_reentrant() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("locked");
    let table = LockTable::new();

    table.lock(&path).unwrap();
    assert!(matches!(
        table.lock(&path),
        Err(RendezvousError::AlreadyLocked { .. })
    ));
}

#[test]
fn unlock_without_lock_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("never-locked");
    let table = LockTable::new();

    assert!(matches!(
        table.unlock(&path),
        Err(RendezvousError::NotLocked { .. })
    ));
}
