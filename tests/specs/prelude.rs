//! Test helpers for behavioral specifications.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;

/// How long a spec waits for an expected state before failing.
pub const WAIT_MAX: Duration = Duration::from_secs(5);
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Returns the path to the workerman binary.
///
/// Resolves relative to the test binary itself (target/debug/deps/...),
/// falling back to CARGO_MANIFEST_DIR for plain `cargo test` runs.
pub fn workerman_binary() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let candidate = debug_dir.join("workerman");
            if candidate.exists() {
                return candidate;
            }
        }
    }
    Path::new(env!("CARGO_MANIFEST_DIR")).join("target/debug/workerman")
}

/// A scratch working directory plus the flags to point the CLI at it.
pub struct Server {
    dir: TempDir,
    name: String,
    workers: u32,
}

impl Server {
    pub fn new(name: &str, workers: u32) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            name: name.to_string(),
            workers,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A CLI invocation against this server's working directory.
    pub fn cmd(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(workerman_binary());
        cmd.arg("--path")
            .arg(self.path())
            .args(["--name", &self.name])
            .args(["--listen", "tcp://127.0.0.1:0"])
            .args(["--workers", &self.workers.to_string()])
            .args(args)
            .env("NO_COLOR", "1")
            .stdin(Stdio::null());
        cmd
    }

    pub fn run(&self, args: &[&str]) -> Output {
        self.cmd(args).output().unwrap()
    }

    /// Spawn a command that is expected to block (e.g. a graceful stop).
    pub fn spawn(&self, args: &[&str]) -> Child {
        self.cmd(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap()
    }

    /// `start -d` and wait for the pid file.
    pub fn start_daemon(&self) -> Output {
        let out = self.run(&["start", "-d"]);
        assert!(
            out.status.success(),
            "daemon start failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        assert!(self.pid_file().exists());
        out
    }

    pub fn pid_file(&self) -> PathBuf {
        self.path().join("process.pid")
    }

    pub fn master_pid(&self) -> i32 {
        std::fs::read_to_string(self.pid_file())
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    }

    /// Parse `status` output into token rows (header skipped).
    ///
    /// Retries until the expected row count appears or the deadline hits.
    pub fn status_rows(&self, expected: usize) -> Vec<Vec<String>> {
        let deadline = Instant::now() + WAIT_MAX;
        loop {
            let out = self.run(&["status"]);
            if out.status.success() {
                let rows = parse_rows(&String::from_utf8_lossy(&out.stdout));
                if rows.len() == expected {
                    return rows;
                }
            }
            if Instant::now() >= deadline {
                panic!(
                    "status never returned {} rows; last output:\n{}{}",
                    expected,
                    String::from_utf8_lossy(&out.stdout),
                    String::from_utf8_lossy(&out.stderr)
                );
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// The bound TCP address, read from a worker status row.
    pub fn bound_addr(&self) -> String {
        let rows = self.status_rows(1 + self.workers as usize);
        rows.iter()
            .find(|row| row[0] != "M")
            .map(|row| row[1].clone())
            .unwrap()
    }

    /// Pids of the master's direct children, via /proc. Empty when no
    /// master is running.
    pub fn worker_pids(&self) -> Vec<i32> {
        let Ok(content) = std::fs::read_to_string(self.pid_file()) else {
            return Vec::new();
        };
        let Ok(master) = content.trim().parse::<i32>() else {
            return Vec::new();
        };
        let mut pids = Vec::new();
        for entry in std::fs::read_dir("/proc").unwrap().flatten() {
            let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() else {
                continue;
            };
            let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
                continue;
            };
            // field 4 of /proc/pid/stat is ppid (after the comm field,
            // which may contain spaces inside parentheses)
            let Some((_, rest)) = stat.rsplit_once(')') else {
                continue;
            };
            let fields: Vec<&str> = rest.split_whitespace().collect();
            if fields.get(1).and_then(|s| s.parse::<i32>().ok()) == Some(master) {
                pids.push(pid);
            }
        }
        pids.sort_unstable();
        pids
    }

    /// Wait until `predicate` holds, panicking at the deadline.
    pub fn wait_for(&self, what: &str, mut predicate: impl FnMut() -> bool) {
        let deadline = Instant::now() + WAIT_MAX;
        while !predicate() {
            if Instant::now() >= deadline {
                panic!("timed out waiting for {what}");
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Every rendezvous file (well-known and hash) remaining on disk.
    pub fn rendezvous_files(&self) -> Vec<String> {
        std::fs::read_dir(self.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect()
    }
}

impl Drop for Server {
    /// Best-effort teardown so a failing spec never leaks a master.
    ///
    /// The master dies first so it cannot revive the workers killed next.
    fn drop(&mut self) {
        if let Ok(content) = std::fs::read_to_string(self.pid_file()) {
            if let Ok(pid) = content.trim().parse::<i32>() {
                let children = self.worker_pids();
                kill(pid, "-9");
                for child in children {
                    kill(child, "-9");
                }
            }
        }
    }
}

fn kill(pid: i32, sig: &str) -> bool {
    Command::new("kill")
        .args([sig, &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Whether a process exists (kill -0).
pub fn process_exists(pid: i32) -> bool {
    kill(pid, "-0")
}

/// Split table output into whitespace-token rows, skipping the header.
pub fn parse_rows(stdout: &str) -> Vec<Vec<String>> {
    stdout
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split_whitespace().map(str::to_string).collect())
        .collect()
}
