// SPDX-License-Identifier: MIT

//! Master bookkeeping, separated from process operations.
//!
//! The monitor loop feeds reaped pids into [`MasterState::on_reaped`] and
//! executes the returned [`ReapDecision`] (fork a replacement, write the
//! restart stamp, leave the loop). Keeping the dispatch pure means every
//! branch of the dead-worker table is testable without forking.

use std::collections::HashMap;
use std::time::SystemTime;

use nix::unistd::Pid;
use workerman_core::ProcessHash;

/// What a reaped child means right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeadWorkerHandler {
    #[default]
    None,
    Stop,
    Reload,
}

/// Master-side record of one worker slot.
///
/// `id` and `hash` survive revives; `restart_count` counts unexpected
/// exits only.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub id: u32,
    pub listener_index: usize,
    pub hash: ProcessHash,
    pub restart_count: u32,
    pub start_time: SystemTime,
}

/// A planned stop/reload saw a non-zero exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnexpectedExit {
    pub worker_id: u32,
    pub status: i32,
}

/// Effects the process layer must execute after a reap.
#[derive(Default)]
pub struct ReapDecision {
    /// Log this as an unexpected exit.
    pub unexpected: Option<UnexpectedExit>,
    /// Fork a replacement from this record.
    pub revive: Option<WorkerRecord>,
    /// The last pending reload worker is gone; stamp `restart.workerman`.
    pub reload_complete: bool,
    /// The last planned-stop worker is gone; the monitor loop exits.
    pub exit_monitor: bool,
}

pub struct MasterState {
    workers: HashMap<Pid, WorkerRecord>,
    pending_stop: HashMap<Pid, WorkerRecord>,
    pub run: bool,
    pub shutdown_disabled: bool,
    expect_dead_worker: bool,
    handler: DeadWorkerHandler,
    next_worker_id: u32,
}

impl Default for MasterState {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterState {
    pub fn new() -> Self {
        Self {
            workers: HashMap::new(),
            pending_stop: HashMap::new(),
            run: true,
            shutdown_disabled: false,
            expect_dead_worker: false,
            handler: DeadWorkerHandler::None,
            next_worker_id: 1,
        }
    }

    /// Allocate the next worker id; strictly increasing for the lifetime
    /// of this master.
    pub fn allocate_id(&mut self) -> u32 {
        let id = self.next_worker_id;
        self.next_worker_id += 1;
        id
    }

    pub fn insert_worker(&mut self, pid: Pid, record: WorkerRecord) {
        self.workers.insert(pid, record);
    }

    pub fn worker_pids(&self) -> Vec<Pid> {
        self.workers.keys().copied().collect()
    }

    /// Worker hashes ordered by worker id.
    pub fn worker_hashes(&self) -> Vec<ProcessHash> {
        let mut records: Vec<&WorkerRecord> = self.workers.values().collect();
        records.sort_by_key(|r| r.id);
        records.iter().map(|r| r.hash.clone()).collect()
    }

    pub fn workers_is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn workers_len(&self) -> usize {
        self.workers.len()
    }

    pub fn pending_stop_len(&self) -> usize {
        self.pending_stop.len()
    }

    pub fn expecting_dead_workers(&self) -> bool {
        self.expect_dead_worker
    }

    pub fn handler(&self) -> DeadWorkerHandler {
        self.handler
    }

    /// Arm the stop handler. Graceful stops snapshot the live set so the
    /// drain can be tracked.
    pub fn begin_stop(&mut self, graceful: bool) {
        self.expect_dead_worker = true;
        self.handler = DeadWorkerHandler::Stop;
        if graceful {
            self.pending_stop = self.workers.clone();
        }
    }

    /// Arm the reload handler: every current worker is to be replaced.
    pub fn begin_reload(&mut self) {
        self.expect_dead_worker = true;
        self.handler = DeadWorkerHandler::Reload;
        self.pending_stop = self.workers.clone();
    }

    /// Dispatch one reaped child through the dead-worker table.
    pub fn on_reaped(&mut self, pid: Pid, status: i32) -> ReapDecision {
        let mut decision = ReapDecision::default();
        let Some(mut record) = self.workers.remove(&pid) else {
            // Not ours (or already handled); keep the pending set clean.
            self.pending_stop.remove(&pid);
            return decision;
        };

        if !self.expect_dead_worker {
            // Unexpected crash: revive with the same id and hash.
            record.restart_count += 1;
            decision.unexpected = Some(UnexpectedExit {
                worker_id: record.id,
                status,
            });
            decision.revive = Some(record);
            return decision;
        }

        match self.handler {
            DeadWorkerHandler::Stop => {
                if status != 0 {
                    decision.unexpected = Some(UnexpectedExit {
                        worker_id: record.id,
                        status,
                    });
                }
                self.pending_stop.remove(&pid);
                if self.workers.is_empty() {
                    self.run = false;
                    self.shutdown_disabled = true;
                    self.expect_dead_worker = false;
                    self.handler = DeadWorkerHandler::None;
                    decision.exit_monitor = true;
                }
            }
            DeadWorkerHandler::Reload => {
                if self.pending_stop.remove(&pid).is_some() {
                    if status != 0 {
                        decision.unexpected = Some(UnexpectedExit {
                            worker_id: record.id,
                            status,
                        });
                    }
                    // Planned replacement: restart_count stays put.
                    decision.revive = Some(record);
                    if self.pending_stop.is_empty() {
                        decision.reload_complete = true;
                        self.expect_dead_worker = false;
                        self.handler = DeadWorkerHandler::None;
                    }
                } else {
                    // A worker outside the reload set crashed.
                    record.restart_count += 1;
                    decision.unexpected = Some(UnexpectedExit {
                        worker_id: record.id,
                        status,
                    });
                    decision.revive = Some(record);
                }
            }
            DeadWorkerHandler::None => {
                // expect_dead_worker without a handler should not happen;
                // fall back to the unexpected-crash path.
                record.restart_count += 1;
                decision.unexpected = Some(UnexpectedExit {
                    worker_id: record.id,
                    status,
                });
                decision.revive = Some(record);
            }
        }
        decision
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
