//! Two-lane run queue.
//!
//! Tasks with a pending cancel request run ahead of ordinarily ready tasks
//! so cancellation is observed promptly. Within a lane order is FIFO, which
//! keeps scheduling deterministic for a given workload.

use crate::types::TaskId;
use std::collections::{HashSet, VecDeque};

/// Which lane a wakeup lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lane {
    /// Cancel requests; drained first.
    Cancel,
    /// Ordinary wakeups.
    Ready,
}

/// FIFO run queue with a cancel lane and per-task dedup.
///
/// A task is enqueued at most once at a time. Re-enqueueing an already
/// queued task into the cancel lane promotes it.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    cancel: VecDeque<TaskId>,
    ready: VecDeque<TaskId>,
    queued: HashSet<TaskId>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enqueues `task` into `lane`. No-op if already queued, except that a
    /// ready-queued task asked to cancel moves to the cancel lane.
    pub(crate) fn enqueue(&mut self, task: TaskId, lane: Lane) {
        if self.queued.contains(&task) {
            if lane == Lane::Cancel && !self.cancel.contains(&task) {
                self.ready.retain(|t| *t != task);
                self.cancel.push_back(task);
            }
            return;
        }
        self.queued.insert(task);
        match lane {
            Lane::Cancel => self.cancel.push_back(task),
            Lane::Ready => self.ready.push_back(task),
        }
    }

    /// Pops the next task, cancel lane first.
    pub(crate) fn pop(&mut self) -> Option<TaskId> {
        let task = self.cancel.pop_front().or_else(|| self.ready.pop_front())?;
        self.queued.remove(&task);
        Some(task)
    }

    /// Drops a task from the queue, e.g. when it turned terminal while
    /// queued.
    pub(crate) fn remove(&mut self, task: TaskId) {
        if self.queued.remove(&task) {
            self.cancel.retain(|t| *t != task);
            self.ready.retain(|t| *t != task);
        }
    }
}
