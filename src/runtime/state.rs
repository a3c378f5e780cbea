//! Runtime bookkeeping state: the scope tree, task table, and stored
//! futures.
//!
//! All mutation happens under the single state lock. Methods that need to
//! enqueue wakeups take the scheduler lock as an argument; the lock order
//! is always state before scheduler.

use crate::cx::CancelCell;
use crate::error::Error;
use crate::record::{ScopeRecord, ScopeState, TaskRecord, TaskState};
use crate::runtime::scheduler::{Lane, Scheduler};
use crate::types::{CancelReason, Outcome, ScopeId, TaskId};
use crate::util::Arena;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A stored task body, type-erased to the runtime's uniform outcome.
pub(crate) type StoredFuture = Pin<Box<dyn Future<Output = Outcome<()>> + Send>>;

pub(crate) struct RuntimeState {
    pub(crate) scopes: Arena<ScopeRecord>,
    pub(crate) tasks: Arena<TaskRecord>,
    /// Task bodies, taken out of the table for the duration of a poll.
    pub(crate) futures: HashMap<TaskId, StoredFuture>,
    pub(crate) cancel_cells: HashMap<TaskId, Arc<CancelCell>>,
    /// Failure escaping the root scope, surfaced from `Runtime::run`.
    pub(crate) root_failure: Option<Error>,
    pub(crate) root_completed: bool,
}

impl RuntimeState {
    pub(crate) fn new() -> Self {
        Self {
            scopes: Arena::new(),
            tasks: Arena::new(),
            futures: HashMap::new(),
            cancel_cells: HashMap::new(),
            root_failure: None,
            root_completed: false,
        }
    }

    /// Creates a scope under `parent`, or the root scope for `None`.
    pub(crate) fn create_scope(&mut self, parent: Option<ScopeId>) -> Result<ScopeId, Error> {
        if let Some(parent) = parent {
            let rec = self
                .scopes
                .get(parent.arena_index())
                .ok_or_else(Error::scope_closed)?;
            if !rec.accepts_spawns() {
                return Err(Error::scope_closed());
            }
        }
        let index = self
            .scopes
            .insert_with(|idx| ScopeRecord::new(ScopeId::from_arena(idx), parent));
        let id = ScopeId::from_arena(index);
        if let Some(parent) = parent {
            if let Some(rec) = self.scopes.get_mut(parent.arena_index()) {
                rec.children.push(id);
            }
        }
        tracing::trace!(scope = %id, parent = ?parent.map(|p| p.to_string()), "created scope");
        Ok(id)
    }

    /// Registers a task under `scope` and hands back its cancel cell.
    ///
    /// The task's future is attached separately once the body has been
    /// constructed; see [`Self::attach_future`].
    pub(crate) fn register_task(
        &mut self,
        scope: ScopeId,
        name: Option<String>,
    ) -> Result<(TaskId, Arc<CancelCell>), Error> {
        let rec = self
            .scopes
            .get(scope.arena_index())
            .ok_or_else(Error::scope_closed)?;
        if !rec.accepts_spawns() {
            return Err(Error::scope_closed());
        }
        let index = self
            .tasks
            .insert_with(|idx| TaskRecord::new(TaskId::from_arena(idx), scope, name));
        let task = TaskId::from_arena(index);
        if let Some(rec) = self.scopes.get_mut(scope.arena_index()) {
            rec.tasks.push(task);
        }
        let cell = Arc::new(CancelCell::new());
        self.cancel_cells.insert(task, Arc::clone(&cell));
        Ok((task, cell))
    }

    /// Attaches the task body and enqueues the task for its first poll.
    pub(crate) fn attach_future(
        &mut self,
        scheduler: &mut Scheduler,
        task: TaskId,
        future: StoredFuture,
    ) {
        self.futures.insert(task, future);
        let lane = match self.tasks.get_mut(task.arena_index()) {
            Some(rec) => {
                rec.transition(TaskState::Ready);
                if matches!(rec.state, TaskState::Cancelling(_)) {
                    Lane::Cancel
                } else {
                    Lane::Ready
                }
            }
            None => Lane::Ready,
        };
        scheduler.enqueue(task, lane);
    }

    /// Requests cancellation of a scope, its tasks, and its descendants.
    pub(crate) fn cancel_scope(
        &mut self,
        scheduler: &mut Scheduler,
        scope: ScopeId,
        reason: &CancelReason,
    ) {
        let Some(rec) = self.scopes.get_mut(scope.arena_index()) else {
            return;
        };
        if !rec.request_cancel(reason) {
            return;
        }
        let effective = rec.cancel_reason.clone().unwrap_or_else(|| reason.clone());
        let tasks = rec.tasks.clone();
        let children = rec.children.clone();
        tracing::debug!(scope = %scope, reason = %effective, "cancelling scope");
        for task in tasks {
            self.cancel_task(scheduler, task, &effective);
        }
        let child_reason = CancelReason::parent_cancelled();
        for child in children {
            self.cancel_scope(scheduler, child, &child_reason);
        }
    }

    /// Requests cancellation of one task. Terminal tasks are untouched.
    pub(crate) fn cancel_task(
        &mut self,
        scheduler: &mut Scheduler,
        task: TaskId,
        reason: &CancelReason,
    ) {
        let Some(rec) = self.tasks.get_mut(task.arena_index()) else {
            return;
        };
        if rec.state.is_terminal() {
            return;
        }
        rec.transition(TaskState::Cancelling(reason.clone()));
        if let Some(cell) = self.cancel_cells.get(&task) {
            cell.request(reason);
        }
        // The task is woken directly through the cancel lane rather than
        // through whatever waker it parked; its next poll observes the
        // cell and unwinds.
        scheduler.enqueue(task, Lane::Cancel);
        tracing::trace!(task = %task, reason = %reason, "cancel requested");
    }

    /// Records a task's terminal outcome and propagates failure.
    ///
    /// The first failure in a scope cancels its siblings; later failures
    /// are logged and dropped.
    pub(crate) fn task_finished(
        &mut self,
        scheduler: &mut Scheduler,
        task: TaskId,
        outcome: Outcome<()>,
    ) {
        let Some(rec) = self.tasks.get_mut(task.arena_index()) else {
            return;
        };
        let scope = rec.scope;
        tracing::debug!(
            task = %task,
            name = rec.name.as_deref().unwrap_or(""),
            scope = %scope,
            outcome = %outcome,
            "task finished"
        );
        rec.transition(TaskState::Done(outcome.clone()));
        self.futures.remove(&task);
        self.cancel_cells.remove(&task);
        scheduler.remove(task);

        if let Outcome::Failed(err) = outcome {
            let err = if err.origin().is_none() {
                err.with_origin(task)
            } else {
                err
            };
            if let Some(srec) = self.scopes.get_mut(scope.arena_index()) {
                if srec.record_failure(err) {
                    self.cancel_scope(scheduler, scope, &CancelReason::sibling_failed());
                }
            }
        }

        self.try_complete_scope(scheduler, scope);
    }

    /// Completes `scope` if every owned task is terminal and every child
    /// scope has completed, reaping its records and delivering its failure
    /// upward exactly once.
    pub(crate) fn try_complete_scope(&mut self, scheduler: &mut Scheduler, scope: ScopeId) {
        let Some(rec) = self.scopes.get(scope.arena_index()) else {
            return;
        };
        if rec.state == ScopeState::Completed {
            return;
        }

        let tasks_done = rec.tasks.iter().all(|task| {
            self.tasks
                .get(task.arena_index())
                .map_or(true, |t| t.state.is_terminal())
        });
        if !tasks_done {
            return;
        }

        // Only once this scope's own tasks have drained are childless
        // child scopes swept up. While any owner task still runs, a fresh
        // empty child stays open so the owner can spawn into it later.
        let children = rec.children.clone();
        for child in children {
            self.try_complete_scope(scheduler, child);
        }

        let Some(rec) = self.scopes.get(scope.arena_index()) else {
            return;
        };
        // Completed children unlink themselves from this list.
        if !rec.children.is_empty() {
            return;
        }

        let Some(rec) = self.scopes.get_mut(scope.arena_index()) else {
            return;
        };
        rec.state = ScopeState::Completed;
        let owned = std::mem::take(&mut rec.tasks);
        let parent = rec.parent;
        let failure = rec.take_failure();
        for task in owned {
            self.tasks.remove(task.arena_index());
            self.futures.remove(&task);
            self.cancel_cells.remove(&task);
            scheduler.remove(task);
        }
        tracing::debug!(scope = %scope, failed = failure.is_some(), "scope completed");

        if let Some(err) = failure {
            tracing::error!(scope = %scope, error = %err, "scope failed");
            match parent {
                Some(parent) => {
                    if let Some(prec) = self.scopes.get_mut(parent.arena_index()) {
                        if prec.record_failure(err) {
                            self.cancel_scope(scheduler, parent, &CancelReason::sibling_failed());
                        }
                    }
                }
                None => self.root_failure = Some(err),
            }
        }

        self.scopes.remove(scope.arena_index());
        match parent {
            Some(parent) => {
                if let Some(prec) = self.scopes.get_mut(parent.arena_index()) {
                    prec.children.retain(|c| *c != scope);
                }
                self.try_complete_scope(scheduler, parent);
            }
            None => self.root_completed = true,
        }
    }

    /// Number of live (non-terminal) tasks, for stall reporting.
    pub(crate) fn live_task_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|(_, rec)| !rec.state.is_terminal())
            .count()
    }
}
