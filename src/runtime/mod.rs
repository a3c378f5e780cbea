//! The runtime: a single-threaded cooperative executor driving a scope
//! tree of tasks to quiescence.
//!
//! The run loop drains the two-lane scheduler, fires expired timers, and
//! when nothing is runnable advances the clock to the next pending
//! deadline. Under the virtual clock this makes delay-heavy workloads
//! complete instantly and deterministically.

pub(crate) mod scheduler;
pub(crate) mod state;
pub(crate) mod timer;

use crate::clock::{Clock, ClockMode};
use crate::cx::Scope;
use crate::error::Error;
use crate::record::TaskState;
use crate::types::{Outcome, TaskId};
use parking_lot::Mutex;
use scheduler::Scheduler;
use state::RuntimeState;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Wake, Waker};
use timer::TimerHeap;

/// State shared between the run loop, task contexts, and wakers.
///
/// Lock order: `state` before `scheduler`. Neither lock is held while a
/// task body is polled.
pub(crate) struct Shared {
    pub(crate) state: Mutex<RuntimeState>,
    pub(crate) scheduler: Mutex<Scheduler>,
    pub(crate) timers: Mutex<TimerHeap>,
    pub(crate) clock: Clock,
}

impl Shared {
    fn new(mode: ClockMode) -> Self {
        Self {
            state: Mutex::new(RuntimeState::new()),
            scheduler: Mutex::new(Scheduler::new()),
            timers: Mutex::new(TimerHeap::new()),
            clock: Clock::new(mode),
        }
    }
}

/// Waker for a stored task: wakeups enqueue the task into the ready lane.
pub(crate) struct TaskWaker {
    task: TaskId,
    shared: Weak<Shared>,
}

impl TaskWaker {
    pub(crate) fn waker(task: TaskId, shared: &Arc<Shared>) -> Waker {
        Waker::from(Arc::new(Self {
            task,
            shared: Arc::downgrade(shared),
        }))
    }
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if let Some(shared) = self.shared.upgrade() {
            shared
                .scheduler
                .lock()
                .enqueue(self.task, scheduler::Lane::Ready);
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// The time source; virtual by default.
    pub clock: ClockMode,
    /// Optional bound on polls before the run is abandoned as stalled.
    pub max_steps: Option<u64>,
}

/// The executor. Owns no threads; [`Runtime::run`] drives everything on
/// the calling thread.
#[derive(Debug, Default)]
pub struct Runtime {
    config: RuntimeConfig,
}

impl Runtime {
    /// Creates a runtime with the default configuration (virtual clock).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runtime with the given configuration.
    #[must_use]
    pub const fn with_config(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Runs `f` as the root task and drives the runtime to quiescence.
    ///
    /// Returns the root task's outcome, except that a failure escaping the
    /// root scope takes precedence: if any task failed, the run reports
    /// that first failure even when the root body itself succeeded.
    pub fn run<F, Fut, T>(&self, f: F) -> Outcome<T>
    where
        F: FnOnce(crate::cx::Cx) -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
        T: Send + 'static,
    {
        let shared = Arc::new(Shared::new(self.config.clock));
        let root_scope = {
            let mut state = shared.state.lock();
            match state.create_scope(None) {
                Ok(id) => id,
                Err(err) => return Outcome::Failed(err),
            }
        };
        let scope = Scope::from_parts(root_scope, Arc::downgrade(&shared));
        let handle = match scope.spawn_named("root", f) {
            Ok(handle) => handle,
            Err(err) => return Outcome::Failed(err),
        };

        if let Err(err) = self.drive(&shared) {
            return Outcome::Failed(err);
        }

        let mut state = shared.state.lock();
        if let Some(err) = state.root_failure.take() {
            return Outcome::Failed(err);
        }
        if let Some(outcome) = handle.take_outcome() {
            return outcome;
        }
        let parked = state.live_task_count();
        tracing::error!(parked, "runtime stalled with tasks parked");
        Outcome::Failed(Error::stalled(parked))
    }

    fn drive(&self, shared: &Arc<Shared>) -> Result<(), Error> {
        let mut steps: u64 = 0;
        loop {
            if shared.state.lock().root_completed {
                return Ok(());
            }

            let next = shared.scheduler.lock().pop();
            if let Some(task) = next {
                steps += 1;
                if let Some(limit) = self.config.max_steps {
                    if steps > limit {
                        tracing::error!(limit, "step limit exceeded");
                        return Err(
                            Error::stalled(shared.state.lock().live_task_count())
                                .with_message(format!("step limit of {limit} exceeded")),
                        );
                    }
                }
                Self::poll_task(shared, task);
                continue;
            }

            let now = shared.clock.now();
            if shared.timers.lock().fire_expired(now) > 0 {
                continue;
            }

            // Nothing runnable. Jump (or sleep) to the next deadline.
            let deadline = shared.timers.lock().next_deadline();
            match deadline {
                Some(deadline) => {
                    tracing::trace!(%deadline, "advancing clock");
                    shared.clock.advance_to(deadline);
                    shared.timers.lock().fire_expired(shared.clock.now());
                }
                None => return Ok(()),
            }
        }
    }

    /// Polls one task. The future is taken out of the table so the state
    /// lock is not held across the poll; task bodies are free to spawn,
    /// cancel, and touch channels.
    fn poll_task(shared: &Arc<Shared>, task: TaskId) {
        let mut future = {
            let mut state = shared.state.lock();
            let Some(rec) = state.tasks.get_mut(task.arena_index()) else {
                return;
            };
            if rec.state.is_terminal() {
                return;
            }
            if matches!(rec.state, TaskState::Ready) {
                rec.transition(TaskState::Running);
            }
            match state.futures.remove(&task) {
                Some(future) => future,
                None => return,
            }
        };

        let waker = TaskWaker::waker(task, shared);
        let mut ctx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut ctx) {
            Poll::Pending => {
                let mut state = shared.state.lock();
                state.futures.insert(task, future);
                if let Some(rec) = state.tasks.get_mut(task.arena_index()) {
                    if matches!(rec.state, TaskState::Running) {
                        rec.transition(TaskState::Suspended);
                    }
                }
            }
            Poll::Ready(outcome) => {
                let mut state = shared.state.lock();
                let mut sched = shared.scheduler.lock();
                state.task_finished(&mut sched, task, outcome);
            }
        }
    }
}
