//! Scopes and join handles.
//!
//! A [`Scope`] owns the tasks spawned in it. It does not complete until
//! every owned task is terminal and every child scope has completed, and
//! cancelling it cancels the whole subtree.

use crate::cx::Cx;
use crate::error::Error;
use crate::runtime::state::StoredFuture;
use crate::runtime::Shared;
use crate::types::{CancelReason, Outcome, ScopeId, TaskId};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

/// A handle to a scope in the runtime's scope tree.
///
/// Cheap to clone. The handle does not keep the scope alive; it is a name,
/// and operations on a completed scope fail with
/// [`crate::ErrorKind::ScopeClosed`].
#[derive(Clone)]
pub struct Scope {
    id: ScopeId,
    shared: Weak<Shared>,
}

impl Scope {
    pub(crate) fn from_parts(id: ScopeId, shared: Weak<Shared>) -> Self {
        Self { id, shared }
    }

    /// This scope's id.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Spawns a task in this scope.
    ///
    /// The body receives its own [`Cx`] and runs until it returns or
    /// observes cancellation. A failure cancels the scope's other tasks.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::ErrorKind::ScopeClosed`] if the scope is
    /// cancelling or completed.
    pub fn spawn<F, Fut, T>(&self, f: F) -> Result<JoinHandle<T>, Error>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_inner(None, f)
    }

    /// Spawns a named task; the name shows up in trace output.
    ///
    /// # Errors
    ///
    /// Same as [`Scope::spawn`].
    pub fn spawn_named<F, Fut, T>(&self, name: impl Into<String>, f: F) -> Result<JoinHandle<T>, Error>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_inner(Some(name.into()), f)
    }

    fn spawn_inner<F, Fut, T>(&self, name: Option<String>, f: F) -> Result<JoinHandle<T>, Error>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
        T: Send + 'static,
    {
        let shared = self.shared.upgrade().ok_or_else(Error::scope_closed)?;
        let (task, cancel_cell) = shared.state.lock().register_task(self.id, name)?;

        let cx = Cx::new(
            task,
            self.id,
            Arc::downgrade(&shared),
            Arc::clone(&cancel_cell),
        );
        let body = f(cx);

        let result_cell = Arc::new(ResultCell::new());
        let completion = Arc::clone(&result_cell);
        let wrapper: StoredFuture = Box::pin(async move {
            match body.await {
                Ok(value) => {
                    completion.complete(Outcome::Ok(value));
                    Outcome::Ok(())
                }
                Err(err) if err.is_cancelled() => {
                    let reason = err.cancel_reason().cloned().unwrap_or_default();
                    completion.complete(Outcome::Cancelled(reason.clone()));
                    Outcome::Cancelled(reason)
                }
                Err(err) => {
                    completion.complete(Outcome::Failed(err.clone()));
                    Outcome::Failed(err)
                }
            }
        });

        {
            let mut state = shared.state.lock();
            let mut sched = shared.scheduler.lock();
            state.attach_future(&mut sched, task, wrapper);
        }
        tracing::trace!(task = %task, scope = %self.id, "spawned task");

        Ok(JoinHandle {
            task,
            cell: result_cell,
            shared: self.shared.clone(),
        })
    }

    /// Creates a child scope.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::ErrorKind::ScopeClosed`] if this scope no
    /// longer accepts work.
    pub fn child(&self) -> Result<Self, Error> {
        let shared = self.shared.upgrade().ok_or_else(Error::scope_closed)?;
        let id = shared.state.lock().create_scope(Some(self.id))?;
        Ok(Self {
            id,
            shared: self.shared.clone(),
        })
    }

    /// Requests cancellation of this scope, all its tasks, and all its
    /// descendant scopes. Idempotent; repeated requests only strengthen
    /// the recorded reason.
    pub fn cancel(&self, reason: CancelReason) {
        if let Some(shared) = self.shared.upgrade() {
            let mut state = shared.state.lock();
            let mut sched = shared.scheduler.lock();
            state.cancel_scope(&mut sched, self.id, &reason);
        }
    }

    /// Whether cancellation has been requested for this scope.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.upgrade().map_or(true, |shared| {
            shared
                .state
                .lock()
                .scopes
                .get(self.id.arena_index())
                .map_or(false, |rec| rec.cancel_reason.is_some())
        })
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Scope").field(&self.id).finish()
    }
}

struct ResultSlot<T> {
    outcome: Option<Outcome<T>>,
    waiters: Vec<Waker>,
}

/// Shared cell the task wrapper writes its typed outcome into, read by
/// [`JoinHandle`].
pub(crate) struct ResultCell<T> {
    slot: Mutex<ResultSlot<T>>,
}

impl<T> ResultCell<T> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(ResultSlot {
                outcome: None,
                waiters: Vec::new(),
            }),
        }
    }

    fn complete(&self, outcome: Outcome<T>) {
        let waiters = {
            let mut slot = self.slot.lock();
            if slot.outcome.is_some() {
                return;
            }
            slot.outcome = Some(outcome);
            std::mem::take(&mut slot.waiters)
        };
        for waker in waiters {
            waker.wake();
        }
    }

    fn take(&self) -> Option<Outcome<T>> {
        self.slot.lock().outcome.take()
    }

    /// Takes the outcome, or registers `waker` if it has not arrived.
    fn poll_take(&self, waker: &Waker) -> Option<Outcome<T>> {
        let mut slot = self.slot.lock();
        if let Some(outcome) = slot.outcome.take() {
            return Some(outcome);
        }
        if !slot.waiters.iter().any(|w| w.will_wake(waker)) {
            slot.waiters.push(waker.clone());
        }
        None
    }
}

/// Handle to a spawned task.
///
/// Dropping the handle detaches the task; it keeps running under its
/// scope.
pub struct JoinHandle<T> {
    task: TaskId,
    cell: Arc<ResultCell<T>>,
    shared: Weak<Shared>,
}

impl<T> JoinHandle<T> {
    /// The spawned task's id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.task
    }

    /// Waits for the task to finish and returns its result.
    ///
    /// A cancelled child surfaces as an error of kind
    /// [`crate::ErrorKind::Cancelled`], which by default cancels the
    /// joining task too when propagated with `?`.
    pub fn join(self, cx: &Cx) -> Join<T> {
        Join {
            cell: self.cell,
            cx: cx.clone(),
        }
    }

    /// Requests cancellation of this task alone.
    pub fn cancel(&self, reason: CancelReason) {
        if let Some(shared) = self.shared.upgrade() {
            let mut state = shared.state.lock();
            let mut sched = shared.scheduler.lock();
            state.cancel_task(&mut sched, self.task, &reason);
        }
    }

    pub(crate) fn take_outcome(&self) -> Option<Outcome<T>> {
        self.cell.take()
    }
}

impl<T> std::fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("JoinHandle").field(&self.task).finish()
    }
}

/// Future returned by [`JoinHandle::join`].
pub struct Join<T> {
    cell: Arc<ResultCell<T>>,
    cx: Cx,
}

impl<T> Future for Join<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(reason) = this.cx.active_cancel() {
            return Poll::Ready(Err(Error::cancelled(reason)));
        }
        match this.cell.poll_take(ctx.waker()) {
            Some(outcome) => Poll::Ready(outcome.into_result()),
            None => Poll::Pending,
        }
    }
}
