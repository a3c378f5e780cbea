//! The task context.
//!
//! Every task body receives a [`Cx`]: its identity, a handle back to the
//! runtime, and the cancellation cell the runtime flips when the task is
//! asked to stop. All suspension points read the cell, so cancellation is
//! observed at the next await and surfaces as an error the body propagates
//! with `?`.

use crate::cx::Scope;
use crate::runtime::Shared;
use crate::time::Sleep;
use crate::types::{CancelReason, ScopeId, TaskId, Time};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

/// Per-task cancellation flag with a shield mask.
///
/// The reason is monotone: requests only strengthen it. While the mask
/// depth is nonzero the flag reads as clear, which is how
/// [`Cx::shield`] lets cleanup run after cancellation.
pub(crate) struct CancelCell {
    reason: Mutex<Option<CancelReason>>,
    mask_depth: AtomicU32,
}

impl CancelCell {
    pub(crate) fn new() -> Self {
        Self {
            reason: Mutex::new(None),
            mask_depth: AtomicU32::new(0),
        }
    }

    pub(crate) fn request(&self, reason: &CancelReason) {
        let mut slot = self.reason.lock();
        match &mut *slot {
            Some(existing) => {
                existing.strengthen(reason);
            }
            slot @ None => *slot = Some(reason.clone()),
        }
    }

    /// The pending reason, regardless of masking.
    pub(crate) fn requested(&self) -> Option<CancelReason> {
        self.reason.lock().clone()
    }

    /// The pending reason, unless a shield is active.
    pub(crate) fn active(&self) -> Option<CancelReason> {
        if self.mask_depth.load(Ordering::Acquire) > 0 {
            return None;
        }
        self.requested()
    }

    pub(crate) fn push_mask(&self) {
        self.mask_depth.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn pop_mask(&self) {
        self.mask_depth.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for CancelCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelCell")
            .field("reason", &*self.reason.lock())
            .field("mask_depth", &self.mask_depth.load(Ordering::Relaxed))
            .finish()
    }
}

struct CxInner {
    task: TaskId,
    scope: ScopeId,
    shared: Weak<Shared>,
    cell: Arc<CancelCell>,
}

/// A task's capability context: identity, time, cancellation, and access
/// to the owning scope.
///
/// Cheap to clone; clones share the same cancellation cell.
#[derive(Clone)]
pub struct Cx {
    inner: Arc<CxInner>,
}

impl Cx {
    pub(crate) fn new(
        task: TaskId,
        scope: ScopeId,
        shared: Weak<Shared>,
        cell: Arc<CancelCell>,
    ) -> Self {
        Self {
            inner: Arc::new(CxInner {
                task,
                scope,
                shared,
                cell,
            }),
        }
    }

    /// This task's id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.inner.task
    }

    /// The scope this task belongs to, for spawning siblings and children.
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope::from_parts(self.inner.scope, self.inner.shared.clone())
    }

    /// Current runtime time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.inner
            .shared
            .upgrade()
            .map_or(Time::ZERO, |shared| shared.clock.now())
    }

    /// Returns whether cancellation has been requested, even if currently
    /// shielded.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cell.requested().is_some()
    }

    /// Explicit cancellation point: fails with the pending reason if this
    /// task has been asked to cancel and no shield is active.
    pub fn checkpoint(&self) -> crate::Result<()> {
        match self.inner.cell.active() {
            Some(reason) => Err(crate::Error::cancelled(reason)),
            None => Ok(()),
        }
    }

    /// Suspends this task for `duration`.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        Sleep::new(self.clone(), self.now() + duration)
    }

    /// Suspends this task until `deadline`.
    pub fn sleep_until(&self, deadline: Time) -> Sleep {
        Sleep::new(self.clone(), deadline)
    }

    /// Yields to other runnable tasks, then resumes.
    pub fn yield_now(&self) -> YieldNow {
        YieldNow {
            cx: self.clone(),
            yielded: false,
        }
    }

    /// Runs `inner` with cancellation masked.
    ///
    /// Used for cleanup after a cancelled operation: awaits inside the
    /// shield complete normally even though the task is cancelling. The
    /// pending cancellation resurfaces at the first await after the shield
    /// future is dropped.
    pub fn shield<F: Future>(&self, inner: F) -> Shield<F> {
        self.inner.cell.push_mask();
        Shield {
            inner: Box::pin(inner),
            cell: Arc::clone(&self.inner.cell),
        }
    }

    pub(crate) fn shared(&self) -> Option<Arc<Shared>> {
        self.inner.shared.upgrade()
    }

    pub(crate) fn active_cancel(&self) -> Option<CancelReason> {
        self.inner.cell.active()
    }
}

impl std::fmt::Debug for Cx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cx")
            .field("task", &self.inner.task)
            .field("scope", &self.inner.scope)
            .finish()
    }
}

/// Future returned by [`Cx::shield`].
///
/// Holding one keeps the task's cancel mask raised; dropping it lowers
/// the mask again.
pub struct Shield<F> {
    inner: Pin<Box<F>>,
    cell: Arc<CancelCell>,
}

impl<F: Future> Future for Shield<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().inner.as_mut().poll(ctx)
    }
}

impl<F> Drop for Shield<F> {
    fn drop(&mut self) {
        self.cell.pop_mask();
    }
}

/// Future returned by [`Cx::yield_now`].
pub struct YieldNow {
    cx: Cx,
    yielded: bool,
}

impl Future for YieldNow {
    type Output = crate::Result<()>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(reason) = this.cx.active_cancel() {
            return Poll::Ready(Err(crate::Error::cancelled(reason)));
        }
        if this.yielded {
            Poll::Ready(Ok(()))
        } else {
            this.yielded = true;
            ctx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CancelKind;

    #[test]
    fn cell_strengthens_monotonically() {
        let cell = CancelCell::new();
        assert!(cell.requested().is_none());
        cell.request(&CancelReason::user("stop"));
        cell.request(&CancelReason::shutdown());
        cell.request(&CancelReason::timeout());
        assert_eq!(
            cell.requested().map(|r| r.kind()),
            Some(CancelKind::Shutdown)
        );
    }

    #[test]
    fn mask_hides_pending_cancel() {
        let cell = CancelCell::new();
        cell.request(&CancelReason::timeout());
        assert!(cell.active().is_some());
        cell.push_mask();
        assert!(cell.active().is_none());
        assert!(cell.requested().is_some());
        cell.pop_mask();
        assert!(cell.active().is_some());
    }

    #[test]
    fn nested_masks_unwind_in_order() {
        let cell = CancelCell::new();
        cell.request(&CancelReason::timeout());
        cell.push_mask();
        cell.push_mask();
        cell.pop_mask();
        assert!(cell.active().is_none());
        cell.pop_mask();
        assert!(cell.active().is_some());
    }
}
