//! Task bookkeeping records.

use crate::types::{CancelReason, Outcome, ScopeId, TaskId};

/// Lifecycle state of a task.
///
/// `Done` is absorbing: once a task is terminal its outcome never changes,
/// even if further cancel requests arrive.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TaskState {
    /// Created but not yet enqueued.
    Created,
    /// Enqueued and waiting to be polled.
    Ready,
    /// Currently being polled.
    Running,
    /// Parked on a waker (channel, timer, or join).
    Suspended,
    /// Asked to cancel; still runs so it can observe the request.
    Cancelling(CancelReason),
    /// Terminal, with the recorded outcome.
    Done(Outcome<()>),
}

impl TaskState {
    pub(crate) const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Whether `next` is a legal successor of `self`.
    fn admits(&self, next: &Self) -> bool {
        match (self, next) {
            // Terminal states are absorbing.
            (Self::Done(_), _) => false,
            // Cancellation and completion may land from any live state.
            (_, Self::Cancelling(_) | Self::Done(_)) => true,
            (Self::Created | Self::Running | Self::Suspended, Self::Ready) => true,
            (Self::Ready, Self::Running) => true,
            (Self::Running, Self::Suspended) => true,
            _ => false,
        }
    }
}

/// Bookkeeping for one task: owning scope, optional name, and lifecycle
/// state.
#[derive(Debug)]
pub(crate) struct TaskRecord {
    pub(crate) id: TaskId,
    pub(crate) scope: ScopeId,
    pub(crate) name: Option<String>,
    pub(crate) state: TaskState,
}

impl TaskRecord {
    pub(crate) fn new(id: TaskId, scope: ScopeId, name: Option<String>) -> Self {
        Self {
            id,
            scope,
            name,
            state: TaskState::Created,
        }
    }

    /// Moves the task to `next` if the transition is legal.
    ///
    /// Returns false (and leaves the state untouched) otherwise. Illegal
    /// transitions are expected under races, e.g. a cancel request landing
    /// on an already terminal task.
    pub(crate) fn transition(&mut self, next: TaskState) -> bool {
        if !self.state.admits(&next) {
            tracing::trace!(
                task = %self.id,
                from = ?self.state,
                to = ?next,
                "ignoring task state transition"
            );
            return false;
        }
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TaskRecord {
        TaskRecord::new(TaskId::testing_default(), ScopeId::testing_default(), None)
    }

    #[test]
    fn normal_lifecycle() {
        let mut rec = record();
        assert!(rec.transition(TaskState::Ready));
        assert!(rec.transition(TaskState::Running));
        assert!(rec.transition(TaskState::Suspended));
        assert!(rec.transition(TaskState::Ready));
        assert!(rec.transition(TaskState::Running));
        assert!(rec.transition(TaskState::Done(Outcome::Ok(()))));
        assert!(rec.state.is_terminal());
    }

    #[test]
    fn done_is_absorbing() {
        let mut rec = record();
        assert!(rec.transition(TaskState::Done(Outcome::Ok(()))));
        assert!(!rec.transition(TaskState::Ready));
        assert!(!rec.transition(TaskState::Cancelling(CancelReason::timeout())));
        assert_eq!(rec.state, TaskState::Done(Outcome::Ok(())));
    }

    #[test]
    fn cancel_lands_from_any_live_state() {
        let mut created = record();
        assert!(created.transition(TaskState::Cancelling(CancelReason::timeout())));

        let mut ready = record();
        ready.transition(TaskState::Ready);
        assert!(ready.transition(TaskState::Cancelling(CancelReason::timeout())));

        let mut suspended = record();
        suspended.transition(TaskState::Ready);
        suspended.transition(TaskState::Running);
        suspended.transition(TaskState::Suspended);
        assert!(suspended.transition(TaskState::Cancelling(CancelReason::timeout())));
    }

    #[test]
    fn ready_does_not_follow_ready() {
        let mut rec = record();
        assert!(rec.transition(TaskState::Ready));
        assert!(!rec.transition(TaskState::Ready));
    }
}
