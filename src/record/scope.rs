//! Scope bookkeeping records.

use crate::error::Error;
use crate::types::{CancelReason, ScopeId, TaskId};

/// Lifecycle state of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeState {
    /// Accepting spawns; tasks may still be running.
    Active,
    /// Cancel requested; spawns are refused, existing tasks drain.
    Cancelling,
    /// Every owned task is terminal and every child scope is completed.
    Completed,
}

/// Bookkeeping for one scope: its place in the tree, the tasks it owns,
/// and the first failure observed among them.
#[derive(Debug)]
pub(crate) struct ScopeRecord {
    pub(crate) id: ScopeId,
    pub(crate) parent: Option<ScopeId>,
    pub(crate) state: ScopeState,
    pub(crate) children: Vec<ScopeId>,
    pub(crate) tasks: Vec<TaskId>,
    pub(crate) cancel_reason: Option<CancelReason>,
    /// First failure among owned tasks. Delivered exactly once when the
    /// scope completes.
    pub(crate) first_failure: Option<Error>,
    pub(crate) failure_delivered: bool,
}

impl ScopeRecord {
    pub(crate) fn new(id: ScopeId, parent: Option<ScopeId>) -> Self {
        Self {
            id,
            parent,
            state: ScopeState::Active,
            children: Vec::new(),
            tasks: Vec::new(),
            cancel_reason: None,
            first_failure: None,
            failure_delivered: false,
        }
    }

    /// Whether the scope currently accepts new spawns.
    pub(crate) fn accepts_spawns(&self) -> bool {
        self.state == ScopeState::Active
    }

    /// Records a cancel request, strengthening any existing reason.
    ///
    /// Returns true if this was the first request or it strengthened the
    /// recorded reason. Completed scopes ignore cancel requests.
    pub(crate) fn request_cancel(&mut self, reason: &CancelReason) -> bool {
        if self.state == ScopeState::Completed {
            return false;
        }
        let changed = match &mut self.cancel_reason {
            Some(existing) => existing.strengthen(reason),
            slot @ None => {
                *slot = Some(reason.clone());
                true
            }
        };
        if self.state == ScopeState::Active {
            self.state = ScopeState::Cancelling;
            return true;
        }
        changed
    }

    /// Records the first failure among owned tasks; later failures are
    /// dropped.
    ///
    /// Returns true if this failure was recorded.
    pub(crate) fn record_failure(&mut self, error: Error) -> bool {
        if self.first_failure.is_some() {
            tracing::debug!(scope = %self.id, %error, "dropping secondary failure");
            return false;
        }
        self.first_failure = Some(error);
        true
    }

    /// Takes the failure for delivery, at most once.
    pub(crate) fn take_failure(&mut self) -> Option<Error> {
        if self.failure_delivered {
            return None;
        }
        let failure = self.first_failure.clone()?;
        self.failure_delivered = true;
        Some(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CancelKind;

    fn record() -> ScopeRecord {
        ScopeRecord::new(ScopeId::testing_default(), None)
    }

    #[test]
    fn active_accepts_spawns_until_cancelled() {
        let mut rec = record();
        assert!(rec.accepts_spawns());
        assert!(rec.request_cancel(&CancelReason::user("stop")));
        assert!(!rec.accepts_spawns());
        assert_eq!(rec.state, ScopeState::Cancelling);
    }

    #[test]
    fn repeated_cancel_strengthens_reason() {
        let mut rec = record();
        rec.request_cancel(&CancelReason::user("stop"));
        assert!(rec.request_cancel(&CancelReason::shutdown()));
        assert_eq!(
            rec.cancel_reason.as_ref().map(CancelReason::kind),
            Some(CancelKind::Shutdown)
        );

        // Weaker repeat changes nothing.
        assert!(!rec.request_cancel(&CancelReason::timeout()));
    }

    #[test]
    fn completed_scope_ignores_cancel() {
        let mut rec = record();
        rec.state = ScopeState::Completed;
        assert!(!rec.request_cancel(&CancelReason::shutdown()));
        assert!(rec.cancel_reason.is_none());
    }

    #[test]
    fn only_first_failure_sticks() {
        let mut rec = record();
        assert!(rec.record_failure(Error::task_failed("first")));
        assert!(!rec.record_failure(Error::task_failed("second")));
        assert_eq!(rec.first_failure.as_ref().unwrap().message(), Some("first"));
    }

    #[test]
    fn failure_delivered_once() {
        let mut rec = record();
        rec.record_failure(Error::task_failed("boom"));
        assert!(rec.take_failure().is_some());
        assert!(rec.take_failure().is_none());
    }
}
