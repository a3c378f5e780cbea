//! Terminal outcome of a task.

use super::CancelReason;
use crate::error::Error;
use core::fmt;

/// The terminal result of a task: completed, failed, or cancelled.
///
/// Cancellation is not an error in disguise; it is its own terminal state
/// carrying the reason the task was asked to stop.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The task ran to completion.
    Ok(T),
    /// The task body returned a failure.
    Failed(Error),
    /// The task observed cancellation at a suspension point.
    Cancelled(CancelReason),
}

impl<T> Outcome<T> {
    /// Returns true for `Ok`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns true for `Failed`.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns true for `Cancelled`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns the success value, if any.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Ok(value) => Some(value),
            Self::Failed(_) | Self::Cancelled(_) => None,
        }
    }

    /// Maps the success value, preserving failure and cancellation.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Ok(value) => Outcome::Ok(f(value)),
            Self::Failed(error) => Outcome::Failed(error),
            Self::Cancelled(reason) => Outcome::Cancelled(reason),
        }
    }

    /// Discards the success value.
    pub fn erased(self) -> Outcome<()> {
        self.map(|_| ())
    }

    /// Converts into a `Result`, folding cancellation into a
    /// cancelled-kind [`Error`].
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Failed(error) => Err(error),
            Self::Cancelled(reason) => Err(Error::cancelled(reason)),
        }
    }
}

impl<T> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(_) => write!(f, "ok"),
            Self::Failed(error) => write!(f, "failed: {error}"),
            Self::Cancelled(reason) => write!(f, "cancelled: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::CancelKind;

    #[test]
    fn predicates() {
        assert!(Outcome::Ok(1).is_ok());
        assert!(Outcome::<i32>::Failed(Error::task_failed("boom")).is_failed());
        assert!(Outcome::<i32>::Cancelled(CancelReason::timeout()).is_cancelled());
    }

    #[test]
    fn into_result_preserves_failure() {
        let out: Outcome<()> = Outcome::Failed(Error::task_failed("boom"));
        let err = out.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TaskFailed);
    }

    #[test]
    fn into_result_wraps_cancellation() {
        let out: Outcome<()> = Outcome::Cancelled(CancelReason::sibling_failed());
        let err = out.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(
            err.cancel_reason().map(CancelReason::kind),
            Some(CancelKind::SiblingFailed)
        );
    }

    #[test]
    fn map_and_erase() {
        let out = Outcome::Ok(21).map(|v| v * 2);
        assert_eq!(out.ok(), Some(42));
        assert!(Outcome::Ok(42).erased().is_ok());
    }
}
