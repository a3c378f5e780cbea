//! Error types for the runtime.
//!
//! Errors are explicit and typed. Cancellation observed at a suspension
//! point surfaces as an [`Error`] of kind [`ErrorKind::Cancelled`] carrying
//! the [`CancelReason`], so task bodies can propagate it with `?` and the
//! runtime can still tell cancellation apart from failure.
//!
//! A timed-out bounded receive is a normal outcome, not an error; see
//! [`crate::channel::TimedRecv`].

use crate::types::{CancelReason, TaskId};
use core::fmt;

/// Convenience alias for results carrying [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operation attempted on a closed channel.
    ChannelClosed,
    /// Spawn attempted on a cancelling or completed scope.
    ScopeClosed,
    /// The task observed cancellation at a suspension point.
    Cancelled,
    /// A task body returned a failure.
    TaskFailed,
    /// The runtime stopped with tasks parked and no way to wake them.
    Stalled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelClosed => write!(f, "channel closed"),
            Self::ScopeClosed => write!(f, "scope closed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::TaskFailed => write!(f, "task failed"),
            Self::Stalled => write!(f, "runtime stalled"),
        }
    }
}

/// A runtime error: kind, optional message, optional origin task, and the
/// cancellation reason when the kind is [`ErrorKind::Cancelled`].
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    origin: Option<TaskId>,
    reason: Option<CancelReason>,
}

impl Error {
    /// Creates an error with the given kind and no context.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            origin: None,
            reason: None,
        }
    }

    /// Creates a channel-closed error.
    #[must_use]
    pub const fn channel_closed() -> Self {
        Self::new(ErrorKind::ChannelClosed)
    }

    /// Creates a scope-closed error.
    #[must_use]
    pub const fn scope_closed() -> Self {
        Self::new(ErrorKind::ScopeClosed)
    }

    /// Creates a cancelled error carrying its reason.
    #[must_use]
    pub fn cancelled(reason: CancelReason) -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            message: None,
            origin: None,
            reason: Some(reason),
        }
    }

    /// Creates a task-failure error with a message.
    #[must_use]
    pub fn task_failed(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::TaskFailed,
            message: Some(message.into()),
            origin: None,
            reason: None,
        }
    }

    /// Creates a stalled-runtime error naming the parked task count.
    #[must_use]
    pub fn stalled(parked: usize) -> Self {
        Self {
            kind: ErrorKind::Stalled,
            message: Some(format!("{parked} tasks parked with no pending wakeups")),
            origin: None,
            reason: None,
        }
    }

    /// Replaces the attached message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attaches the task the error originated from.
    #[must_use]
    pub fn with_origin(mut self, task: TaskId) -> Self {
        self.origin = Some(task);
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Returns the cancellation reason, if this is a cancelled error.
    #[must_use]
    pub const fn cancel_reason(&self) -> Option<&CancelReason> {
        self.reason.as_ref()
    }

    /// Returns the originating task, if recorded.
    #[must_use]
    pub const fn origin(&self) -> Option<TaskId> {
        self.origin
    }

    /// Returns the attached message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(origin) = self.origin {
            write!(f, " [origin {origin}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// Error returned from a channel send, giving the value back to the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SendError<T> {
    /// The channel was closed before or while sending.
    #[error("send on closed channel")]
    Closed(T),
    /// The sending task observed cancellation while waiting for capacity.
    #[error("send cancelled: {1}")]
    Cancelled(T, CancelReason),
}

impl<T> SendError<T> {
    /// Recovers the value that could not be sent.
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(value) | Self::Cancelled(value, _) => value,
        }
    }
}

impl<T> From<SendError<T>> for Error {
    fn from(err: SendError<T>) -> Self {
        match err {
            SendError::Closed(_) => Self::channel_closed(),
            SendError::Cancelled(_, reason) => Self::cancelled(reason),
        }
    }
}

/// Error returned from a non-blocking send attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrySendError<T> {
    /// The channel buffer is full (or no receiver is waiting, for
    /// rendezvous channels).
    #[error("channel full")]
    Full(T),
    /// The channel is closed.
    #[error("send on closed channel")]
    Closed(T),
}

/// Error returned from a non-blocking receive attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryRecvError {
    /// No value is currently available.
    #[error("channel empty")]
    Empty,
    /// The channel is closed and drained.
    #[error("channel closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CancelKind;
    use crate::util::ArenaIndex;

    #[test]
    fn display_includes_context() {
        let err = Error::task_failed("division by zero")
            .with_origin(TaskId::from_arena(ArenaIndex::new(3, 0)));
        let rendered = err.to_string();
        assert!(rendered.contains("task failed"));
        assert!(rendered.contains("division by zero"));
        assert!(rendered.contains("T3"));
    }

    #[test]
    fn cancelled_carries_reason() {
        let err = Error::cancelled(CancelReason::timeout());
        assert!(err.is_cancelled());
        assert_eq!(
            err.cancel_reason().map(|r| r.kind()),
            Some(CancelKind::Timeout)
        );
    }

    #[test]
    fn send_error_returns_value() {
        let err = SendError::Closed(41);
        assert_eq!(err.into_inner(), 41);
    }

    #[test]
    fn send_error_converts_to_error() {
        let err: Error = SendError::Closed(()).into();
        assert_eq!(err.kind(), ErrorKind::ChannelClosed);

        let err: Error = SendError::Cancelled((), CancelReason::shutdown()).into();
        assert!(err.is_cancelled());
    }
}
