//! Core types: identifiers, time, cancellation, and task outcomes.

mod cancel;
mod id;
mod outcome;

pub use cancel::{CancelKind, CancelReason};
pub use id::{ScopeId, TaskId, Time};
pub use outcome::Outcome;
