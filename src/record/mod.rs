//! Runtime bookkeeping: task and scope records.

mod scope;
mod task;

pub(crate) use scope::{ScopeRecord, ScopeState};
pub(crate) use task::{TaskRecord, TaskState};
