//! Delays and deadline-bounded waits.

mod sleep;
mod timeout;

pub use sleep::Sleep;
pub use timeout::{timeout, Timeout};
