//! A minimal structured-concurrency runtime.
//!
//! Tasks are cooperatively scheduled futures owned by a tree of scopes.
//! A scope does not complete until every task in it is terminal, a task
//! failure cancels its siblings, and cancelling a scope cancels its whole
//! subtree. Cancellation is cooperative: it is observed at suspension
//! points (sleeps, channel operations, joins, yields) and flows through
//! task bodies as an error propagated with `?`.
//!
//! Tasks communicate over bounded [`Channel`]s with blocking sends, a
//! rendezvous mode at capacity zero, and timeout-bounded receives where
//! the deadline elapsing is a normal outcome. Fixed-period [`Ticker`]s
//! deliver ticks on a schedule grid, dropping rather than piling up ticks
//! when the consumer lags.
//!
//! By default the runtime uses a virtual clock: delays complete by
//! jumping time to the next deadline, so timing-heavy workloads run
//! instantly and deterministically. [`ClockMode::Steady`] switches to
//! real sleeps.
//!
//! ```
//! use weft::Runtime;
//!
//! let outcome = Runtime::new().run(|cx| async move {
//!     let chan = weft::channel::<u32>(4);
//!     let tx = chan.clone();
//!     let producer = cx.scope().spawn(move |cx| async move {
//!         for v in 0..4 {
//!             tx.send(&cx, v).await?;
//!         }
//!         tx.close();
//!         Ok(())
//!     })?;
//!
//!     let mut sum = 0;
//!     while let Some(v) = chan.recv(&cx).await? {
//!         sum += v;
//!     }
//!     producer.join(&cx).await?;
//!     Ok(sum)
//! });
//! assert_eq!(outcome.ok(), Some(6));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod channel;
pub mod clock;
pub mod cx;
pub mod error;
mod record;
pub mod runtime;
pub mod ticker;
pub mod time;
pub mod types;
pub mod util;

pub use channel::{channel, Channel, RecvFuture, SendFuture, TimedRecv};
pub use clock::ClockMode;
pub use cx::{Cx, Join, JoinHandle, Scope, Shield, YieldNow};
pub use error::{Error, ErrorKind, Result, SendError, TryRecvError, TrySendError};
pub use runtime::{Runtime, RuntimeConfig};
pub use ticker::{Tick, Ticker};
pub use time::{timeout, Sleep, Timeout};
pub use types::{CancelKind, CancelReason, Outcome, ScopeId, TaskId, Time};
