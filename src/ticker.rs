//! Fixed-period tick source.
//!
//! A ticker is a driver task feeding a capacity-one channel. Ticks carry
//! their scheduled time. When the consumer lags, at most one tick stays
//! buffered and the schedule skips forward past missed periods, so a slow
//! consumer sees one late tick and then resumes the fixed grid.

use crate::channel::{channel, Channel, TimedRecv};
use crate::cx::{Cx, JoinHandle, Scope};
use crate::error::{Error, TrySendError};
use crate::types::{CancelReason, Time};
use std::time::Duration;

/// A single tick, carrying the instant it was scheduled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// The grid point this tick belongs to, not the delivery time.
    pub scheduled: Time,
}

/// A fixed-period tick source bound to a scope.
///
/// Dropping the handle does not stop the ticker; call [`Ticker::cancel`]
/// or cancel the owning scope.
pub struct Ticker {
    chan: Channel<Tick>,
    handle: JoinHandle<()>,
}

impl Scope {
    /// Starts a ticker in this scope with the given period and initial
    /// delay. The first tick is scheduled at now + `initial_delay`, the
    /// rest every `period` after it.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::ErrorKind::ScopeClosed`] if this scope no
    /// longer accepts spawns.
    pub fn ticker(&self, period: Duration, initial_delay: Duration) -> Result<Ticker, Error> {
        assert!(!period.is_zero(), "ticker period must be positive");
        let chan = channel::<Tick>(1);
        let feed = chan.clone();
        let handle = self.spawn_named("ticker", move |cx| async move {
            let result = run_ticker(&cx, &feed, period, initial_delay).await;
            feed.close();
            result
        })?;
        Ok(Ticker { chan, handle })
    }
}

async fn run_ticker(
    cx: &Cx,
    feed: &Channel<Tick>,
    period: Duration,
    initial_delay: Duration,
) -> Result<(), Error> {
    let mut scheduled = cx.now() + initial_delay;
    loop {
        cx.sleep_until(scheduled).await?;
        // Drop-when-full: a lagging consumer keeps at most one tick.
        match feed.try_send(Tick { scheduled }) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => return Ok(()),
        }
        scheduled += period;
        // Skip grid points that already passed while the consumer lagged.
        let now = cx.now();
        while scheduled <= now {
            scheduled += period;
        }
    }
}

impl Ticker {
    /// Receives the next tick, or `None` once the ticker has stopped.
    ///
    /// # Errors
    ///
    /// Fails if the receiving task is cancelled while waiting.
    pub async fn recv(&self, cx: &Cx) -> Result<Option<Tick>, Error> {
        self.chan.recv(cx).await
    }

    /// Receives the next tick with a deadline; the deadline elapsing is a
    /// normal outcome.
    ///
    /// # Errors
    ///
    /// Fails if the receiving task is cancelled while waiting.
    pub async fn recv_timeout(
        &self,
        cx: &Cx,
        duration: Duration,
    ) -> Result<TimedRecv<Tick>, Error> {
        self.chan.recv_timeout(cx, duration).await
    }

    /// Stops the ticker. Pending receivers observe the close once any
    /// buffered tick is drained.
    pub fn cancel(&self) {
        self.handle.cancel(CancelReason::user("ticker cancelled"));
    }

    /// The driving task's id.
    #[must_use]
    pub fn task(&self) -> crate::types::TaskId {
        self.handle.id()
    }
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Ticker").field(&self.handle.id()).finish()
    }
}
