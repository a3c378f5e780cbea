//! Cancel-aware delay.

use crate::cx::Cx;
use crate::error::Error;
use crate::types::Time;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future returned by [`Cx::sleep`] and [`Cx::sleep_until`].
///
/// Resolves to `Ok(())` once the deadline passes, or to a cancelled-kind
/// error if the task is asked to stop first. Inside a shield the deadline
/// is honored even when cancellation is pending.
pub struct Sleep {
    cx: Cx,
    deadline: Time,
    registered: bool,
}

impl Sleep {
    pub(crate) fn new(cx: Cx, deadline: Time) -> Self {
        Self {
            cx,
            deadline,
            registered: false,
        }
    }

    /// The instant this sleep resolves.
    #[must_use]
    pub fn deadline(&self) -> Time {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = Result<(), Error>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(reason) = this.cx.active_cancel() {
            return Poll::Ready(Err(Error::cancelled(reason)));
        }
        let Some(shared) = this.cx.shared() else {
            return Poll::Ready(Err(Error::cancelled(
                crate::types::CancelReason::shutdown(),
            )));
        };
        if shared.clock.now() >= this.deadline {
            return Poll::Ready(Ok(()));
        }
        // One registration per sleep; the timer entry outlives spurious
        // wakeups and fires exactly once at the deadline.
        if !this.registered {
            shared
                .timers
                .lock()
                .insert(this.deadline, ctx.waker().clone());
            this.registered = true;
        }
        Poll::Pending
    }
}
