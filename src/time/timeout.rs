//! Deadline-bounding combinator.

use crate::cx::Cx;
use crate::error::Error;
use crate::time::Sleep;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Bounds `inner` by a deadline relative to now.
///
/// Resolves to `Ok(Some(output))` if `inner` finishes in time and
/// `Ok(None)` if the deadline passes first; the deadline elapsing is a
/// normal outcome, not an error. Cancellation of the waiting task
/// surfaces as an error.
///
/// The inner future is polled before the deadline is checked, so a result
/// that is ready at the deadline wins over the timeout.
pub fn timeout<F: Future>(cx: &Cx, duration: Duration, inner: F) -> Timeout<F> {
    Timeout {
        inner: Box::pin(inner),
        sleep: cx.sleep(duration),
    }
}

/// Future returned by [`timeout`].
pub struct Timeout<F> {
    inner: Pin<Box<F>>,
    sleep: Sleep,
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<Option<F::Output>, Error>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Poll::Ready(output) = this.inner.as_mut().poll(ctx) {
            return Poll::Ready(Ok(Some(output)));
        }
        match Pin::new(&mut this.sleep).poll(ctx) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(None)),
            Poll::Ready(Err(err)) => Poll::Ready(Err(err)),
            Poll::Pending => Poll::Pending,
        }
    }
}
