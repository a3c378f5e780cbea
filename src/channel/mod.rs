//! Bounded MPMC channel with blocking send, rendezvous mode, and
//! timeout-bounded receive.
//!
//! A [`Channel`] handle is cloneable and usable for both sending and
//! receiving. Capacity bounds the buffer strictly: a send on a full
//! channel suspends the sender until a receiver makes room. Capacity zero
//! is a rendezvous channel where every send waits for a receiver.
//!
//! Parked senders hold their value inside the channel's waiter queue, so
//! closing the channel can hand each unsent value back to its sender.

use crate::cx::Cx;
use crate::error::{Error, SendError, TryRecvError, TrySendError};
use crate::time::timeout;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(0);

/// Result of a timeout-bounded receive.
///
/// The deadline elapsing is a normal outcome, on the same footing as a
/// delivered value or a drained closed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedRecv<T> {
    /// A value arrived before the deadline.
    Value(T),
    /// The channel closed and drained before the deadline.
    Closed,
    /// The deadline elapsed with no value available.
    TimedOut,
}

impl<T> TimedRecv<T> {
    /// Returns the delivered value, if any.
    pub fn value(self) -> Option<T> {
        match self {
            Self::Value(value) => Some(value),
            Self::Closed | Self::TimedOut => None,
        }
    }

    /// Returns true if the deadline elapsed.
    #[must_use]
    pub const fn timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

struct SendWaiter<T> {
    id: u64,
    value: T,
    waker: Waker,
}

struct RecvWaiter<T> {
    id: u64,
    /// Filled by a sender handing its value directly to this receiver.
    slot: Option<T>,
    waker: Waker,
}

struct ChannelState<T> {
    capacity: usize,
    buffer: VecDeque<T>,
    closed: bool,
    send_waiters: VecDeque<SendWaiter<T>>,
    recv_waiters: VecDeque<RecvWaiter<T>>,
    /// Values taken from parked senders at close, keyed by waiter id,
    /// waiting to be handed back through the send future.
    failed_sends: HashMap<u64, T>,
    next_waiter: u64,
}

impl<T> ChannelState<T> {
    fn alloc_waiter(&mut self) -> u64 {
        let id = self.next_waiter;
        self.next_waiter += 1;
        id
    }

    /// Hands `value` to the longest-waiting receiver with an empty slot,
    /// or returns it if no receiver is parked.
    fn deliver_to_receiver(&mut self, value: T) -> Result<(), T> {
        match self.recv_waiters.iter_mut().find(|w| w.slot.is_none()) {
            Some(waiter) => {
                waiter.slot = Some(value);
                waiter.waker.wake_by_ref();
                Ok(())
            }
            None => Err(value),
        }
    }

    /// Promotes parked senders into freed buffer space, oldest first.
    fn refill_from_senders(&mut self) {
        while self.buffer.len() < self.capacity {
            match self.send_waiters.pop_front() {
                Some(waiter) => {
                    self.buffer.push_back(waiter.value);
                    waiter.waker.wake();
                }
                None => break,
            }
        }
    }

    /// Puts back a value that was handed to a receiver which went away
    /// before observing it.
    fn requeue_front(&mut self, value: T) {
        if let Err(value) = self.deliver_to_receiver(value) {
            // May transiently exceed capacity on a rendezvous channel;
            // the value was already detached from its sender.
            self.buffer.push_front(value);
        }
    }
}

/// A bounded channel handle, cloneable and usable from any task.
pub struct Channel<T> {
    inner: Arc<Mutex<ChannelState<T>>>,
    id: u64,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            id: self.id,
        }
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Channel").field(&self.id).finish()
    }
}

/// Creates a bounded channel. Capacity zero makes it a rendezvous
/// channel: every send waits for a matching receive.
#[must_use]
pub fn channel<T>(capacity: usize) -> Channel<T> {
    let id = NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(channel = id, capacity, "created channel");
    Channel {
        inner: Arc::new(Mutex::new(ChannelState {
            capacity,
            buffer: VecDeque::new(),
            closed: false,
            send_waiters: VecDeque::new(),
            recv_waiters: VecDeque::new(),
            failed_sends: HashMap::new(),
            next_waiter: 0,
        })),
        id,
    }
}

impl<T> Channel<T> {
    /// The buffer capacity this channel was created with.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Number of values currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    /// Returns true if no values are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().buffer.is_empty()
    }

    /// Returns true if the channel has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Closes the channel. Idempotent.
    ///
    /// Buffered values stay receivable; once drained, receives resolve to
    /// `None`. Parked senders fail with their value handed back. Parked
    /// receivers wake and observe the close.
    pub fn close(&self) {
        let mut st = self.inner.lock();
        if st.closed {
            return;
        }
        st.closed = true;
        tracing::trace!(channel = self.id, buffered = st.buffer.len(), "closing channel");
        while let Some(waiter) = st.send_waiters.pop_front() {
            st.failed_sends.insert(waiter.id, waiter.value);
            waiter.waker.wake();
        }
        for waiter in &st.recv_waiters {
            waiter.waker.wake_by_ref();
        }
    }

    /// Attempts to send without suspending.
    ///
    /// # Errors
    ///
    /// [`TrySendError::Full`] if no space or receiver is available,
    /// [`TrySendError::Closed`] if the channel is closed.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let mut st = self.inner.lock();
        if st.closed {
            return Err(TrySendError::Closed(value));
        }
        match st.deliver_to_receiver(value) {
            Ok(()) => Ok(()),
            Err(value) => {
                if st.buffer.len() < st.capacity {
                    st.buffer.push_back(value);
                    Ok(())
                } else {
                    Err(TrySendError::Full(value))
                }
            }
        }
    }

    /// Attempts to receive without suspending.
    ///
    /// # Errors
    ///
    /// [`TryRecvError::Empty`] if no value is available,
    /// [`TryRecvError::Closed`] once the channel is closed and drained.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut st = self.inner.lock();
        if let Some(value) = st.buffer.pop_front() {
            st.refill_from_senders();
            return Ok(value);
        }
        if let Some(waiter) = st.send_waiters.pop_front() {
            waiter.waker.wake();
            return Ok(waiter.value);
        }
        if st.closed {
            Err(TryRecvError::Closed)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    /// Sends a value, suspending while the channel is full.
    ///
    /// Fails with the value handed back if the channel closes or the
    /// sending task is cancelled while waiting.
    pub fn send(&self, cx: &Cx, value: T) -> SendFuture<T> {
        SendFuture {
            chan: Arc::clone(&self.inner),
            cx: cx.clone(),
            value: Some(value),
            waiter: None,
        }
    }

    /// Receives a value, suspending while the channel is empty.
    ///
    /// Resolves to `Ok(None)` once the channel is closed and drained.
    pub fn recv(&self, cx: &Cx) -> RecvFuture<T> {
        RecvFuture {
            chan: Arc::clone(&self.inner),
            cx: cx.clone(),
            waiter: None,
        }
    }

    /// Receives with a deadline.
    ///
    /// The deadline elapsing yields [`TimedRecv::TimedOut`] rather than an
    /// error; a value that is available at the deadline wins the race.
    ///
    /// # Errors
    ///
    /// Only cancellation of the receiving task fails this call.
    pub async fn recv_timeout(&self, cx: &Cx, duration: Duration) -> Result<TimedRecv<T>, Error> {
        match timeout(cx, duration, self.recv(cx)).await? {
            Some(Ok(Some(value))) => Ok(TimedRecv::Value(value)),
            Some(Ok(None)) => Ok(TimedRecv::Closed),
            Some(Err(err)) => Err(err),
            None => Ok(TimedRecv::TimedOut),
        }
    }
}

/// Future returned by [`Channel::send`].
pub struct SendFuture<T> {
    chan: Arc<Mutex<ChannelState<T>>>,
    cx: Cx,
    value: Option<T>,
    waiter: Option<u64>,
}

impl<T> Unpin for SendFuture<T> {}

impl<T> Future for SendFuture<T> {
    type Output = Result<(), SendError<T>>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut st = this.chan.lock();

        // Resolve a prior registration first: while parked, the value may
        // have been consumed or failed by a close.
        if let Some(id) = this.waiter {
            if let Some(value) = st.failed_sends.remove(&id) {
                this.waiter = None;
                return Poll::Ready(Err(SendError::Closed(value)));
            }
            if let Some(pos) = st.send_waiters.iter().position(|w| w.id == id) {
                if let Some(reason) = this.cx.active_cancel() {
                    if let Some(waiter) = st.send_waiters.remove(pos) {
                        this.waiter = None;
                        return Poll::Ready(Err(SendError::Cancelled(waiter.value, reason)));
                    }
                }
                if let Some(waiter) = st.send_waiters.get_mut(pos) {
                    waiter.waker = ctx.waker().clone();
                }
                return Poll::Pending;
            }
            // Gone from both tables: the value was delivered.
            this.waiter = None;
            return Poll::Ready(Ok(()));
        }

        let Some(value) = this.value.take() else {
            return Poll::Ready(Ok(()));
        };
        if let Some(reason) = this.cx.active_cancel() {
            return Poll::Ready(Err(SendError::Cancelled(value, reason)));
        }
        if st.closed {
            return Poll::Ready(Err(SendError::Closed(value)));
        }
        match st.deliver_to_receiver(value) {
            Ok(()) => Poll::Ready(Ok(())),
            Err(value) => {
                if st.buffer.len() < st.capacity {
                    st.buffer.push_back(value);
                    Poll::Ready(Ok(()))
                } else {
                    let id = st.alloc_waiter();
                    st.send_waiters.push_back(SendWaiter {
                        id,
                        value,
                        waker: ctx.waker().clone(),
                    });
                    this.waiter = Some(id);
                    Poll::Pending
                }
            }
        }
    }
}

impl<T> Drop for SendFuture<T> {
    fn drop(&mut self) {
        if let Some(id) = self.waiter.take() {
            let mut st = self.chan.lock();
            st.send_waiters.retain(|w| w.id != id);
            st.failed_sends.remove(&id);
        }
    }
}

/// Future returned by [`Channel::recv`].
pub struct RecvFuture<T> {
    chan: Arc<Mutex<ChannelState<T>>>,
    cx: Cx,
    waiter: Option<u64>,
}

impl<T> Unpin for RecvFuture<T> {}

impl<T> RecvFuture<T> {
    fn deregister(waiter: &mut Option<u64>, st: &mut ChannelState<T>) {
        if let Some(id) = waiter.take() {
            st.recv_waiters.retain(|w| w.id != id);
        }
    }
}

impl<T> Future for RecvFuture<T> {
    type Output = Result<Option<T>, Error>;

    fn poll(self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut st = this.chan.lock();

        // A sender may have filled our slot while we were parked.
        if let Some(id) = this.waiter {
            match st.recv_waiters.iter().position(|w| w.id == id) {
                Some(pos) if st.recv_waiters[pos].slot.is_some() => {
                    if let Some(waiter) = st.recv_waiters.remove(pos) {
                        this.waiter = None;
                        return Poll::Ready(Ok(waiter.slot));
                    }
                }
                Some(_) => {}
                None => this.waiter = None,
            }
        }

        if let Some(reason) = this.cx.active_cancel() {
            Self::deregister(&mut this.waiter, &mut st);
            return Poll::Ready(Err(Error::cancelled(reason)));
        }
        if let Some(value) = st.buffer.pop_front() {
            st.refill_from_senders();
            Self::deregister(&mut this.waiter, &mut st);
            return Poll::Ready(Ok(Some(value)));
        }
        // Rendezvous: take the value straight from a parked sender.
        if let Some(waiter) = st.send_waiters.pop_front() {
            waiter.waker.wake();
            Self::deregister(&mut this.waiter, &mut st);
            return Poll::Ready(Ok(Some(waiter.value)));
        }
        if st.closed {
            Self::deregister(&mut this.waiter, &mut st);
            return Poll::Ready(Ok(None));
        }

        match this.waiter {
            Some(id) => {
                if let Some(waiter) = st.recv_waiters.iter_mut().find(|w| w.id == id) {
                    waiter.waker = ctx.waker().clone();
                }
            }
            None => {
                let id = st.alloc_waiter();
                st.recv_waiters.push_back(RecvWaiter {
                    id,
                    slot: None,
                    waker: ctx.waker().clone(),
                });
                this.waiter = Some(id);
            }
        }
        Poll::Pending
    }
}

impl<T> Drop for RecvFuture<T> {
    fn drop(&mut self) {
        if let Some(id) = self.waiter.take() {
            let mut st = self.chan.lock();
            if let Some(pos) = st.recv_waiters.iter().position(|w| w.id == id) {
                if let Some(waiter) = st.recv_waiters.remove(pos) {
                    if let Some(value) = waiter.slot {
                        // The value was handed to us but never observed;
                        // give it to someone else.
                        st.requeue_front(value);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_respects_capacity() {
        let chan = channel::<u32>(2);
        assert_eq!(chan.capacity(), 2);
        chan.try_send(1).unwrap();
        chan.try_send(2).unwrap();
        match chan.try_send(3) {
            Err(TrySendError::Full(3)) => {}
            other => panic!("expected full, got {other:?}"),
        }
        assert_eq!(chan.len(), 2);
    }

    #[test]
    fn rendezvous_has_no_buffer() {
        let chan = channel::<u32>(0);
        match chan.try_send(1) {
            Err(TrySendError::Full(1)) => {}
            other => panic!("expected full, got {other:?}"),
        }
    }

    #[test]
    fn fifo_order() {
        let chan = channel::<u32>(4);
        for v in 0..4 {
            chan.try_send(v).unwrap();
        }
        for v in 0..4 {
            assert_eq!(chan.try_recv(), Ok(v));
        }
        assert_eq!(chan.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn close_drains_then_reports_closed() {
        let chan = channel::<u32>(4);
        chan.try_send(1).unwrap();
        chan.try_send(2).unwrap();
        chan.close();

        match chan.try_send(3) {
            Err(TrySendError::Closed(3)) => {}
            other => panic!("expected closed, got {other:?}"),
        }
        assert_eq!(chan.try_recv(), Ok(1));
        assert_eq!(chan.try_recv(), Ok(2));
        assert_eq!(chan.try_recv(), Err(TryRecvError::Closed));
    }

    #[test]
    fn close_is_idempotent() {
        let chan = channel::<u32>(1);
        chan.close();
        chan.close();
        assert!(chan.is_closed());
    }

    #[test]
    fn timed_recv_accessors() {
        assert_eq!(TimedRecv::Value(5).value(), Some(5));
        assert_eq!(TimedRecv::<u32>::Closed.value(), None);
        assert!(TimedRecv::<u32>::TimedOut.timed_out());
        assert!(!TimedRecv::Value(5).timed_out());
    }
}
