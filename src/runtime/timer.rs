//! Deadline-ordered timer queue.
//!
//! A binary min-heap of (deadline, sequence, waker) entries. The sequence
//! number breaks ties so timers registered earlier fire earlier, keeping
//! wakeup order deterministic at equal deadlines.

use crate::types::Time;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::task::Waker;

struct TimerEntry {
    deadline: Time,
    seq: u64,
    waker: Waker,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Min-heap of pending timers.
#[derive(Default)]
pub(crate) struct TimerHeap {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    next_seq: u64,
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a waker to fire at `deadline`.
    pub(crate) fn insert(&mut self, deadline: Time, waker: Waker) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(TimerEntry {
            deadline,
            seq,
            waker,
        }));
    }

    /// The earliest pending deadline, if any.
    pub(crate) fn next_deadline(&self) -> Option<Time> {
        self.heap.peek().map(|entry| entry.0.deadline)
    }

    /// Pops and wakes every timer with `deadline <= now`.
    ///
    /// Returns how many fired.
    pub(crate) fn fire_expired(&mut self, now: Time) -> usize {
        let mut fired = 0;
        while let Some(entry) = self.heap.peek() {
            if entry.0.deadline > now {
                break;
            }
            let entry = self.heap.pop().map(|r| r.0);
            if let Some(entry) = entry {
                entry.waker.wake();
                fired += 1;
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    fn counting() -> (Arc<CountingWaker>, Waker) {
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&counter));
        (counter, waker)
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut timers = TimerHeap::new();
        let (late, late_waker) = counting();
        let (early, early_waker) = counting();
        timers.insert(Time::from_millis(200), late_waker);
        timers.insert(Time::from_millis(100), early_waker);

        assert_eq!(timers.next_deadline(), Some(Time::from_millis(100)));
        assert_eq!(timers.fire_expired(Time::from_millis(100)), 1);
        assert_eq!(early.0.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(late.0.load(AtomicOrdering::SeqCst), 0);

        assert_eq!(timers.fire_expired(Time::from_millis(250)), 1);
        assert_eq!(late.0.load(AtomicOrdering::SeqCst), 1);
        assert!(timers.next_deadline().is_none());
    }

    #[test]
    fn equal_deadlines_fire_in_insert_order() {
        let mut timers = TimerHeap::new();
        let deadline = Time::from_millis(50);
        let (first, first_waker) = counting();
        let (second, second_waker) = counting();
        timers.insert(deadline, first_waker);
        timers.insert(deadline, second_waker);

        // Fire one tick worth; both share the deadline so both fire, but
        // the heap must surface the earlier registration first.
        assert_eq!(timers.next_deadline(), Some(deadline));
        assert_eq!(timers.fire_expired(deadline), 2);
        assert_eq!(first.0.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(second.0.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn nothing_fires_before_deadline() {
        let mut timers = TimerHeap::new();
        let (counter, waker) = counting();
        timers.insert(Time::from_millis(100), waker);
        assert_eq!(timers.fire_expired(Time::from_millis(99)), 0);
        assert_eq!(counter.0.load(AtomicOrdering::SeqCst), 0);
    }
}
