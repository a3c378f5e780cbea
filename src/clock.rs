//! Runtime clock sources.
//!
//! The runtime reads time through a single [`Clock`] so the same workload
//! can run against virtual time (deterministic, advanced by the scheduler
//! when idle) or a steady monotonic source (real delays).

use crate::types::Time;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Which time source the runtime uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockMode {
    /// Virtual time starting at zero; the runtime jumps it forward to the
    /// next pending deadline whenever no task is runnable.
    #[default]
    Virtual,
    /// Monotonic wall-clock time; idle periods are real sleeps.
    Steady,
}

pub(crate) enum Clock {
    Virtual(AtomicU64),
    Steady { base: Instant },
}

impl Clock {
    pub(crate) fn new(mode: ClockMode) -> Self {
        match mode {
            ClockMode::Virtual => Self::Virtual(AtomicU64::new(0)),
            ClockMode::Steady => Self::Steady {
                base: Instant::now(),
            },
        }
    }

    /// Current time since the runtime epoch.
    pub(crate) fn now(&self) -> Time {
        match self {
            Self::Virtual(nanos) => Time::from_nanos(nanos.load(Ordering::Acquire)),
            Self::Steady { base } => {
                let elapsed = base.elapsed();
                Time::from_nanos(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
            }
        }
    }

    /// Advances to `target`. Virtual time jumps; steady time sleeps the
    /// remaining real duration. Never moves backwards.
    pub(crate) fn advance_to(&self, target: Time) {
        match self {
            Self::Virtual(nanos) => {
                nanos.fetch_max(target.as_nanos(), Ordering::AcqRel);
            }
            Self::Steady { .. } => {
                let now = self.now();
                if target > now {
                    std::thread::sleep(target.duration_since(now));
                }
            }
        }
    }
}
