use crate::cancel::Cancellation;
use crate::error::{Result, WiringError};
use crossbeam::utils::{Backoff, CachePadded};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

/// Default cap on a single hold-off sleep
pub const DEFAULT_MAX_SLEEP: Duration = Duration::from_micros(1000);

/// Spin-then-sleep waiting strategy for threads held back by a full resource.
///
/// Starts with crossbeam's exponential spinning and, once that is exhausted,
/// sleeps with exponentially growing intervals capped at `max_sleep`.
pub struct HoldOff {
    backoff: Backoff,
    sleeps: u32,
    max_sleep: Duration,
}

impl HoldOff {
    /// A fresh hold-off whose sleeps never exceed `max_sleep`
    pub fn new(max_sleep: Duration) -> Self {
        Self {
            backoff: Backoff::new(),
            sleeps: 0,
            max_sleep,
        }
    }

    /// Wait one step
    pub fn wait(&mut self) {
        if !self.backoff.is_completed() {
            self.backoff.snooze();
            return;
        }
        let micros = (1u64 << self.sleeps.min(10)).min(self.max_sleep.as_micros() as u64);
        self.sleeps = self.sleeps.saturating_add(1);
        thread::sleep(Duration::from_micros(micros.max(1)));
    }
}

impl Default for HoldOff {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SLEEP)
    }
}

/// Counts tasks that entered a scheduler and have not yet finished.
///
/// With a capacity, `on_ramp` holds the caller back while the count is at
/// capacity. `forced_on_ramp` always succeeds and is used by injecting edges.
/// Without a capacity the counter only observes.
#[derive(Debug)]
pub struct BackpressureCounter {
    count: CachePadded<AtomicU64>,
    capacity: Option<u64>,
    max_sleep: Duration,
}

impl BackpressureCounter {
    /// Create a counter with no capacity
    pub fn unbounded() -> Self {
        Self::with_capacity(None, DEFAULT_MAX_SLEEP)
    }

    /// Create a counter holding callers back at `capacity`, if any
    pub fn with_capacity(capacity: Option<u64>, max_sleep: Duration) -> Self {
        Self {
            count: CachePadded::new(AtomicU64::new(0)),
            capacity,
            max_sleep,
        }
    }

    /// `None` when unbounded
    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    /// Enter, waiting for room if the counter is full.
    /// Returns true if the caller had to wait.
    pub fn on_ramp(&self) -> bool {
        if self.attempt_on_ramp() {
            return false;
        }
        let mut hold_off = HoldOff::new(self.max_sleep);
        loop {
            hold_off.wait();
            if self.attempt_on_ramp() {
                return true;
            }
        }
    }

    /// Enter only if there is room right now
    pub fn attempt_on_ramp(&self) -> bool {
        match self.capacity {
            None => {
                self.count.fetch_add(1, Ordering::AcqRel);
                true
            }
            Some(capacity) => self
                .count
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                    (count < capacity).then_some(count + 1)
                })
                .is_ok(),
        }
    }

    /// Enter regardless of capacity
    pub fn forced_on_ramp(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Leave. Must pair with exactly one successful on-ramp.
    pub fn off_ramp(&self) {
        let previous = self.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "off_ramp without matching on_ramp");
    }

    /// Tasks currently between on-ramp and off-ramp
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Block until every entered task has left
    pub fn wait_until_empty(&self, cancel: &Cancellation) -> Result<()> {
        let mut hold_off = HoldOff::new(self.max_sleep);
        while self.count() > 0 {
            if cancel.is_cancelled() {
                return Err(WiringError::Interrupted);
            }
            hold_off.wait();
        }
        Ok(())
    }
}

impl Default for BackpressureCounter {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_attempt_respects_capacity() {
        let counter = BackpressureCounter::with_capacity(Some(2), DEFAULT_MAX_SLEEP);
        assert!(counter.attempt_on_ramp());
        assert!(counter.attempt_on_ramp());
        assert!(!counter.attempt_on_ramp());
        counter.off_ramp();
        assert!(counter.attempt_on_ramp());
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_forced_ignores_capacity() {
        let counter = BackpressureCounter::with_capacity(Some(1), DEFAULT_MAX_SLEEP);
        counter.forced_on_ramp();
        counter.forced_on_ramp();
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_unbounded_never_refuses() {
        let counter = BackpressureCounter::unbounded();
        for _ in 0..1000 {
            assert!(counter.attempt_on_ramp());
        }
        assert_eq!(counter.count(), 1000);
    }

    #[test]
    fn test_on_ramp_waits_for_room() {
        let counter = Arc::new(BackpressureCounter::with_capacity(Some(1), DEFAULT_MAX_SLEEP));
        assert!(!counter.on_ramp());

        let releaser = Arc::clone(&counter);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            releaser.off_ramp();
        });

        let start = Instant::now();
        assert!(counter.on_ramp());
        assert!(start.elapsed() >= Duration::from_millis(20));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_until_empty_interrupted() {
        let counter = BackpressureCounter::unbounded();
        counter.forced_on_ramp();
        let cancel = Cancellation::new();
        cancel.cancel();
        assert_eq!(counter.wait_until_empty(&cancel), Err(WiringError::Interrupted));
    }
}
