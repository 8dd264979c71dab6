use crate::cancel::{Cancellation, CANCEL_POLL};
use crate::error::{Result, WiringError};
use parking_lot::{Condvar, Mutex};
use std::num::NonZeroU64;
use std::time::{Duration, Instant};
use tracing::error;

/// A counter that only goes up, with threads able to wait for a target value.
///
/// Every change wakes all waiters, and each re-checks its own target.
#[derive(Debug, Default)]
pub struct MonotonicWaitCounter {
    value: Mutex<u64>,
    changed: Condvar,
}

impl MonotonicWaitCounter {
    /// A counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// A counter starting at `value`
    pub fn starting_at(value: u64) -> Self {
        Self {
            value: Mutex::new(value),
            changed: Condvar::new(),
        }
    }

    /// The current value
    pub fn get(&self) -> u64 {
        *self.value.lock()
    }

    /// Raise by one and return the new value
    pub fn increment(&self) -> u64 {
        self.add(NonZeroU64::MIN)
    }

    /// Raise by `delta` and return the new value
    pub fn add(&self, delta: NonZeroU64) -> u64 {
        let mut value = self.value.lock();
        *value = value.saturating_add(delta.get());
        self.changed.notify_all();
        *value
    }

    /// Raise to `target`. Setting the current value again is a no-op;
    /// anything lower is rejected and leaves the counter untouched.
    pub fn set(&self, target: u64) -> Result<()> {
        let mut value = self.value.lock();
        if target < *value {
            error!(current = *value, requested = target, "monotonic counter asked to decrease");
            return Err(WiringError::CounterRegression {
                current: *value,
                requested: target,
            });
        }
        if target > *value {
            *value = target;
            self.changed.notify_all();
        }
        Ok(())
    }

    /// Block until the counter is at least `target`
    pub fn await_value(&self, target: u64, cancel: &Cancellation) -> Result<()> {
        let mut value = self.value.lock();
        while *value < target {
            if cancel.is_cancelled() {
                return Err(WiringError::Interrupted);
            }
            self.changed.wait_for(&mut value, CANCEL_POLL);
        }
        Ok(())
    }

    /// Block until the counter is at least `target` or `timeout` passes.
    /// Returns whether the target was reached.
    pub fn await_value_timeout(&self, target: u64, timeout: Duration) -> bool {
        let mut value = self.value.lock();
        if *value >= target {
            return true;
        }
        // a timeout past the end of time waits without a deadline
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while *value < target {
                self.changed.wait(&mut value);
            }
            return true;
        };
        while *value < target {
            if self.changed.wait_until(&mut value, deadline).timed_out() {
                return *value >= target;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_set_backwards_rejected() {
        let counter = MonotonicWaitCounter::starting_at(10);
        assert_eq!(
            counter.set(3),
            Err(WiringError::CounterRegression {
                current: 10,
                requested: 3
            })
        );
        assert_eq!(counter.get(), 10);
        assert!(counter.set(10).is_ok());
        assert!(counter.set(12).is_ok());
        assert_eq!(counter.get(), 12);
    }

    #[test]
    fn test_await_already_satisfied() {
        let counter = MonotonicWaitCounter::starting_at(5);
        counter.await_value(5, &Cancellation::never()).unwrap();
        assert!(counter.await_value_timeout(1, Duration::ZERO));
    }

    #[test]
    fn test_await_unbounded_timeout() {
        let counter = Arc::new(MonotonicWaitCounter::starting_at(5));
        assert!(counter.await_value_timeout(1, Duration::MAX));

        let raiser = Arc::clone(&counter);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            raiser.set(8).unwrap();
        });
        assert!(counter.await_value_timeout(8, Duration::MAX));
        handle.join().unwrap();
    }

    #[test]
    fn test_await_timeout_expires() {
        let counter = MonotonicWaitCounter::new();
        assert!(!counter.await_value_timeout(1, Duration::from_millis(20)));
    }

    #[test]
    fn test_many_waiters_released() {
        let counter = Arc::new(MonotonicWaitCounter::new());
        let handles: Vec<_> = (1..=5u64)
            .map(|target| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || counter.await_value(target, &Cancellation::never()))
            })
            .collect();

        for _ in 0..5 {
            thread::sleep(Duration::from_millis(5));
            counter.increment();
        }
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
    }

    #[test]
    fn test_await_cancelled() {
        let counter = MonotonicWaitCounter::new();
        let cancel = Cancellation::new();
        cancel.cancel();
        assert_eq!(counter.await_value(1, &cancel), Err(WiringError::Interrupted));
    }
}
