//! Admission control for concurrent gossip sync sessions.

use crate::backpressure::HoldOff;
use crate::cancel::Cancellation;
use crate::error::{Result, WiringError};
use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

const COUNT_BITS: u32 = 32;
const COUNT_MASK: u64 = u32::MAX as u64;

/// Free permits in the low half, permits parked by a drain in the high half.
/// One word, so a release always sees both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GateState {
    available: u64,
    collected: u64,
}

impl GateState {
    fn unpack(word: u64) -> Self {
        Self {
            available: word & COUNT_MASK,
            collected: word >> COUNT_BITS,
        }
    }

    fn pack(self) -> u64 {
        (self.collected << COUNT_BITS) | self.available
    }
}

/// A fixed pool of permits handed out without blocking.
///
/// Acquisition is an atomic decrement; there is no fairness among
/// contending callers.
#[derive(Debug)]
pub struct SyncPermitGate {
    capacity: u64,
    state: CachePadded<AtomicU64>,
}

impl SyncPermitGate {
    /// A gate with `capacity` permits, all free. Capacities beyond
    /// `u32::MAX` are capped there.
    pub fn new(capacity: usize) -> Self {
        let capacity = (capacity as u64).min(COUNT_MASK);
        Self {
            capacity,
            state: CachePadded::new(AtomicU64::new(capacity)),
        }
    }

    /// Take a permit if one is free. Never blocks.
    pub fn try_acquire(&self) -> bool {
        self.update(|mut state| {
            state.available = state.available.checked_sub(1)?;
            Some(state)
        })
        .is_ok()
    }

    /// Return a permit taken with [`try_acquire`](Self::try_acquire)
    pub fn release(&self) -> Result<()> {
        let capacity = self.capacity;
        self.update(|mut state| {
            (state.available + state.collected < capacity).then(|| {
                state.available += 1;
                state
            })
        })
        .map(|_| ())
        .map_err(|_| {
            error!(capacity, "sync permit released more times than acquired");
            WiringError::PermitOverRelease {
                capacity: self.capacity(),
            }
        })
    }

    /// Permits free to acquire right now
    pub fn available(&self) -> usize {
        self.load().available as usize
    }

    /// Number of permits currently out with sessions
    pub fn held(&self) -> usize {
        let state = self.load();
        (self.capacity - state.available - state.collected) as usize
    }

    /// Total number of permits the gate manages
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Block until every outstanding permit has come back, then leave all
    /// permits available again.
    ///
    /// Permits are collected as they are released, so new sessions cannot
    /// start while the gate drains. Collected permits still count against
    /// over-release. On cancellation they are handed back before returning.
    pub fn wait_until_all_released(&self, cancel: &Cancellation) -> Result<()> {
        debug!(outstanding = self.held(), "draining sync permits");
        let mut collected = 0;
        let mut hold_off = HoldOff::default();
        while collected < self.capacity {
            if self.collect_one() {
                collected += 1;
                continue;
            }
            if cancel.is_cancelled() {
                self.give_back(collected);
                return Err(WiringError::Interrupted);
            }
            hold_off.wait();
        }
        self.give_back(collected);
        debug!("all sync permits released");
        Ok(())
    }

    fn collect_one(&self) -> bool {
        self.update(|mut state| {
            state.available = state.available.checked_sub(1)?;
            state.collected += 1;
            Some(state)
        })
        .is_ok()
    }

    fn give_back(&self, permits: u64) {
        let _ = self.update(|mut state| {
            state.collected -= permits;
            state.available += permits;
            Some(state)
        });
    }

    fn load(&self) -> GateState {
        GateState::unpack(self.state.load(Ordering::Acquire))
    }

    fn update<F>(&self, mut f: F) -> std::result::Result<u64, u64>
    where
        F: FnMut(GateState) -> Option<GateState>,
    {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                f(GateState::unpack(word)).map(GateState::pack)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_capacity_two_scenario() {
        let gate = SyncPermitGate::new(2);
        assert!(gate.try_acquire());
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        assert_eq!(gate.available(), 0);

        gate.release().unwrap();
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
    }

    #[test]
    fn test_over_release_rejected() {
        let gate = SyncPermitGate::new(1);
        assert_eq!(
            gate.release(),
            Err(WiringError::PermitOverRelease { capacity: 1 })
        );
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn test_wait_until_all_released() {
        let gate = Arc::new(SyncPermitGate::new(3));
        assert!(gate.try_acquire());
        assert!(gate.try_acquire());

        let releaser = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            releaser.release().unwrap();
            thread::sleep(Duration::from_millis(20));
            releaser.release().unwrap();
        });

        gate.wait_until_all_released(&Cancellation::never()).unwrap();
        assert_eq!(gate.available(), 3);
        handle.join().unwrap();
    }

    #[test]
    fn test_over_release_rejected_while_draining() {
        let gate = Arc::new(SyncPermitGate::new(2));
        assert!(gate.try_acquire());

        let drainer = Arc::clone(&gate);
        let handle = thread::spawn(move || drainer.wait_until_all_released(&Cancellation::never()));
        while gate.load().collected == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(gate.held(), 1);

        gate.release().unwrap();
        // the free permit sits with the drain, so this one has no owner
        assert_eq!(
            gate.release(),
            Err(WiringError::PermitOverRelease { capacity: 2 })
        );
        handle.join().unwrap().unwrap();
        assert_eq!(gate.available(), 2);
        assert_eq!(gate.held(), 0);
    }

    #[test]
    fn test_wait_until_all_released_cancelled() {
        let gate = SyncPermitGate::new(2);
        assert!(gate.try_acquire());
        let cancel = Cancellation::new();
        cancel.cancel();

        assert_eq!(
            gate.wait_until_all_released(&cancel),
            Err(WiringError::Interrupted)
        );
        // the one free permit was collected and handed back
        assert_eq!(gate.available(), 1);
        assert_eq!(gate.held(), 1);
    }

    #[test]
    fn test_state_packing() {
        let state = GateState {
            available: 3,
            collected: 14,
        };
        assert_eq!(GateState::unpack(state.pack()), state);
    }
}
