//! Rendezvous that lends one resource from a provider to a single waiting consumer.
//!
//! A provider first wins the provide permit, which is only available while the
//! consumer is blocked waiting and no other provider holds it. It then lends
//! the resource with [`Handoff::provide`] and blocks until the consumer's
//! [`HandoffHandle`] is dropped, at which point the very same resource comes
//! back to the provider.

use crate::cancel::{Cancellation, CANCEL_POLL};
use crate::error::{Result, WiringError};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::ops::{Deref, DerefMut};
use tracing::{error, trace};

struct HandoffState<T> {
    consumer_waiting: bool,
    permit_held: bool,
    deposited: Option<T>,
    returned: Option<T>,
    /// Provider gave up while the consumer still held the resource
    provider_abandoned: bool,
}

/// A single-slot handoff of a `T` from providers to one consumer.
///
/// See the module documentation for the protocol.
pub struct Handoff<T> {
    state: Mutex<HandoffState<T>>,
    changed: Condvar,
}

impl<T> Handoff<T> {
    /// An idle handoff: no consumer waiting, nothing deposited
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HandoffState {
                consumer_waiting: false,
                permit_held: false,
                deposited: None,
                returned: None,
                provider_abandoned: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// Claim the right to provide. Never blocks.
    pub fn acquire_provide_permit(&self) -> bool {
        let mut state = self.state.lock();
        if state.consumer_waiting && !state.permit_held {
            state.permit_held = true;
            true
        } else {
            false
        }
    }

    /// Lend `resource` to the waiting consumer and block until it is handed back.
    ///
    /// If cancelled before the consumer picks it up, the resource is dropped.
    /// If cancelled while the consumer holds it, the consumer drops it when done.
    pub fn provide(&self, resource: T, cancel: &Cancellation) -> Result<T> {
        let mut state = self.state.lock();
        if !state.permit_held || state.deposited.is_some() || state.provider_abandoned {
            error!("resource provided without holding the provide permit");
            return Err(WiringError::NoProvidePermit);
        }
        state.deposited = Some(resource);
        self.changed.notify_all();
        trace!("resource deposited");

        loop {
            if let Some(resource) = state.returned.take() {
                state.permit_held = false;
                self.changed.notify_all();
                trace!("resource returned to provider");
                return Ok(resource);
            }
            if cancel.is_cancelled() {
                if state.deposited.take().is_some() {
                    state.permit_held = false;
                } else {
                    state.provider_abandoned = true;
                }
                self.changed.notify_all();
                return Err(WiringError::Interrupted);
            }
            self.changed.wait_for(&mut state, CANCEL_POLL);
        }
    }

    /// Block the consumer until a resource is deposited
    pub fn wait_for_resource(&self, cancel: &Cancellation) -> Result<HandoffHandle<'_, T>> {
        let mut state = self.state.lock();
        state.consumer_waiting = true;
        loop {
            if let Some(resource) = state.deposited.take() {
                state.consumer_waiting = false;
                return Ok(HandoffHandle {
                    handoff: self,
                    resource: Some(resource),
                });
            }
            if cancel.is_cancelled() {
                state.consumer_waiting = false;
                return Err(WiringError::Interrupted);
            }
            self.changed.wait_for(&mut state, CANCEL_POLL);
        }
    }

    /// True while the consumer is blocked in [`wait_for_resource`](Self::wait_for_resource)
    pub fn is_consumer_waiting(&self) -> bool {
        self.state.lock().consumer_waiting
    }

    fn give_back(&self, resource: T) {
        let mut state = self.state.lock();
        if state.provider_abandoned {
            state.provider_abandoned = false;
            state.permit_held = false;
            drop(resource);
        } else {
            state.returned = Some(resource);
        }
        self.changed.notify_all();
    }
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Handoff<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Handoff")
            .field("consumer_waiting", &state.consumer_waiting)
            .field("permit_held", &state.permit_held)
            .field("deposited", &state.deposited.is_some())
            .finish()
    }
}

/// The consumer's loan of a provided resource. Dropping it unblocks the provider.
pub struct HandoffHandle<'a, T> {
    handoff: &'a Handoff<T>,
    resource: Option<T>,
}

impl<T> Deref for HandoffHandle<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.resource.as_ref().expect("resource present until drop")
    }
}

impl<T> DerefMut for HandoffHandle<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.resource.as_mut().expect("resource present until drop")
    }
}

impl<T> Drop for HandoffHandle<'_, T> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.handoff.give_back(resource);
        }
    }
}
