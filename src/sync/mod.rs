//! Coordination primitives for peer sync sessions and external collaborators.

pub mod counter;
pub mod handoff;
pub mod permits;
pub mod role_lock;

pub use counter::MonotonicWaitCounter;
pub use handoff::{Handoff, HandoffHandle};
pub use permits::SyncPermitGate;
pub use role_lock::{MaybeLocked, RoleGuard, RoleLock, SyncRole};
