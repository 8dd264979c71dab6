//! Mutual exclusion between the outbound and inbound side of a peer sync.

use parking_lot::{Mutex, ReentrantMutex};
use std::fmt;
use tracing::trace;

/// Which side of a sync session holds the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncRole {
    /// We initiated the sync
    Outbound,
    /// The peer initiated the sync
    Inbound,
}

impl fmt::Display for SyncRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncRole::Outbound => write!(f, "outbound"),
            SyncRole::Inbound => write!(f, "inbound"),
        }
    }
}

type RoleObserver = Box<dyn Fn(SyncRole) + Send + Sync>;

/// A non-blocking lock held by at most one [`SyncRole`] at a time.
///
/// The observers run synchronously: `on_acquired` right after the lock is
/// taken, `on_released` right before it is given up. Transitions are
/// serialized, so no other acquire can interleave between a transition and
/// its notification. Observers may query the lock and even call
/// `try_acquire`, which is refused while the lock is held.
pub struct RoleLock {
    holder: Mutex<Option<SyncRole>>,
    /// Held across a transition and its observer
    transition: ReentrantMutex<()>,
    on_acquired: RoleObserver,
    on_released: RoleObserver,
}

impl RoleLock {
    /// A free lock that reports every acquire and release to the observers
    pub fn new<A, R>(on_acquired: A, on_released: R) -> Self
    where
        A: Fn(SyncRole) + Send + Sync + 'static,
        R: Fn(SyncRole) + Send + Sync + 'static,
    {
        Self {
            holder: Mutex::new(None),
            transition: ReentrantMutex::new(()),
            on_acquired: Box::new(on_acquired),
            on_released: Box::new(on_released),
        }
    }

    /// A lock without observers
    pub fn unobserved() -> Self {
        Self::new(|_| {}, |_| {})
    }

    /// Take the lock for `role` if nobody holds it. Never blocks on a holder.
    pub fn try_acquire(&self, role: SyncRole) -> MaybeLocked<'_> {
        let _transition = self.transition.lock();
        {
            let mut holder = self.holder.lock();
            if holder.is_some() {
                return MaybeLocked::NotAcquired;
            }
            *holder = Some(role);
        }
        (self.on_acquired)(role);
        trace!(%role, "role lock acquired");
        MaybeLocked::Locked(RoleGuard { lock: self, role })
    }

    /// The role currently holding the lock
    pub fn held_role(&self) -> Option<SyncRole> {
        *self.holder.lock()
    }

    /// True while any role holds the lock
    pub fn is_held(&self) -> bool {
        self.held_role().is_some()
    }

    fn release(&self, role: SyncRole) {
        let _transition = self.transition.lock();
        (self.on_released)(role);
        *self.holder.lock() = None;
        trace!(%role, "role lock released");
    }
}

impl fmt::Debug for RoleLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleLock")
            .field("holder", &self.held_role())
            .finish()
    }
}

/// Outcome of [`RoleLock::try_acquire`]
#[must_use = "dropping a Locked result releases the lock immediately"]
pub enum MaybeLocked<'a> {
    Locked(RoleGuard<'a>),
    NotAcquired,
}

impl<'a> MaybeLocked<'a> {
    /// True if the lock was taken
    pub fn is_locked(&self) -> bool {
        matches!(self, MaybeLocked::Locked(_))
    }

    /// The guard, if the lock was taken
    pub fn into_guard(self) -> Option<RoleGuard<'a>> {
        match self {
            MaybeLocked::Locked(guard) => Some(guard),
            MaybeLocked::NotAcquired => None,
        }
    }
}

/// Holds a [`RoleLock`] until dropped
pub struct RoleGuard<'a> {
    lock: &'a RoleLock,
    role: SyncRole,
}

impl RoleGuard<'_> {
    /// The role this guard holds the lock for
    pub fn role(&self) -> SyncRole {
        self.role
    }
}

impl Drop for RoleGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(self.role);
    }
}
