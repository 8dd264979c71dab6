use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on how long a blocked thread goes without noticing a cancellation
pub const CANCEL_POLL: Duration = Duration::from_millis(5);

/// A cooperative cancellation signal for blocking waits.
///
/// Clones share the same flag. Once cancelled a token stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    /// Create a new, not yet cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that nobody holds a handle to cancel
    pub fn never() -> Self {
        Self::default()
    }

    /// Signal every wait observing this token to give up
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// True once any clone has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = Cancellation::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
