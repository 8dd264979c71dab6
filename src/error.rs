use thiserror::Error;

/// Result type for wiring and coordination operations
pub type Result<T> = std::result::Result<T, WiringError>;

/// Errors raised by the wiring layer and the coordination primitives.
///
/// Everything except [`WiringError::Interrupted`] is a contract violation: the
/// embedding code used a primitive in a way it must never be used, and the
/// error is returned at the offending call site.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WiringError {
    /// A blocking wait was cancelled before it completed
    #[error("Blocking wait was interrupted")]
    Interrupted,

    /// `provide` was called without first winning the provide permit
    #[error("Resource provided without holding the provide permit")]
    NoProvidePermit,

    /// A peer's unprocessed event count would have gone below zero
    #[error("Event exited for peer {peer} with no unprocessed events recorded")]
    LedgerUnderflow { peer: String },

    /// The monotonic counter was asked to move backwards
    #[error("Counter may not decrease: current value {current}, requested {requested}")]
    CounterRegression { current: u64, requested: u64 },

    /// More permits were released than the gate holds
    #[error("Permit released beyond gate capacity {capacity}")]
    PermitOverRelease { capacity: usize },

    /// An input wire was bound a second time
    #[error("Input wire {wire} is already bound")]
    AlreadyBound { wire: String },

    /// Data arrived on an input wire before a handler was bound
    #[error("Input wire {wire} received data before being bound")]
    Unbound { wire: String },

    /// A scheduler, wire or sink name is not a legal identifier
    #[error("Illegal name: {0:?}")]
    InvalidName(String),

    /// A scheduler name was registered twice in the same model
    #[error("Name already registered: {0}")]
    DuplicateName(String),

    /// A router address enumeration is empty, reordered or non-contiguous
    #[error("Invalid router addresses: {0}")]
    InvalidRouterAddresses(String),

    /// Squelching was started twice, or stopped while not active
    #[error("Scheduler {scheduler} squelching is already {state}")]
    SquelchState {
        scheduler: String,
        state: &'static str,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}

impl WiringError {
    /// True for every variant that signals a bug in the embedding code
    pub fn is_contract_violation(&self) -> bool {
        !matches!(self, WiringError::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupted_is_not_contract_violation() {
        assert!(!WiringError::Interrupted.is_contract_violation());
        assert!(WiringError::NoProvidePermit.is_contract_violation());
    }

    #[test]
    fn test_squelch_state_message() {
        let err = WiringError::SquelchState {
            scheduler: "intake".into(),
            state: "active",
        };
        assert_eq!(err.to_string(), "Scheduler intake squelching is already active");
    }
}
