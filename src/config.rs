use crate::error::{Result, WiringError};
use serde::{Deserialize, Serialize};

/// Plain parameters the embedding node supplies at construction time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackboneConfig {
    /// Number of concurrent gossip sync sessions admitted by the permit gate
    pub sync_permits: usize,
    /// Capacity applied to schedulers built without an explicit one; `None` is unbounded
    pub default_unhandled_task_capacity: Option<u64>,
    /// Cap on a single backpressure hold-off sleep, in microseconds
    pub backpressure_backoff_max_us: u64,
}

impl BackboneConfig {
    /// Reject values no node can run with
    pub fn validate(&self) -> Result<()> {
        if self.sync_permits == 0 {
            return Err(WiringError::InvalidConfig(
                "sync_permits must be at least 1".into(),
            ));
        }
        if self.default_unhandled_task_capacity == Some(0) {
            return Err(WiringError::InvalidConfig(
                "default_unhandled_task_capacity must be at least 1".into(),
            ));
        }
        if self.backpressure_backoff_max_us == 0 {
            return Err(WiringError::InvalidConfig(
                "backpressure_backoff_max_us must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self {
            sync_permits: 17,
            default_unhandled_task_capacity: None,
            backpressure_backoff_max_us: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(BackboneConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_permits_rejected() {
        let config = BackboneConfig {
            sync_permits: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(WiringError::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BackboneConfig = toml::from_str("sync_permits = 4").unwrap();
        assert_eq!(config.sync_permits, 4);
        assert_eq!(config.default_unhandled_task_capacity, None);
        assert_eq!(config.backpressure_backoff_max_us, 1000);
    }

    #[test]
    fn test_capacity_from_toml() {
        let config: BackboneConfig =
            toml::from_str("default_unhandled_task_capacity = 0").unwrap();
        assert!(config.validate().is_err());
    }
}
