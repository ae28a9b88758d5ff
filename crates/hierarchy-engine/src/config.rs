//! Engine configuration.
//!
//! Structural limits, transaction lock timeout, and retry settings. Loaded
//! from environment variables with defaults equal to the hard caps.

use hierarchy_model::TreeLimits;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Configuration for the hierarchy services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Structural limits enforced on every mutation.
    pub limits: TreeLimits,

    /// Maximum time to wait for a store transaction, in milliseconds.
    pub lock_timeout_ms: u64,

    /// Maximum attempts for operations retried on conflict.
    pub conflict_max_attempts: u32,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            limits: TreeLimits::default(),
            lock_timeout_ms: 5_000,
            conflict_max_attempts: 3,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl HierarchyConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `HIERARCHY_MAX_DEPTH`: Exclusive bound on path length (default: 50)
    /// - `HIERARCHY_MAX_CHILDREN`: Direct children per node (default: 1000)
    /// - `HIERARCHY_MAX_METADATA_BYTES`: Serialized metadata size (default: 16384)
    /// - `HIERARCHY_MAX_NAME_LEN`: Entity name length (default: 100)
    /// - `HIERARCHY_LOCK_TIMEOUT_MS`: Transaction wait (default: 5000)
    /// - `HIERARCHY_LINK_MAX_ATTEMPTS`: Conflict retries (default: 3)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            limits: TreeLimits {
                max_depth: env_parse("HIERARCHY_MAX_DEPTH").unwrap_or(default.limits.max_depth),
                max_children: env_parse("HIERARCHY_MAX_CHILDREN")
                    .unwrap_or(default.limits.max_children),
                max_metadata_bytes: env_parse("HIERARCHY_MAX_METADATA_BYTES")
                    .unwrap_or(default.limits.max_metadata_bytes),
                max_name_len: env_parse("HIERARCHY_MAX_NAME_LEN")
                    .unwrap_or(default.limits.max_name_len),
            },
            lock_timeout_ms: env_parse("HIERARCHY_LOCK_TIMEOUT_MS")
                .unwrap_or(default.lock_timeout_ms),
            conflict_max_attempts: env_parse("HIERARCHY_LINK_MAX_ATTEMPTS")
                .unwrap_or(default.conflict_max_attempts),
        }
    }

    /// Get the lock timeout as a Duration.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Retry policy for conflict-retried operations.
    pub fn conflict_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.conflict_max_attempts,
            ..RetryPolicy::fast()
        }
    }

    /// Validate that limits are non-zero and within the hard caps.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.limits.is_within_caps() {
            return Err(ConfigError::InvalidValue {
                key: "limits".to_string(),
                message: format!(
                    "{:?} must be non-zero and not exceed {:?}",
                    self.limits,
                    TreeLimits::default()
                ),
            });
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "HIERARCHY_LOCK_TIMEOUT_MS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.conflict_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "HIERARCHY_LINK_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HierarchyConfig::default();
        assert_eq!(config.limits.max_depth, 50);
        assert_eq!(config.limits.max_children, 1000);
        assert_eq!(config.lock_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_conflict_retry_uses_configured_attempts() {
        let config = HierarchyConfig {
            conflict_max_attempts: 7,
            ..HierarchyConfig::default()
        };
        assert_eq!(config.conflict_retry().max_attempts, 7);
    }

    #[test]
    fn test_validate_rejects_loosened_limits() {
        let mut config = HierarchyConfig::default();
        config.limits.max_children = 5000;
        assert!(config.validate().is_err());

        let mut config = HierarchyConfig::default();
        config.conflict_max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
