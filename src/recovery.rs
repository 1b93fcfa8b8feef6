//! Failure-recovery configuration for cluster nodes.
//!
//! The recovery state machine itself lives in [`crate::node`]; this module
//! holds the strategy and its configuration, including the partial-update
//! form used by configuration broadcasts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{SimError, SimResult};

/// Default number of recovery retries
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before a restarted node comes back online
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Default number of failures tolerated before recovery triggers
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Action taken once a node's failure count reaches its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryStrategy {
    /// Go offline, then return online after the retry delay with the
    /// failure counter reset
    Restart,

    /// Go offline and stay offline; work reassignment is the cluster's
    /// responsibility, not the node's
    Failover,

    /// Keep serving in degraded mode
    Degraded,
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryStrategy::Restart => write!(f, "restart"),
            RecoveryStrategy::Failover => write!(f, "failover"),
            RecoveryStrategy::Degraded => write!(f, "degraded"),
        }
    }
}

/// Configuration for the per-node failure-recovery state machine.
///
/// Mutable at any time; a change takes effect on the next failure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Maximum recovery attempts
    pub max_retries: u32,

    /// Delay before a restarting node comes back online
    pub retry_delay: Duration,

    /// Failures tolerated before recovery triggers (at least 1)
    pub failure_threshold: u32,

    /// Recovery action to dispatch
    pub strategy: RecoveryStrategy,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            strategy: RecoveryStrategy::Restart,
        }
    }
}

impl RecoveryConfig {
    /// Shallow-merge a partial update into this configuration
    pub fn apply(&mut self, update: &RecoveryConfigUpdate) {
        if let Some(max_retries) = update.max_retries {
            self.max_retries = max_retries;
        }
        if let Some(retry_delay) = update.retry_delay {
            self.retry_delay = retry_delay;
        }
        if let Some(failure_threshold) = update.failure_threshold {
            self.failure_threshold = failure_threshold;
        }
        if let Some(strategy) = update.strategy {
            self.strategy = strategy;
        }
    }

    /// Validate invariants: the failure threshold must be at least 1
    pub fn validate(&self) -> SimResult<()> {
        if self.failure_threshold == 0 {
            return Err(SimError::ConfigurationError(
                "failure threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial update for [`RecoveryConfig`]; absent fields preserve the
/// current values
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfigUpdate {
    /// New maximum recovery attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// New restart delay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<Duration>,

    /// New failure threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,

    /// New recovery strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<RecoveryStrategy>,
}

impl RecoveryConfigUpdate {
    /// A full replacement expressed as an update
    pub fn from_config(config: RecoveryConfig) -> Self {
        RecoveryConfigUpdate {
            max_retries: Some(config.max_retries),
            retry_delay: Some(config.retry_delay),
            failure_threshold: Some(config.failure_threshold),
            strategy: Some(config.strategy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecoveryConfig::default();
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.retry_delay, DEFAULT_RETRY_DELAY);
        assert_eq!(config.failure_threshold, DEFAULT_FAILURE_THRESHOLD);
        assert_eq!(config.strategy, RecoveryStrategy::Restart);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_update_preserves_absent_fields() {
        let mut config = RecoveryConfig::default();
        config.apply(&RecoveryConfigUpdate {
            failure_threshold: Some(5),
            strategy: Some(RecoveryStrategy::Degraded),
            ..Default::default()
        });

        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.strategy, RecoveryStrategy::Degraded);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.retry_delay, DEFAULT_RETRY_DELAY);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = RecoveryConfig::default();
        config.failure_threshold = 0;
        assert!(matches!(
            config.validate(),
            Err(SimError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_strategy_wire_names() {
        assert_eq!(
            serde_json::to_string(&RecoveryStrategy::Failover).unwrap(),
            "\"failover\""
        );
    }
}
