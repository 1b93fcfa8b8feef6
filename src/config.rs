//! Configuration for a simulation session.

use std::path::PathBuf;
use std::time::Duration;

use crate::balancer::LoadBalancingStrategy;
use crate::compression::CompressionConfig;
use crate::error::{SimError, SimResult};
use crate::recovery::RecoveryConfig;

/// Default liveness window: a node silent longer than this reads back
/// as offline
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cadence of real-time sensor generation
pub const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Default step between historical sensor readings
pub const DEFAULT_HISTORICAL_STEP: Duration = Duration::from_secs(30);

/// Default cadence of the cluster load-simulation tick
pub const DEFAULT_LOAD_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Simulation configuration builder
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Root directory for persisted datasets, indexes and session state
    pub data_dir: PathBuf,

    /// Liveness window for the lazy offline check
    pub heartbeat_timeout: Duration,

    /// Cadence of real-time sensor generation
    pub telemetry_interval: Duration,

    /// Step between historical sensor readings
    pub historical_step: Duration,

    /// Optional cooperative delay between historical generation steps,
    /// keeping unbounded runs from monopolizing the executor
    pub historical_pacing: Option<Duration>,

    /// Cadence of the periodic cluster load-simulation tick
    pub load_tick_interval: Duration,

    /// Recovery configuration applied to newly created nodes
    pub default_recovery: RecoveryConfig,

    /// Compression configuration applied to newly created nodes
    pub default_compression: CompressionConfig,

    /// Initial cluster-wide load-balancing strategy
    pub strategy: LoadBalancingStrategy,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            data_dir: PathBuf::from("data"),
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            telemetry_interval: DEFAULT_TELEMETRY_INTERVAL,
            historical_step: DEFAULT_HISTORICAL_STEP,
            historical_pacing: None,
            load_tick_interval: DEFAULT_LOAD_TICK_INTERVAL,
            default_recovery: RecoveryConfig::default(),
            default_compression: CompressionConfig::default(),
            strategy: LoadBalancingStrategy::default(),
        }
    }
}

impl SimConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data directory
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set the heartbeat liveness window
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Set the real-time telemetry cadence
    pub fn telemetry_interval(mut self, interval: Duration) -> Self {
        self.telemetry_interval = interval;
        self
    }

    /// Set the historical generation step
    pub fn historical_step(mut self, step: Duration) -> Self {
        self.historical_step = step;
        self
    }

    /// Set the cooperative pacing delay between historical steps
    pub fn historical_pacing(mut self, pacing: Duration) -> Self {
        self.historical_pacing = Some(pacing);
        self
    }

    /// Set the load-simulation tick cadence
    pub fn load_tick_interval(mut self, interval: Duration) -> Self {
        self.load_tick_interval = interval;
        self
    }

    /// Set the recovery configuration for newly created nodes
    pub fn default_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.default_recovery = recovery;
        self
    }

    /// Set the compression configuration for newly created nodes
    pub fn default_compression(mut self, compression: CompressionConfig) -> Self {
        self.default_compression = compression;
        self
    }

    /// Set the initial load-balancing strategy
    pub fn strategy(mut self, strategy: LoadBalancingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> SimResult<Self> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(SimError::ConfigurationError(
                "data directory must not be empty".to_string(),
            ));
        }
        if self.heartbeat_timeout.is_zero() {
            return Err(SimError::ConfigurationError(
                "heartbeat timeout must be positive".to_string(),
            ));
        }
        if self.telemetry_interval.is_zero() || self.historical_step.is_zero() {
            return Err(SimError::ConfigurationError(
                "telemetry cadences must be positive".to_string(),
            ));
        }
        self.default_recovery.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::RecoveryStrategy;

    #[test]
    fn test_default_config_builds() {
        let config = SimConfig::new().build().unwrap();
        assert_eq!(config.heartbeat_timeout, DEFAULT_HEARTBEAT_TIMEOUT);
        assert_eq!(config.telemetry_interval, DEFAULT_TELEMETRY_INTERVAL);
        assert_eq!(config.strategy, LoadBalancingStrategy::LeastLoaded);
    }

    #[test]
    fn test_builder_chain() {
        let config = SimConfig::new()
            .data_dir("/tmp/simdata")
            .heartbeat_timeout(Duration::from_secs(10))
            .telemetry_interval(Duration::from_secs(1))
            .strategy(LoadBalancingStrategy::TemperatureAware)
            .build()
            .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/simdata"));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(10));
        assert_eq!(config.strategy, LoadBalancingStrategy::TemperatureAware);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = SimConfig::new()
            .heartbeat_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(SimError::ConfigurationError(_))));
    }

    #[test]
    fn test_invalid_default_recovery_rejected() {
        let mut recovery = RecoveryConfig::default();
        recovery.failure_threshold = 0;
        recovery.strategy = RecoveryStrategy::Restart;

        let result = SimConfig::new().default_recovery(recovery).build();
        assert!(result.is_err());
    }
}
