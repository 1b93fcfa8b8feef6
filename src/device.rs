//! Passive data types describing a node's hardware: accelerator devices,
//! the network link and the local disk.
//!
//! These carry no behavior beyond clamped metric updates; they are mutated
//! only by heartbeat application or the load-simulation tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum device utilization percentage
pub const MAX_UTILIZATION: f64 = 100.0;

/// Maximum simulated device temperature in Celsius
pub const MAX_TEMPERATURE: f64 = 90.0;

/// An accelerator device attached to a cluster node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device model identifier
    pub model: String,

    /// Device memory in GB
    pub memory_gb: u32,

    /// Current utilization percentage (0-100)
    pub utilization: f64,

    /// Current temperature in Celsius
    pub temperature: f64,

    /// Optional compute capability rating (e.g. TOPS)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_capability: Option<f64>,
}

impl DeviceInfo {
    /// Create a new idle device at ambient temperature
    pub fn new(model: impl Into<String>, memory_gb: u32) -> Self {
        DeviceInfo {
            model: model.into(),
            memory_gb,
            utilization: 0.0,
            temperature: 35.0,
            compute_capability: None,
        }
    }

    /// Set the compute capability rating
    pub fn with_compute_capability(mut self, capability: f64) -> Self {
        self.compute_capability = Some(capability);
        self
    }

    /// Apply a load perturbation, clamping utilization to 100% and
    /// temperature to the simulated maximum of 90C.
    pub fn apply_load(&mut self, utilization_delta: f64, temperature_delta: f64) {
        self.utilization = (self.utilization + utilization_delta).min(MAX_UTILIZATION);
        self.temperature = (self.temperature + temperature_delta).min(MAX_TEMPERATURE);
    }
}

/// Network link descriptor for a cluster node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Node address on the cluster network
    pub address: String,

    /// Role of this link in the cluster topology
    pub role: String,

    /// Link bandwidth in Mbps
    pub bandwidth_mbps: f64,

    /// Current latency in milliseconds
    pub latency_ms: f64,

    /// Current packet loss percentage (0-100)
    pub packet_loss_pct: f64,

    /// Time of the last metric update
    pub last_update: DateTime<Utc>,
}

impl NetworkInfo {
    /// Create a new descriptor with nominal link metrics
    pub fn new(address: impl Into<String>, role: impl Into<String>) -> Self {
        NetworkInfo {
            address: address.into(),
            role: role.into(),
            bandwidth_mbps: 1000.0,
            latency_ms: 1.0,
            packet_loss_pct: 0.0,
            last_update: Utc::now(),
        }
    }

    /// Perturb latency and packet loss, keeping latency at or above 1ms
    /// and packet loss within 0-100%. Refreshes the update timestamp.
    pub fn perturb(&mut self, latency_delta: f64, packet_loss_delta: f64) {
        self.latency_ms = (self.latency_ms + latency_delta).max(1.0);
        self.packet_loss_pct = (self.packet_loss_pct + packet_loss_delta).clamp(0.0, 100.0);
        self.last_update = Utc::now();
    }
}

/// Local disk descriptor for a cluster node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskInfo {
    /// Disk label
    pub label: String,

    /// Disk size in GB
    pub size_gb: u64,
}

impl Default for DiskInfo {
    fn default() -> Self {
        DiskInfo {
            label: "--".to_string(),
            size_gb: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_load_clamping() {
        let mut device = DeviceInfo::new("test-accel", 16);
        assert_eq!(device.utilization, 0.0);

        device.apply_load(150.0, 80.0);
        assert_eq!(device.utilization, MAX_UTILIZATION);
        assert_eq!(device.temperature, MAX_TEMPERATURE);
    }

    #[test]
    fn test_network_perturbation_bounds() {
        let mut network = NetworkInfo::new("192.168.1.100", "worker");
        let before = network.last_update;

        network.perturb(-5.0, -1.0);
        assert_eq!(network.latency_ms, 1.0);
        assert_eq!(network.packet_loss_pct, 0.0);

        network.perturb(0.5, 200.0);
        assert_eq!(network.latency_ms, 1.5);
        assert_eq!(network.packet_loss_pct, 100.0);
        assert!(network.last_update >= before);
    }

    #[test]
    fn test_device_serde_roundtrip() {
        let device = DeviceInfo::new("2048 Ampere", 64).with_compute_capability(275.0);
        let json = serde_json::to_string(&device).unwrap();
        let back: DeviceInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(device, back);
    }
}
