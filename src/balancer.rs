//! Device load-balancing strategies.
//!
//! Selection is a pure function over a node's device list; the random
//! source is passed in so callers can make `RoundRobin` deterministic.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::device::DeviceInfo;

/// Strategy used when picking a device from a node's device list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancingStrategy {
    /// Pick a uniformly random device. This is a weak, nondeterministic
    /// round-robin: callers invoke selection at a cadence where the
    /// expectation over picks matters more than a rotating cursor.
    RoundRobin,

    /// Pick the device with the lowest utilization
    LeastLoaded,

    /// Pick the device with the lowest temperature
    TemperatureAware,
}

impl Default for LoadBalancingStrategy {
    fn default() -> Self {
        LoadBalancingStrategy::LeastLoaded
    }
}

impl fmt::Display for LoadBalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadBalancingStrategy::RoundRobin => write!(f, "round-robin"),
            LoadBalancingStrategy::LeastLoaded => write!(f, "least-loaded"),
            LoadBalancingStrategy::TemperatureAware => write!(f, "temperature-aware"),
        }
    }
}

/// Select a device from `devices` according to `strategy`.
///
/// An empty device list yields `None`; it is not an error. Ties on the
/// minimal metric are broken by encounter order (the first minimal
/// element wins).
pub fn select_device<'a, R: Rng + ?Sized>(
    devices: &'a [DeviceInfo],
    strategy: LoadBalancingStrategy,
    rng: &mut R,
) -> Option<&'a DeviceInfo> {
    if devices.is_empty() {
        return None;
    }

    match strategy {
        LoadBalancingStrategy::RoundRobin => {
            let index = rng.gen_range(0..devices.len());
            devices.get(index)
        }
        LoadBalancingStrategy::LeastLoaded => devices
            .iter()
            .reduce(|best, d| if d.utilization < best.utilization { d } else { best }),
        LoadBalancingStrategy::TemperatureAware => devices
            .iter()
            .reduce(|best, d| if d.temperature < best.temperature { d } else { best }),
    }
}
