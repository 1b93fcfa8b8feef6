//! Edge Cluster Simulation Core
//!
//! This crate simulates a small edge-computing cluster of heterogeneous
//! nodes for exercising cluster-management logic without real hardware:
//! heartbeat/liveness tracking, a failure-detection-and-recovery state
//! machine, multi-strategy load balancing over accelerator devices, and
//! a phase-driven sensor data generator with anomaly injection backed by
//! a time-indexed dataset store.

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]
#![warn(missing_docs)]

pub mod balancer;
pub mod compression;
pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod manager;
pub mod node;
pub mod recovery;
pub mod registry;
pub mod scheduler;
pub mod simulation;
pub mod storage;
pub mod telemetry;
pub mod trace;

pub use balancer::LoadBalancingStrategy;
pub use compression::{CompressionAlgorithm, CompressionConfig, CompressionConfigUpdate};
pub use config::SimConfig;
pub use device::{DeviceInfo, DiskInfo, NetworkInfo};
pub use error::{SimError, SimResult};
pub use event::{ClusterEvent, Command, EventSink};
pub use manager::SimulationManager;
pub use node::{ClusterNode, HeartbeatData, NodeConfig, NodeStatus, NodeStatusReport};
pub use recovery::{RecoveryConfig, RecoveryConfigUpdate, RecoveryStrategy};
pub use registry::{ClusterRegistry, ClusterStatus};
pub use simulation::{Simulation, SimulationStatus};
pub use storage::{DatasetIndexEntry, DatasetQuery, DatasetStore, FileStore};
pub use telemetry::{SensorGenerator, SensorReading};
pub use trace::{NodeTrace, TraceSeverity};
