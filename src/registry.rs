//! Cluster registry: node membership, global balancing strategy,
//! configuration broadcast, aggregate status and cluster-wide device
//! selection.

use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::balancer::LoadBalancingStrategy;
use crate::compression::CompressionConfigUpdate;
use crate::config::SimConfig;
use crate::device::{DeviceInfo, DiskInfo, NetworkInfo};
use crate::error::{SimError, SimResult};
use crate::event::EventSink;
use crate::node::{ClusterNode, HeartbeatData, NodeConfig, NodeSnapshot, NodeStatus};
use crate::recovery::RecoveryConfigUpdate;
use crate::scheduler::{self, TimerHandle};

/// Per-node entry in an aggregate cluster status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    /// Effective node status
    pub status: NodeStatus,
    /// Current device list
    pub devices: Vec<DeviceInfo>,
    /// Disk descriptor
    pub disk: DiskInfo,
    /// Network descriptor
    pub network: NetworkInfo,
    /// Current workload percentage
    pub workload: f64,
}

/// Aggregate view over the whole cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    /// Per-node summaries, keyed by node name
    pub nodes: BTreeMap<String, NodeSummary>,
    /// Total device count across all nodes
    pub total_devices: usize,
    /// Mean workload across effectively-online nodes, 0 with none online
    pub average_workload: f64,
    /// Number of effectively-online nodes
    pub active_nodes: usize,
}

/// Registry of simulated cluster nodes.
///
/// Node names are unique. The registry owns the cluster-wide balancing
/// strategy and the periodic load-simulation timer; individual node
/// state stays behind each node's own lock.
pub struct ClusterRegistry {
    nodes: Arc<RwLock<BTreeMap<String, Arc<ClusterNode>>>>,
    strategy: RwLock<LoadBalancingStrategy>,
    heartbeat_timeout: Duration,
    load_tick_interval: Duration,
    load_timer: Mutex<Option<TimerHandle>>,
    sink: EventSink,
    default_config: SimConfig,
}

impl ClusterRegistry {
    /// Create an empty registry
    pub fn new(config: &SimConfig, sink: EventSink) -> Self {
        ClusterRegistry {
            nodes: Arc::new(RwLock::new(BTreeMap::new())),
            strategy: RwLock::new(config.strategy),
            heartbeat_timeout: config.heartbeat_timeout,
            load_tick_interval: config.load_tick_interval,
            load_timer: Mutex::new(None),
            sink,
            default_config: config.clone(),
        }
    }

    /// Add a node. Unset recovery and compression blocks take the
    /// registry defaults. Fails if the name is already registered.
    pub fn add_node(&self, mut config: NodeConfig) -> SimResult<Arc<ClusterNode>> {
        if let Some(network) = &config.network {
            if network.address.is_empty() {
                return Err(SimError::NotConfigured(format!(
                    "node {} has a network descriptor without an address",
                    config.name
                )));
            }
        }
        if config.recovery.is_none() {
            config.recovery = Some(self.default_config.default_recovery);
        }
        if config.compression.is_none() {
            config.compression = Some(self.default_config.default_compression);
        }

        let mut nodes = self.nodes.write();
        if nodes.contains_key(&config.name) {
            return Err(SimError::NodeAlreadyExists(config.name));
        }

        let name = config.name.clone();
        let node = Arc::new(ClusterNode::new(
            config,
            self.heartbeat_timeout,
            self.sink.clone(),
        ));
        nodes.insert(name.clone(), Arc::clone(&node));
        info!("node {name} added to cluster ({} total)", nodes.len());
        Ok(node)
    }

    /// Remove a node, canceling any restart it has pending
    pub fn remove_node(&self, name: &str) -> SimResult<()> {
        let removed = self.nodes.write().remove(name);
        match removed {
            Some(node) => {
                node.cancel_pending_restarts();
                info!("node {name} removed from cluster");
                Ok(())
            }
            None => Err(SimError::NodeNotFound(name.to_string())),
        }
    }

    /// Look up a node by name
    pub fn node(&self, name: &str) -> Option<Arc<ClusterNode>> {
        self.nodes.read().get(name).cloned()
    }

    /// Names of all registered nodes, sorted
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.read().keys().cloned().collect()
    }

    /// Number of registered nodes
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Current cluster-wide balancing strategy
    pub fn strategy(&self) -> LoadBalancingStrategy {
        *self.strategy.read()
    }

    /// Change the cluster-wide balancing strategy
    pub fn set_strategy(&self, strategy: LoadBalancingStrategy) {
        *self.strategy.write() = strategy;
        info!("load balancing strategy set to {strategy}");
    }

    /// Route a heartbeat to the named node
    pub fn apply_heartbeat(&self, name: &str, data: HeartbeatData) -> SimResult<()> {
        let node = self
            .node(name)
            .ok_or_else(|| SimError::NodeNotFound(name.to_string()))?;
        node.apply_heartbeat(data);
        Ok(())
    }

    /// Merge a recovery configuration update into every node
    pub fn broadcast_recovery_config(&self, update: &RecoveryConfigUpdate) -> SimResult<()> {
        let nodes: Vec<Arc<ClusterNode>> = self.nodes.read().values().cloned().collect();
        for node in &nodes {
            node.set_recovery_config(update)?;
        }
        info!("recovery configuration broadcast to {} node(s)", nodes.len());
        Ok(())
    }

    /// Merge a compression configuration update into every node
    pub fn broadcast_compression_config(&self, update: &CompressionConfigUpdate) {
        let nodes: Vec<Arc<ClusterNode>> = self.nodes.read().values().cloned().collect();
        for node in &nodes {
            node.set_compression_config(update);
        }
        info!(
            "compression configuration broadcast to {} node(s)",
            nodes.len()
        );
    }

    /// Aggregate status over the whole cluster.
    ///
    /// The average workload is taken over effectively-online nodes
    /// only; with no online nodes it is 0.
    pub fn cluster_status(&self) -> ClusterStatus {
        let nodes = self.nodes.read();
        let mut summaries = BTreeMap::new();
        let mut total_devices = 0;
        let mut active_nodes = 0;
        let mut active_workload = 0.0;

        for (name, node) in nodes.iter() {
            let status = node.effective_status();
            let devices = node.devices();
            total_devices += devices.len();
            let workload = node.workload();
            if status.is_online() {
                active_nodes += 1;
                active_workload += workload;
            }

            summaries.insert(
                name.clone(),
                NodeSummary {
                    status,
                    devices,
                    disk: node.disk(),
                    network: node.network(),
                    workload,
                },
            );
        }

        ClusterStatus {
            nodes: summaries,
            total_devices,
            average_workload: if active_nodes > 0 {
                active_workload / active_nodes as f64
            } else {
                0.0
            },
            active_nodes,
        }
    }

    /// Pick the best `(node, device)` pair cluster-wide.
    ///
    /// Each effectively-online node nominates a device under the
    /// current strategy; candidates are then ranked by a strategy
    /// metric. Least-loaded weighs device utilization against node
    /// workload, temperature-aware weighs device temperature the same
    /// way, and round-robin favors the node with the stalest network
    /// update for fair rotation. Ties keep the first candidate seen.
    pub fn optimal_device(&self) -> Option<(String, DeviceInfo)> {
        let strategy = self.strategy();
        let nodes = self.nodes.read();

        let mut best: Option<(String, DeviceInfo)> = None;
        let mut best_metric = f64::INFINITY;

        for (name, node) in nodes.iter() {
            if !node.effective_status().is_online() {
                continue;
            }
            let Some(device) = node.select_optimal_device(strategy) else {
                continue;
            };

            let metric = match strategy {
                LoadBalancingStrategy::LeastLoaded => {
                    device.utilization + node.workload() * 0.5
                }
                LoadBalancingStrategy::TemperatureAware => {
                    device.temperature + node.workload() * 0.2
                }
                LoadBalancingStrategy::RoundRobin => {
                    node.network().last_update.timestamp_millis() as f64
                }
            };

            if metric < best_metric {
                best_metric = metric;
                best = Some((name.clone(), device));
            }
        }

        best
    }

    /// Perturb load metrics on every node once
    pub fn simulate_cluster_load(&self) {
        let nodes: Vec<Arc<ClusterNode>> = self.nodes.read().values().cloned().collect();
        for node in &nodes {
            node.simulate_load();
        }
        debug!("cluster load simulation tick over {} node(s)", nodes.len());
    }

    /// Start the periodic load-simulation tick
    pub fn start_load_simulation(&self) -> SimResult<()> {
        let mut timer = self.load_timer.lock();
        if timer.is_some() {
            return Err(SimError::AlreadyRunning);
        }

        let nodes = Arc::clone(&self.nodes);
        *timer = Some(scheduler::schedule_repeating(
            self.load_tick_interval,
            move || {
                let snapshot: Vec<Arc<ClusterNode>> =
                    nodes.read().values().cloned().collect();
                async move {
                    for node in &snapshot {
                        node.simulate_load();
                    }
                }
            },
        ));
        info!(
            "cluster load simulation started (every {:?})",
            self.load_tick_interval
        );
        Ok(())
    }

    /// Stop the periodic load-simulation tick
    pub fn stop_load_simulation(&self) -> SimResult<()> {
        match self.load_timer.lock().take() {
            Some(timer) => {
                timer.cancel();
                info!("cluster load simulation stopped");
                Ok(())
            }
            None => Err(SimError::NotRunning),
        }
    }

    /// Whether the periodic load-simulation tick is running
    pub fn is_simulating_load(&self) -> bool {
        self.load_timer.lock().is_some()
    }

    /// Persisted form of every registered node
    pub fn snapshots(&self) -> Vec<NodeSnapshot> {
        self.nodes
            .read()
            .values()
            .map(|node| node.snapshot())
            .collect()
    }

    /// Restore nodes from persisted snapshots, skipping duplicates
    pub fn restore(&self, snapshots: Vec<NodeSnapshot>) {
        let mut nodes = self.nodes.write();
        for snapshot in snapshots {
            let name = snapshot.config.name.clone();
            if nodes.contains_key(&name) {
                debug!("skipping duplicate node snapshot {name}");
                continue;
            }
            let node = Arc::new(ClusterNode::from_snapshot(
                snapshot,
                self.heartbeat_timeout,
                self.sink.clone(),
            ));
            nodes.insert(name, node);
        }
        info!("registry restored with {} node(s)", nodes.len());
    }

    /// Stop timers and cancel every pending node restart
    pub fn shutdown(&self) {
        if let Some(timer) = self.load_timer.lock().take() {
            timer.cancel();
        }
        for node in self.nodes.read().values() {
            node.cancel_pending_restarts();
        }
        info!("cluster registry shut down");
    }
}
