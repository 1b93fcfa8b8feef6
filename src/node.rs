//! Cluster node: heartbeat application, liveness, failure recovery and
//! load simulation.
//!
//! A node owns its device list, network and disk descriptors, workload,
//! failure counter, trace log and both configuration blocks. All shared
//! mutable state sits behind one per-node lock; the restart continuation
//! spawned by the recovery state machine goes through the same lock, so a
//! node never needs external synchronization.

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::balancer::{self, LoadBalancingStrategy};
use crate::compression::{CompressionConfig, CompressionConfigUpdate};
use crate::device::{DeviceInfo, DiskInfo, NetworkInfo};
use crate::error::SimResult;
use crate::event::{ClusterEvent, Command, EventSink};
use crate::recovery::{RecoveryConfig, RecoveryConfigUpdate, RecoveryStrategy};
use crate::scheduler::{self, TimerHandle};
use crate::trace::{NodeTrace, TraceLog, TraceSeverity};

/// Node liveness status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Node is up and serving
    Online,
    /// Node is down
    Offline,
    /// Node is serving with reduced capacity
    Degraded,
}

impl NodeStatus {
    /// Whether the node counts as active for cluster aggregates
    pub fn is_online(&self) -> bool {
        matches!(self, NodeStatus::Online)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Online => write!(f, "online"),
            NodeStatus::Offline => write!(f, "offline"),
            NodeStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// A heartbeat message applied to a node.
///
/// Absent fields preserve the node's prior values (partial update
/// semantics); timestamp and status always overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatData {
    /// When the heartbeat was produced
    pub timestamp: DateTime<Utc>,

    /// Reported node status
    pub status: NodeStatus,

    /// Replacement device list, if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<DeviceInfo>>,

    /// Replacement network descriptor, if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkInfo>,

    /// Replacement workload percentage, if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<f64>,
}

/// The status payload published for a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatusReport {
    /// Node name
    pub name: String,
    /// Effective node status
    pub status: NodeStatus,
    /// Current workload percentage
    pub workload: f64,
    /// Current device list
    pub devices: Vec<DeviceInfo>,
    /// Last applied heartbeat timestamp
    pub last_heartbeat: DateTime<Utc>,
    /// Current failure counter
    pub failure_count: u32,
}

/// Initial configuration for a cluster node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name, unique within a registry
    pub name: String,

    /// Initial device list
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,

    /// Initial network descriptor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkInfo>,

    /// Initial disk descriptor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskInfo>,

    /// Initial status; defaults to offline until the first heartbeat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,

    /// Initial last-heartbeat timestamp; defaults to creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,

    /// Initial workload percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<f64>,

    /// Initial failure counter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_count: Option<u32>,

    /// Recovery configuration; defaults apply when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryConfig>,

    /// Compression configuration; defaults apply when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<CompressionConfig>,
}

impl NodeConfig {
    /// Create a configuration for a named node
    pub fn new(name: impl Into<String>) -> Self {
        NodeConfig {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the initial device list
    pub fn devices(mut self, devices: Vec<DeviceInfo>) -> Self {
        self.devices = devices;
        self
    }

    /// Set the initial network descriptor
    pub fn network(mut self, network: NetworkInfo) -> Self {
        self.network = Some(network);
        self
    }

    /// Set the initial disk descriptor
    pub fn disk(mut self, disk: DiskInfo) -> Self {
        self.disk = Some(disk);
        self
    }

    /// Set the initial status
    pub fn status(mut self, status: NodeStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the initial last-heartbeat timestamp
    pub fn last_heartbeat(mut self, at: DateTime<Utc>) -> Self {
        self.last_heartbeat = Some(at);
        self
    }

    /// Set the recovery configuration
    pub fn recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Set the compression configuration
    pub fn compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = Some(compression);
        self
    }
}

/// Persisted form of a node: its materialized configuration plus traces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Node configuration reflecting current state
    pub config: NodeConfig,
    /// Trace log contents
    pub traces: Vec<NodeTrace>,
}

struct NodeState {
    status: NodeStatus,
    devices: Vec<DeviceInfo>,
    network: NetworkInfo,
    disk: DiskInfo,
    workload: f64,
    failure_count: u32,
    last_heartbeat: DateTime<Utc>,
    recovery: RecoveryConfig,
    compression: CompressionConfig,
    traces: TraceLog,
}

/// A simulated cluster node
pub struct ClusterNode {
    name: String,
    heartbeat_timeout: chrono::Duration,
    state: Arc<RwLock<NodeState>>,
    sink: EventSink,
    restart_timers: Mutex<Vec<TimerHandle>>,
}

impl ClusterNode {
    /// Create a node from its initial configuration.
    ///
    /// `heartbeat_timeout` is the liveness window used by
    /// [`effective_status`](Self::effective_status).
    pub fn new(config: NodeConfig, heartbeat_timeout: Duration, sink: EventSink) -> Self {
        let network = config
            .network
            .unwrap_or_else(|| NetworkInfo::new("", ""));
        let state = NodeState {
            status: config.status.unwrap_or(NodeStatus::Offline),
            devices: config.devices,
            network,
            disk: config.disk.unwrap_or_default(),
            workload: config.workload.unwrap_or(0.0),
            failure_count: config.failure_count.unwrap_or(0),
            last_heartbeat: config.last_heartbeat.unwrap_or_else(Utc::now),
            recovery: config.recovery.unwrap_or_default(),
            compression: config.compression.unwrap_or_default(),
            traces: TraceLog::new(),
        };

        ClusterNode {
            name: config.name,
            heartbeat_timeout: chrono::Duration::from_std(heartbeat_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(30)),
            state: Arc::new(RwLock::new(state)),
            sink,
            restart_timers: Mutex::new(Vec::new()),
        }
    }

    /// Restore a node from a persisted snapshot, replaying its traces
    pub fn from_snapshot(
        snapshot: NodeSnapshot,
        heartbeat_timeout: Duration,
        sink: EventSink,
    ) -> Self {
        let node = Self::new(snapshot.config, heartbeat_timeout, sink);
        {
            let mut state = node.state.write();
            for trace in snapshot.traces {
                state.traces.append(trace);
            }
        }
        node
    }

    /// Node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply a heartbeat to the node.
    ///
    /// Heartbeats strictly older than the last applied one are discarded
    /// so out-of-order delivery cannot regress node state. Status and
    /// timestamp always overwrite; devices, network and workload are
    /// replaced only when present in the payload.
    pub fn apply_heartbeat(&self, data: HeartbeatData) {
        let mut state = self.state.write();
        if data.timestamp < state.last_heartbeat {
            debug!(
                "node {}: discarding stale heartbeat ({} < {})",
                self.name, data.timestamp, state.last_heartbeat
            );
            return;
        }

        state.last_heartbeat = data.timestamp;
        state.status = data.status;
        if let Some(devices) = data.devices {
            state.devices = devices;
        }
        if let Some(network) = data.network {
            state.network = network;
        }
        if let Some(workload) = data.workload {
            state.workload = workload;
        }

        let payload = json!({
            "status": state.status,
            "devices": state.devices,
            "disk": state.disk,
            "network": state.network,
            "workload": state.workload,
        });
        self.emit_trace(&mut state, TraceSeverity::Info, "Heartbeat received", payload);
        info!(
            "node {} heartbeat applied: status={} workload={:.1}",
            self.name, state.status, state.workload
        );
        self.publish_status(&state);
    }

    /// The node's effective status.
    ///
    /// A node whose last heartbeat is older than the liveness window
    /// reads back as offline. The stored status is not mutated; a later
    /// heartbeat restores the stored value.
    pub fn effective_status(&self) -> NodeStatus {
        let state = self.state.read();
        effective_status_of(&state, self.heartbeat_timeout)
    }

    /// The last explicitly set status, ignoring the liveness window
    pub fn stored_status(&self) -> NodeStatus {
        self.state.read().status
    }

    /// Record a failure and run the recovery state machine.
    ///
    /// Returns `true` iff recovery was initiated by this call. Failures
    /// below the configured threshold are tolerated: the counter still
    /// advances and a trace is recorded, but the status is untouched.
    ///
    /// A `Restart` schedules a non-blocking continuation; this call
    /// returns immediately. Failures arriving while a restart is pending
    /// still advance the counter and may dispatch their own recovery;
    /// concurrent restarts are deliberately not deduplicated.
    pub fn handle_failure(&self) -> bool {
        let mut state = self.state.write();
        state.failure_count += 1;
        let attempt = state.failure_count;
        let config = state.recovery;

        if attempt < config.failure_threshold {
            self.emit_trace(
                &mut state,
                TraceSeverity::Info,
                &format!(
                    "Node failure tolerated ({attempt}/{})",
                    config.failure_threshold
                ),
                json!({ "failure_count": attempt }),
            );
            return false;
        }

        self.emit_trace(
            &mut state,
            TraceSeverity::Warning,
            &format!("Node failure detected. Initiating recovery (attempt {attempt})"),
            json!({ "failure_count": attempt }),
        );

        match config.strategy {
            RecoveryStrategy::Restart => {
                state.status = NodeStatus::Offline;
                self.publish_status(&state);
                drop(state);
                self.schedule_restart(config.retry_delay);
            }
            RecoveryStrategy::Failover => {
                state.status = NodeStatus::Offline;
                self.emit_trace(
                    &mut state,
                    TraceSeverity::Warning,
                    "Initiating failover process",
                    json!({ "status": NodeStatus::Offline }),
                );
                self.publish_status(&state);
            }
            RecoveryStrategy::Degraded => {
                state.status = NodeStatus::Degraded;
                self.emit_trace(
                    &mut state,
                    TraceSeverity::Warning,
                    "Entered degraded mode",
                    json!({ "status": NodeStatus::Degraded }),
                );
                self.publish_status(&state);
            }
        }

        true
    }

    fn schedule_restart(&self, delay: Duration) {
        let state = Arc::clone(&self.state);
        let sink = self.sink.clone();
        let name = self.name.clone();
        let timeout = self.heartbeat_timeout;

        let timer = scheduler::schedule_once(delay, async move {
            let mut state = state.write();
            state.status = NodeStatus::Online;
            state.failure_count = 0;

            let trace = NodeTrace {
                timestamp: Utc::now(),
                severity: TraceSeverity::Info,
                message: "Node restarted successfully".to_string(),
                origin: name.clone(),
                payload: json!({ "status": NodeStatus::Online }),
            };
            state.traces.append(trace.clone());
            sink.publish(ClusterEvent::Trace(trace));
            info!("node {name} restarted successfully");

            sink.publish(ClusterEvent::Status(report_of(&state, &name, timeout)));
        });

        let mut timers = self.restart_timers.lock();
        timers.retain(|t| !t.is_finished());
        timers.push(timer);
    }

    /// Cancel any pending restart continuations. Used when the node is
    /// removed from the registry so a dead node cannot come back online.
    pub fn cancel_pending_restarts(&self) {
        let mut timers = self.restart_timers.lock();
        for timer in timers.drain(..) {
            timer.cancel();
        }
    }

    /// Perturb device and network metrics to simulate load.
    ///
    /// Each device gains 0-10% utilization (capped at 100) and 0-5C of
    /// temperature (capped at 90); latency wanders by ±1ms with a 1ms
    /// floor and packet loss by ±0.25% within 0-100. The node workload
    /// becomes the mean device utilization, 0 with no devices.
    pub fn simulate_load(&self) {
        let mut rng = rand::thread_rng();
        let mut guard = self.state.write();
        let state = &mut *guard;

        for device in &mut state.devices {
            device.apply_load(rng.gen_range(0.0..10.0), rng.gen_range(0.0..5.0));
        }
        state
            .network
            .perturb(rng.gen_range(-1.0..1.0), rng.gen_range(-0.25..0.25));

        state.workload = if state.devices.is_empty() {
            0.0
        } else {
            let total: f64 = state.devices.iter().map(|d| d.utilization).sum();
            (total / state.devices.len() as f64).clamp(0.0, 100.0)
        };
    }

    /// Select a device from this node's device list using `strategy`
    pub fn select_optimal_device(&self, strategy: LoadBalancingStrategy) -> Option<DeviceInfo> {
        let state = self.state.read();
        let mut rng = rand::thread_rng();
        balancer::select_device(&state.devices, strategy, &mut rng).cloned()
    }

    /// Shallow-merge a compression configuration update
    pub fn set_compression_config(&self, update: &CompressionConfigUpdate) {
        let mut state = self.state.write();
        state.compression.apply(update);
        let payload = json!({ "compression": state.compression });
        self.emit_trace(
            &mut state,
            TraceSeverity::Info,
            "Compression configuration updated",
            payload,
        );
        self.publish_status(&state);
    }

    /// Shallow-merge a recovery configuration update.
    ///
    /// The merged configuration must stay valid (threshold at least 1);
    /// an invalid merge is rejected without side effects.
    pub fn set_recovery_config(&self, update: &RecoveryConfigUpdate) -> SimResult<()> {
        let mut state = self.state.write();
        let mut merged = state.recovery;
        merged.apply(update);
        merged.validate()?;
        state.recovery = merged;

        let payload = json!({ "recovery": state.recovery });
        self.emit_trace(
            &mut state,
            TraceSeverity::Info,
            "Recovery configuration updated",
            payload,
        );
        self.publish_status(&state);
        Ok(())
    }

    /// Handle an inbound command from the messaging collaborator
    pub fn handle_command(&self, command: Command) -> SimResult<()> {
        match command {
            Command::UpdateConfig {
                compression,
                recovery,
            } => {
                if let Some(compression) = compression {
                    self.set_compression_config(&compression);
                }
                if let Some(recovery) = recovery {
                    self.set_recovery_config(&recovery)?;
                }
                Ok(())
            }
            Command::RequestStatus => {
                let state = self.state.read();
                self.publish_status(&state);
                Ok(())
            }
        }
    }

    /// Current status report for this node
    pub fn status_report(&self) -> NodeStatusReport {
        let state = self.state.read();
        report_of(&state, &self.name, self.heartbeat_timeout)
    }

    /// Current workload percentage
    pub fn workload(&self) -> f64 {
        self.state.read().workload
    }

    /// Current failure counter
    pub fn failure_count(&self) -> u32 {
        self.state.read().failure_count
    }

    /// Copy of the current device list
    pub fn devices(&self) -> Vec<DeviceInfo> {
        self.state.read().devices.clone()
    }

    /// Copy of the current network descriptor
    pub fn network(&self) -> NetworkInfo {
        self.state.read().network.clone()
    }

    /// Copy of the current disk descriptor
    pub fn disk(&self) -> DiskInfo {
        self.state.read().disk.clone()
    }

    /// Timestamp of the last applied heartbeat
    pub fn last_heartbeat(&self) -> DateTime<Utc> {
        self.state.read().last_heartbeat
    }

    /// Current recovery configuration
    pub fn recovery_config(&self) -> RecoveryConfig {
        self.state.read().recovery
    }

    /// Current compression configuration
    pub fn compression_config(&self) -> CompressionConfig {
        self.state.read().compression
    }

    /// Copy of the trace log, in emission order
    pub fn traces(&self) -> Vec<NodeTrace> {
        self.state.read().traces.snapshot()
    }

    /// Clear the trace log
    pub fn clear_traces(&self) {
        self.state.write().traces.clear();
    }

    /// Persisted form of this node
    pub fn snapshot(&self) -> NodeSnapshot {
        let state = self.state.read();
        NodeSnapshot {
            config: NodeConfig {
                name: self.name.clone(),
                devices: state.devices.clone(),
                network: Some(state.network.clone()),
                disk: Some(state.disk.clone()),
                status: Some(state.status),
                last_heartbeat: Some(state.last_heartbeat),
                workload: Some(state.workload),
                failure_count: Some(state.failure_count),
                recovery: Some(state.recovery),
                compression: Some(state.compression),
            },
            traces: state.traces.snapshot(),
        }
    }

    fn emit_trace(
        &self,
        state: &mut NodeState,
        severity: TraceSeverity,
        message: &str,
        payload: serde_json::Value,
    ) {
        let trace = NodeTrace {
            timestamp: Utc::now(),
            severity,
            message: message.to_string(),
            origin: self.name.clone(),
            payload,
        };
        state.traces.append(trace.clone());
        self.sink.publish(ClusterEvent::Trace(trace));
    }

    fn publish_status(&self, state: &NodeState) {
        self.sink.publish(ClusterEvent::Status(report_of(
            state,
            &self.name,
            self.heartbeat_timeout,
        )));
    }
}

fn effective_status_of(state: &NodeState, timeout: chrono::Duration) -> NodeStatus {
    if Utc::now() - state.last_heartbeat > timeout {
        NodeStatus::Offline
    } else {
        state.status
    }
}

fn report_of(state: &NodeState, name: &str, timeout: chrono::Duration) -> NodeStatusReport {
    NodeStatusReport {
        name: name.to_string(),
        status: effective_status_of(state, timeout),
        workload: state.workload,
        devices: state.devices.clone(),
        last_heartbeat: state.last_heartbeat,
        failure_count: state.failure_count,
    }
}
