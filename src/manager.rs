//! Simulation manager: the facade over the cluster registry, session
//! descriptors, sensor generation and file persistence.
//!
//! The manager owns one registry, one file store and at most one active
//! sensor session. Simulation sessions carry their own telemetry timer
//! that writes periodic snapshots; those writes are best-effort and
//! never abort a running session. Writes of the authoritative node and
//! simulation lists do propagate failures to the caller.

use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::SimConfig;
use crate::device::{DeviceInfo, DiskInfo, NetworkInfo};
use crate::error::{SimError, SimResult};
use crate::event::{ClusterEvent, Command, EventSink};
use crate::node::{NodeConfig, NodeStatus};
use crate::registry::{ClusterRegistry, ClusterStatus};
use crate::scheduler::{self, TimerHandle};
use crate::simulation::{Simulation, SimulationStatus};
use crate::storage::{DatasetIndexEntry, DatasetQuery, DatasetStore, FileStore};
use crate::telemetry::{self, SensorGenerator, SensorReading};

/// Facade over one simulated edge cluster
pub struct SimulationManager {
    config: SimConfig,
    store: Arc<FileStore>,
    registry: Arc<ClusterRegistry>,
    simulations: RwLock<BTreeMap<String, Simulation>>,
    telemetry_timers: Mutex<HashMap<String, TimerHandle>>,
    generator: Mutex<Option<Arc<SensorGenerator>>>,
    sink: EventSink,
}

impl SimulationManager {
    /// Open a manager rooted at the configured data directory.
    ///
    /// Persisted nodes and simulations are restored; a data directory
    /// with no node state is seeded with the default edge fleet.
    pub async fn new(config: SimConfig, sink: EventSink) -> SimResult<Self> {
        let config = config.build()?;
        let store = Arc::new(FileStore::new(&config.data_dir).await?);
        let registry = Arc::new(ClusterRegistry::new(&config, sink.clone()));

        let node_snapshots = store.load_nodes().await?;
        if node_snapshots.is_empty() {
            for node_config in default_fleet() {
                registry.add_node(node_config)?;
            }
            store.save_nodes(&registry.snapshots()).await?;
            info!("seeded default edge fleet ({} nodes)", registry.len());
        } else {
            registry.restore(node_snapshots);
        }

        let simulations: BTreeMap<String, Simulation> = store
            .load_simulations()
            .await?
            .into_iter()
            .map(|simulation| (simulation.name.clone(), simulation))
            .collect();
        info!(
            "simulation manager ready: {} simulation(s), {} node(s)",
            simulations.len(),
            registry.len()
        );

        Ok(SimulationManager {
            config,
            store,
            registry,
            simulations: RwLock::new(simulations),
            telemetry_timers: Mutex::new(HashMap::new()),
            generator: Mutex::new(None),
            sink,
        })
    }

    /// The underlying cluster registry
    pub fn registry(&self) -> &Arc<ClusterRegistry> {
        &self.registry
    }

    /// The underlying file store
    pub fn store(&self) -> &Arc<FileStore> {
        &self.store
    }

    // ---- simulation sessions ----

    /// Register a new session. The name must be unused.
    pub async fn add_simulation(&self, simulation: Simulation) -> SimResult<()> {
        {
            let mut simulations = self.simulations.write();
            if simulations.contains_key(&simulation.name) {
                return Err(SimError::SimulationAlreadyExists(simulation.name));
            }
            simulations.insert(simulation.name.clone(), simulation);
        }
        self.persist_simulations().await
    }

    /// Remove a session, stopping its telemetry timer if running
    pub async fn remove_simulation(&self, name: &str) -> SimResult<()> {
        {
            let mut simulations = self.simulations.write();
            if simulations.remove(name).is_none() {
                return Err(SimError::SimulationNotFound(name.to_string()));
            }
        }
        if let Some(timer) = self.telemetry_timers.lock().remove(name) {
            timer.cancel();
        }
        self.persist_simulations().await
    }

    /// Snapshot of all registered sessions
    pub fn simulations(&self) -> Vec<Simulation> {
        self.simulations.read().values().cloned().collect()
    }

    /// Sessions currently in the running state
    pub fn running_simulations(&self) -> Vec<Simulation> {
        self.simulations
            .read()
            .values()
            .filter(|simulation| simulation.is_running())
            .cloned()
            .collect()
    }

    /// Look up one session by name
    pub fn simulation(&self, name: &str) -> Option<Simulation> {
        self.simulations.read().get(name).cloned()
    }

    /// Start a session: mark it running and begin writing periodic
    /// telemetry snapshots on the configured cadence.
    ///
    /// Snapshot writes are best-effort; a failed write is logged and
    /// the session keeps running.
    pub async fn start_simulation(&self, name: &str) -> SimResult<()> {
        self.transition_simulation(name, SimulationStatus::Running)
            .await?;

        let store = Arc::clone(&self.store);
        let sink = self.sink.clone();
        let simulation_name = name.to_string();
        let timer = scheduler::schedule_repeating(self.config.telemetry_interval, move || {
            let store = Arc::clone(&store);
            let sink = sink.clone();
            let simulation_name = simulation_name.clone();
            async move {
                let reading = {
                    let mut rng = rand::thread_rng();
                    telemetry::generate_reading(0, Utc::now(), 0.0, &mut rng)
                };
                sink.publish(ClusterEvent::Sensor(reading.clone()));
                if let Err(err) = store.save_telemetry(&simulation_name, &reading).await {
                    warn!("telemetry snapshot for {simulation_name} failed: {err}");
                }
            }
        });

        if let Some(old) = self.telemetry_timers.lock().insert(name.to_string(), timer) {
            old.cancel();
        }
        info!("simulation {name} started");
        Ok(())
    }

    /// Stop a session and its telemetry timer
    pub async fn stop_simulation(&self, name: &str) -> SimResult<()> {
        self.transition_simulation(name, SimulationStatus::Stopped)
            .await?;
        if let Some(timer) = self.telemetry_timers.lock().remove(name) {
            timer.cancel();
        }
        info!("simulation {name} stopped");
        Ok(())
    }

    /// Pause a session; its telemetry timer stops until restarted
    pub async fn pause_simulation(&self, name: &str) -> SimResult<()> {
        self.transition_simulation(name, SimulationStatus::Paused)
            .await?;
        if let Some(timer) = self.telemetry_timers.lock().remove(name) {
            timer.cancel();
        }
        info!("simulation {name} paused");
        Ok(())
    }

    async fn transition_simulation(
        &self,
        name: &str,
        status: SimulationStatus,
    ) -> SimResult<()> {
        {
            let mut simulations = self.simulations.write();
            let simulation = simulations
                .get_mut(name)
                .ok_or_else(|| SimError::SimulationNotFound(name.to_string()))?;
            match status {
                SimulationStatus::Running => simulation.start(),
                SimulationStatus::Stopped => simulation.stop(),
                SimulationStatus::Paused => simulation.pause(),
            }
        }
        self.persist_simulations().await
    }

    async fn persist_simulations(&self) -> SimResult<()> {
        let snapshots: Vec<Simulation> = self.simulations.read().values().cloned().collect();
        self.store.save_simulations(&snapshots).await
    }

    // ---- sensor sessions ----

    /// Generate a historical batch over `[start, end)`, persist it as
    /// a new dataset and return its derived index entry.
    ///
    /// Only one sensor session (historical or real-time) may be active
    /// at a time across the manager.
    pub async fn generate_historical_data(
        &self,
        plc_count: u32,
        anomaly_factor: f64,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> SimResult<DatasetIndexEntry> {
        let generator = {
            let mut slot = self.generator.lock();
            if slot.is_some() {
                return Err(SimError::AlreadyRunning);
            }
            let generator = Arc::new(SensorGenerator::new(
                plc_count,
                anomaly_factor,
                &self.config,
                self.sink.clone(),
            ));
            *slot = Some(Arc::clone(&generator));
            generator
        };

        let result = generator.generate_historical(start, end).await;
        {
            // A stop followed by a new session may have replaced the
            // slot while the walk was draining; only clear our own.
            let mut slot = self.generator.lock();
            if slot.as_ref().map_or(false, |g| Arc::ptr_eq(g, &generator)) {
                *slot = None;
            }
        }
        let batch = result?;

        let dataset_id = format!("dataset-{}", Uuid::new_v4());
        self.store.save_dataset(&dataset_id, &batch).await
    }

    /// Start a real-time sensor session publishing readings through
    /// the event sink on the configured cadence
    pub fn start_realtime_sensors(&self, plc_count: u32, anomaly_factor: f64) -> SimResult<()> {
        let mut slot = self.generator.lock();
        if slot.is_some() {
            return Err(SimError::AlreadyRunning);
        }

        let generator = Arc::new(SensorGenerator::new(
            plc_count,
            anomaly_factor,
            &self.config,
            self.sink.clone(),
        ));
        generator.start_realtime()?;
        *slot = Some(generator);
        Ok(())
    }

    /// Stop the active sensor session
    pub fn stop_sensors(&self) -> SimResult<()> {
        let generator = self
            .generator
            .lock()
            .take()
            .ok_or(SimError::NotRunning)?;
        if generator.is_running() {
            generator.stop()?;
        }
        Ok(())
    }

    /// Whether a sensor session is active
    pub fn sensor_session_active(&self) -> bool {
        self.generator.lock().is_some()
    }

    /// Query persisted datasets through the index
    pub async fn query_datasets(&self, query: &DatasetQuery) -> SimResult<Vec<SensorReading>> {
        self.store.query(query).await
    }

    // ---- cluster ----

    /// Add a node and persist the updated node list
    pub async fn add_node(&self, config: NodeConfig) -> SimResult<()> {
        self.registry.add_node(config)?;
        self.store.save_nodes(&self.registry.snapshots()).await
    }

    /// Remove a node and persist the updated node list
    pub async fn remove_node(&self, name: &str) -> SimResult<()> {
        self.registry.remove_node(name)?;
        self.store.save_nodes(&self.registry.snapshots()).await
    }

    /// Aggregate cluster status
    pub fn cluster_status(&self) -> ClusterStatus {
        self.registry.cluster_status()
    }

    /// Best `(node, device)` pair under the current strategy
    pub fn optimal_device(&self) -> Option<(String, DeviceInfo)> {
        self.registry.optimal_device()
    }

    /// Route a command to one node
    pub fn handle_node_command(&self, node: &str, command: Command) -> SimResult<()> {
        let node = self
            .registry
            .node(node)
            .ok_or_else(|| SimError::NodeNotFound(node.to_string()))?;
        node.handle_command(command)
    }

    /// Stop every timer, cancel pending restarts and persist all state
    pub async fn shutdown(&self) -> SimResult<()> {
        for (_, timer) in self.telemetry_timers.lock().drain() {
            timer.cancel();
        }
        if let Some(generator) = self.generator.lock().take() {
            if generator.is_running() {
                generator.stop()?;
            }
        }
        self.registry.shutdown();

        self.store.save_nodes(&self.registry.snapshots()).await?;
        self.persist_simulations().await?;
        info!("simulation manager shut down");
        Ok(())
    }
}

/// The default edge fleet seeded into an empty data directory
pub fn default_fleet() -> Vec<NodeConfig> {
    let mut fleet = Vec::new();

    let mut router_net = NetworkInfo::new("192.168.1.99", "router");
    router_net.bandwidth_mbps = 1.0;
    fleet.push(
        NodeConfig::new("RPi 5")
            .status(NodeStatus::Online)
            .network(router_net)
            .disk(DiskInfo {
                label: "NVMe|SDCard".to_string(),
                size_gb: 64,
            }),
    );

    let mut orin_net = NetworkInfo::new("192.168.1.100", "node-sun");
    orin_net.bandwidth_mbps = 10.0;
    fleet.push(
        NodeConfig::new("AGX Orin")
            .status(NodeStatus::Online)
            .devices(vec![
                DeviceInfo::new("2048 Ampere", 64).with_compute_capability(275.0)
            ])
            .network(orin_net)
            .disk(DiskInfo {
                label: "eMMC 5.1".to_string(),
                size_gb: 64,
            }),
    );

    for (name, address, role) in [
        ("J202 NX (Yang)", "192.168.1.101", "node-white"),
        ("J202 NX (Yin)", "192.168.1.102", "node-black"),
    ] {
        let mut net = NetworkInfo::new(address, role);
        net.bandwidth_mbps = 1.0;
        fleet.push(
            NodeConfig::new(name)
                .status(NodeStatus::Online)
                .devices(vec![
                    DeviceInfo::new("1024 Ampere", 16).with_compute_capability(157.0)
                ])
                .network(net)
                .disk(DiskInfo {
                    label: "NVMe|SDCard".to_string(),
                    size_gb: 64,
                }),
        );
    }

    let mut nano_net = NetworkInfo::new("192.168.1.103", "node-tiny");
    nano_net.bandwidth_mbps = 1.0;
    fleet.push(
        NodeConfig::new("Orin Nano")
            .status(NodeStatus::Online)
            .devices(vec![
                DeviceInfo::new("1024 Ampere", 8).with_compute_capability(67.0)
            ])
            .network(nano_net)
            .disk(DiskInfo {
                label: "NVMe|SDCard".to_string(),
                size_gb: 64,
            }),
    );

    fleet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{Algorithm, AnalysisStrategy, WorkType};
    use chrono::TimeZone;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_config(data_dir: &std::path::Path) -> SimConfig {
        SimConfig::new()
            .data_dir(data_dir)
            .telemetry_interval(Duration::from_millis(20))
            .historical_step(Duration::from_secs(6))
    }

    fn session(name: &str) -> Simulation {
        Simulation::new(
            name,
            "test session",
            5,
            WorkType::AnomalyDetection,
            AnalysisStrategy::Statistical,
            Algorithm::FixedThresholds,
            "data/test",
        )
    }

    #[tokio::test]
    async fn test_empty_data_dir_seeds_default_fleet() {
        let dir = tempdir().unwrap();
        let manager = SimulationManager::new(test_config(dir.path()), EventSink::disabled())
            .await
            .unwrap();

        assert_eq!(manager.registry().len(), 5);
        assert!(manager.registry().node("AGX Orin").is_some());

        // A second manager over the same directory restores rather
        // than reseeding.
        let reopened = SimulationManager::new(test_config(dir.path()), EventSink::disabled())
            .await
            .unwrap();
        assert_eq!(reopened.registry().len(), 5);
    }

    #[tokio::test]
    async fn test_simulation_registration() {
        let dir = tempdir().unwrap();
        let manager = SimulationManager::new(test_config(dir.path()), EventSink::disabled())
            .await
            .unwrap();

        manager.add_simulation(session("alpha")).await.unwrap();
        assert!(matches!(
            manager.add_simulation(session("alpha")).await,
            Err(SimError::SimulationAlreadyExists(_))
        ));

        assert!(manager.simulation("alpha").is_some());
        manager.remove_simulation("alpha").await.unwrap();
        assert!(matches!(
            manager.remove_simulation("alpha").await,
            Err(SimError::SimulationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_start_simulation_writes_telemetry_snapshots() {
        let dir = tempdir().unwrap();
        let manager = SimulationManager::new(test_config(dir.path()), EventSink::disabled())
            .await
            .unwrap();

        manager.add_simulation(session("alpha")).await.unwrap();
        manager.start_simulation("alpha").await.unwrap();
        assert_eq!(manager.running_simulations().len(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        manager.stop_simulation("alpha").await.unwrap();

        let snapshots = manager.store().load_telemetry("alpha").await.unwrap();
        assert!(!snapshots.is_empty());
        assert_eq!(
            manager.simulation("alpha").unwrap().status,
            SimulationStatus::Stopped
        );
    }

    #[tokio::test]
    async fn test_unknown_simulation_rejected() {
        let dir = tempdir().unwrap();
        let manager = SimulationManager::new(test_config(dir.path()), EventSink::disabled())
            .await
            .unwrap();

        assert!(matches!(
            manager.start_simulation("ghost").await,
            Err(SimError::SimulationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_historical_generation_persists_and_queries() {
        let dir = tempdir().unwrap();
        let manager = SimulationManager::new(test_config(dir.path()), EventSink::disabled())
            .await
            .unwrap();

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap();

        let entry = manager
            .generate_historical_data(1, 0.0, start, Some(end))
            .await
            .unwrap();
        assert_eq!(entry.record_count, 10);
        assert_eq!(entry.anomaly_count, 0);
        let range = entry.time_range.unwrap();
        assert_eq!(range.start, start);
        assert_eq!(range.end, start + chrono::Duration::seconds(54));

        let results = manager
            .query_datasets(&DatasetQuery::new().start(start).end(end))
            .await
            .unwrap();
        assert_eq!(results.len(), 10);
        assert!(!manager.sensor_session_active());
    }

    #[tokio::test]
    async fn test_single_sensor_session_across_manager() {
        let dir = tempdir().unwrap();
        let manager = SimulationManager::new(test_config(dir.path()), EventSink::disabled())
            .await
            .unwrap();

        manager.start_realtime_sensors(2, 0.0).unwrap();
        assert!(manager.sensor_session_active());

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            manager
                .generate_historical_data(1, 0.0, start, Some(start))
                .await,
            Err(SimError::AlreadyRunning)
        ));

        manager.stop_sensors().unwrap();
        assert!(matches!(manager.stop_sensors(), Err(SimError::NotRunning)));
    }

    #[tokio::test]
    async fn test_node_membership_persists() {
        let dir = tempdir().unwrap();
        let manager = SimulationManager::new(test_config(dir.path()), EventSink::disabled())
            .await
            .unwrap();

        manager
            .add_node(NodeConfig::new("extra").status(NodeStatus::Online))
            .await
            .unwrap();
        manager.remove_node("RPi 5").await.unwrap();

        let reopened = SimulationManager::new(test_config(dir.path()), EventSink::disabled())
            .await
            .unwrap();
        assert!(reopened.registry().node("extra").is_some());
        assert!(reopened.registry().node("RPi 5").is_none());
        assert_eq!(reopened.registry().len(), 5);
    }

    #[tokio::test]
    async fn test_shutdown_persists_everything() {
        let dir = tempdir().unwrap();
        let manager = SimulationManager::new(test_config(dir.path()), EventSink::disabled())
            .await
            .unwrap();

        manager.add_simulation(session("alpha")).await.unwrap();
        manager.start_simulation("alpha").await.unwrap();
        manager.start_realtime_sensors(1, 0.0).unwrap();
        manager.shutdown().await.unwrap();

        assert!(!manager.sensor_session_active());
        let reopened = SimulationManager::new(test_config(dir.path()), EventSink::disabled())
            .await
            .unwrap();
        assert!(reopened.simulation("alpha").is_some());
    }
}
