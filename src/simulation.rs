//! Simulation session descriptors.
//!
//! A simulation is a named session definition: what kind of analysis
//! workload runs over the cluster, how many nodes it expects and where
//! its data lives. Lifecycle transitions only flip the status field and
//! touch the last-update timestamp; timers and persistence belong to
//! the manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a simulation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationStatus {
    /// Not generating telemetry
    Stopped,
    /// Actively generating telemetry
    Running,
    /// Suspended; can be resumed by starting again
    Paused,
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationStatus::Stopped => write!(f, "stopped"),
            SimulationStatus::Running => write!(f, "running"),
            SimulationStatus::Paused => write!(f, "paused"),
        }
    }
}

/// Kind of workload a simulation models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkType {
    /// Anomaly detection over sensor telemetry
    AnomalyDetection,
    /// Generic compute work
    Generic,
}

/// Analysis family used by the workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisStrategy {
    /// Classical statistical analysis
    Statistical,
    /// Machine-learning based analysis
    MachineLearning,
}

/// Concrete algorithm within the analysis family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Fixed threshold comparison
    FixedThresholds,
    /// Standard deviation bands
    StandardDeviation,
    /// Time series decomposition
    TimeSeries,
    /// Feed-forward neural network
    NeuralNetwork,
    /// Decision tree ensemble
    DecisionTrees,
    /// Recurrent neural network
    RecurrentNeuralNetwork,
}

/// A named simulation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    /// Session name, unique within a manager
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Number of cluster nodes the session expects
    pub node_count: u32,
    /// Workload kind
    pub work_type: WorkType,
    /// Analysis family
    pub strategy: AnalysisStrategy,
    /// Concrete algorithm
    pub algorithm: Algorithm,
    /// Directory the session's data lives under
    pub data_directory: String,
    /// Current lifecycle state
    pub status: SimulationStatus,
    /// Last lifecycle transition
    pub last_update: DateTime<Utc>,
}

impl Simulation {
    /// Create a stopped session
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        node_count: u32,
        work_type: WorkType,
        strategy: AnalysisStrategy,
        algorithm: Algorithm,
        data_directory: impl Into<String>,
    ) -> Self {
        Simulation {
            name: name.into(),
            description: description.into(),
            node_count,
            work_type,
            strategy,
            algorithm,
            data_directory: data_directory.into(),
            status: SimulationStatus::Stopped,
            last_update: Utc::now(),
        }
    }

    /// Mark the session running
    pub fn start(&mut self) {
        self.status = SimulationStatus::Running;
        self.last_update = Utc::now();
    }

    /// Mark the session stopped
    pub fn stop(&mut self) {
        self.status = SimulationStatus::Stopped;
        self.last_update = Utc::now();
    }

    /// Mark the session paused
    pub fn pause(&mut self) {
        self.status = SimulationStatus::Paused;
        self.last_update = Utc::now();
    }

    /// Whether the session is currently running
    pub fn is_running(&self) -> bool {
        self.status == SimulationStatus::Running
    }
}

/// Persisted form of a session; identical to the live model
pub type SimulationSnapshot = Simulation;
