//! Error types for the edge-cluster-sim crate.

use chrono::{DateTime, Utc};
use std::io;
use thiserror::Error;

/// Main error type for simulation operations
#[derive(Error, Debug)]
pub enum SimError {
    /// Node already exists in the cluster registry
    #[error("Node already exists: {0}")]
    NodeAlreadyExists(String),

    /// Node not found in the cluster registry
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Simulation already exists
    #[error("Simulation already exists: {0}")]
    SimulationAlreadyExists(String),

    /// Simulation not found
    #[error("Simulation not found: {0}")]
    SimulationNotFound(String),

    /// Dataset not found in the store
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    /// A sensor generation session is already active
    #[error("A sensor session is already running")]
    AlreadyRunning,

    /// No sensor generation session is active
    #[error("No sensor session is running")]
    NotRunning,

    /// Start of a requested time range is after its end
    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidRange {
        /// Requested range start
        start: DateTime<Utc>,
        /// Requested range end
        end: DateTime<Utc>,
    },

    /// Underlying storage read/write failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] io::Error),

    /// Serialization or deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A required network or address field is missing before a
    /// dependent action
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Type alias for Result with SimError
pub type SimResult<T> = Result<T, SimError>;
