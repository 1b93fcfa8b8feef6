//! Outbound event surface and inbound command shapes.
//!
//! The simulation core does not own a transport. Everything it would
//! publish (status reports, traces, sensor readings) is offered to an
//! [`EventSink`], a best-effort channel edge the host environment drains
//! into whatever messaging layer it uses. Commands arrive pre-parsed in
//! the wire shape of the command topic.

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::compression::CompressionConfigUpdate;
use crate::node::NodeStatusReport;
use crate::recovery::RecoveryConfigUpdate;
use crate::telemetry::SensorReading;
use crate::trace::NodeTrace;

/// An event published by the simulation core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ClusterEvent {
    /// A node status report
    Status(NodeStatusReport),
    /// A node trace entry
    Trace(NodeTrace),
    /// A real-time sensor reading
    Sensor(SensorReading),
}

/// Best-effort publisher of [`ClusterEvent`]s.
///
/// Publishing never fails: if the receiving side is gone the event is
/// dropped and logged at debug level. Trace and telemetry publication is
/// explicitly best-effort; a disconnected consumer must not abort a
/// running simulation.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ClusterEvent>>,
}

impl EventSink {
    /// Create a sink and the receiver that drains it
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ClusterEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink { tx: Some(tx) }, rx)
    }

    /// A sink that discards every event
    pub fn disabled() -> Self {
        EventSink { tx: None }
    }

    /// Offer an event to the consumer
    pub fn publish(&self, event: ClusterEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                debug!("event sink receiver dropped, discarding event");
            }
        }
    }
}

/// A command pushed into the core by the messaging collaborator.
///
/// Wire shape: `{"type": "updateConfig", "data": {...}}` or
/// `{"type": "requestStatus"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Command {
    /// Apply partial configuration updates to a node
    UpdateConfig {
        /// Compression settings to merge, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        compression: Option<CompressionConfigUpdate>,
        /// Recovery settings to merge, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recovery: Option<RecoveryConfigUpdate>,
    },
    /// Ask the node to publish its current status report
    RequestStatus,
}
