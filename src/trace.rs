//! Per-node trace log: an ordered, append-only record of node-internal
//! events, bounded only by explicit clearing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a trace entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceSeverity {
    /// Informational event
    Info,
    /// Something degraded or suspicious
    Warning,
    /// A failure
    Error,
}

impl fmt::Display for TraceSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceSeverity::Info => write!(f, "info"),
            TraceSeverity::Warning => write!(f, "warning"),
            TraceSeverity::Error => write!(f, "error"),
        }
    }
}

/// A single trace entry emitted by a cluster node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTrace {
    /// When the event happened
    pub timestamp: DateTime<Utc>,

    /// Event severity
    pub severity: TraceSeverity,

    /// Human-readable event description
    pub message: String,

    /// Name of the node that emitted the trace
    pub origin: String,

    /// Structured event payload
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Append-only trace log. The only operations are append and clear.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TraceLog {
    entries: Vec<NodeTrace>,
}

impl TraceLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn append(&mut self, trace: NodeTrace) {
        self.entries.push(trace);
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries in the log
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of all entries, in emission order
    pub fn snapshot(&self) -> Vec<NodeTrace> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trace(message: &str) -> NodeTrace {
        NodeTrace {
            timestamp: Utc::now(),
            severity: TraceSeverity::Info,
            message: message.to_string(),
            origin: "node-1".to_string(),
            payload: json!({ "k": 1 }),
        }
    }

    #[test]
    fn test_append_preserves_order() {
        let mut log = TraceLog::new();
        log.append(trace("first"));
        log.append(trace("second"));

        let entries = log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[1].message, "second");
    }

    #[test]
    fn test_clear_empties_log() {
        let mut log = TraceLog::new();
        log.append(trace("entry"));
        assert!(!log.is_empty());

        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn test_severity_wire_names() {
        assert_eq!(
            serde_json::to_string(&TraceSeverity::Warning).unwrap(),
            "\"warning\""
        );
    }
}
