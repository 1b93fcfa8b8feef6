//! Compression configuration for node payloads.
//!
//! The configuration is carried as metadata only: nodes report and
//! broadcast it, but no codec runs inside the simulation core.

use serde::{Deserialize, Serialize};

/// Default compression level (gzip scale)
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Default minimum payload size before compression would apply, in bytes
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;

/// Compression algorithm carried in node metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    /// Gzip (levels 1-9)
    Gzip,
    /// LZ4 (levels 1-16)
    Lz4,
    /// No compression
    None,
}

impl Default for CompressionAlgorithm {
    fn default() -> Self {
        CompressionAlgorithm::Gzip
    }
}

/// Compression settings for a cluster node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Whether compression is enabled
    pub enabled: bool,

    /// Algorithm to use
    pub algorithm: CompressionAlgorithm,

    /// Compression level
    pub level: u32,

    /// Minimum payload size for compression to apply, in bytes
    pub threshold_bytes: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        CompressionConfig {
            enabled: false,
            algorithm: CompressionAlgorithm::Gzip,
            level: DEFAULT_COMPRESSION_LEVEL,
            threshold_bytes: DEFAULT_COMPRESSION_THRESHOLD,
        }
    }
}

impl CompressionConfig {
    /// Whether a payload of `size` bytes would be compressed under this
    /// configuration
    pub fn would_compress(&self, size: usize) -> bool {
        self.enabled && size >= self.threshold_bytes
    }

    /// Shallow-merge a partial update into this configuration
    pub fn apply(&mut self, update: &CompressionConfigUpdate) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(algorithm) = update.algorithm {
            self.algorithm = algorithm;
        }
        if let Some(level) = update.level {
            self.level = level;
        }
        if let Some(threshold_bytes) = update.threshold_bytes {
            self.threshold_bytes = threshold_bytes;
        }
    }
}

/// Partial update for [`CompressionConfig`]; absent fields preserve the
/// current values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfigUpdate {
    /// Enable or disable compression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// New algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<CompressionAlgorithm>,

    /// New level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,

    /// New size threshold in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_bytes: Option<usize>,
}

impl CompressionConfigUpdate {
    /// A full replacement expressed as an update
    pub fn from_config(config: CompressionConfig) -> Self {
        CompressionConfigUpdate {
            enabled: Some(config.enabled),
            algorithm: Some(config.algorithm),
            level: Some(config.level),
            threshold_bytes: Some(config.threshold_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompressionConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.algorithm, CompressionAlgorithm::Gzip);
        assert_eq!(config.level, DEFAULT_COMPRESSION_LEVEL);
        assert_eq!(config.threshold_bytes, DEFAULT_COMPRESSION_THRESHOLD);
    }

    #[test]
    fn test_would_compress_respects_threshold() {
        let config = CompressionConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(config.would_compress(2048));
        assert!(!config.would_compress(512));

        let disabled = CompressionConfig::default();
        assert!(!disabled.would_compress(1 << 20));
    }

    #[test]
    fn test_partial_update() {
        let mut config = CompressionConfig::default();
        config.apply(&CompressionConfigUpdate {
            enabled: Some(true),
            algorithm: Some(CompressionAlgorithm::Lz4),
            ..Default::default()
        });

        assert!(config.enabled);
        assert_eq!(config.algorithm, CompressionAlgorithm::Lz4);
        assert_eq!(config.level, DEFAULT_COMPRESSION_LEVEL);
    }

    #[test]
    fn test_algorithm_wire_names() {
        assert_eq!(
            serde_json::to_string(&CompressionAlgorithm::None).unwrap(),
            "\"none\""
        );
        let parsed: CompressionAlgorithm = serde_json::from_str("\"lz4\"").unwrap();
        assert_eq!(parsed, CompressionAlgorithm::Lz4);
    }
}
