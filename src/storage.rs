//! JSON file persistence: sensor datasets with derived indexes, node
//! snapshots and simulation session state.
//!
//! Layout under the configured data directory:
//!
//! ```text
//! data/
//!   datasets/<dataset_id>.json
//!   indexes/<dataset_id>.index.json
//!   nodes.json
//!   simulations.json
//! ```
//!
//! Index entries are derived from a batch at save time and never edited
//! by hand; a re-save of the same dataset id regenerates its index.
//! Range queries consult the indexes first and only load batches whose
//! time range overlaps the requested window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{SimError, SimResult};
use crate::node::NodeSnapshot;
use crate::simulation::SimulationSnapshot;
use crate::telemetry::SensorReading;

const DATASETS_DIR: &str = "datasets";
const INDEXES_DIR: &str = "indexes";
const TELEMETRY_DIR: &str = "telemetry";
const NODES_FILE: &str = "nodes.json";
const SIMULATIONS_FILE: &str = "simulations.json";
const INDEX_SUFFIX: &str = ".index.json";

/// Inclusive time range covered by a dataset batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Timestamp of the first record
    pub start: DateTime<Utc>,
    /// Timestamp of the last record
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Whether this range overlaps the optionally-bounded query window
    pub fn overlaps(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> bool {
        start.map_or(true, |s| self.end >= s) && end.map_or(true, |e| self.start <= e)
    }
}

/// Derived summary of a persisted dataset batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetIndexEntry {
    /// Identifier of the batch this entry summarizes
    pub dataset_id: String,

    /// Time span of the batch; `None` for an empty batch
    pub time_range: Option<TimeRange>,

    /// Distinct PLC identifiers present, sorted ascending
    pub plc_ids: Vec<u32>,

    /// Number of records flagged anomalous
    pub anomaly_count: usize,

    /// Total number of records
    pub record_count: usize,
}

impl DatasetIndexEntry {
    /// Derive the index entry for a batch
    pub fn from_readings(dataset_id: impl Into<String>, readings: &[SensorReading]) -> Self {
        let time_range = match (readings.first(), readings.last()) {
            (Some(first), Some(last)) => Some(TimeRange {
                start: first.timestamp,
                end: last.timestamp,
            }),
            _ => None,
        };
        let plc_ids: BTreeSet<u32> = readings.iter().map(|r| r.plc_id).collect();

        DatasetIndexEntry {
            dataset_id: dataset_id.into(),
            time_range,
            plc_ids: plc_ids.into_iter().collect(),
            anomaly_count: readings.iter().filter(|r| r.anomaly).count(),
            record_count: readings.len(),
        }
    }
}

/// Filters for a dataset range query.
///
/// Time bounds are inclusive; absent bounds are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DatasetQuery {
    /// Earliest timestamp to include
    pub start: Option<DateTime<Utc>>,
    /// Latest timestamp to include
    pub end: Option<DateTime<Utc>>,
    /// Restrict to one PLC identifier
    pub plc_id: Option<u32>,
    /// Keep only anomalous readings
    pub only_anomalies: bool,
}

impl DatasetQuery {
    /// An unbounded query matching every reading
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the query from below
    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Bound the query from above
    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    /// Restrict to a single PLC
    pub fn plc_id(mut self, plc_id: u32) -> Self {
        self.plc_id = Some(plc_id);
        self
    }

    /// Keep only anomalous readings
    pub fn only_anomalies(mut self) -> Self {
        self.only_anomalies = true;
        self
    }

    /// Whether a single reading passes the fine-grained filters
    pub fn matches(&self, reading: &SensorReading) -> bool {
        if self.start.map_or(false, |s| reading.timestamp < s) {
            return false;
        }
        if self.end.map_or(false, |e| reading.timestamp > e) {
            return false;
        }
        if self.plc_id.map_or(false, |id| reading.plc_id != id) {
            return false;
        }
        if self.only_anomalies && !reading.anomaly {
            return false;
        }
        true
    }
}

/// Persistence seam for sensor dataset batches
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Persist a batch and regenerate its index entry
    async fn save_dataset(
        &self,
        dataset_id: &str,
        readings: &[SensorReading],
    ) -> SimResult<DatasetIndexEntry>;

    /// Load a full batch by identifier
    async fn load_dataset(&self, dataset_id: &str) -> SimResult<Vec<SensorReading>>;

    /// Load every index entry
    async fn load_indexes(&self) -> SimResult<Vec<DatasetIndexEntry>>;

    /// Run a range query: filter batches by index overlap, then apply
    /// the fine-grained filters to the overlapping batches only.
    /// Results are sorted by timestamp ascending. A window whose start
    /// lies after its end is rejected before any batch is touched.
    async fn query(&self, query: &DatasetQuery) -> SimResult<Vec<SensorReading>> {
        if let (Some(start), Some(end)) = (query.start, query.end) {
            if end < start {
                return Err(SimError::InvalidRange { start, end });
            }
        }
        let indexes = self.load_indexes().await?;
        let relevant: Vec<String> = indexes
            .into_iter()
            .filter(|entry| {
                entry
                    .time_range
                    .map_or(false, |range| range.overlaps(query.start, query.end))
            })
            .map(|entry| entry.dataset_id)
            .collect();
        debug!("query touches {} dataset(s)", relevant.len());

        let batches =
            try_join_all(relevant.iter().map(|id| self.load_dataset(id))).await?;

        let mut results: Vec<SensorReading> = batches
            .into_iter()
            .flatten()
            .filter(|reading| query.matches(reading))
            .collect();
        results.sort_by_key(|reading| reading.timestamp);
        Ok(results)
    }
}

/// File-backed store rooted at the simulation data directory
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store at `root`, creating the directory layout
    pub async fn new(root: impl Into<PathBuf>) -> SimResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(DATASETS_DIR)).await?;
        fs::create_dir_all(root.join(INDEXES_DIR)).await?;
        fs::create_dir_all(root.join(TELEMETRY_DIR)).await?;
        info!("file store opened at {}", root.display());
        Ok(FileStore { root })
    }

    /// Root directory of this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dataset_path(&self, dataset_id: &str) -> PathBuf {
        self.root
            .join(DATASETS_DIR)
            .join(format!("{dataset_id}.json"))
    }

    fn index_path(&self, dataset_id: &str) -> PathBuf {
        self.root
            .join(INDEXES_DIR)
            .join(format!("{dataset_id}{INDEX_SUFFIX}"))
    }

    /// Persist the node snapshots of a registry
    pub async fn save_nodes(&self, snapshots: &[NodeSnapshot]) -> SimResult<()> {
        let content = serde_json::to_vec_pretty(snapshots)?;
        fs::write(self.root.join(NODES_FILE), content).await?;
        info!("saved {} node snapshot(s)", snapshots.len());
        Ok(())
    }

    /// Load node snapshots; a missing file yields an empty list
    pub async fn load_nodes(&self) -> SimResult<Vec<NodeSnapshot>> {
        match fs::read(self.root.join(NODES_FILE)).await {
            Ok(content) => Ok(serde_json::from_slice(&content)?),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("no nodes file found, starting with an empty registry");
                Ok(Vec::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Persist one telemetry snapshot for a running simulation.
    ///
    /// Snapshot files are named `<simulation>_<millis>.json` so loading
    /// can filter by simulation name prefix.
    pub async fn save_telemetry(&self, simulation: &str, reading: &SensorReading) -> SimResult<()> {
        let file = format!("{simulation}_{}.json", reading.timestamp.timestamp_millis());
        let content = serde_json::to_vec_pretty(reading)?;
        fs::write(self.root.join(TELEMETRY_DIR).join(file), content).await?;
        debug!("telemetry snapshot saved for {simulation}");
        Ok(())
    }

    /// Load every telemetry snapshot recorded for a simulation,
    /// sorted by timestamp ascending
    pub async fn load_telemetry(&self, simulation: &str) -> SimResult<Vec<SensorReading>> {
        let prefix = format!("{simulation}_");
        let mut readings = Vec::new();
        let mut dir = fs::read_dir(self.root.join(TELEMETRY_DIR)).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(&prefix) || !name.ends_with(".json") {
                continue;
            }
            let content = fs::read(entry.path()).await?;
            readings.push(serde_json::from_slice(&content)?);
        }
        readings.sort_by_key(|reading: &SensorReading| reading.timestamp);
        Ok(readings)
    }

    /// Persist simulation session state
    pub async fn save_simulations(&self, snapshots: &[SimulationSnapshot]) -> SimResult<()> {
        let content = serde_json::to_vec_pretty(snapshots)?;
        fs::write(self.root.join(SIMULATIONS_FILE), content).await?;
        info!("saved {} simulation snapshot(s)", snapshots.len());
        Ok(())
    }

    /// Load simulation session state; a missing file yields an empty list
    pub async fn load_simulations(&self) -> SimResult<Vec<SimulationSnapshot>> {
        match fs::read(self.root.join(SIMULATIONS_FILE)).await {
            Ok(content) => Ok(serde_json::from_slice(&content)?),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("no simulations file found, starting with an empty list");
                Ok(Vec::new())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl DatasetStore for FileStore {
    async fn save_dataset(
        &self,
        dataset_id: &str,
        readings: &[SensorReading],
    ) -> SimResult<DatasetIndexEntry> {
        let content = serde_json::to_vec_pretty(readings)?;
        fs::write(self.dataset_path(dataset_id), content).await?;

        let entry = DatasetIndexEntry::from_readings(dataset_id, readings);
        let index_content = serde_json::to_vec_pretty(&entry)?;
        fs::write(self.index_path(dataset_id), index_content).await?;

        info!(
            "dataset {dataset_id} saved: {} record(s), {} anomalie(s)",
            entry.record_count, entry.anomaly_count
        );
        Ok(entry)
    }

    async fn load_dataset(&self, dataset_id: &str) -> SimResult<Vec<SensorReading>> {
        match fs::read(self.dataset_path(dataset_id)).await {
            Ok(content) => Ok(serde_json::from_slice(&content)?),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(SimError::DatasetNotFound(dataset_id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn load_indexes(&self) -> SimResult<Vec<DatasetIndexEntry>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(self.root.join(INDEXES_DIR)).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(INDEX_SUFFIX) {
                continue;
            }
            let content = fs::read(entry.path()).await?;
            entries.push(serde_json::from_slice(&content)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn reading(secs: i64, plc_id: u32, anomaly: bool) -> SensorReading {
        SensorReading {
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            plc_id,
            phase: 0,
            values: BTreeMap::from([("s1".to_string(), 1.0)]),
            anomaly,
        }
    }

    #[test]
    fn test_index_derivation() {
        let readings = vec![
            reading(0, 1, false),
            reading(30, 0, true),
            reading(60, 1, true),
        ];
        let entry = DatasetIndexEntry::from_readings("batch-1", &readings);

        let range = entry.time_range.unwrap();
        assert_eq!(range.start, Utc.timestamp_opt(0, 0).unwrap());
        assert_eq!(range.end, Utc.timestamp_opt(60, 0).unwrap());
        assert_eq!(entry.plc_ids, vec![0, 1]);
        assert_eq!(entry.anomaly_count, 2);
        assert_eq!(entry.record_count, 3);
    }

    #[test]
    fn test_empty_batch_has_no_time_range() {
        let entry = DatasetIndexEntry::from_readings("empty", &[]);
        assert!(entry.time_range.is_none());
        assert_eq!(entry.record_count, 0);
        assert!(entry.plc_ids.is_empty());
    }

    #[test]
    fn test_time_range_overlap() {
        let range = TimeRange {
            start: Utc.timestamp_opt(100, 0).unwrap(),
            end: Utc.timestamp_opt(200, 0).unwrap(),
        };

        assert!(range.overlaps(None, None));
        assert!(range.overlaps(Some(Utc.timestamp_opt(150, 0).unwrap()), None));
        assert!(range.overlaps(None, Some(Utc.timestamp_opt(100, 0).unwrap())));
        assert!(!range.overlaps(Some(Utc.timestamp_opt(201, 0).unwrap()), None));
        assert!(!range.overlaps(None, Some(Utc.timestamp_opt(99, 0).unwrap())));
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        let readings = vec![reading(0, 0, false), reading(30, 0, true)];

        let entry = store.save_dataset("batch", &readings).await.unwrap();
        assert_eq!(entry.record_count, 2);

        let loaded = store.load_dataset("batch").await.unwrap();
        assert_eq!(loaded, readings);

        let indexes = store.load_indexes().await.unwrap();
        assert_eq!(indexes, vec![entry]);
    }

    #[tokio::test]
    async fn test_missing_dataset_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();

        let result = store.load_dataset("nope").await;
        assert!(matches!(result, Err(SimError::DatasetNotFound(id)) if id == "nope"));
    }

    #[tokio::test]
    async fn test_query_skips_non_overlapping_batches() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();

        store
            .save_dataset("early", &[reading(0, 0, false), reading(30, 0, false)])
            .await
            .unwrap();
        store
            .save_dataset("late", &[reading(1000, 0, true), reading(1030, 1, false)])
            .await
            .unwrap();

        let query = DatasetQuery::new()
            .start(Utc.timestamp_opt(900, 0).unwrap())
            .end(Utc.timestamp_opt(1100, 0).unwrap());
        let results = store.query(&query).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.timestamp.timestamp() >= 1000));
    }

    #[tokio::test]
    async fn test_backwards_query_window_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        store
            .save_dataset("batch", &[reading(0, 0, false)])
            .await
            .unwrap();

        let query = DatasetQuery::new()
            .start(Utc.timestamp_opt(200, 0).unwrap())
            .end(Utc.timestamp_opt(100, 0).unwrap());
        let result = store.query(&query).await;
        assert!(matches!(result, Err(SimError::InvalidRange { .. })));
    }

    #[tokio::test]
    async fn test_query_fine_filters_and_ordering() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();

        store
            .save_dataset(
                "b1",
                &[reading(60, 0, true), reading(90, 1, true), reading(120, 0, false)],
            )
            .await
            .unwrap();
        store
            .save_dataset("b2", &[reading(0, 0, true)])
            .await
            .unwrap();

        let query = DatasetQuery::new().plc_id(0).only_anomalies();
        let results = store.query(&query).await.unwrap();

        let times: Vec<i64> = results.iter().map(|r| r.timestamp.timestamp()).collect();
        assert_eq!(times, vec![0, 60]);
        assert!(results.iter().all(|r| r.plc_id == 0 && r.anomaly));
    }

    #[tokio::test]
    async fn test_telemetry_snapshots_filtered_by_simulation() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();

        store
            .save_telemetry("alpha", &reading(30, 0, false))
            .await
            .unwrap();
        store
            .save_telemetry("alpha", &reading(0, 0, false))
            .await
            .unwrap();
        store
            .save_telemetry("beta", &reading(60, 0, false))
            .await
            .unwrap();

        let loaded = store.load_telemetry("alpha").await.unwrap();
        let times: Vec<i64> = loaded.iter().map(|r| r.timestamp.timestamp()).collect();
        assert_eq!(times, vec![0, 30]);
    }

    #[tokio::test]
    async fn test_nodes_round_trip_and_missing_file() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();

        assert!(store.load_nodes().await.unwrap().is_empty());

        let snapshot = NodeSnapshot {
            config: crate::node::NodeConfig::new("n1"),
            traces: Vec::new(),
        };
        store.save_nodes(&[snapshot]).await.unwrap();

        let loaded = store.load_nodes().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].config.name, "n1");
    }
}
