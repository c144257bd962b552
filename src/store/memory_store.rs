//! In-memory record store
//!
//! Records are sharded by series id. Each shard has its own mutex, and the outer
//! map lock is only held long enough to find or create a shard, so writers of
//! unrelated series never wait on each other.

use crate::error::PersistenceError;
use crate::records::{TimeSeriesRecord, Timestamp};
use crate::store::{RecordStore, SeriesSummary, TimeRange};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

/// Records of one series keyed by `(timestamp, source)`
type Shard = BTreeMap<(Timestamp, String), TimeSeriesRecord>;

/// Volatile record store used for tests and for runs without a database
#[derive(Debug, Default)]
pub struct MemoryStore {
    shards: RwLock<HashMap<String, Arc<Mutex<Shard>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the shard for a series, creating it on first write
    fn shard(&self, series_id: &str) -> Result<Arc<Mutex<Shard>>, PersistenceError> {
        {
            let shards = self
                .shards
                .read()
                .map_err(|e| PersistenceError::Poisoned(e.to_string()))?;
            if let Some(shard) = shards.get(series_id) {
                return Ok(Arc::clone(shard));
            }
        }

        let mut shards = self
            .shards
            .write()
            .map_err(|e| PersistenceError::Poisoned(e.to_string()))?;
        Ok(Arc::clone(shards.entry(series_id.to_string()).or_default()))
    }

    /// Existing shard for a series without creating one
    fn existing_shard(&self, series_id: &str) -> Result<Option<Arc<Mutex<Shard>>>, PersistenceError> {
        let shards = self
            .shards
            .read()
            .map_err(|e| PersistenceError::Poisoned(e.to_string()))?;
        Ok(shards.get(series_id).cloned())
    }
}

impl RecordStore for MemoryStore {
    fn upsert(&self, records: &[TimeSeriesRecord]) -> Result<usize, PersistenceError> {
        // Group first so each shard lock is taken once per call
        let mut by_series: BTreeMap<&str, Vec<&TimeSeriesRecord>> = BTreeMap::new();
        for record in records {
            by_series
                .entry(record.series_id.as_str())
                .or_default()
                .push(record);
        }

        let mut written = 0;
        for (series_id, series_records) in by_series {
            let shard = self.shard(series_id)?;
            let mut shard = shard
                .lock()
                .map_err(|e| PersistenceError::Poisoned(e.to_string()))?;

            for record in series_records {
                let timestamp = record.stored_timestamp();
                let key = (timestamp, record.source.clone());
                if shard.contains_key(&key) {
                    continue;
                }
                let mut stored = record.clone();
                stored.timestamp = timestamp;
                shard.insert(key, stored);
                written += 1;
            }
        }

        debug!("MemoryStore wrote {} of {} records", written, records.len());
        Ok(written)
    }

    fn query(
        &self,
        series_id: &str,
        range: TimeRange,
    ) -> Result<Vec<TimeSeriesRecord>, PersistenceError> {
        let Some(shard) = self.existing_shard(series_id)? else {
            return Ok(Vec::new());
        };
        let shard = shard
            .lock()
            .map_err(|e| PersistenceError::Poisoned(e.to_string()))?;

        Ok(shard
            .values()
            .filter(|record| range.contains(record.timestamp))
            .cloned()
            .collect())
    }

    fn summary(&self) -> Result<BTreeMap<String, SeriesSummary>, PersistenceError> {
        let shards: Vec<(String, Arc<Mutex<Shard>>)> = {
            let shards = self
                .shards
                .read()
                .map_err(|e| PersistenceError::Poisoned(e.to_string()))?;
            shards
                .iter()
                .map(|(id, shard)| (id.clone(), Arc::clone(shard)))
                .collect()
        };

        let mut summary = BTreeMap::new();
        for (series_id, shard) in shards {
            let shard = shard
                .lock()
                .map_err(|e| PersistenceError::Poisoned(e.to_string()))?;
            if shard.is_empty() {
                continue;
            }
            summary.insert(
                series_id,
                SeriesSummary {
                    count: shard.len(),
                    latest_timestamp: shard.keys().next_back().map(|(ts, _)| *ts),
                },
            );
        }
        Ok(summary)
    }
}
