/// In-memory record store with per-series locking
pub mod memory_store;

/// SQLite-backed record store
pub mod sqlite_store;

pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;

use crate::error::PersistenceError;
use crate::records::{SeriesSelector, TimeSeriesRecord, Timestamp};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Inclusive time interval used for store queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// The window of length `span` ending at `end`
    ///
    /// A span reaching past the earliest representable time starts there.
    pub fn ending_at(end: Timestamp, span: Duration) -> Self {
        Self {
            start: end.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC),
            end,
        }
    }

    pub fn contains(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// Per-series statistics reported by [`RecordStore::summary`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesSummary {
    /// Number of stored records
    pub count: usize,
    /// Timestamp of the newest record
    pub latest_timestamp: Option<Timestamp>,
}

/// Append-only time-series persistence consumed by the scheduler, the
/// correlation engine and the alert evaluator
///
/// Implementations must make `upsert` atomic per `(series_id, timestamp, source)`
/// key: concurrent writers of the same key store it exactly once, and writing
/// an already stored key is a no-op rather than an error.
///
/// Timestamps are kept at millisecond precision
/// ([`TimeSeriesRecord::stored_timestamp`]); records that differ only below a
/// millisecond share a key.
///
/// Calls may block on I/O. Async callers run them on the blocking pool.
pub trait RecordStore: Send + Sync {
    /// Store records, skipping keys that already exist
    ///
    /// Returns the number of records newly written.
    fn upsert(&self, records: &[TimeSeriesRecord]) -> Result<usize, PersistenceError>;

    /// Records of one series inside `range`, ascending by timestamp
    fn query(
        &self,
        series_id: &str,
        range: TimeRange,
    ) -> Result<Vec<TimeSeriesRecord>, PersistenceError>;

    /// Count and newest timestamp for every stored series
    fn summary(&self) -> Result<BTreeMap<String, SeriesSummary>, PersistenceError>;

    /// Ids of every stored series
    fn series_ids(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(self.summary()?.into_keys().collect())
    }

    /// Ids of the stored series matched by `selector`
    fn resolve(&self, selector: &SeriesSelector) -> Result<Vec<String>, PersistenceError> {
        match selector {
            SeriesSelector::Exact(id) => Ok(vec![id.clone()]),
            SeriesSelector::Prefix(_) => Ok(self
                .series_ids()?
                .into_iter()
                .filter(|id| selector.matches(id))
                .collect()),
        }
    }
}
