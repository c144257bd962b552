//! SQLite-backed record store
//!
//! Uniqueness of `(series_id, timestamp, source)` is enforced by the database
//! itself: the `records` table carries a UNIQUE constraint and writes use
//! `INSERT OR IGNORE`. Every operation opens its own connection, so concurrent
//! writers are arbitrated by SQLite rather than by a lock in this process.

use crate::error::PersistenceError;
use crate::records::{RecordValue, TimeSeriesRecord, Timestamp};
use crate::store::{RecordStore, SeriesSummary, TimeRange};
use chrono::{TimeZone, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OpenFlags, TransactionBehavior};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        series_id TEXT NOT NULL,
        ts_millis INTEGER NOT NULL,
        source TEXT NOT NULL,
        value TEXT NOT NULL,
        metadata TEXT NOT NULL,
        UNIQUE(series_id, ts_millis, source)
    );
    CREATE INDEX IF NOT EXISTS idx_records_series_ts ON records(series_id, ts_millis);
";

/// Record store persisted in a SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open (and create if needed) the database at `path`
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` when the file cannot be opened or the schema
    /// cannot be created. Callers treat this as a fatal startup error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout: Duration::from_secs(5),
        };

        let conn = store.connect()?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("SQLite journal mode: {}", mode);
        conn.execute_batch(SCHEMA)?;

        info!("SQLite record store ready at {}", store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, PersistenceError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| {
            PersistenceError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    fn from_millis(millis: i64) -> Result<Timestamp, PersistenceError> {
        Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
            PersistenceError::Unavailable(format!("invalid stored timestamp: {}", millis))
        })
    }
}

impl RecordStore for SqliteStore {
    fn upsert(&self, records: &[TimeSeriesRecord]) -> Result<usize, PersistenceError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO records (series_id, ts_millis, source, value, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in records {
                written += stmt.execute(params![
                    record.series_id,
                    record.timestamp.timestamp_millis(),
                    record.source,
                    serde_json::to_string(&record.value)?,
                    serde_json::to_string(&record.metadata)?,
                ])?;
            }
        }
        tx.commit()?;

        debug!("SqliteStore wrote {} of {} records", written, records.len());
        Ok(written)
    }

    fn query(
        &self,
        series_id: &str,
        range: TimeRange,
    ) -> Result<Vec<TimeSeriesRecord>, PersistenceError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT ts_millis, source, value, metadata FROM records
             WHERE series_id = ?1 AND ts_millis >= ?2 AND ts_millis <= ?3
             ORDER BY ts_millis ASC, source ASC",
        )?;

        let rows = stmt.query_map(
            params![
                series_id,
                range.start.timestamp_millis(),
                range.end.timestamp_millis()
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )?;

        let mut records = Vec::new();
        for row in rows {
            let (millis, source, value, metadata) = row?;
            let value: RecordValue = serde_json::from_str(&value)?;
            let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata)?;
            records.push(TimeSeriesRecord {
                series_id: series_id.to_string(),
                timestamp: Self::from_millis(millis)?,
                value,
                source,
                metadata,
            });
        }
        Ok(records)
    }

    fn summary(&self) -> Result<BTreeMap<String, SeriesSummary>, PersistenceError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT series_id, COUNT(*), MAX(ts_millis) FROM records GROUP BY series_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<i64>>(2)?,
            ))
        })?;

        let mut summary = BTreeMap::new();
        for row in rows {
            let (series_id, count, latest) = row?;
            summary.insert(
                series_id,
                SeriesSummary {
                    count: count as usize,
                    latest_timestamp: latest.map(Self::from_millis).transpose()?,
                },
            );
        }
        Ok(summary)
    }
}
