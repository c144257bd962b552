/// Error types for collection, persistence, analysis and alerting
pub mod error;

/// Normalized time-series records and series selectors
pub mod records;

/// Record store trait with in-memory and SQLite backends
pub mod store;

/// Collector adapters for external data sources
pub mod collectors;

/// Collection cycles, per-category schedules and run modes
pub mod scheduler;

/// Cross-series correlation analysis
pub mod analysis;

/// Alert rules, evaluation and notification sinks
pub mod alerts;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use alerts::{AlertEvaluator, AlertEvent, AlertRule, NotificationSink};
pub use analysis::{CorrelationEngine, CorrelationReport};
pub use collectors::CollectorAdapter;
pub use config::{Config, RunMode};
pub use error::{AlertError, AnalysisError, CollectionError, ConfigError, PersistenceError};
pub use records::{Category, RecordValue, SeriesSelector, Severity, TimeSeriesRecord, Timestamp};
pub use scheduler::{Cadence, CollectionCycleReport, Orchestrator};
pub use store::{MemoryStore, RecordStore, SqliteStore};
