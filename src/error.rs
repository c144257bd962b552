use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while a collector fetches records from its source
#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("Source unreachable: {0}")]
    Unreachable(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Rate limited by source: {0}")]
    RateLimited(String),

    #[error("Collector timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur when writing to or reading from the record store
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store lock poisoned: {0}")]
    Poisoned(String),
}

/// Errors that can occur while computing correlations
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Insufficient data for {series_a} vs {series_b}: {actual} aligned points, {required} required")]
    InsufficientData {
        series_a: String,
        series_b: String,
        required: usize,
        actual: usize,
    },

    #[error("Series has no variance: {0}")]
    DegenerateSeries(String),

    #[error("Malformed series: {0}")]
    MalformedSeries(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Errors that can occur while evaluating rules or delivering alerts
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to send notification: {0}")]
    NotificationFailed(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
