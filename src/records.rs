//! Core record types for the profitability monitor
//!
//! This module defines the fundamental data structures used throughout the application
//! for representing collected time-series records, collector categories, series
//! selectors and alert severities.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// Identity of a stored record: `(series_id, timestamp, source)`
pub type RecordKey = (String, Timestamp, String);

/// Value carried by a time-series record
///
/// Most indicators are plain numbers (a price, a yield). News items and filings
/// carry a structured payload instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RecordValue {
    /// Scalar measurement
    Number(f64),
    /// Structured document such as a news article or filing summary
    Payload(serde_json::Value),
}

impl RecordValue {
    /// Numeric view of the value
    ///
    /// Payloads expose a number when they carry a numeric `value` field.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RecordValue::Number(value) => Some(*value).filter(|v| v.is_finite()),
            RecordValue::Payload(payload) => payload
                .get("value")
                .and_then(|v| v.as_f64())
                .filter(|v| v.is_finite()),
        }
    }

    /// Flatten the value into searchable text
    pub fn text(&self) -> String {
        match self {
            RecordValue::Number(value) => value.to_string(),
            RecordValue::Payload(payload) => collect_text(payload),
        }
    }
}

fn collect_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(collect_text)
            .collect::<Vec<_>>()
            .join(" "),
        serde_json::Value::Object(map) => map
            .values()
            .map(collect_text)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

/// A single observation of one series from one source
///
/// Records are immutable once stored. The triple `(series_id, timestamp, source)`
/// identifies a record; storing the same triple twice is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSeriesRecord {
    /// Series the record belongs to, e.g. `treasury:10y`
    pub series_id: String,
    /// When the observation was made
    pub timestamp: Timestamp,
    /// Observed value
    pub value: RecordValue,
    /// Data source that produced the record, e.g. `yahoo_finance_^TNX`
    pub source: String,
    /// Free-form attributes (filing type, hardware type, impact level, ...)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TimeSeriesRecord {
    /// Create a numeric record without metadata
    pub fn number(series_id: &str, timestamp: Timestamp, value: f64, source: &str) -> Self {
        Self {
            series_id: series_id.to_string(),
            timestamp,
            value: RecordValue::Number(value),
            source: source.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    /// Create a record carrying a structured payload
    pub fn payload(
        series_id: &str,
        timestamp: Timestamp,
        payload: serde_json::Value,
        source: &str,
    ) -> Self {
        Self {
            series_id: series_id.to_string(),
            timestamp,
            value: RecordValue::Payload(payload),
            source: source.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata attribute
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Timestamp as kept by record stores, truncated to whole milliseconds
    pub fn stored_timestamp(&self) -> Timestamp {
        self.timestamp.trunc_subsecs(3)
    }

    /// Identity key used for idempotent storage
    pub fn key(&self) -> RecordKey {
        (
            self.series_id.clone(),
            self.stored_timestamp(),
            self.source.clone(),
        )
    }
}

/// Collector category, each with its own collection cadence
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Cloud GPU rental prices
    GpuPricing,
    /// Treasury yields, energy futures and interest rates
    FinancialMarkets,
    /// Hardware and energy market news
    News,
    /// SEC filings
    Filings,
}

impl Category {
    /// All categories in scheduling order
    pub const ALL: [Category; 4] = [
        Category::GpuPricing,
        Category::FinancialMarkets,
        Category::News,
        Category::Filings,
    ];

    /// Series-id families owned by this category
    pub fn series_families(&self) -> &'static [&'static str] {
        match self {
            Category::GpuPricing => &["gpu_pricing:"],
            Category::FinancialMarkets => &["treasury:", "energy:", "rates:"],
            Category::News => &["news:"],
            Category::Filings => &["sec_filings:"],
        }
    }

    /// Whether a series id belongs to this category
    pub fn owns_series(&self, series_id: &str) -> bool {
        self.series_families()
            .iter()
            .any(|family| series_id.starts_with(family))
    }

    /// Category owning a series id, if any
    pub fn for_series(series_id: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|category| category.owns_series(series_id))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::GpuPricing => "gpu_pricing",
            Category::FinancialMarkets => "financial_markets",
            Category::News => "news",
            Category::Filings => "filings",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selects one series by id, or a family of series by a trailing `*`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(from = "String", into = "String")]
pub enum SeriesSelector {
    /// Exactly this series id
    Exact(String),
    /// Every series id starting with this prefix
    Prefix(String),
}

impl SeriesSelector {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => SeriesSelector::Prefix(prefix.to_string()),
            None => SeriesSelector::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, series_id: &str) -> bool {
        match self {
            SeriesSelector::Exact(id) => id == series_id,
            SeriesSelector::Prefix(prefix) => series_id.starts_with(prefix.as_str()),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, SeriesSelector::Prefix(_))
    }
}

impl From<String> for SeriesSelector {
    fn from(pattern: String) -> Self {
        SeriesSelector::parse(&pattern)
    }
}

impl From<SeriesSelector> for String {
    fn from(selector: SeriesSelector) -> Self {
        selector.to_string()
    }
}

impl fmt::Display for SeriesSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesSelector::Exact(id) => f.write_str(id),
            SeriesSelector::Prefix(prefix) => write!(f, "{}*", prefix),
        }
    }
}

/// Severity level assigned to an alert rule
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth knowing, no action required
    Low,
    /// May require attention
    Medium,
    /// Directly affects profitability
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(label)
    }
}
