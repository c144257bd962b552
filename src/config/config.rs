use crate::alerts::rules::MAX_WINDOW_HOURS;
use crate::alerts::{builtin_rules, AlertRule, AlertThresholds};
use crate::analysis::{default_pairs, CorrelationSettings, SeriesPair};
use crate::error::ConfigError;
use crate::records::{Category, SeriesSelector};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest accepted collection interval, one year
pub const MAX_INTERVAL_MINUTES: u64 = 525_600;

/// Longest accepted analysis window
pub const MAX_DAYS_BACK: u32 = 36_500;

/// Longest accepted collector timeout, one day
pub const MAX_COLLECTOR_TIMEOUT_SECONDS: u64 = 86_400;

/// What the binary does after startup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Run every collector once
    #[default]
    Single,
    /// All categories at one fixed interval
    Continuous,
    /// Each category at its own cadence
    Scheduled,
    /// Print what the store holds
    Summary,
    /// Print the correlation report
    Analyze,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub collection: CollectionConfig,
    pub schedule: ScheduleConfig,
    pub storage: StorageConfig,
    pub analysis: AnalysisConfig,
    pub alerts: AlertsConfig,
    /// File-fed collector adapters
    pub collectors: Vec<CollectorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectionConfig {
    pub mode: RunMode,
    /// Interval between cycles in continuous mode
    pub interval_minutes: u64,
    pub collector_timeout_seconds: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Single,
            interval_minutes: 60,
            collector_timeout_seconds: 120,
        }
    }
}

impl CollectionConfig {
    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.interval_minutes as i64)
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_secs(self.collector_timeout_seconds)
    }
}

/// Per-category cadences used in scheduled mode, in minutes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub gpu_pricing_minutes: u64,
    pub financial_markets_minutes: u64,
    pub news_minutes: u64,
    pub filings_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            gpu_pricing_minutes: 15,
            financial_markets_minutes: 15,
            news_minutes: 60,
            filings_minutes: 240,
        }
    }
}

impl ScheduleConfig {
    pub fn minutes(&self, category: Category) -> u64 {
        match category {
            Category::GpuPricing => self.gpu_pricing_minutes,
            Category::FinancialMarkets => self.financial_markets_minutes,
            Category::News => self.news_minutes,
            Category::Filings => self.filings_minutes,
        }
    }

    pub fn intervals(&self) -> BTreeMap<Category, chrono::Duration> {
        Category::ALL
            .iter()
            .map(|category| {
                (
                    *category,
                    chrono::Duration::minutes(self.minutes(*category) as i64),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite database file
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from("profitwatch.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub days_back: u32,
    pub min_sample_size: usize,
    pub alignment_tolerance_minutes: u32,
    pub pairs: Vec<(SeriesSelector, SeriesSelector)>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            days_back: 30,
            min_sample_size: 10,
            alignment_tolerance_minutes: 30,
            pairs: default_pairs().into_iter().map(|p| (p.a, p.b)).collect(),
        }
    }
}

impl AnalysisConfig {
    pub fn settings(&self) -> CorrelationSettings {
        CorrelationSettings {
            min_sample_size: self.min_sample_size,
            alignment_tolerance: chrono::Duration::minutes(self.alignment_tolerance_minutes as i64),
            pairs: self
                .pairs
                .iter()
                .map(|(a, b)| SeriesPair {
                    a: a.clone(),
                    b: b.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertsConfig {
    pub enabled: bool,
    pub default_cooldown_minutes: u32,
    pub gpu_price_spike_percent: f64,
    pub treasury_yield_spike_bps: f64,
    pub natural_gas_spike_percent: f64,
    pub fed_rate_change_bps: f64,
    pub window_hours: u32,
    /// Per-rule cooldown overrides in minutes
    pub cooldowns: BTreeMap<String, u32>,
    /// Additional rules evaluated alongside the built-in ones
    pub custom: Vec<AlertRule>,
    /// Optional JSON-lines file receiving every raised and resolved alert
    pub log_path: Option<PathBuf>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        let thresholds = AlertThresholds::default();
        Self {
            enabled: true,
            default_cooldown_minutes: thresholds.default_cooldown_minutes,
            gpu_price_spike_percent: thresholds.gpu_price_spike_percent,
            treasury_yield_spike_bps: thresholds.treasury_yield_spike_bps,
            natural_gas_spike_percent: thresholds.natural_gas_spike_percent,
            fed_rate_change_bps: thresholds.fed_rate_change_bps,
            window_hours: thresholds.window_hours,
            cooldowns: BTreeMap::new(),
            custom: Vec::new(),
            log_path: None,
        }
    }
}

impl AlertsConfig {
    pub fn thresholds(&self) -> AlertThresholds {
        AlertThresholds {
            gpu_price_spike_percent: self.gpu_price_spike_percent,
            treasury_yield_spike_bps: self.treasury_yield_spike_bps,
            natural_gas_spike_percent: self.natural_gas_spike_percent,
            fed_rate_change_bps: self.fed_rate_change_bps,
            window_hours: self.window_hours,
            default_cooldown_minutes: self.default_cooldown_minutes,
            cooldowns: self.cooldowns.clone(),
        }
    }

    /// Built-in rules with configured thresholds, followed by custom rules
    pub fn rules(&self) -> Vec<AlertRule> {
        let mut rules = builtin_rules(&self.thresholds());
        rules.extend(self.custom.iter().cloned());
        rules
    }
}

/// One file-fed collector adapter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectorConfig {
    pub name: String,
    pub category: Category,
    /// JSON feed written by the external scraper
    pub path: PathBuf,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Errors
    ///
    /// * `ReadError` - the file does not exist or cannot be read
    /// * `ParseError` - the file is not valid TOML for this structure
    /// * `ValidationError` - a value is out of range
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string without validating it
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load the configuration file if given, falling back to defaults when it is missing
    ///
    /// A file that exists but cannot be parsed or fails validation is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                match Self::from_file(path) {
                    Err(ConfigError::ReadError(reason)) => {
                        warn!("Configuration file not readable ({}), using defaults", reason);
                        Ok(Self::default())
                    }
                    other => other,
                }
            }
            None => {
                info!("Using default configuration");
                Ok(Self::default())
            }
        }
    }

    /// Check value ranges and cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::ValidationError(message));

        if !(1..=MAX_INTERVAL_MINUTES).contains(&self.collection.interval_minutes) {
            return invalid(format!(
                "collection.interval_minutes must be between 1 and {}",
                MAX_INTERVAL_MINUTES
            ));
        }
        if !(1..=MAX_COLLECTOR_TIMEOUT_SECONDS).contains(&self.collection.collector_timeout_seconds)
        {
            return invalid(format!(
                "collection.collector_timeout_seconds must be between 1 and {}",
                MAX_COLLECTOR_TIMEOUT_SECONDS
            ));
        }
        for category in Category::ALL {
            if !(1..=MAX_INTERVAL_MINUTES).contains(&self.schedule.minutes(category)) {
                return invalid(format!(
                    "schedule.{}_minutes must be between 1 and {}",
                    category, MAX_INTERVAL_MINUTES
                ));
            }
        }

        if self.storage.backend == StorageBackend::Sqlite
            && self.storage.path.as_os_str().is_empty()
        {
            return invalid("storage.path cannot be empty for the sqlite backend".to_string());
        }

        if !(1..=MAX_DAYS_BACK).contains(&self.analysis.days_back) {
            return invalid(format!(
                "analysis.days_back must be between 1 and {}",
                MAX_DAYS_BACK
            ));
        }
        if self.analysis.alignment_tolerance_minutes as u64 > MAX_INTERVAL_MINUTES {
            return invalid(format!(
                "analysis.alignment_tolerance_minutes must be at most {}",
                MAX_INTERVAL_MINUTES
            ));
        }
        if self.analysis.min_sample_size < 3 {
            return invalid("analysis.min_sample_size must be at least 3".to_string());
        }

        let alerts = &self.alerts;
        if alerts
            .log_path
            .as_ref()
            .is_some_and(|path| path.as_os_str().is_empty())
        {
            return invalid("alerts.log_path cannot be empty".to_string());
        }
        for (field, value) in [
            ("gpu_price_spike_percent", alerts.gpu_price_spike_percent),
            ("treasury_yield_spike_bps", alerts.treasury_yield_spike_bps),
            ("natural_gas_spike_percent", alerts.natural_gas_spike_percent),
            ("fed_rate_change_bps", alerts.fed_rate_change_bps),
        ] {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!("alerts.{} must be a non-negative number", field));
            }
        }
        if !(1..=MAX_WINDOW_HOURS).contains(&alerts.window_hours) {
            return invalid(format!(
                "alerts.window_hours must be between 1 and {}",
                MAX_WINDOW_HOURS
            ));
        }

        let mut rule_names = HashSet::new();
        for rule in alerts.rules() {
            rule.validate().map_err(ConfigError::ValidationError)?;
            if !rule_names.insert(rule.name.clone()) {
                return invalid(format!("duplicate alert rule name '{}'", rule.name));
            }
        }

        let mut collector_names = HashSet::new();
        for collector in &self.collectors {
            if collector.name.trim().is_empty() {
                return invalid("collector name cannot be empty".to_string());
            }
            if collector.path.as_os_str().is_empty() {
                return invalid(format!("collector '{}' has an empty path", collector.name));
            }
            if !collector_names.insert(collector.name.as_str()) {
                return invalid(format!("duplicate collector name '{}'", collector.name));
            }
        }

        Ok(())
    }
}
