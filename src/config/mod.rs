#[allow(clippy::module_inception)]
mod config;

pub use config::{
    AlertsConfig, AnalysisConfig, CollectionConfig, CollectorConfig, Config, RunMode,
    ScheduleConfig, StorageBackend, StorageConfig,
};
