/// Pair correlation over stored series and the report built from it
pub mod correlation;

/// Fixed exposure table for known series
pub mod risk;

/// Alignment, Pearson coefficient and significance testing
pub mod statistics;

pub use correlation::{
    default_pairs, CorrelationEngine, CorrelationReport, CorrelationResult, CorrelationSettings,
    SeriesPair, SkippedPair,
};
pub use risk::{risk_factor, RiskFactor};
pub use statistics::Strength;
