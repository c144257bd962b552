use crate::records::{SeriesSelector, Severity};
use serde::Serialize;
use std::fmt;

/// Known exposure of the business to one series
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskFactor {
    pub series: String,
    pub severity: Severity,
    pub description: &'static str,
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} RISK ({}): {}",
            self.severity.to_string().to_uppercase(),
            self.series,
            self.description
        )
    }
}

const RISK_TABLE: &[(&str, Severity, &str)] = &[
    (
        "energy:natural_gas",
        Severity::High,
        "Natural gas price increases directly impact operational costs",
    ),
    (
        "rates:fed_funds",
        Severity::Medium,
        "Interest rate changes affect customer demand and financing costs",
    ),
    (
        "treasury:10y",
        Severity::Medium,
        "Rising Treasury yields increase borrowing costs for expansion",
    ),
    (
        "gpu_pricing:*",
        Severity::Medium,
        "GPU price volatility indicates market instability",
    ),
    (
        "energy:crude_oil",
        Severity::Low,
        "Crude oil moves feed through to energy costs",
    ),
];

/// Risk factor for a series, if it has known exposure
///
/// Lookup is by series identity only. Correlation values never change the
/// outcome.
pub fn risk_factor(series: &SeriesSelector) -> Option<RiskFactor> {
    let key = series.to_string();
    RISK_TABLE
        .iter()
        .find(|(pattern, _, _)| {
            let entry = SeriesSelector::parse(pattern);
            entry == *series || (entry.is_wildcard() && entry.matches(&key))
        })
        .map(|(_, severity, description)| RiskFactor {
            series: key,
            severity: *severity,
            description,
        })
}
