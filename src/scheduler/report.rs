//! Collection cycle reports
//!
//! A [`CycleReportBuilder`] collects per-collector outcomes while a cycle runs.
//! `finalize` consumes the builder, so a finished [`CollectionCycleReport`] can
//! no longer change.

use crate::records::{Category, Timestamp};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Result of invoking one collector during a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectorOutcome {
    /// Category of the collector
    pub category: Category,
    /// Whether the collector was invoked in this cycle
    pub attempted: bool,
    /// Fetch and persistence both succeeded
    pub succeeded: bool,
    /// Fetch, timeout or persistence failed
    pub failed: bool,
    /// Records returned by the collector
    pub record_count: usize,
    /// Records newly written to the store (duplicates are skipped)
    pub written: usize,
    /// Failure description
    pub error: Option<String>,
}

impl CollectorOutcome {
    pub fn success(category: Category, record_count: usize, written: usize) -> Self {
        Self {
            category,
            attempted: true,
            succeeded: true,
            failed: false,
            record_count,
            written,
            error: None,
        }
    }

    /// A failed invocation; `record_count` is non-zero when fetch worked but storing did not
    pub fn failure(category: Category, record_count: usize, error: impl Into<String>) -> Self {
        Self {
            category,
            attempted: true,
            succeeded: false,
            failed: true,
            record_count,
            written: 0,
            error: Some(error.into()),
        }
    }
}

/// Outcome of one orchestrator pass over the due collectors
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionCycleReport {
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    /// Outcomes keyed by collector name
    pub outcomes: BTreeMap<String, CollectorOutcome>,
}

impl CollectionCycleReport {
    pub fn succeeded(&self) -> impl Iterator<Item = (&String, &CollectorOutcome)> {
        self.outcomes.iter().filter(|(_, outcome)| outcome.succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = (&String, &CollectorOutcome)> {
        self.outcomes.iter().filter(|(_, outcome)| outcome.failed)
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    /// Records newly written across all collectors
    pub fn records_written(&self) -> usize {
        self.outcomes.values().map(|outcome| outcome.written).sum()
    }

    /// Categories that had at least one collector invoked
    pub fn categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> =
            self.outcomes.values().map(|outcome| outcome.category).collect();
        categories.sort();
        categories.dedup();
        categories
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

impl fmt::Display for CollectionCycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Collection cycle {} -> {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.finished_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        for (name, outcome) in &self.outcomes {
            match &outcome.error {
                None => writeln!(
                    f,
                    "  ok    {} [{}]: {} records, {} new",
                    name, outcome.category, outcome.record_count, outcome.written
                )?,
                Some(error) => writeln!(
                    f,
                    "  error {} [{}]: {}",
                    name, outcome.category, error
                )?,
            }
        }
        write!(
            f,
            "  {} succeeded, {} failed, {} records written",
            self.success_count(),
            self.failure_count(),
            self.records_written()
        )
    }
}

/// Accumulates collector outcomes for a cycle in progress
#[derive(Debug)]
pub struct CycleReportBuilder {
    started_at: Timestamp,
    outcomes: BTreeMap<String, CollectorOutcome>,
}

impl CycleReportBuilder {
    pub fn start() -> Self {
        Self::start_at(Utc::now())
    }

    pub fn start_at(started_at: Timestamp) -> Self {
        Self {
            started_at,
            outcomes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, collector: &str, outcome: CollectorOutcome) {
        self.outcomes.insert(collector.to_string(), outcome);
    }

    pub fn finalize(self) -> CollectionCycleReport {
        let finished_at = Utc::now().max(self.started_at);
        self.finalize_at(finished_at)
    }

    pub fn finalize_at(self, finished_at: Timestamp) -> CollectionCycleReport {
        CollectionCycleReport {
            started_at: self.started_at,
            finished_at,
            outcomes: self.outcomes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_report_counts() {
        let start = Utc.with_ymd_and_hms(2026, 7, 1, 8, 0, 0).unwrap();
        let mut builder = CycleReportBuilder::start_at(start);
        builder.record("lambda_gpu", CollectorOutcome::success(Category::GpuPricing, 12, 10));
        builder.record("markets", CollectorOutcome::success(Category::FinancialMarkets, 5, 5));
        builder.record("sec", CollectorOutcome::failure(Category::Filings, 0, "EDGAR unreachable"));

        let report = builder.finalize_at(start + Duration::seconds(4));
        assert_eq!(report.success_count(), 2);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.records_written(), 15);
        assert_eq!(
            report.categories(),
            vec![Category::GpuPricing, Category::FinancialMarkets, Category::Filings]
        );
        assert_eq!(report.finished_at - report.started_at, Duration::seconds(4));
    }

    #[test]
    fn test_persistence_failure_keeps_fetched_count() {
        let outcome = CollectorOutcome::failure(Category::News, 7, "database is locked");
        assert!(outcome.attempted);
        assert!(outcome.failed);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.record_count, 7);
        assert_eq!(outcome.written, 0);
    }

    #[test]
    fn test_report_display() {
        let start = Utc.with_ymd_and_hms(2026, 7, 1, 8, 0, 0).unwrap();
        let mut builder = CycleReportBuilder::start_at(start);
        builder.record("markets", CollectorOutcome::success(Category::FinancialMarkets, 3, 2));
        builder.record("news", CollectorOutcome::failure(Category::News, 0, "rate limited"));
        let text = builder.finalize_at(start).to_string();

        assert!(text.contains("ok    markets [financial_markets]: 3 records, 2 new"));
        assert!(text.contains("error news [news]: rate limited"));
        assert!(text.contains("1 succeeded, 1 failed, 2 records written"));
    }
}
