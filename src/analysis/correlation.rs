use crate::analysis::risk::{risk_factor, RiskFactor};
use crate::analysis::statistics::{
    align, collapse, is_significant, pearson, t_statistic, Point, Strength,
};
use crate::error::AnalysisError;
use crate::records::{SeriesSelector, Timestamp};
use crate::store::{RecordStore, TimeRange};
use chrono::{Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Two series selectors to correlate
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesPair {
    pub a: SeriesSelector,
    pub b: SeriesSelector,
}

impl SeriesPair {
    pub fn new(a: &str, b: &str) -> Self {
        Self {
            a: SeriesSelector::parse(a),
            b: SeriesSelector::parse(b),
        }
    }

    pub fn swapped(&self) -> Self {
        Self {
            a: self.b.clone(),
            b: self.a.clone(),
        }
    }
}

impl fmt::Display for SeriesPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {}", self.a, self.b)
    }
}

/// GPU pricing against each macro indicator
pub fn default_pairs() -> Vec<SeriesPair> {
    ["treasury:10y", "energy:natural_gas", "energy:crude_oil", "rates:fed_funds"]
        .iter()
        .map(|series| SeriesPair::new("gpu_pricing:*", series))
        .collect()
}

/// Tunables for the correlation engine
#[derive(Debug, Clone)]
pub struct CorrelationSettings {
    /// Fewer aligned points than this and a pair is skipped
    pub min_sample_size: usize,
    /// Maximum distance between two observations matched as one sample
    pub alignment_tolerance: Duration,
    pub pairs: Vec<SeriesPair>,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            min_sample_size: 10,
            alignment_tolerance: Duration::minutes(30),
            pairs: default_pairs(),
        }
    }
}

/// Correlation between two aligned series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationResult {
    pub series_a: String,
    pub series_b: String,
    /// Pearson coefficient in [-1, 1]
    pub coefficient: f64,
    pub sample_size: usize,
    pub strength: Strength,
    /// Significant at alpha = 0.05, two-tailed
    pub significant: bool,
    pub t_statistic: f64,
}

/// A configured pair that could not be classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPair {
    pub pair: SeriesPair,
    pub reason: String,
}

/// Correlations, insights and risk factors over one analysis window
#[derive(Debug, Clone)]
pub struct CorrelationReport {
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub days_back: u32,
    pub results: BTreeMap<SeriesPair, CorrelationResult>,
    pub skipped: Vec<SkippedPair>,
    pub insights: Vec<String>,
    pub risk_factors: Vec<RiskFactor>,
}

impl fmt::Display for CorrelationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{}", rule)?;
        writeln!(f, "PROFITABILITY CORRELATION ANALYSIS")?;
        writeln!(f, "{}", rule)?;
        writeln!(
            f,
            "Analysis period: {} to {} ({} days)",
            self.window_start.format("%Y-%m-%d %H:%M"),
            self.window_end.format("%Y-%m-%d %H:%M"),
            self.days_back
        )?;
        writeln!(f)?;

        writeln!(f, "CORRELATIONS:")?;
        writeln!(f, "{}", "-".repeat(30))?;
        if self.results.is_empty() {
            writeln!(f, "No pair had enough aligned data")?;
        }
        for (pair, result) in &self.results {
            writeln!(f, "{}:", pair)?;
            writeln!(f, "  Correlation: {:.3}", result.coefficient)?;
            writeln!(f, "  Samples: {}", result.sample_size)?;
            writeln!(f, "  Strength: {}", result.strength)?;
            writeln!(
                f,
                "  Significance: {}",
                if result.significant {
                    "significant"
                } else {
                    "not significant"
                }
            )?;
        }
        if !self.skipped.is_empty() {
            writeln!(f)?;
            writeln!(f, "SKIPPED:")?;
            for skipped in &self.skipped {
                writeln!(f, "  {}: {}", skipped.pair, skipped.reason)?;
            }
        }
        writeln!(f)?;

        writeln!(f, "KEY INSIGHTS:")?;
        writeln!(f, "{}", "-".repeat(15))?;
        for insight in &self.insights {
            writeln!(f, "• {}", insight)?;
        }
        writeln!(f)?;

        writeln!(f, "RISK FACTORS:")?;
        writeln!(f, "{}", "-".repeat(15))?;
        for risk in &self.risk_factors {
            writeln!(f, "• {}", risk)?;
        }
        writeln!(f)?;
        write!(f, "{}", rule)
    }
}

/// Computes correlations between stored series
pub struct CorrelationEngine {
    store: Arc<dyn RecordStore>,
    settings: CorrelationSettings,
}

/// Pair results plus what was needed to build a report
struct PairRun {
    results: BTreeMap<SeriesPair, CorrelationResult>,
    skipped: Vec<SkippedPair>,
    with_data: BTreeSet<SeriesSelector>,
}

impl CorrelationEngine {
    pub fn new(store: Arc<dyn RecordStore>, settings: CorrelationSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &CorrelationSettings {
        &self.settings
    }

    /// Correlate every configured pair over the last `days_back` days
    ///
    /// Pairs with too little data or a constant series are left out of the
    /// result.
    ///
    /// # Errors
    ///
    /// Returns an error only when the store cannot be read.
    pub fn analyze(
        &self,
        days_back: u32,
    ) -> Result<BTreeMap<SeriesPair, CorrelationResult>, AnalysisError> {
        self.analyze_at(Utc::now(), days_back)
    }

    pub fn analyze_at(
        &self,
        now: Timestamp,
        days_back: u32,
    ) -> Result<BTreeMap<SeriesPair, CorrelationResult>, AnalysisError> {
        let range = TimeRange::ending_at(now, Duration::days(days_back as i64));
        Ok(self.run_pairs(range)?.results)
    }

    /// Correlate one pair inside `range`
    ///
    /// # Errors
    ///
    /// * `InsufficientData` - fewer aligned points than the minimum sample size
    /// * `DegenerateSeries` - one side is constant over the aligned points
    /// * `MalformedSeries` - a series has records but none of them are numeric
    /// * `Persistence` - the store could not be read
    pub fn correlate(
        &self,
        pair: &SeriesPair,
        range: TimeRange,
    ) -> Result<CorrelationResult, AnalysisError> {
        let a = self.load_series(&pair.a, range)?;
        let b = self.load_series(&pair.b, range)?;
        self.correlate_points(pair, &a, &b)
    }

    fn correlate_points(
        &self,
        pair: &SeriesPair,
        a: &[Point],
        b: &[Point],
    ) -> Result<CorrelationResult, AnalysisError> {
        let aligned = align(a, b, self.settings.alignment_tolerance);
        if aligned.len() < self.settings.min_sample_size {
            return Err(AnalysisError::InsufficientData {
                series_a: pair.a.to_string(),
                series_b: pair.b.to_string(),
                required: self.settings.min_sample_size,
                actual: aligned.len(),
            });
        }

        let xs: Vec<f64> = aligned.iter().map(|p| p.a).collect();
        let ys: Vec<f64> = aligned.iter().map(|p| p.b).collect();
        let coefficient = pearson(&xs, &ys)
            .ok_or_else(|| AnalysisError::DegenerateSeries(pair.to_string()))?;
        let sample_size = aligned.len();

        Ok(CorrelationResult {
            series_a: pair.a.to_string(),
            series_b: pair.b.to_string(),
            coefficient,
            sample_size,
            strength: Strength::from_coefficient(coefficient),
            significant: is_significant(coefficient, sample_size),
            t_statistic: t_statistic(coefficient, sample_size),
        })
    }

    /// Build the full report over the last `days_back` days
    pub fn generate_report(&self, days_back: u32) -> Result<CorrelationReport, AnalysisError> {
        self.generate_report_at(Utc::now(), days_back)
    }

    pub fn generate_report_at(
        &self,
        now: Timestamp,
        days_back: u32,
    ) -> Result<CorrelationReport, AnalysisError> {
        let range = TimeRange::ending_at(now, Duration::days(days_back as i64));
        let run = self.run_pairs(range)?;

        let insights = run
            .results
            .values()
            .filter(|result| result.significant && result.strength >= Strength::Moderate)
            .flat_map(insights_for)
            .collect();
        let risk_factors = run.with_data.iter().filter_map(risk_factor).collect();

        info!(
            "Correlation report: {} pairs analyzed, {} skipped",
            run.results.len(),
            run.skipped.len()
        );
        Ok(CorrelationReport {
            window_start: range.start,
            window_end: range.end,
            days_back,
            results: run.results,
            skipped: run.skipped,
            insights,
            risk_factors,
        })
    }

    fn run_pairs(&self, range: TimeRange) -> Result<PairRun, AnalysisError> {
        let mut loaded: BTreeMap<SeriesSelector, Vec<Point>> = BTreeMap::new();
        let mut run = PairRun {
            results: BTreeMap::new(),
            skipped: Vec::new(),
            with_data: BTreeSet::new(),
        };

        for pair in &self.settings.pairs {
            let mut sides = Vec::with_capacity(2);
            for selector in [&pair.a, &pair.b] {
                if !loaded.contains_key(selector) {
                    let points = match self.load_series(selector, range) {
                        Ok(points) => points,
                        Err(AnalysisError::MalformedSeries(reason)) => {
                            debug!("Ignoring {}: {}", selector, reason);
                            Vec::new()
                        }
                        Err(e) => return Err(e),
                    };
                    if !points.is_empty() {
                        run.with_data.insert(selector.clone());
                    }
                    loaded.insert(selector.clone(), points);
                }
                sides.push(loaded.get(selector).cloned().unwrap_or_default());
            }

            match self.correlate_points(pair, &sides[0], &sides[1]) {
                Ok(result) => {
                    debug!(
                        "{}: r={:.3} n={} {} {}",
                        pair,
                        result.coefficient,
                        result.sample_size,
                        result.strength,
                        if result.significant {
                            "significant"
                        } else {
                            "not significant"
                        }
                    );
                    run.results.insert(pair.clone(), result);
                }
                Err(e @ AnalysisError::Persistence(_)) => return Err(e),
                Err(e) => {
                    debug!("Skipping {}: {}", pair, e);
                    run.skipped.push(SkippedPair {
                        pair: pair.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(run)
    }

    /// Numeric points of every series matched by `selector`, averaged per timestamp
    fn load_series(
        &self,
        selector: &SeriesSelector,
        range: TimeRange,
    ) -> Result<Vec<Point>, AnalysisError> {
        let mut records = 0;
        let mut points = Vec::new();
        for series_id in self.store.resolve(selector)? {
            for record in self.store.query(&series_id, range)? {
                records += 1;
                if let Some(value) = record.value.as_f64() {
                    points.push((record.timestamp, value));
                }
            }
        }

        if records > 0 && points.is_empty() {
            return Err(AnalysisError::MalformedSeries(format!(
                "{} has {} records but no numeric values",
                selector, records
            )));
        }
        Ok(collapse(points))
    }
}

/// Domain meaning of a series used in insight sentences
fn series_semantics(series: &str) -> Option<(&'static str, &'static str)> {
    match series {
        "energy:natural_gas" => Some(("natural gas prices", "through operating costs")),
        "rates:fed_funds" => Some((
            "the federal funds rate",
            "through financing costs and customer demand",
        )),
        "treasury:10y" => Some(("10Y Treasury yields", "through the cost of capital")),
        "energy:crude_oil" => Some(("crude oil prices", "through energy costs")),
        _ => None,
    }
}

fn insights_for(result: &CorrelationResult) -> Vec<String> {
    let direction = if result.coefficient > 0.0 {
        "positively"
    } else {
        "negatively"
    };
    let mut insights = vec![format!(
        "{} and {} are {}ly {} correlated (r={:.3}, n={}, p<0.05)",
        result.series_a,
        result.series_b,
        result.strength,
        direction,
        result.coefficient,
        result.sample_size
    )];

    let known = series_semantics(&result.series_b)
        .map(|semantics| (semantics, &result.series_a))
        .or_else(|| series_semantics(&result.series_a).map(|s| (s, &result.series_b)));
    if let Some(((label, channel), other)) = known {
        let effect = if result.coefficient > 0.0 {
            "higher"
        } else {
            "lower"
        };
        insights.push(format!(
            "Rising {} may lead to {} {} {}",
            label, effect, other, channel
        ));
    }
    insights
}
