//! Alert rules and the conditions they evaluate
//!
//! A rule pairs a [`RuleCondition`] with a severity, a cooldown and a message
//! template. Conditions read rolling windows from the record store and yield
//! one [`Trigger`] per subject (usually a series id) that currently matches.

use crate::error::AlertError;
use crate::records::{RecordKey, RecordValue, SeriesSelector, Severity, TimeSeriesRecord, Timestamp};
use crate::store::{RecordStore, TimeRange};
use chrono::Duration;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Unit in which a threshold change is measured
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeUnit {
    /// Relative change against the earliest value in the window
    Percent,
    /// Absolute change times 100 (for values quoted in percent, like yields)
    BasisPoints,
}

/// Which moves count against a threshold
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Either,
}

/// Longest accepted rule window, ten years
pub const MAX_WINDOW_HOURS: u32 = 87_600;

fn default_window_hours() -> u32 {
    24
}

fn default_cooldown_minutes() -> u32 {
    60
}

/// Condition checked by an alert rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Latest value moved more than `threshold` from the earliest value in the window
    ThresholdChange {
        series: SeriesSelector,
        threshold: f64,
        unit: ChangeUnit,
        direction: Direction,
        #[serde(default = "default_window_hours")]
        window_hours: u32,
    },
    /// A record arrived since the previous evaluation
    NewRecord {
        series: SeriesSelector,
        #[serde(default = "default_window_hours")]
        lookback_hours: u32,
    },
    /// A record in the window mentions one of the keywords (case-insensitive)
    ///
    /// Without a `field`, all text of the record is searched.
    KeywordMatch {
        series: SeriesSelector,
        keywords: Vec<String>,
        #[serde(default)]
        field: Option<String>,
        #[serde(default = "default_window_hours")]
        window_hours: u32,
    },
}

/// Keys of the records a `NewRecord` condition has already considered
///
/// Only keys inside the condition's lookback window are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeenRecords {
    keys: BTreeSet<RecordKey>,
}

impl SeenRecords {
    pub fn contains(&self, key: &RecordKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn extend(&mut self, keys: impl IntoIterator<Item = RecordKey>) {
        self.keys.extend(keys);
    }

    /// Forget keys of records older than `cutoff`
    fn prune(&mut self, cutoff: Timestamp) {
        self.keys.retain(|(_, timestamp, _)| *timestamp >= cutoff);
    }
}

/// A subject currently matching a condition, with the values for its message
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub subject: String,
    pub payload: BTreeMap<String, Value>,
}

impl RuleCondition {
    /// Selector of the series this condition reads
    pub fn series(&self) -> &SeriesSelector {
        match self {
            RuleCondition::ThresholdChange { series, .. }
            | RuleCondition::NewRecord { series, .. }
            | RuleCondition::KeywordMatch { series, .. } => series,
        }
    }

    /// Evaluate the condition at `now`
    ///
    /// # Arguments
    ///
    /// * `store` - Record store to read windows from
    /// * `now` - Evaluation time; the end of every window
    /// * `seen` - Record keys the owning rule has already looked at; `NewRecord`
    ///   reports only records missing from it, then adds every record in its
    ///   window and forgets keys older than the lookback
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Persistence` when the store cannot be read.
    pub fn evaluate(
        &self,
        store: &dyn RecordStore,
        now: Timestamp,
        seen: &mut SeenRecords,
    ) -> Result<Vec<Trigger>, AlertError> {
        if let RuleCondition::NewRecord { lookback_hours, .. } = self {
            seen.prune(now - Duration::hours(*lookback_hours as i64));
        }

        let mut triggers = Vec::new();
        for series_id in store.resolve(self.series())? {
            let trigger = match self {
                RuleCondition::ThresholdChange {
                    threshold,
                    unit,
                    direction,
                    window_hours,
                    ..
                } => {
                    let range = TimeRange::ending_at(now, Duration::hours(*window_hours as i64));
                    let records = store.query(&series_id, range)?;
                    threshold_change(&series_id, &records, *threshold, *unit, *direction, *window_hours)
                }
                RuleCondition::NewRecord { lookback_hours, .. } => {
                    let range = TimeRange::ending_at(now, Duration::hours(*lookback_hours as i64));
                    let records = store.query(&series_id, range)?;
                    // Publication time says nothing about when a record was stored
                    let trigger = records
                        .iter()
                        .rev()
                        .find(|record| !seen.contains(&record.key()))
                        .map(|record| Trigger {
                            subject: series_id.clone(),
                            payload: record_fields(record),
                        });
                    seen.extend(records.iter().map(TimeSeriesRecord::key));
                    trigger
                }
                RuleCondition::KeywordMatch {
                    keywords,
                    field,
                    window_hours,
                    ..
                } => {
                    let range = TimeRange::ending_at(now, Duration::hours(*window_hours as i64));
                    let records = store.query(&series_id, range)?;
                    keyword_match(&series_id, &records, keywords, field.as_deref())
                }
            };
            triggers.extend(trigger);
        }
        Ok(triggers)
    }
}

fn threshold_change(
    series_id: &str,
    records: &[TimeSeriesRecord],
    threshold: f64,
    unit: ChangeUnit,
    direction: Direction,
    window_hours: u32,
) -> Option<Trigger> {
    let values: Vec<f64> = records.iter().filter_map(|r| r.value.as_f64()).collect();
    let (earliest, latest) = match values.as_slice() {
        [first, .., last] => (*first, *last),
        _ => return None,
    };

    let change = match unit {
        ChangeUnit::Percent => {
            if earliest == 0.0 {
                debug!("Cannot compute percent change of {} from zero", series_id);
                return None;
            }
            (latest - earliest) / earliest * 100.0
        }
        ChangeUnit::BasisPoints => (latest - earliest) * 100.0,
    };

    let exceeded = match direction {
        Direction::Increase => change > threshold,
        Direction::Either => change.abs() > threshold,
    };
    if !exceeded {
        return None;
    }

    let mut payload = BTreeMap::new();
    payload.insert("series".to_string(), Value::from(series_id));
    payload.insert("change".to_string(), Value::from((change * 10.0).round() / 10.0));
    payload.insert("period".to_string(), Value::from(window_hours));
    payload.insert("price".to_string(), Value::from(latest));
    payload.insert("current".to_string(), Value::from(latest));
    payload.insert("previous".to_string(), Value::from(earliest));
    Some(Trigger {
        subject: series_id.to_string(),
        payload,
    })
}

fn keyword_match(
    series_id: &str,
    records: &[TimeSeriesRecord],
    keywords: &[String],
    field: Option<&str>,
) -> Option<Trigger> {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return None;
    }

    // Newest matching record wins
    records.iter().rev().find_map(|record| {
        let haystack = match field {
            Some(field) => field_text(record, field)?,
            None => record_text(record),
        }
        .to_lowercase();

        let keyword = keywords.iter().find(|k| haystack.contains(k.as_str()))?;
        let mut payload = record_fields(record);
        payload.insert("keyword".to_string(), Value::from(keyword.as_str()));
        payload
            .entry("status".to_string())
            .or_insert_with(|| Value::from(keyword.as_str()));
        Some(Trigger {
            subject: series_id.to_string(),
            payload,
        })
    })
}

/// Text of one named attribute, looked up in metadata first, then the payload
fn field_text(record: &TimeSeriesRecord, field: &str) -> Option<String> {
    if let Some(value) = record.metadata.get(field) {
        return Some(value.clone());
    }
    match &record.value {
        RecordValue::Payload(payload) => payload.get(field).map(value_text),
        RecordValue::Number(_) => None,
    }
}

fn record_text(record: &TimeSeriesRecord) -> String {
    let mut text = record.value.text();
    for value in record.metadata.values() {
        text.push(' ');
        text.push_str(value);
    }
    text
}

/// Template values describing one record
///
/// Includes the series id, its name within the family, the record date, the
/// numeric value when there is one, top-level payload fields and metadata.
pub fn record_fields(record: &TimeSeriesRecord) -> BTreeMap<String, Value> {
    let mut fields = BTreeMap::new();
    fields.insert("series".to_string(), Value::from(record.series_id.as_str()));
    let name = record
        .series_id
        .rsplit_once(':')
        .map(|(_, name)| name)
        .unwrap_or(&record.series_id);
    fields.insert("name".to_string(), Value::from(name));
    fields.insert("source".to_string(), Value::from(record.source.as_str()));
    fields.insert(
        "date".to_string(),
        Value::from(record.timestamp.format("%Y-%m-%d").to_string()),
    );
    fields.insert("timestamp".to_string(), Value::from(record.timestamp.to_rfc3339()));
    if let Some(value) = record.value.as_f64() {
        fields.insert("value".to_string(), Value::from(value));
    }
    if let RecordValue::Payload(Value::Object(map)) = &record.value {
        for (key, value) in map {
            fields.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in &record.metadata {
        fields.insert(key.clone(), Value::from(value.as_str()));
    }
    fields
}

/// Render a number without trailing zeros: `25.0` becomes `25`, `4.35` stays `4.35`
pub fn format_number(value: f64) -> String {
    let text = format!("{:.4}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(", "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Fill `{key}` placeholders from the payload
///
/// Placeholders without a matching key are left as they are.
pub fn render_template(template: &str, payload: &BTreeMap<String, Value>) -> String {
    let mut message = template.to_string();
    for (key, value) in payload {
        let placeholder = format!("{{{}}}", key);
        if message.contains(&placeholder) {
            message = message.replace(&placeholder, &value_text(value));
        }
    }
    message
}

/// A named condition with its severity, cooldown and message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRule {
    pub name: String,
    pub condition: RuleCondition,
    pub severity: Severity,
    pub message_template: String,
    /// Minimum minutes between two events for the same subject
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
}

impl AlertRule {
    pub fn cooldown(&self) -> Duration {
        Duration::minutes(self.cooldown_minutes as i64)
    }

    pub fn render(&self, trigger: &Trigger) -> String {
        render_template(&self.message_template, &trigger.payload)
    }

    /// Check that the rule can be evaluated
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("alert rule name cannot be empty".to_string());
        }
        match &self.condition {
            RuleCondition::ThresholdChange {
                threshold,
                window_hours,
                ..
            } => {
                if !threshold.is_finite() || *threshold < 0.0 {
                    return Err(format!(
                        "rule '{}': threshold must be a non-negative number",
                        self.name
                    ));
                }
                check_window(&self.name, "window_hours", *window_hours)?;
            }
            RuleCondition::NewRecord { lookback_hours, .. } => {
                check_window(&self.name, "lookback_hours", *lookback_hours)?;
            }
            RuleCondition::KeywordMatch {
                keywords,
                window_hours,
                ..
            } => {
                if keywords.is_empty() {
                    return Err(format!("rule '{}': keywords cannot be empty", self.name));
                }
                // A blank keyword is contained in every text
                if keywords.iter().any(|k| k.trim().is_empty()) {
                    return Err(format!("rule '{}': keywords cannot be blank", self.name));
                }
                check_window(&self.name, "window_hours", *window_hours)?;
            }
        }
        Ok(())
    }
}

fn check_window(rule: &str, field: &str, hours: u32) -> Result<(), String> {
    if !(1..=MAX_WINDOW_HOURS).contains(&hours) {
        return Err(format!(
            "rule '{}': {} must be between 1 and {}",
            rule, field, MAX_WINDOW_HOURS
        ));
    }
    Ok(())
}

/// Configurable thresholds of the built-in rules
#[derive(Debug, Clone, PartialEq)]
pub struct AlertThresholds {
    pub gpu_price_spike_percent: f64,
    pub treasury_yield_spike_bps: f64,
    pub natural_gas_spike_percent: f64,
    pub fed_rate_change_bps: f64,
    pub window_hours: u32,
    pub default_cooldown_minutes: u32,
    /// Per-rule cooldown overrides in minutes
    pub cooldowns: BTreeMap<String, u32>,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            gpu_price_spike_percent: 15.0,
            treasury_yield_spike_bps: 20.0,
            natural_gas_spike_percent: 10.0,
            fed_rate_change_bps: 0.0,
            window_hours: 24,
            default_cooldown_minutes: 60,
            cooldowns: BTreeMap::new(),
        }
    }
}

impl AlertThresholds {
    fn cooldown_for(&self, rule: &str) -> u32 {
        self.cooldowns
            .get(rule)
            .copied()
            .unwrap_or(self.default_cooldown_minutes)
    }
}

/// Keywords that signal constrained GPU supply in hardware news
pub const SUPPLY_CONSTRAINT_KEYWORDS: [&str; 7] = [
    "shortage",
    "supply constraint",
    "limited availability",
    "out of stock",
    "delayed",
    "postponed",
    "pushed back",
];

/// The standard rule set for profitability monitoring
pub fn builtin_rules(thresholds: &AlertThresholds) -> Vec<AlertRule> {
    let window = thresholds.window_hours;
    let rule = |name: &str, condition: RuleCondition, severity: Severity, template: &str| AlertRule {
        name: name.to_string(),
        condition,
        severity,
        message_template: template.to_string(),
        cooldown_minutes: thresholds.cooldown_for(name),
    };

    vec![
        rule(
            "gpu_price_spike",
            RuleCondition::ThresholdChange {
                series: SeriesSelector::parse("gpu_pricing:*"),
                threshold: thresholds.gpu_price_spike_percent,
                unit: ChangeUnit::Percent,
                direction: Direction::Increase,
                window_hours: window,
            },
            Severity::High,
            "GPU prices increased by {change}% in the last {period} hours. Current price for {series}: ${price}/hour",
        ),
        rule(
            "treasury_yield_spike",
            RuleCondition::ThresholdChange {
                series: SeriesSelector::parse("treasury:10y"),
                threshold: thresholds.treasury_yield_spike_bps,
                unit: ChangeUnit::BasisPoints,
                direction: Direction::Either,
                window_hours: window,
            },
            Severity::Medium,
            "10Y Treasury yield moved {change} basis points to {current}%. This may impact borrowing costs.",
        ),
        rule(
            "natural_gas_spike",
            RuleCondition::ThresholdChange {
                series: SeriesSelector::parse("energy:natural_gas"),
                threshold: thresholds.natural_gas_spike_percent,
                unit: ChangeUnit::Percent,
                direction: Direction::Either,
                window_hours: window,
            },
            Severity::High,
            "Natural gas prices moved {change}% to ${price}/MMBtu. This directly impacts operational costs.",
        ),
        rule(
            "fed_rate_change",
            RuleCondition::ThresholdChange {
                series: SeriesSelector::parse("rates:fed_funds"),
                threshold: thresholds.fed_rate_change_bps,
                unit: ChangeUnit::BasisPoints,
                direction: Direction::Either,
                window_hours: 7 * 24,
            },
            Severity::High,
            "Federal funds rate changed to {current}%. This affects financing costs and customer spending.",
        ),
        rule(
            "new_sec_filing",
            RuleCondition::NewRecord {
                series: SeriesSelector::parse("sec_filings:*"),
                lookback_hours: window,
            },
            Severity::Medium,
            "New SEC filing detected: {filing_type} for {company}. Filed on {date}.",
        ),
        rule(
            "gpu_supply_constraint",
            RuleCondition::KeywordMatch {
                series: SeriesSelector::parse("news:hardware:*"),
                keywords: SUPPLY_CONSTRAINT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
                field: None,
                window_hours: window,
            },
            Severity::High,
            "GPU supply constraints detected for {hardware_type}. Status: {status}",
        ),
        rule(
            "energy_market_event",
            RuleCondition::KeywordMatch {
                series: SeriesSelector::parse("news:energy:*"),
                keywords: vec!["high".to_string()],
                field: Some("impact_level".to_string()),
                window_hours: window,
            },
            Severity::Medium,
            "Energy market event detected: {event_type} with {impact_level} impact in {regions}",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 10, 16, 0, 0).unwrap()
    }

    fn hours_ago(hours: i64) -> Timestamp {
        now() - Duration::hours(hours)
    }

    fn rule_named(name: &str) -> AlertRule {
        builtin_rules(&AlertThresholds::default())
            .into_iter()
            .find(|rule| rule.name == name)
            .unwrap()
    }

    #[test]
    fn test_treasury_spike_in_basis_points() {
        let store = MemoryStore::new();
        store
            .upsert(&[
                TimeSeriesRecord::number("treasury:10y", hours_ago(20), 4.10, "yahoo"),
                TimeSeriesRecord::number("treasury:10y", hours_ago(10), 4.12, "yahoo"),
                TimeSeriesRecord::number("treasury:10y", hours_ago(1), 4.35, "yahoo"),
            ])
            .unwrap();
        let rule = rule_named("treasury_yield_spike");

        let triggers = rule.condition.evaluate(&store, now(), &mut SeenRecords::default()).unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].subject, "treasury:10y");
        assert_eq!(
            rule.render(&triggers[0]),
            "10Y Treasury yield moved 25 basis points to 4.35%. This may impact borrowing costs."
        );
    }

    #[test]
    fn test_threshold_respects_window_and_direction() {
        let store = MemoryStore::new();
        store
            .upsert(&[
                // Outside the 24 hour window
                TimeSeriesRecord::number("gpu_pricing:H100", hours_ago(30), 1.00, "lambda"),
                TimeSeriesRecord::number("gpu_pricing:H100", hours_ago(12), 2.99, "lambda"),
                TimeSeriesRecord::number("gpu_pricing:H100", hours_ago(2), 3.20, "lambda"),
                // A drop never counts for an increase-only rule
                TimeSeriesRecord::number("gpu_pricing:A100", hours_ago(12), 2.00, "lambda"),
                TimeSeriesRecord::number("gpu_pricing:A100", hours_ago(2), 1.00, "lambda"),
            ])
            .unwrap();
        let rule = rule_named("gpu_price_spike");

        assert!(rule.condition.evaluate(&store, now(), &mut SeenRecords::default()).unwrap().is_empty());

        store
            .upsert(&[TimeSeriesRecord::number("gpu_pricing:H100", hours_ago(1), 3.50, "lambda")])
            .unwrap();
        let triggers = rule.condition.evaluate(&store, now(), &mut SeenRecords::default()).unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(
            rule.render(&triggers[0]),
            "GPU prices increased by 17.1% in the last 24 hours. Current price for gpu_pricing:H100: $3.5/hour"
        );
    }

    #[test]
    fn test_wildcard_threshold_yields_one_trigger_per_series() {
        let store = MemoryStore::new();
        for series in ["gpu_pricing:H100", "gpu_pricing:A100"] {
            store
                .upsert(&[
                    TimeSeriesRecord::number(series, hours_ago(5), 1.0, "lambda"),
                    TimeSeriesRecord::number(series, hours_ago(1), 2.0, "lambda"),
                ])
                .unwrap();
        }

        let triggers = rule_named("gpu_price_spike")
            .condition
            .evaluate(&store, now(), &mut SeenRecords::default())
            .unwrap();
        let subjects: Vec<&str> = triggers.iter().map(|t| t.subject.as_str()).collect();
        assert_eq!(subjects, vec!["gpu_pricing:A100", "gpu_pricing:H100"]);
    }

    #[test]
    fn test_single_point_never_triggers() {
        let store = MemoryStore::new();
        store
            .upsert(&[TimeSeriesRecord::number("rates:fed_funds", hours_ago(1), 5.33, "fred")])
            .unwrap();
        let triggers = rule_named("fed_rate_change")
            .condition
            .evaluate(&store, now(), &mut SeenRecords::default())
            .unwrap();
        assert!(triggers.is_empty());
    }

    #[test]
    fn test_fed_rate_change_over_a_week() {
        let store = MemoryStore::new();
        store
            .upsert(&[
                TimeSeriesRecord::number("rates:fed_funds", hours_ago(6 * 24), 5.33, "fred"),
                TimeSeriesRecord::number("rates:fed_funds", hours_ago(1), 5.08, "fred"),
            ])
            .unwrap();
        let rule = rule_named("fed_rate_change");
        let triggers = rule.condition.evaluate(&store, now(), &mut SeenRecords::default()).unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(
            rule.render(&triggers[0]),
            "Federal funds rate changed to 5.08%. This affects financing costs and customer spending."
        );
    }

    fn filing(company: &str, filed_at: Timestamp, filing_type: &str) -> TimeSeriesRecord {
        TimeSeriesRecord::payload(
            &format!("sec_filings:{}", company),
            filed_at,
            json!({"filing_type": filing_type, "url": "https://www.sec.gov/"}),
            "edgar",
        )
        .with_metadata("company", company)
    }

    #[test]
    fn test_new_record_reports_each_record_once() {
        let store = MemoryStore::new();
        store.upsert(&[filing("CoreWeave", hours_ago(3), "10-Q")]).unwrap();
        let rule = rule_named("new_sec_filing");
        let mut seen = SeenRecords::default();

        let triggers = rule.condition.evaluate(&store, now(), &mut seen).unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(
            rule.render(&triggers[0]),
            "New SEC filing detected: 10-Q for CoreWeave. Filed on 2026-03-10."
        );
        assert_eq!(seen.len(), 1);

        // Nothing was stored since the previous evaluation
        let later = now() + Duration::minutes(15);
        assert!(rule.condition.evaluate(&store, later, &mut seen).unwrap().is_empty());
    }

    #[test]
    fn test_new_record_filed_earlier_but_stored_later() {
        let store = MemoryStore::new();
        let rule = rule_named("new_sec_filing");
        let mut seen = SeenRecords::default();

        assert!(rule.condition.evaluate(&store, now(), &mut seen).unwrap().is_empty());

        // Scraped one cycle later, dated two hours before the previous evaluation
        store.upsert(&[filing("CoreWeave", hours_ago(2), "8-K")]).unwrap();
        let later = now() + Duration::minutes(15);
        let triggers = rule.condition.evaluate(&store, later, &mut seen).unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].subject, "sec_filings:CoreWeave");
        assert_eq!(triggers[0].payload["filing_type"], json!("8-K"));

        assert!(rule
            .condition
            .evaluate(&store, later + Duration::minutes(15), &mut seen)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_seen_records_forget_keys_past_lookback() {
        let store = MemoryStore::new();
        store.upsert(&[filing("Applied Digital", hours_ago(20), "10-K")]).unwrap();
        let rule = rule_named("new_sec_filing");
        let mut seen = SeenRecords::default();

        rule.condition.evaluate(&store, now(), &mut seen).unwrap();
        assert_eq!(seen.len(), 1);

        rule.condition
            .evaluate(&store, now() + Duration::hours(6), &mut seen)
            .unwrap();
        assert!(seen.is_empty());
    }

    #[test]
    fn test_new_record_ignores_records_older_than_lookback() {
        let store = MemoryStore::new();
        store
            .upsert(&[TimeSeriesRecord::payload(
                "sec_filings:CoreWeave",
                hours_ago(48),
                json!({"filing_type": "8-K"}),
                "edgar",
            )])
            .unwrap();
        let triggers = rule_named("new_sec_filing")
            .condition
            .evaluate(&store, now(), &mut SeenRecords::default())
            .unwrap();
        assert!(triggers.is_empty());
    }

    #[test]
    fn test_supply_constraint_keywords() {
        let store = MemoryStore::new();
        store
            .upsert(&[
                TimeSeriesRecord::payload(
                    "news:hardware:NVIDIA",
                    hours_ago(4),
                    json!({"title": "Blackwell shipments Pushed Back to Q3"}),
                    "tomshardware",
                )
                .with_metadata("hardware_type", "B200"),
                TimeSeriesRecord::payload(
                    "news:hardware:AMD",
                    hours_ago(4),
                    json!({"title": "MI300X now broadly available"}),
                    "tomshardware",
                ),
            ])
            .unwrap();
        let rule = rule_named("gpu_supply_constraint");

        let triggers = rule.condition.evaluate(&store, now(), &mut SeenRecords::default()).unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].subject, "news:hardware:NVIDIA");
        assert_eq!(
            rule.render(&triggers[0]),
            "GPU supply constraints detected for B200. Status: pushed back"
        );
    }

    #[test]
    fn test_keyword_match_on_field() {
        let store = MemoryStore::new();
        store
            .upsert(&[
                TimeSeriesRecord::payload(
                    "news:energy:grid",
                    hours_ago(2),
                    json!({"event_type": "grid emergency", "regions": ["ERCOT", "SPP"]}),
                    "eia",
                )
                .with_metadata("impact_level", "High"),
                TimeSeriesRecord::payload(
                    "news:energy:lng",
                    hours_ago(2),
                    json!({"event_type": "high demand forecast"}),
                    "eia",
                )
                .with_metadata("impact_level", "low"),
            ])
            .unwrap();
        let rule = rule_named("energy_market_event");

        let triggers = rule.condition.evaluate(&store, now(), &mut SeenRecords::default()).unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(
            rule.render(&triggers[0]),
            "Energy market event detected: grid emergency with High impact in ERCOT, SPP"
        );
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(25.0), "25");
        assert_eq!(format_number(4.35), "4.35");
        assert_eq!(format_number(-12.5), "-12.5");
        assert_eq!(format_number(0.00001), "0");
        assert_eq!(format_number(24.999999999999964), "25");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let mut payload = BTreeMap::new();
        payload.insert("price".to_string(), json!(2.5));
        assert_eq!(render_template("${price} {missing}", &payload), "$2.5 {missing}");
    }

    #[test]
    fn test_rule_deserializes_from_toml() {
        let rule: AlertRule = toml::from_str(
            r#"
            name = "crude_oil_spike"
            severity = "low"
            message_template = "Crude moved {change}%"
            condition = { type = "threshold_change", series = "energy:crude_oil", threshold = 8.0, unit = "percent", direction = "either" }
            "#,
        )
        .unwrap();

        assert_eq!(rule.cooldown_minutes, 60);
        assert_eq!(rule.severity, Severity::Low);
        assert_eq!(
            rule.condition,
            RuleCondition::ThresholdChange {
                series: SeriesSelector::parse("energy:crude_oil"),
                threshold: 8.0,
                unit: ChangeUnit::Percent,
                direction: Direction::Either,
                window_hours: 24,
            }
        );
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_rule_validation() {
        let mut rule = rule_named("gpu_supply_constraint");
        rule.condition = RuleCondition::KeywordMatch {
            series: SeriesSelector::parse("news:*"),
            keywords: vec![" ".to_string()],
            field: None,
            window_hours: 24,
        };
        assert!(rule.validate().is_err());

        let mut rule = rule_named("gpu_price_spike");
        rule.name = String::new();
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_blank_keyword_is_rejected_and_never_matches() {
        let store = MemoryStore::new();
        store
            .upsert(&[TimeSeriesRecord::payload(
                "news:hardware:AMD",
                hours_ago(1),
                json!({"title": "MI300X broadly available"}),
                "tomshardware",
            )])
            .unwrap();

        let mut rule = rule_named("gpu_supply_constraint");
        rule.condition = RuleCondition::KeywordMatch {
            series: SeriesSelector::parse("news:hardware:*"),
            keywords: vec!["shortage".to_string(), "".to_string()],
            field: None,
            window_hours: 24,
        };
        let err = rule.validate().unwrap_err();
        assert!(err.contains("blank"));

        let triggers = rule
            .condition
            .evaluate(&store, now(), &mut SeenRecords::default())
            .unwrap();
        assert!(triggers.is_empty());
    }

    #[test]
    fn test_cooldown_overrides() {
        let mut thresholds = AlertThresholds::default();
        thresholds.cooldowns.insert("new_sec_filing".to_string(), 240);
        let rules = builtin_rules(&thresholds);

        assert_eq!(rules.len(), 7);
        for rule in &rules {
            let expected = if rule.name == "new_sec_filing" { 240 } else { 60 };
            assert_eq!(rule.cooldown_minutes, expected, "{}", rule.name);
            assert!(rule.validate().is_ok());
        }
    }
}
