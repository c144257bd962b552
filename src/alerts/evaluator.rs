use crate::alerts::rules::{AlertRule, SeenRecords};
use crate::alerts::sink::NotificationSink;
use crate::records::{Severity, Timestamp};
use crate::store::RecordStore;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A raised alert
///
/// Events are created when a rule fires outside its cooldown and are later
/// marked resolved. They are never removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub id: u64,
    pub rule_name: String,
    /// What fired, usually a series id
    pub subject: String,
    pub triggered_at: Timestamp,
    pub severity: Severity,
    pub message: String,
    pub payload: BTreeMap<String, Value>,
    pub resolved: bool,
    pub resolved_at: Option<Timestamp>,
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.severity.to_string().to_uppercase(),
            self.rule_name,
            self.subject,
            self.message
        )
    }
}

/// Stateful rule engine with per-subject cooldown and resolution
///
/// For every `(rule, subject)` key the evaluator moves between idle, active and
/// resolved: a trigger outside the cooldown raises an event, and the first
/// evaluation in which the key no longer triggers resolves it.
pub struct AlertEvaluator {
    store: Arc<dyn RecordStore>,
    rules: Vec<AlertRule>,
    sinks: Vec<Box<dyn NotificationSink>>,
    events: Vec<AlertEvent>,
    /// Records each rule has already considered, as of its last successful evaluation
    seen: HashMap<String, SeenRecords>,
    next_id: u64,
}

impl AlertEvaluator {
    pub fn new(store: Arc<dyn RecordStore>, rules: Vec<AlertRule>) -> Self {
        Self {
            store,
            rules,
            sinks: Vec::new(),
            events: Vec::new(),
            seen: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Every event raised so far, oldest first
    pub fn events(&self) -> &[AlertEvent] {
        &self.events
    }

    pub fn active_events(&self) -> impl Iterator<Item = &AlertEvent> {
        self.events.iter().filter(|event| !event.resolved)
    }

    /// Evaluate every rule at `now`
    ///
    /// Returns the events raised or resolved by this evaluation. A rule whose
    /// condition fails is logged and skipped; its events and seen records stay
    /// as they were.
    pub fn evaluate(&mut self, now: Timestamp) -> Vec<AlertEvent> {
        let rules = std::mem::take(&mut self.rules);
        let mut transitions = Vec::new();

        for rule in &rules {
            let mut seen = self.seen.get(&rule.name).cloned().unwrap_or_default();
            let triggers = match rule.condition.evaluate(self.store.as_ref(), now, &mut seen) {
                Ok(triggers) => triggers,
                Err(e) => {
                    warn!("Skipping rule '{}' this cycle: {}", rule.name, e);
                    continue;
                }
            };
            self.seen.insert(rule.name.clone(), seen);

            let mut firing = HashSet::new();
            for trigger in triggers {
                firing.insert(trigger.subject.clone());
                if self.in_cooldown(rule, &trigger.subject, now) {
                    debug!(
                        "Rule '{}' for {} is in cooldown, not raising",
                        rule.name, trigger.subject
                    );
                    continue;
                }

                let event = AlertEvent {
                    id: self.next_id,
                    rule_name: rule.name.clone(),
                    subject: trigger.subject.clone(),
                    triggered_at: now,
                    severity: rule.severity,
                    message: rule.render(&trigger),
                    payload: trigger.payload,
                    resolved: false,
                    resolved_at: None,
                };
                self.next_id += 1;
                info!("Alert raised: {}", event);
                self.notify(&event);
                self.events.push(event.clone());
                transitions.push(event);
            }

            let mut resolved = Vec::new();
            for event in self.events.iter_mut() {
                if event.rule_name == rule.name && !event.resolved && !firing.contains(&event.subject) {
                    event.resolved = true;
                    event.resolved_at = Some(now);
                    info!("Alert resolved: {} ({})", event.rule_name, event.subject);
                    resolved.push(event.clone());
                }
            }
            for event in resolved {
                self.notify(&event);
                transitions.push(event);
            }
        }

        self.rules = rules;
        transitions
    }

    /// Whether an event for this key was raised less than one cooldown ago
    fn in_cooldown(&self, rule: &AlertRule, subject: &str, now: Timestamp) -> bool {
        let cooldown = rule.cooldown();
        self.events.iter().any(|event| {
            event.rule_name == rule.name && event.subject == subject && now - event.triggered_at < cooldown
        })
    }

    fn notify(&self, event: &AlertEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.notify(event) {
                error!("Failed to deliver alert {} for '{}': {}", event.id, event.rule_name, e);
            }
        }
    }
}
