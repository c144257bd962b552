/// Stateful evaluation of alert rules
pub mod evaluator;

/// Rule conditions and the built-in rule set
pub mod rules;

/// Alert delivery seam
pub mod sink;

pub use evaluator::{AlertEvaluator, AlertEvent};
pub use rules::{
    builtin_rules, AlertRule, AlertThresholds, ChangeUnit, Direction, RuleCondition, SeenRecords,
    Trigger,
};
pub use sink::{AlertLogSink, LogSink, NotificationSink};
