/// Cycle execution and the mode loop
pub mod orchestrator;

/// Per-cycle outcome reporting
pub mod report;

/// Per-category cadence bookkeeping
pub mod schedule;

pub use orchestrator::{Cadence, Orchestrator, DEFAULT_COLLECTOR_TIMEOUT};
pub use report::{CollectionCycleReport, CollectorOutcome, CycleReportBuilder};
pub use schedule::{CategorySchedule, ScheduleState};
