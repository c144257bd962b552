//! Per-category collection cadence
//!
//! Each category keeps its own `next_due` time. After a run the next due time
//! moves forward by exactly one interval from the previous due time, so slow
//! cycles and late wakeups do not push later runs back.

use crate::records::{Category, Timestamp};
use crate::store::SeriesSummary;
use chrono::Duration;
use log::debug;
use std::collections::BTreeMap;

/// Cadence state of one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySchedule {
    pub interval: Duration,
    pub last_run: Option<Timestamp>,
    pub next_due: Timestamp,
    pub runs: u64,
}

/// Next-due bookkeeping for every scheduled category
#[derive(Debug, Clone, Default)]
pub struct ScheduleState {
    entries: BTreeMap<Category, CategorySchedule>,
}

impl ScheduleState {
    /// Every category becomes due at `start`
    pub fn new(intervals: &BTreeMap<Category, Duration>, start: Timestamp) -> Self {
        let entries = intervals
            .iter()
            .map(|(category, interval)| {
                (
                    *category,
                    CategorySchedule {
                        interval: *interval,
                        last_run: None,
                        next_due: start,
                        runs: 0,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// All categories share one interval and run together
    pub fn uniform(categories: &[Category], interval: Duration, start: Timestamp) -> Self {
        let intervals = categories
            .iter()
            .map(|category| (*category, interval))
            .collect();
        Self::new(&intervals, start)
    }

    /// Rebuild the schedule after a restart from what the store already holds
    ///
    /// A category's last run is the newest record among the series it owns.
    /// Categories without stored data are due immediately.
    pub fn restore(
        intervals: &BTreeMap<Category, Duration>,
        summary: &BTreeMap<String, SeriesSummary>,
        now: Timestamp,
    ) -> Self {
        let mut state = Self::new(intervals, now);
        for (category, entry) in state.entries.iter_mut() {
            let latest = summary
                .iter()
                .filter(|(series_id, _)| category.owns_series(series_id))
                .filter_map(|(_, series)| series.latest_timestamp)
                .max();

            if let Some(last_run) = latest {
                entry.last_run = Some(last_run);
                entry.next_due = last_run + entry.interval;
                debug!(
                    "Restored schedule for {}: last data at {}, next due {}",
                    category, last_run, entry.next_due
                );
            }
        }
        state
    }

    /// Categories whose due time has passed at `now`
    pub fn due(&self, now: Timestamp) -> Vec<Category> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.next_due <= now)
            .map(|(category, _)| *category)
            .collect()
    }

    /// Record that `category` ran at `ran_at`
    ///
    /// The next due time advances from the previous due time. Slots that were
    /// missed entirely (the process was stalled or stopped) are skipped rather
    /// than replayed back to back.
    pub fn mark_run(&mut self, category: Category, ran_at: Timestamp) {
        if let Some(entry) = self.entries.get_mut(&category) {
            let mut next_due = entry.next_due + entry.interval;
            if next_due <= ran_at {
                next_due = ran_at + entry.interval;
            }
            entry.last_run = Some(ran_at);
            entry.next_due = next_due;
            entry.runs += 1;
        }
    }

    /// Earliest upcoming due time across categories
    pub fn next_due(&self) -> Option<Timestamp> {
        self.entries.values().map(|entry| entry.next_due).min()
    }

    pub fn get(&self, category: Category) -> Option<&CategorySchedule> {
        self.entries.get(&category)
    }

    pub fn categories(&self) -> Vec<Category> {
        self.entries.keys().copied().collect()
    }
}
