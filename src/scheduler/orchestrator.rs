use crate::alerts::AlertEvaluator;
use crate::collectors::CollectorAdapter;
use crate::error::CollectionError;
use crate::records::{Category, Timestamp};
use crate::scheduler::report::{CollectionCycleReport, CollectorOutcome, CycleReportBuilder};
use crate::scheduler::schedule::ScheduleState;
use crate::store::RecordStore;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Default upper bound on a single collector invocation
pub const DEFAULT_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(120);

/// How often collection cycles repeat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cadence {
    /// Run every collector once and return
    Once,
    /// All categories run together at a fixed interval
    Uniform(chrono::Duration),
    /// Each category runs at its own interval
    PerCategory(BTreeMap<Category, chrono::Duration>),
}

/// Drives collectors, persists their records and runs alert evaluation
///
/// The orchestrator owns the schedule and alert state. Both are only touched
/// between cycles; during a cycle the store is the only shared resource.
pub struct Orchestrator {
    collectors: Vec<Arc<dyn CollectorAdapter>>,
    store: Arc<dyn RecordStore>,
    collector_timeout: Duration,
    evaluator: Option<AlertEvaluator>,
}

impl Orchestrator {
    pub fn new(collectors: Vec<Arc<dyn CollectorAdapter>>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            collectors,
            store,
            collector_timeout: DEFAULT_COLLECTOR_TIMEOUT,
            evaluator: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.collector_timeout = timeout;
        self
    }

    /// Run alert evaluation after every cycle that invoked a collector
    pub fn with_evaluator(mut self, evaluator: AlertEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn collectors(&self) -> &[Arc<dyn CollectorAdapter>] {
        &self.collectors
    }

    pub fn evaluator(&self) -> Option<&AlertEvaluator> {
        self.evaluator.as_ref()
    }

    /// Categories that have at least one collector
    pub fn categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> =
            self.collectors.iter().map(|c| c.category()).collect();
        categories.sort();
        categories.dedup();
        categories
    }

    /// Invoke the given collectors concurrently and persist what they return
    ///
    /// Each collector runs as its own task. Fetch errors, timeouts, panics and
    /// store failures are recorded as that collector's failure; the remaining
    /// collectors are unaffected. This never returns an error.
    pub async fn run_cycle(&self, collectors: &[Arc<dyn CollectorAdapter>]) -> CollectionCycleReport {
        let mut builder = CycleReportBuilder::start();
        info!("Starting collection cycle with {} collectors", collectors.len());

        let mut handles = Vec::with_capacity(collectors.len());
        for collector in collectors {
            let name = collector.name().to_string();
            let category = collector.category();
            let handle = tokio::spawn(collect_one(
                Arc::clone(collector),
                Arc::clone(&self.store),
                self.collector_timeout,
            ));
            handles.push((name, category, handle));
        }

        for (name, category, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Collector '{}' task failed: {}", name, e);
                    CollectorOutcome::failure(category, 0, format!("collector task panicked: {}", e))
                }
            };

            match &outcome.error {
                None => info!(
                    "Collector '{}' returned {} records ({} new)",
                    name, outcome.record_count, outcome.written
                ),
                Some(e) => warn!("Collector '{}' failed: {}", name, e),
            }
            builder.record(&name, outcome);
        }

        let report = builder.finalize();
        info!(
            "Collection cycle finished: {} succeeded, {} failed, {} records written",
            report.success_count(),
            report.failure_count(),
            report.records_written()
        );
        report
    }

    /// Run every collector in the given categories, then evaluate alerts
    pub async fn run_categories(&mut self, categories: &[Category]) -> CollectionCycleReport {
        let selected: Vec<Arc<dyn CollectorAdapter>> = self
            .collectors
            .iter()
            .filter(|c| categories.contains(&c.category()))
            .cloned()
            .collect();

        let report = self.run_cycle(&selected).await;
        if !report.is_empty() {
            self.evaluate_alerts(Utc::now()).await;
        }
        report
    }

    /// Run all collectors once
    pub async fn run_once(&mut self) -> CollectionCycleReport {
        let categories = self.categories();
        self.run_categories(&categories).await
    }

    /// Run the categories that are due at `now` and advance their schedule
    ///
    /// Returns `None` when nothing was due.
    pub async fn run_due(
        &mut self,
        schedule: &mut ScheduleState,
        now: Timestamp,
    ) -> Option<CollectionCycleReport> {
        let due = schedule.due(now);
        if due.is_empty() {
            return None;
        }

        debug!(
            "Due categories: {}",
            due.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
        );
        let report = self.run_categories(&due).await;
        for category in due {
            schedule.mark_run(category, now);
        }
        Some(report)
    }

    /// Run collection cycles according to `cadence` until shutdown is signalled
    ///
    /// The shutdown flag is checked between cycles. Sleeping between cycles is
    /// interrupted by a shutdown signal; a cycle in progress always completes.
    /// Returns the number of cycles run.
    pub async fn run(&mut self, cadence: Cadence, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut schedule = match cadence {
            Cadence::Once => {
                if *shutdown.borrow() {
                    return 0;
                }
                let report = self.run_once().await;
                debug!("{}", report);
                return 1;
            }
            Cadence::Uniform(interval) => {
                info!("Running continuously every {} minutes", interval.num_minutes());
                ScheduleState::uniform(&self.categories(), interval, Utc::now())
            }
            Cadence::PerCategory(intervals) => self.restore_schedule(intervals, Utc::now()),
        };

        let mut cycles = 0;
        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, stopping after {} cycles", cycles);
                break;
            }

            if let Some(report) = self.run_due(&mut schedule, Utc::now()).await {
                debug!("{}", report);
                cycles += 1;
            }

            let Some(next_due) = schedule.next_due() else {
                warn!("No categories to schedule, stopping");
                break;
            };
            let wait = (next_due - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if wait.is_zero() {
                continue;
            }

            debug!("Next collection at {} (in {:?})", next_due, wait);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("Shutdown channel closed, stopping after {} cycles", cycles);
                        break;
                    }
                }
            }
        }
        cycles
    }

    /// Build a per-category schedule, picking up where stored data left off
    fn restore_schedule(
        &self,
        mut intervals: BTreeMap<Category, chrono::Duration>,
        now: Timestamp,
    ) -> ScheduleState {
        let active = self.categories();
        intervals.retain(|category, _| active.contains(category));

        match self.store.summary() {
            Ok(summary) => ScheduleState::restore(&intervals, &summary, now),
            Err(e) => {
                warn!("Could not read store summary, scheduling all categories now: {}", e);
                ScheduleState::new(&intervals, now)
            }
        }
    }

    /// Evaluate alert rules on the blocking pool; store reads may block
    async fn evaluate_alerts(&mut self, now: Timestamp) {
        let Some(mut evaluator) = self.evaluator.take() else {
            return;
        };

        let evaluated = tokio::task::spawn_blocking(move || {
            let transitions = evaluator.evaluate(now);
            (evaluator, transitions)
        })
        .await;

        match evaluated {
            Ok((evaluator, transitions)) => {
                if !transitions.is_empty() {
                    info!("Alert evaluation produced {} transitions", transitions.len());
                }
                self.evaluator = Some(evaluator);
            }
            Err(e) => error!("Alert evaluation task failed, alerting disabled: {}", e),
        }
    }
}

/// Fetch from one collector and persist the result
async fn collect_one(
    collector: Arc<dyn CollectorAdapter>,
    store: Arc<dyn RecordStore>,
    timeout: Duration,
) -> CollectorOutcome {
    let category = collector.category();
    let fetched = match tokio::time::timeout(timeout, collector.fetch()).await {
        Ok(result) => result,
        Err(_) => Err(CollectionError::Timeout(timeout)),
    };

    let records = match fetched {
        Ok(records) => records,
        Err(e) => return CollectorOutcome::failure(category, 0, e.to_string()),
    };

    let record_count = records.len();
    match tokio::task::spawn_blocking(move || store.upsert(&records)).await {
        Ok(Ok(written)) => CollectorOutcome::success(category, record_count, written),
        Ok(Err(e)) => CollectorOutcome::failure(category, record_count, e.to_string()),
        Err(e) => CollectorOutcome::failure(
            category,
            record_count,
            format!("store task failed: {}", e),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{builtin_rules, AlertThresholds};
    use crate::collectors::{FetchFuture, MockCollector};
    use crate::error::PersistenceError;
    use crate::records::{Severity, TimeSeriesRecord};
    use crate::store::{MemoryStore, SeriesSummary, TimeRange};
    use std::sync::Mutex;

    fn record(series: &str, minutes_ago: i64, value: f64) -> TimeSeriesRecord {
        TimeSeriesRecord::number(
            series,
            Utc::now() - chrono::Duration::minutes(minutes_ago),
            value,
            "test",
        )
    }

    struct PanickingCollector;

    impl CollectorAdapter for PanickingCollector {
        fn name(&self) -> &str {
            "panicky"
        }

        fn category(&self) -> Category {
            Category::News
        }

        fn fetch(&self) -> FetchFuture<'_> {
            Box::pin(async { panic!("scraper blew up") })
        }
    }

    struct UnavailableStore;

    impl RecordStore for UnavailableStore {
        fn upsert(&self, _records: &[TimeSeriesRecord]) -> Result<usize, PersistenceError> {
            Err(PersistenceError::Unavailable("disk full".to_string()))
        }

        fn query(
            &self,
            _series_id: &str,
            _range: TimeRange,
        ) -> Result<Vec<TimeSeriesRecord>, PersistenceError> {
            Ok(Vec::new())
        }

        fn summary(&self) -> Result<BTreeMap<String, SeriesSummary>, PersistenceError> {
            Err(PersistenceError::Unavailable("disk full".to_string()))
        }
    }

    /// Memory store that remembers which threads read and write it
    #[derive(Default)]
    struct ThreadRecordingStore {
        inner: MemoryStore,
        threads: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl ThreadRecordingStore {
        fn touch(&self) {
            self.threads.lock().unwrap().push(std::thread::current().id());
        }
    }

    impl RecordStore for ThreadRecordingStore {
        fn upsert(&self, records: &[TimeSeriesRecord]) -> Result<usize, PersistenceError> {
            self.touch();
            self.inner.upsert(records)
        }

        fn query(
            &self,
            series_id: &str,
            range: TimeRange,
        ) -> Result<Vec<TimeSeriesRecord>, PersistenceError> {
            self.touch();
            self.inner.query(series_id, range)
        }

        fn summary(&self) -> Result<BTreeMap<String, SeriesSummary>, PersistenceError> {
            self.inner.summary()
        }
    }

    #[tokio::test]
    async fn test_store_calls_stay_off_the_runtime_thread() {
        let store = Arc::new(ThreadRecordingStore::default());
        let collector = MockCollector::returning(
            "treasury",
            Category::FinancialMarkets,
            vec![record("treasury:10y", 120, 4.10), record("treasury:10y", 5, 4.35)],
        );
        let evaluator =
            AlertEvaluator::new(store.clone(), builtin_rules(&AlertThresholds::default()));
        let mut orchestrator =
            Orchestrator::new(vec![Arc::new(collector)], store.clone()).with_evaluator(evaluator);

        let report = orchestrator.run_once().await;
        assert_eq!(report.success_count(), 1);
        assert_eq!(
            orchestrator.evaluator().unwrap().active_events().count(),
            1
        );

        let runtime_thread = std::thread::current().id();
        let threads = store.threads.lock().unwrap();
        assert!(threads.len() > 1);
        assert!(threads.iter().all(|id| *id != runtime_thread));
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let store = Arc::new(MemoryStore::new());
        let good = MockCollector::returning(
            "lambda_gpu",
            Category::GpuPricing,
            vec![record("gpu_pricing:H100", 5, 2.99), record("gpu_pricing:A100", 5, 1.79)],
        );
        let bad = MockCollector::failing("sec", Category::Filings, "EDGAR unreachable");
        let orchestrator = Orchestrator::new(
            vec![Arc::new(good), Arc::new(bad), Arc::new(PanickingCollector)],
            store.clone(),
        );

        let report = orchestrator.run_cycle(orchestrator.collectors()).await;

        assert_eq!(report.outcomes.len(), 3);
        assert!(report.outcomes["lambda_gpu"].succeeded);
        assert_eq!(report.outcomes["lambda_gpu"].written, 2);
        assert!(report.outcomes["sec"].failed);
        assert!(report.outcomes["sec"].error.as_ref().unwrap().contains("EDGAR"));
        assert!(report.outcomes["panicky"].failed);
        assert!(report.outcomes["panicky"]
            .error
            .as_ref()
            .unwrap()
            .contains("panicked"));
        assert_eq!(store.summary().unwrap()["gpu_pricing:H100"].count, 1);
    }

    #[tokio::test]
    async fn test_slow_collector_times_out() {
        let store = Arc::new(MemoryStore::new());
        let slow = MockCollector::returning("slow", Category::News, Vec::new())
            .with_delay(Duration::from_secs(5));
        let fast = MockCollector::returning(
            "markets",
            Category::FinancialMarkets,
            vec![record("treasury:10y", 1, 4.2)],
        );
        let orchestrator = Orchestrator::new(vec![Arc::new(slow), Arc::new(fast)], store)
            .with_timeout(Duration::from_millis(50));

        let report = orchestrator.run_cycle(orchestrator.collectors()).await;

        let slow_outcome = &report.outcomes["slow"];
        assert!(slow_outcome.failed);
        assert!(slow_outcome.error.as_ref().unwrap().contains("timed out"));
        assert!(report.outcomes["markets"].succeeded);
    }

    #[tokio::test]
    async fn test_persistence_failure_marks_collector_failed() {
        let collector = MockCollector::returning(
            "markets",
            Category::FinancialMarkets,
            vec![record("treasury:10y", 1, 4.2), record("rates:fed_funds", 1, 5.33)],
        );
        let orchestrator = Orchestrator::new(vec![Arc::new(collector)], Arc::new(UnavailableStore));

        let report = orchestrator.run_cycle(orchestrator.collectors()).await;
        let outcome = &report.outcomes["markets"];
        assert!(outcome.failed);
        assert_eq!(outcome.record_count, 2);
        assert_eq!(outcome.written, 0);
        assert!(outcome.error.as_ref().unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_repeated_cycle_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let collector = MockCollector::returning(
            "gpu",
            Category::GpuPricing,
            vec![record("gpu_pricing:H100", 10, 2.99)],
        );
        let mut orchestrator = Orchestrator::new(vec![Arc::new(collector)], store.clone());

        let first = orchestrator.run_once().await;
        let second = orchestrator.run_once().await;
        assert_eq!(first.records_written(), 1);
        assert_eq!(second.records_written(), 0);
        assert!(second.outcomes["gpu"].succeeded);
        assert_eq!(store.summary().unwrap()["gpu_pricing:H100"].count, 1);
    }

    #[tokio::test]
    async fn test_run_due_only_runs_due_categories() {
        let store = Arc::new(MemoryStore::new());
        let gpu = MockCollector::returning("gpu", Category::GpuPricing, Vec::new());
        let news = MockCollector::returning("news", Category::News, Vec::new());
        let mut orchestrator = Orchestrator::new(
            vec![Arc::new(gpu.clone()), Arc::new(news.clone())],
            store,
        );

        let start = Utc::now();
        let mut intervals = BTreeMap::new();
        intervals.insert(Category::GpuPricing, chrono::Duration::minutes(15));
        intervals.insert(Category::News, chrono::Duration::minutes(60));
        let mut schedule = ScheduleState::new(&intervals, start);

        assert!(orchestrator.run_due(&mut schedule, start).await.is_some());
        assert!(orchestrator
            .run_due(&mut schedule, start + chrono::Duration::minutes(10))
            .await
            .is_none());
        let report = orchestrator
            .run_due(&mut schedule, start + chrono::Duration::minutes(15))
            .await
            .unwrap();

        assert_eq!(report.categories(), vec![Category::GpuPricing]);
        assert_eq!(gpu.call_count(), 2);
        assert_eq!(news.call_count(), 1);
    }

    #[tokio::test]
    async fn test_single_mode_runs_once() {
        let collector = MockCollector::returning("gpu", Category::GpuPricing, Vec::new());
        let mut orchestrator =
            Orchestrator::new(vec![Arc::new(collector.clone())], Arc::new(MemoryStore::new()));
        let (_tx, rx) = watch::channel(false);

        assert_eq!(orchestrator.run(Cadence::Once, rx).await, 1);
        assert_eq!(collector.call_count(), 1);
    }

    #[tokio::test]
    async fn test_continuous_mode_stops_on_shutdown() {
        let collector = MockCollector::returning("gpu", Category::GpuPricing, Vec::new());
        let mut orchestrator =
            Orchestrator::new(vec![Arc::new(collector.clone())], Arc::new(MemoryStore::new()));
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            let _ = tx.send(true);
        });

        let cycles = orchestrator
            .run(Cadence::Uniform(chrono::Duration::milliseconds(30)), rx)
            .await;
        assert!(cycles >= 2, "expected several cycles, got {}", cycles);
        assert_eq!(collector.call_count() as u64, cycles);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_runs_nothing() {
        let collector = MockCollector::returning("gpu", Category::GpuPricing, Vec::new());
        let mut orchestrator =
            Orchestrator::new(vec![Arc::new(collector.clone())], Arc::new(MemoryStore::new()));
        let (_tx, rx) = watch::channel(true);

        let cycles = orchestrator
            .run(Cadence::Uniform(chrono::Duration::minutes(60)), rx)
            .await;
        assert_eq!(cycles, 0);
        assert_eq!(collector.call_count(), 0);
    }

    #[tokio::test]
    async fn test_scheduled_mode_without_collectors_returns() {
        let mut orchestrator = Orchestrator::new(Vec::new(), Arc::new(MemoryStore::new()));
        let (_tx, rx) = watch::channel(false);
        let mut intervals = BTreeMap::new();
        intervals.insert(Category::News, chrono::Duration::minutes(60));

        assert_eq!(orchestrator.run(Cadence::PerCategory(intervals), rx).await, 0);
    }

    #[tokio::test]
    async fn test_alerts_evaluated_after_cycle() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let collector = MockCollector::returning(
            "markets",
            Category::FinancialMarkets,
            vec![
                record("treasury:10y", 180, 4.10),
                record("treasury:10y", 120, 4.12),
                record("treasury:10y", 5, 4.35),
            ],
        );
        let evaluator =
            AlertEvaluator::new(store.clone(), builtin_rules(&AlertThresholds::default()));
        let mut orchestrator =
            Orchestrator::new(vec![Arc::new(collector)], store).with_evaluator(evaluator);

        orchestrator.run_once().await;

        let evaluator = orchestrator.evaluator().unwrap();
        let active: Vec<_> = evaluator.active_events().collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].rule_name, "treasury_yield_spike");
        assert_eq!(active[0].severity, Severity::Medium);
    }
}
