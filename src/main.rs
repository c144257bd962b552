use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use profitwatch::alerts::{AlertEvaluator, AlertLogSink, LogSink};
use profitwatch::analysis::CorrelationEngine;
use profitwatch::collectors::{CollectorAdapter, FeedCollector};
use profitwatch::config::{Config, RunMode, StorageBackend, StorageConfig};
use profitwatch::records::Category;
use profitwatch::scheduler::{Cadence, Orchestrator};
use profitwatch::store::{MemoryStore, RecordStore, SeriesSummary, SqliteStore};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Command-line arguments for the profitability indicator collector
#[derive(Parser)]
#[command(
    name = "profitwatch",
    about = "GPU rental profitability monitor - collects market indicators, correlates them and raises alerts",
    long_about = "Collects GPU rental prices, Treasury yields, energy prices, news and SEC filings \
                  on per-category schedules, stores them as time series, analyzes correlations \
                  between them and raises alerts when indicators move sharply."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Run mode, overriding `collection.mode`
    #[arg(short, long, value_enum)]
    mode: Option<RunMode>,

    /// Continuous-mode interval in minutes, overriding `collection.interval_minutes`
    #[arg(long, value_name = "MINUTES", value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,

    /// Days of history for analyze mode, overriding `analysis.days_back`
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    days: Option<u32>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults in Config::load
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Apply command-line overrides on top of the loaded configuration
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(mode) = self.mode {
            config.collection.mode = mode;
        }
        if let Some(interval) = self.interval {
            config.collection.interval_minutes = interval;
        }
        if let Some(days) = self.days {
            config.analysis.days_back = days;
        }
    }
}

/// Open the configured record store
fn open_store(storage: &StorageConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    match storage.backend {
        StorageBackend::Sqlite => {
            info!("Opening SQLite store at {}", storage.path.display());
            let store = SqliteStore::open(&storage.path).with_context(|| {
                format!("failed to open record store at {}", storage.path.display())
            })?;
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            info!("Using in-memory store; records are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn build_collectors(config: &Config) -> Vec<Arc<dyn CollectorAdapter>> {
    config
        .collectors
        .iter()
        .map(|c| {
            info!("Registered collector {} ({}) reading {}", c.name, c.category, c.path.display());
            Arc::new(FeedCollector::new(c.name.clone(), c.category, c.path.clone()))
                as Arc<dyn CollectorAdapter>
        })
        .collect()
}

/// Cadence for a collection mode; `None` for modes that do not collect
fn cadence_for(config: &Config) -> Option<Cadence> {
    match config.collection.mode {
        RunMode::Single => Some(Cadence::Once),
        RunMode::Continuous => Some(Cadence::Uniform(config.collection.interval())),
        RunMode::Scheduled => Some(Cadence::PerCategory(config.schedule.intervals())),
        RunMode::Summary | RunMode::Analyze => None,
    }
}

/// Human-readable store contents grouped by category
fn format_summary(summary: &BTreeMap<String, SeriesSummary>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "DATA COLLECTION SUMMARY");
    let _ = writeln!(out, "=======================");

    if summary.is_empty() {
        let _ = writeln!(out, "No records stored");
        return out;
    }

    let mut grouped: BTreeMap<String, Vec<(&String, &SeriesSummary)>> = BTreeMap::new();
    for (series_id, stats) in summary {
        let group = Category::for_series(series_id)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "other".to_string());
        grouped.entry(group).or_default().push((series_id, stats));
    }

    let total: usize = summary.values().map(|s| s.count).sum();
    for (group, series) in grouped {
        let _ = writeln!(out, "\n{}:", group.to_uppercase());
        for (series_id, stats) in series {
            let latest = stats
                .latest_timestamp
                .map(|ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| "never".to_string());
            let _ = writeln!(
                out,
                "  {:<40} {:>6} records  latest {}",
                series_id, stats.count, latest
            );
        }
    }
    let _ = writeln!(out, "\nTotal: {} records in {} series", total, summary.len());
    out
}

async fn run(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config.storage)?;

    let Some(cadence) = cadence_for(&config) else {
        if config.collection.mode == RunMode::Analyze {
            let engine = CorrelationEngine::new(store, config.analysis.settings());
            let report = engine
                .generate_report(config.analysis.days_back)
                .context("correlation analysis failed")?;
            print!("{}", report);
        } else {
            let summary = store.summary().context("failed to read store summary")?;
            print!("{}", format_summary(&summary));
        }
        return Ok(());
    };

    let collectors = build_collectors(&config);
    if collectors.is_empty() {
        warn!("No collectors configured; add [[collectors]] entries to the configuration");
    }

    let mut orchestrator = Orchestrator::new(collectors, Arc::clone(&store))
        .with_timeout(config.collection.collector_timeout());
    if config.alerts.enabled {
        let mut evaluator = AlertEvaluator::new(Arc::clone(&store), config.alerts.rules())
            .with_sink(Box::new(LogSink));
        if let Some(path) = &config.alerts.log_path {
            info!("Appending alert history to {}", path.display());
            evaluator = evaluator.with_sink(Box::new(AlertLogSink::new(path)));
        }
        orchestrator = orchestrator.with_evaluator(evaluator);
    }

    if cadence == Cadence::Once {
        let report = orchestrator.run_once().await;
        print!("{}", report);
        if let Some(evaluator) = orchestrator.evaluator() {
            for event in evaluator.active_events() {
                println!("{}", event);
            }
        }
        return Ok(());
    }

    let (shutdown_sender, shutdown_receiver) = watch::channel(false);
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), finishing current cycle and shutting down...");
        if let Err(e) = shutdown_sender.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("failed to install SIGINT handler")?;

    info!("profitwatch is running. Press Ctrl+C to stop.");
    let cycles = orchestrator.run(cadence, shutdown_receiver).await;
    info!("Shutdown complete after {} collection cycles", cycles);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting profitwatch");

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    cli.apply_overrides(&mut config);
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
