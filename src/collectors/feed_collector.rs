use crate::collectors::{CollectorAdapter, FetchFuture};
use crate::error::CollectionError;
use crate::records::{Category, TimeSeriesRecord};
use log::{debug, warn};
use std::io::ErrorKind;
use std::path::PathBuf;

/// Collector that reads a JSON array of records from a feed file
///
/// The site and API scrapers run outside this process and drop their normalized
/// output into feed files. Each fetch re-reads the file; records that were
/// already stored are skipped by the store, so re-reading an unchanged feed is
/// harmless.
pub struct FeedCollector {
    name: String,
    category: Category,
    path: PathBuf,
}

impl FeedCollector {
    /// Create a feed collector
    ///
    /// # Arguments
    ///
    /// * `name` - Collector name used in cycle reports
    /// * `category` - Category whose cadence drives this collector
    /// * `path` - JSON file containing an array of records
    pub fn new(name: impl Into<String>, category: Category, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            category,
            path: path.into(),
        }
    }

    /// Parse feed contents, dropping records outside this collector's category
    fn parse(&self, contents: &str) -> Result<Vec<TimeSeriesRecord>, CollectionError> {
        let records: Vec<TimeSeriesRecord> = serde_json::from_str(contents).map_err(|e| {
            CollectionError::MalformedPayload(format!("{}: {}", self.path.display(), e))
        })?;

        let total = records.len();
        let records: Vec<TimeSeriesRecord> = records
            .into_iter()
            .filter(|record| self.category.owns_series(&record.series_id))
            .collect();

        if records.len() < total {
            warn!(
                "Collector '{}' dropped {} records outside category {}",
                self.name,
                total - records.len(),
                self.category
            );
        }
        Ok(records)
    }
}

impl CollectorAdapter for FeedCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Category {
        self.category
    }

    fn fetch(&self) -> FetchFuture<'_> {
        Box::pin(async move {
            debug!("Reading feed {} for '{}'", self.path.display(), self.name);
            let contents = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| match e.kind() {
                    ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                        CollectionError::Unreachable(format!("{}: {}", self.path.display(), e))
                    }
                    _ => CollectionError::IoError(e),
                })?;
            self.parse(&contents)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn feed_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_fetch_parses_records() {
        let file = feed_file(
            r#"[
                {"series_id": "treasury:10y", "timestamp": "2026-02-02T15:00:00Z", "value": 4.35, "source": "yahoo_finance_^TNX"},
                {"series_id": "energy:natural_gas", "timestamp": "2026-02-02T15:00:00Z", "value": 3.12, "source": "yahoo_finance_NG=F",
                 "metadata": {"unit": "MMBtu"}}
            ]"#,
        );
        let collector = FeedCollector::new("markets", Category::FinancialMarkets, file.path());

        let records = collector.fetch().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].series_id, "treasury:10y");
        assert_eq!(records[1].metadata["unit"], "MMBtu");
    }

    #[tokio::test]
    async fn test_fetch_drops_foreign_series() {
        let file = feed_file(
            r#"[
                {"series_id": "gpu_pricing:H100", "timestamp": "2026-02-02T15:00:00Z", "value": 2.99, "source": "lambda_labs"},
                {"series_id": "treasury:10y", "timestamp": "2026-02-02T15:00:00Z", "value": 4.35, "source": "yahoo"}
            ]"#,
        );
        let collector = FeedCollector::new("gpu", Category::GpuPricing, file.path());

        let records = collector.fetch().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].series_id, "gpu_pricing:H100");
    }

    #[tokio::test]
    async fn test_missing_feed_is_unreachable() {
        let collector = FeedCollector::new("gpu", Category::GpuPricing, "/nonexistent/feed.json");
        let result = collector.fetch().await;
        assert!(matches!(result, Err(CollectionError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_malformed_feed() {
        let file = feed_file("{ not json");
        let collector = FeedCollector::new("news", Category::News, file.path());
        let result = collector.fetch().await;
        assert!(matches!(result, Err(CollectionError::MalformedPayload(_))));
    }

    #[test]
    fn test_name_and_category() {
        let collector = FeedCollector::new("filings", Category::Filings, "feeds/sec.json");
        assert_eq!(collector.name(), "filings");
        assert_eq!(collector.category(), Category::Filings);
    }
}
