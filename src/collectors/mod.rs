/// Collector that reads records exported by an external scraper
pub mod feed_collector;

/// Scriptable collector for tests and dry runs
pub mod mock_collector;

pub use feed_collector::FeedCollector;
pub use mock_collector::MockCollector;

use crate::error::CollectionError;
use crate::records::{Category, TimeSeriesRecord};
use std::future::Future;
use std::pin::Pin;

/// Future returned by [`CollectorAdapter::fetch`]
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<TimeSeriesRecord>, CollectionError>> + Send + 'a>>;

/// Uniform interface over a data source
///
/// Each adapter wraps one source (a pricing page, a market data API, a news
/// feed) and returns normalized records. Adapters fail independently: an error
/// from one never affects the others in the same cycle.
pub trait CollectorAdapter: Send + Sync {
    /// Unique name used in cycle reports and logs
    fn name(&self) -> &str;

    /// Category that decides the collection cadence
    fn category(&self) -> Category;

    /// Fetch the current records from the source
    fn fetch(&self) -> FetchFuture<'_>;
}
