use crate::collectors::{CollectorAdapter, FetchFuture};
use crate::error::CollectionError;
use crate::records::{Category, TimeSeriesRecord};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outcome a mock collector replays on fetch
#[derive(Debug, Clone)]
pub enum MockResponse {
    Records(Vec<TimeSeriesRecord>),
    Unreachable(String),
    RateLimited(String),
    MalformedPayload(String),
}

impl MockResponse {
    fn to_result(&self) -> Result<Vec<TimeSeriesRecord>, CollectionError> {
        match self {
            MockResponse::Records(records) => Ok(records.clone()),
            MockResponse::Unreachable(msg) => Err(CollectionError::Unreachable(msg.clone())),
            MockResponse::RateLimited(msg) => Err(CollectionError::RateLimited(msg.clone())),
            MockResponse::MalformedPayload(msg) => {
                Err(CollectionError::MalformedPayload(msg.clone()))
            }
        }
    }
}

/// Mock collector for testing orchestration
///
/// Responses are returned in order. After the last response, the collector
/// keeps cycling through them. Clones share their call counter.
#[derive(Debug, Clone)]
pub struct MockCollector {
    name: String,
    category: Category,
    responses: Vec<MockResponse>,
    current_index: Arc<Mutex<usize>>,
    call_count: Arc<Mutex<usize>>,
    delay: Option<Duration>,
}

impl MockCollector {
    /// Create a mock collector with a sequence of responses
    pub fn with_responses(
        name: &str,
        category: Category,
        responses: Vec<MockResponse>,
    ) -> Self {
        Self {
            name: name.to_string(),
            category,
            responses,
            current_index: Arc::new(Mutex::new(0)),
            call_count: Arc::new(Mutex::new(0)),
            delay: None,
        }
    }

    /// Create a mock collector that always returns the given records
    pub fn returning(name: &str, category: Category, records: Vec<TimeSeriesRecord>) -> Self {
        Self::with_responses(name, category, vec![MockResponse::Records(records)])
    }

    /// Create a mock collector whose source is always unreachable
    pub fn failing(name: &str, category: Category, message: &str) -> Self {
        Self::with_responses(
            name,
            category,
            vec![MockResponse::Unreachable(message.to_string())],
        )
    }

    /// Add a delay to every fetch (useful for testing timeouts)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times fetch() has been called
    pub fn call_count(&self) -> usize {
        self.call_count.lock().map(|count| *count).unwrap_or(0)
    }
}

impl CollectorAdapter for MockCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> Category {
        self.category
    }

    fn fetch(&self) -> FetchFuture<'_> {
        Box::pin(async move {
            if let Ok(mut count) = self.call_count.lock() {
                *count += 1;
            }

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if self.responses.is_empty() {
                return Ok(Vec::new());
            }

            let response_index = match self.current_index.lock() {
                Ok(mut index) => {
                    let current = *index % self.responses.len();
                    *index += 1;
                    current
                }
                Err(_) => 0,
            };
            self.responses[response_index].to_result()
        })
    }
}
