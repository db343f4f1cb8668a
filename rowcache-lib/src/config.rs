//! Session configuration

use std::time::Duration;

use crate::cache::BatchLayout;
use crate::cache::DEFAULT_BATCH_SIZE;
use crate::fetch::RetryConfig;

/// Extra rows kept warm on each side of the visible range by default.
pub const DEFAULT_OVERSCAN: usize = 20;

/// Configuration for a [`TableSession`](crate::session::TableSession).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rowcache_lib::SessionConfig;
///
/// let config = SessionConfig::default()
///     .with_batch_size(200)
///     .with_overscan(50)
///     .with_fetch_timeout(Duration::from_secs(10));
/// assert_eq!(config.layout().batch_size(), 200);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Rows per batch, the unit of fetching.
    ///
    /// Default: 100
    pub batch_size: usize,

    /// Rows fetched beyond each edge of the visible range.
    ///
    /// Default: 20
    pub overscan: usize,

    /// Whether to prefetch the batch after the buffered range.
    ///
    /// Default: true
    pub prefetch: bool,

    /// Timeout for a single fetch attempt.
    ///
    /// Default: 30 seconds
    pub fetch_timeout: Duration,

    /// Maximum simultaneous batch requests per session.
    ///
    /// Default: 6
    pub max_concurrent_fetches: usize,

    /// Retry policy for failed batch requests.
    pub retry: RetryConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            overscan: DEFAULT_OVERSCAN,
            prefetch: true,
            fetch_timeout: Duration::from_secs(30),
            max_concurrent_fetches: 6,
            retry: RetryConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the overscan margin.
    pub fn with_overscan(mut self, overscan: usize) -> Self {
        self.overscan = overscan;
        self
    }

    /// Enables or disables prefetching of the next batch.
    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Sets the per-attempt fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Sets the concurrent fetch ceiling. Zero is treated as one.
    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = limit;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the batch layout for this config.
    pub fn layout(&self) -> BatchLayout {
        BatchLayout::new(self.batch_size)
    }
}
