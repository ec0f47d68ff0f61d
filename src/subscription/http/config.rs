use std::time::Duration;

/// Configuration for query caching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// How long data is considered fresh.
    ///
    /// A `Query` subscribing to fresh data serves it from the cache without a
    /// request. Stale data is served and refetched in the background.
    pub stale_time: Duration,

    /// How long an entry survives after its last update before
    /// [`QueryClient::collect_garbage`](super::QueryClient::collect_garbage)
    /// evicts it.
    pub cache_time: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,              // immediately stale
            cache_time: Duration::from_secs(5 * 60), // 5 minutes
        }
    }
}

impl QueryConfig {
    #[must_use]
    pub const fn new(stale_time: Duration, cache_time: Duration) -> Self {
        Self {
            stale_time,
            cache_time,
        }
    }
}
