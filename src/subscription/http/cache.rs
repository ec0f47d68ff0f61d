use std::time::{Duration, Instant};

use super::query::{QueryError, QueryState};

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Pending,
    Success,
    Error,
}

/// One cached read: the last settled value or error, plus whether a fetch is
/// currently running for it.
///
/// A refetch keeps the previous data visible while pending.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub status: QueryStatus,
    pub data: Option<T>,
    pub error: Option<QueryError>,
    pub timestamp: Instant,
    pub is_stale: bool,
}

impl<T> CacheEntry<T> {
    /// An entry whose first fetch has just started.
    pub fn pending() -> Self {
        Self {
            status: QueryStatus::Pending,
            data: None,
            error: None,
            timestamp: Instant::now(),
            is_stale: true,
        }
    }

    pub fn mark_pending(&mut self) {
        self.status = QueryStatus::Pending;
    }

    pub const fn mark_stale(&mut self) {
        self.is_stale = true;
    }

    /// Records a successful fetch.
    pub fn succeed(&mut self, data: T) {
        self.status = QueryStatus::Success;
        self.data = Some(data);
        self.error = None;
        self.timestamp = Instant::now();
        self.is_stale = false;
    }

    /// Records a failed fetch. Previous data is dropped so observers never mix
    /// an error with an older value.
    pub fn fail(&mut self, error: QueryError) {
        self.status = QueryStatus::Error;
        self.data = None;
        self.error = Some(error);
        self.timestamp = Instant::now();
        self.is_stale = true;
    }

    /// Checks staleness against `stale_time`, latching the flag once set.
    pub fn check_staleness(&mut self, stale_time: Duration) -> bool {
        if self.timestamp.elapsed() >= stale_time {
            self.is_stale = true;
        }
        self.is_stale
    }

    pub fn should_gc(&self, cache_time: Duration) -> bool {
        self.status != QueryStatus::Pending && self.timestamp.elapsed() > cache_time
    }
}

impl<T: Clone> CacheEntry<T> {
    /// The entry as observers see it.
    pub fn state(&self) -> QueryState<T> {
        match (self.status, &self.data, &self.error) {
            (QueryStatus::Error, _, Some(error)) => QueryState::Error(error.clone()),
            (_, Some(data), _) => QueryState::Success {
                data: data.clone(),
                is_stale: self.is_stale || self.status == QueryStatus::Pending,
            },
            _ => QueryState::Loading,
        }
    }
}
