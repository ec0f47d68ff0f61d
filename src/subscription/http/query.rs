//! Cached, deduplicated reads.
//!
//! [`QueryClient`] is the shared cache: one per application instance, handed to
//! every page as an `Arc`. [`Query`] is the subscription a page returns from
//! `subscriptions()` to observe one key.
//!
//! # Lifecycle of a key
//!
//! 1. The first observer finds no entry, emits `Loading` and starts the fetch.
//! 2. Any read of the same key issued before that fetch settles joins it
//!    instead of calling the fetcher again.
//! 3. The settled value (or error) is written to the entry; every observer
//!    sees the same result.
//! 4. [`QueryClient::invalidate`] marks the key stale and wakes the active
//!    `Query` subscriptions, which refetch. Subscriptions reacting to the same
//!    invalidation share one request.
//!
//! # Example
//!
//! ```rust,ignore
//! fn subscriptions(&self) -> Vec<Subscription<Message>> {
//!     let api = Arc::clone(&self.api);
//!     vec![
//!         Subscription::new(Query::new(
//!             QueryKey::new("products"),
//!             move || {
//!                 let api = Arc::clone(&api);
//!                 Box::pin(async move { api.list_products().await })
//!             },
//!             Arc::clone(&self.query_client),
//!         ))
//!         .map(Message::Products),
//!     ]
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::command::Command;
use crate::subscription::{SubscriptionId, SubscriptionSource};

use super::cache::CacheEntry;
use super::config::QueryConfig;

/// Error type for reads and writes against the remote service.
///
/// `Clone` because one failed fetch is handed to every observer of the key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The request never produced a response.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The server answered with a non-2xx status.
    #[error("Server responded with {status}: {message}")]
    Status { status: u16, message: String },

    /// The response could not be decoded, or the fetch failed locally.
    #[error("Fetch failed: {0}")]
    FetchError(String),
}

impl QueryError {
    /// The HTTP status of a rejected request.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Identity of a logical read: a resource name plus an optional identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    resource: &'static str,
    id: Option<String>,
}

impl QueryKey {
    #[must_use]
    pub const fn new(resource: &'static str) -> Self {
        Self { resource, id: None }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub const fn resource(&self) -> &'static str {
        self.resource
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}/{id}", self.resource),
            None => f.write_str(self.resource),
        }
    }
}

/// What an observer sees for a key.
#[derive(Debug, Clone)]
pub enum QueryState<T> {
    /// Nothing requested yet, or the query is disabled.
    Idle,
    /// The first fetch is in flight and there is no data to show.
    Loading,
    /// Data is available. `is_stale` is set while a refetch is due or running.
    Success { data: T, is_stale: bool },
    /// The last fetch failed.
    Error(QueryError),
}

impl<T> QueryState<T> {
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    pub const fn error(&self) -> Option<&QueryError> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Success { is_stale: true, .. })
    }
}

/// A state update emitted by a [`Query`] subscription.
#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    /// The key this update belongs to. Pages use it to drop updates for a key
    /// they no longer display.
    pub key: QueryKey,
    pub state: QueryState<T>,
}

impl<T> QueryResult<T> {
    pub const fn data(&self) -> Option<&T> {
        self.state.data()
    }

    pub const fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub const fn is_success(&self) -> bool {
        self.state.is_success()
    }

    pub const fn is_error(&self) -> bool {
        self.state.is_error()
    }

    pub const fn is_stale(&self) -> bool {
        self.state.is_stale()
    }
}

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, QueryError>>>;

/// Type-erased cache entry, so invalidation and eviction work without knowing
/// the value type.
trait ErasedEntry: Send + Sync {
    fn mark_stale(&mut self);
    fn should_gc(&self, cache_time: Duration) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Send + Sync + 'static> ErasedEntry for CacheEntry<T> {
    fn mark_stale(&mut self) {
        CacheEntry::mark_stale(self);
    }

    fn should_gc(&self, cache_time: Duration) -> bool {
        CacheEntry::should_gc(self, cache_time)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A fetch that has been started and not yet settled.
struct InFlight {
    generation: u64,
    future: Box<dyn Any + Send + Sync>,
}

#[derive(Debug, Clone)]
struct Invalidation {
    key: QueryKey,
    /// Fetches with a generation above this started after the invalidation.
    epoch: u64,
}

/// The shared query cache.
///
/// Cheap to clone; clones share the same cache.
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use storefront::subscription::http::{QueryClient, QueryConfig};
///
/// let config = QueryConfig::new(Duration::from_secs(30), Duration::from_secs(300));
/// let client = Arc::new(QueryClient::with_config(config));
/// ```
#[derive(Clone)]
pub struct QueryClient {
    cache: Arc<DashMap<QueryKey, Box<dyn ErasedEntry>>>,
    in_flight: Arc<DashMap<QueryKey, InFlight>>,
    generation: Arc<AtomicU64>,
    invalidation_tx: broadcast::Sender<Invalidation>,
    config: QueryConfig,
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("entries", &self.cache.len())
            .field("in_flight", &self.in_flight.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(QueryConfig::default())
    }

    #[must_use]
    pub fn with_config(config: QueryConfig) -> Self {
        let (invalidation_tx, _) = broadcast::channel(100);
        Self {
            cache: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            invalidation_tx,
            config,
        }
    }

    pub const fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Reads `key`, joining a fetch already in flight for it.
    ///
    /// The fetcher is only called when no fetch for the key is running.
    ///
    /// # Errors
    ///
    /// Returns the fetch failure. The same failure is recorded in the entry.
    pub async fn fetch<V, F>(&self, key: &QueryKey, fetcher: F) -> Result<V, QueryError>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> BoxFuture<'static, Result<V, QueryError>>,
    {
        self.run(key, fetcher, 0).await
    }

    /// Reads `key` with a new fetcher invocation, whatever is cached or
    /// in flight. The entry is updated in place when it settles.
    ///
    /// # Errors
    ///
    /// Returns the fetch failure. The same failure is recorded in the entry.
    pub async fn refetch<V, F>(&self, key: &QueryKey, fetcher: F) -> Result<V, QueryError>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> BoxFuture<'static, Result<V, QueryError>>,
    {
        let floor = self.current_generation();
        self.run(key, fetcher, floor).await
    }

    /// Current state of `key`. Unknown keys (or keys cached with another
    /// value type) are `Idle`.
    pub fn state<V: Clone + Send + Sync + 'static>(&self, key: &QueryKey) -> QueryState<V> {
        self.get_cache::<V>(key)
            .map_or(QueryState::Idle, |entry| entry.state())
    }

    /// Returns `true` while a fetch for `key` is running.
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Marks `key` stale and notifies active queries, as a command.
    ///
    /// ```rust,ignore
    /// Message::Created(settled) => self.create.settle_with(
    ///     settled,
    ///     |()| self.query_client.invalidate(&QueryKey::new("products")),
    ///     |_| Command::none(),
    /// )
    /// ```
    pub fn invalidate<Msg>(&self, key: &QueryKey) -> Command<Msg>
    where
        Msg: Send + 'static,
    {
        let client = self.clone();
        let key = key.clone();

        Command {
            stream: Some(
                stream::once(async move { client.invalidate_now(&key) })
                    .filter_map(|()| async { None })
                    .boxed(),
            ),
        }
    }

    /// Marks `key` stale and notifies active queries immediately.
    pub fn invalidate_now(&self, key: &QueryKey) {
        if let Some(mut entry) = self.cache.get_mut(key) {
            entry.mark_stale();
        }

        let epoch = self.current_generation();
        debug!(%key, epoch, "invalidating query");
        // no active query is fine
        let _ = self.invalidation_tx.send(Invalidation {
            key: key.clone(),
            epoch,
        });
    }

    /// Evicts settled entries older than `cache_time`. Returns how many were
    /// removed.
    pub fn collect_garbage(&self) -> usize {
        let before = self.cache.len();
        let cache_time = self.config.cache_time;
        self.cache.retain(|_, entry| !entry.should_gc(cache_time));
        before - self.cache.len()
    }

    fn subscribe_invalidation(&self) -> broadcast::Receiver<Invalidation> {
        self.invalidation_tx.subscribe()
    }

    fn get_cache<V: Clone + Send + Sync + 'static>(&self, key: &QueryKey) -> Option<CacheEntry<V>> {
        self.cache
            .get(key)
            .and_then(|entry| entry.as_any().downcast_ref::<CacheEntry<V>>().cloned())
    }

    fn update_entry<V: Send + Sync + 'static>(
        &self,
        key: &QueryKey,
        update: impl FnOnce(&mut CacheEntry<V>),
    ) {
        let mut slot = self
            .cache
            .entry(key.clone())
            .or_insert_with(|| Box::new(CacheEntry::<V>::pending()) as Box<dyn ErasedEntry>);

        if let Some(entry) = slot.as_any_mut().downcast_mut::<CacheEntry<V>>() {
            update(entry);
        } else {
            warn!(%key, "query key reused with a different value type, replacing entry");
            let mut entry = CacheEntry::<V>::pending();
            update(&mut entry);
            *slot = Box::new(entry);
        }
    }

    async fn run<V, F>(&self, key: &QueryKey, fetcher: F, floor: u64) -> Result<V, QueryError>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> BoxFuture<'static, Result<V, QueryError>>,
    {
        self.begin(key, fetcher, floor).await
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Joins the in-flight fetch for `key` if it started after `floor`,
    /// otherwise launches a new one.
    ///
    /// A launch marks the entry pending while the `in_flight` slot is still
    /// locked, so no joiner can settle the entry before it is marked.
    fn begin<V, F>(&self, key: &QueryKey, fetcher: F, floor: u64) -> SharedFetch<V>
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> BoxFuture<'static, Result<V, QueryError>>,
    {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if current.generation > floor {
                    if let Some(shared) = current.future.downcast_ref::<SharedFetch<V>>() {
                        debug!(%key, generation = current.generation, "joining in-flight fetch");
                        return shared.clone();
                    }
                }
                let (generation, shared) = self.launch(key, fetcher);
                self.update_entry::<V>(key, CacheEntry::mark_pending);
                occupied.insert(InFlight {
                    generation,
                    future: Box::new(shared.clone()),
                });
                shared
            }
            Entry::Vacant(vacant) => {
                let (generation, shared) = self.launch(key, fetcher);
                self.update_entry::<V>(key, CacheEntry::mark_pending);
                vacant.insert(InFlight {
                    generation,
                    future: Box::new(shared.clone()),
                });
                shared
            }
        }
    }

    /// Wraps the fetcher's future so that settling writes the entry exactly
    /// once per generation, whoever is polling it.
    fn launch<V, F>(&self, key: &QueryKey, fetcher: F) -> (u64, SharedFetch<V>)
    where
        V: Clone + Send + Sync + 'static,
        F: FnOnce() -> BoxFuture<'static, Result<V, QueryError>>,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(%key, generation, "starting fetch");

        let request = fetcher();
        let client = self.clone();
        let key = key.clone();
        let shared = async move {
            let result = request.await;
            client.settle(&key, generation, &result);
            result
        }
        .boxed()
        .shared();

        (generation, shared)
    }

    fn settle<V>(&self, key: &QueryKey, generation: u64, result: &Result<V, QueryError>)
    where
        V: Clone + Send + Sync + 'static,
    {
        match result {
            Ok(data) => self.update_entry::<V>(key, |entry| entry.succeed(data.clone())),
            Err(error) => {
                warn!(%key, generation, %error, "fetch failed");
                self.update_entry::<V>(key, |entry| entry.fail(error.clone()));
            }
        }
        self.in_flight
            .remove_if(key, |_, in_flight| in_flight.generation == generation);
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

type Fetcher<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync>;

/// A subscription observing one key of the [`QueryClient`].
///
/// On start it serves cached data when present, fetches when the data is
/// missing or stale, then refetches on every invalidation of its key.
///
/// A disabled query emits [`QueryState::Idle`] once and never calls its
/// fetcher; because `enabled` is part of the subscription id, enabling it
/// starts a fresh subscription that fetches.
pub struct Query<V> {
    key: QueryKey,
    fetcher: Fetcher<V>,
    client: Arc<QueryClient>,
    enabled: bool,
}

impl<V> Query<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F>(key: QueryKey, fetcher: F, client: Arc<QueryClient>) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
    {
        Self {
            key,
            fetcher: Arc::new(fetcher),
            client,
            enabled: true,
        }
    }

    /// A query keyed by `resource` and an identifier that may not be known
    /// yet. Disabled while `id` is `None`.
    pub fn with_id<F>(
        resource: &'static str,
        id: Option<String>,
        fetcher: F,
        client: Arc<QueryClient>,
    ) -> Self
    where
        F: Fn(String) -> BoxFuture<'static, Result<V, QueryError>> + Send + Sync + 'static,
    {
        let key = match &id {
            Some(id) => QueryKey::new(resource).with_id(id.clone()),
            None => QueryKey::new(resource),
        };
        let enabled = id.is_some();

        Self::new(
            key,
            move || match &id {
                Some(id) => fetcher(id.clone()),
                None => future::ready(Err(QueryError::FetchError(
                    "query has no identifier".to_string(),
                )))
                .boxed(),
            },
            client,
        )
        .enabled(enabled)
    }

    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub const fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl<V> SubscriptionSource for Query<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Output = QueryResult<V>;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        let key = self.key.clone();

        if !self.enabled {
            let idle = QueryResult {
                key,
                state: QueryState::Idle,
            };
            return stream::once(future::ready(idle))
                .chain(stream::pending())
                .boxed();
        }

        let fetcher = Arc::clone(&self.fetcher);
        let client = Arc::clone(&self.client);

        stream::unfold(State::Initial, move |state| {
            let key = key.clone();
            let fetcher = Arc::clone(&fetcher);
            let client = Arc::clone(&client);

            async move {
                match state {
                    State::Initial => {
                        // subscribe first so an invalidation during the fetch is not lost
                        let rx = client.subscribe_invalidation();
                        let stale_time = client.config().stale_time;

                        match client.get_cache::<V>(&key) {
                            Some(mut cached) if cached.data.is_some() => {
                                let is_stale = cached.check_staleness(stale_time);
                                let state = cached.state();
                                let next = if is_stale {
                                    State::Fetching { rx, floor: 0 }
                                } else {
                                    State::Watching { rx }
                                };
                                Some((QueryResult { key, state }, next))
                            }
                            _ => Some((
                                QueryResult {
                                    key,
                                    state: QueryState::Loading,
                                },
                                State::Fetching { rx, floor: 0 },
                            )),
                        }
                    }

                    State::Fetching { rx, floor } => {
                        let state = match client.run(&key, || fetcher(), floor).await {
                            Ok(data) => QueryState::Success {
                                data,
                                is_stale: false,
                            },
                            Err(error) => QueryState::Error(error),
                        };
                        Some((QueryResult { key, state }, State::Watching { rx }))
                    }

                    State::Watching { mut rx } => loop {
                        let floor = match rx.recv().await {
                            Ok(invalidation) if invalidation.key == key => invalidation.epoch,
                            Ok(_) => continue,
                            // a skipped notice may have been for this key
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                debug!(%key, skipped, "invalidations lagged, refetching");
                                client.current_generation()
                            }
                            Err(broadcast::error::RecvError::Closed) => return None,
                        };
                        let state = match client.state::<V>(&key) {
                            state @ QueryState::Success { .. } => state,
                            _ => QueryState::Loading,
                        };
                        return Some((QueryResult { key, state }, State::Fetching { rx, floor }));
                    },
                }
            }
        })
        .boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}

impl<V> Hash for Query<V> {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.key.hash(hasher);
        self.enabled.hash(hasher);
    }
}

enum State {
    Initial,
    Fetching {
        rx: broadcast::Receiver<Invalidation>,
        floor: u64,
    },
    Watching {
        rx: broadcast::Receiver<Invalidation>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Semaphore;
    use tokio::time::timeout;

    type TestFetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<i32, QueryError>> + Send + Sync>;

    /// Fetcher returning `value` and counting calls. Each invocation consumes
    /// one permit of `gate` before settling.
    fn gated_fetcher(calls: Arc<AtomicUsize>, gate: Arc<Semaphore>, value: i32) -> TestFetcher {
        Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let gate = Arc::clone(&gate);
            async move {
                gate.acquire()
                    .await
                    .map_err(|e| QueryError::FetchError(e.to_string()))?
                    .forget();
                Ok(value)
            }
            .boxed()
        })
    }

    fn open_gate() -> Arc<Semaphore> {
        Arc::new(Semaphore::new(Semaphore::MAX_PERMITS))
    }

    #[test]
    fn test_query_key_display() {
        assert_eq!(QueryKey::new("products").to_string(), "products");
        assert_eq!(QueryKey::new("product").with_id("7").to_string(), "product/7");
        assert_ne!(QueryKey::new("product"), QueryKey::new("product").with_id("7"));
    }

    #[test]
    fn test_query_error_display() {
        let err = QueryError::NetworkError("connection refused".to_string());
        assert_eq!(err.to_string(), "Network error: connection refused");

        let err = QueryError::Status {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Server responded with 500: boom");
        assert!(!err.is_not_found());
        assert!(
            QueryError::Status {
                status: 404,
                message: String::new()
            }
            .is_not_found()
        );
    }

    #[test]
    fn test_query_result_predicates() {
        let key = QueryKey::new("products");
        let loading: QueryResult<i32> = QueryResult {
            key: key.clone(),
            state: QueryState::Loading,
        };
        assert!(loading.is_loading());
        assert_eq!(loading.data(), None);

        let stale = QueryResult {
            key: key.clone(),
            state: QueryState::Success {
                data: 1,
                is_stale: true,
            },
        };
        assert!(stale.is_success());
        assert!(stale.is_stale());
        assert_eq!(stale.data(), Some(&1));

        let error: QueryResult<i32> = QueryResult {
            key,
            state: QueryState::Error(QueryError::FetchError("bad json".to_string())),
        };
        assert!(error.is_error());
        assert!(!error.is_success());
    }

    #[test]
    fn test_unknown_key_is_idle() {
        let client = QueryClient::new();
        assert!(client.state::<i32>(&QueryKey::new("products")).is_idle());
    }

    #[tokio::test]
    async fn test_fetch_stores_success() {
        let client = QueryClient::new();
        let key = QueryKey::new("products");
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = gated_fetcher(Arc::clone(&calls), open_gate(), 42);

        let result = client.fetch(&key, || fetcher()).await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            client.state::<i32>(&key),
            QueryState::Success {
                data: 42,
                is_stale: false
            }
        ));
        assert!(!client.is_fetching(&key));
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_invocation() {
        let client = QueryClient::new();
        let key = QueryKey::new("products");
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = gated_fetcher(Arc::clone(&calls), Arc::clone(&gate), 7);

        let (first, second, ()) = tokio::join!(
            client.fetch(&key, || fetcher()),
            client.fetch(&key, || fetcher()),
            async {
                tokio::task::yield_now().await;
                assert!(client.is_fetching(&key));
                assert!(client.state::<i32>(&key).is_loading());
                gate.add_permits(1);
            }
        );

        assert_eq!(first, Ok(7));
        assert_eq!(second, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refetch_forces_new_invocation() {
        let client = QueryClient::new();
        let key = QueryKey::new("products");
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = gated_fetcher(Arc::clone(&calls), open_gate(), 1);

        client.fetch(&key, || fetcher()).await.expect("first fetch");
        client.refetch(&key, || fetcher()).await.expect("refetch");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refetch_does_not_join_pending_fetch() {
        let client = QueryClient::new();
        let key = QueryKey::new("products");
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = gated_fetcher(Arc::clone(&calls), Arc::clone(&gate), 3);

        let (first, second, ()) = tokio::join!(
            client.fetch(&key, || fetcher()),
            client.refetch(&key, || fetcher()),
            async {
                tokio::task::yield_now().await;
                gate.add_permits(2);
            }
        );

        assert_eq!(first, Ok(3));
        assert_eq!(second, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_last_to_settle_wins() {
        let client = QueryClient::new();
        let key = QueryKey::new("products");
        let slow_gate = Arc::new(Semaphore::new(0));
        let fast_gate = Arc::new(Semaphore::new(0));
        let slow = gated_fetcher(Arc::new(AtomicUsize::new(0)), Arc::clone(&slow_gate), 1);
        let fast = gated_fetcher(Arc::new(AtomicUsize::new(0)), Arc::clone(&fast_gate), 2);

        // The first-issued fetch settles last, so its value is kept.
        let _ = tokio::join!(
            client.fetch(&key, || slow()),
            client.refetch(&key, || fast()),
            async {
                tokio::task::yield_now().await;
                fast_gate.add_permits(1);
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
                slow_gate.add_permits(1);
            }
        );

        assert_eq!(client.state::<i32>(&key).data(), Some(&1));
    }

    #[tokio::test]
    async fn test_launch_marks_entry_before_any_joiner_settles_it() {
        let client = QueryClient::new();
        let key = QueryKey::new("products");
        let fetcher = gated_fetcher(Arc::new(AtomicUsize::new(0)), open_gate(), 8);

        let launched = client.begin(&key, || fetcher(), 0);
        assert!(client.state::<i32>(&key).is_loading());

        // the joiner drives the shared fetch to completion first
        let joined = client.begin(&key, || fetcher(), 0);
        assert_eq!(joined.await, Ok(8));
        assert_eq!(launched.await, Ok(8));

        assert!(matches!(
            client.state::<i32>(&key),
            QueryState::Success {
                data: 8,
                is_stale: false
            }
        ));
        assert!(!client.is_fetching(&key));
    }

    #[tokio::test]
    async fn test_failed_fetch_is_recorded_not_raised() {
        let client = QueryClient::new();
        let key = QueryKey::new("products");

        let result = client
            .fetch(&key, || {
                Box::pin(async {
                    Err::<i32, _>(QueryError::NetworkError("connection refused".to_string()))
                })
            })
            .await;

        assert!(result.is_err());
        assert!(matches!(
            client.state::<i32>(&key),
            QueryState::Error(QueryError::NetworkError(_))
        ));
        assert!(!client.is_fetching(&key));
    }

    #[tokio::test]
    async fn test_invalidate_command_broadcasts_without_messages() {
        let client = QueryClient::new();
        let mut rx = client.subscribe_invalidation();

        let cmd: Command<()> = client.invalidate(&QueryKey::new("products"));
        assert!(cmd.into_messages().await.is_empty());

        let invalidation = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("notification within timeout")
            .expect("channel open");
        assert_eq!(invalidation.key, QueryKey::new("products"));
    }

    #[tokio::test]
    async fn test_invalidate_marks_entry_stale() {
        let client = QueryClient::new();
        let key = QueryKey::new("products");
        client
            .fetch(&key, || Box::pin(async { Ok(5) }))
            .await
            .expect("fetch");

        client.invalidate_now(&key);

        assert!(client.state::<i32>(&key).is_stale());
    }

    #[tokio::test]
    async fn test_collect_garbage_evicts_old_entries() {
        let client = QueryClient::with_config(QueryConfig::new(Duration::ZERO, Duration::ZERO));
        client
            .fetch(&QueryKey::new("products"), || Box::pin(async { Ok(1) }))
            .await
            .expect("fetch");
        tokio::time::sleep(Duration::from_millis(2)).await;

        assert_eq!(client.collect_garbage(), 1);
        assert!(client.state::<i32>(&QueryKey::new("products")).is_idle());
    }

    #[tokio::test]
    async fn test_query_stream_loads_then_succeeds() {
        let client = Arc::new(QueryClient::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = gated_fetcher(Arc::clone(&calls), open_gate(), 9);
        let query = Query::new(QueryKey::new("products"), move || fetcher(), client);

        let mut stream = query.stream();
        let first = stream.next().await.expect("loading state");
        let second = stream.next().await.expect("success state");

        assert!(first.is_loading());
        assert_eq!(second.data(), Some(&9));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_stream_serves_fresh_cache_without_fetching() {
        let client = Arc::new(QueryClient::with_config(QueryConfig::new(
            Duration::from_secs(60),
            Duration::from_secs(300),
        )));
        let key = QueryKey::new("products");
        client
            .fetch(&key, || Box::pin(async { Ok(1) }))
            .await
            .expect("warm cache");

        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = gated_fetcher(Arc::clone(&calls), open_gate(), 2);
        let query = Query::new(key, move || fetcher(), client);

        let mut stream = query.stream();
        let first = stream.next().await.expect("cached state");
        assert_eq!(first.data(), Some(&1));
        assert!(!first.is_stale());

        assert!(
            timeout(Duration::from_millis(50), stream.next()).await.is_err(),
            "fresh data must not trigger a fetch"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_query_stream_refetches_on_invalidation() {
        let client = Arc::new(QueryClient::new());
        let key = QueryKey::new("products");
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = gated_fetcher(Arc::clone(&calls), open_gate(), 4);
        let query = Query::new(key.clone(), move || fetcher(), Arc::clone(&client));

        let mut stream = query.stream();
        stream.next().await.expect("loading");
        stream.next().await.expect("loaded");

        client.invalidate_now(&key);

        let refreshing = stream.next().await.expect("refreshing");
        assert_eq!(refreshing.data(), Some(&6));
        let refreshed = stream.next().await.expect("refreshed");
        assert_eq!(refreshed.data(), Some(&4));
        assert!(!refreshed.is_stale());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_two_queries_share_invalidation_refetch() {
        let client = Arc::new(QueryClient::new());
        let key = QueryKey::new("products");
        let calls = Arc::new(AtomicUsize::new(0));
        // one permit each for the initial loads of `a` and `b`
        let gate = Arc::new(Semaphore::new(2));
        let fetcher = gated_fetcher(Arc::clone(&calls), Arc::clone(&gate), 4);
        let f1 = Arc::clone(&fetcher);
        let mut a = Query::new(key.clone(), move || f1(), Arc::clone(&client)).stream();
        let mut b = Query::new(key.clone(), move || fetcher(), Arc::clone(&client)).stream();

        a.next().await.expect("a loading");
        a.next().await.expect("a loaded");
        b.next().await.expect("b cached");
        b.next().await.expect("b refreshed");
        let before = calls.load(Ordering::SeqCst);

        client.invalidate_now(&key);
        let (ra, rb, ()) = tokio::join!(
            async {
                a.next().await;
                a.next().await
            },
            async {
                b.next().await;
                b.next().await
            },
            async {
                tokio::task::yield_now().await;
                gate.add_permits(1);
            }
        );

        assert_eq!(ra.and_then(|r| r.data().copied()), Some(4));
        assert_eq!(rb.and_then(|r| r.data().copied()), Some(4));
        assert_eq!(calls.load(Ordering::SeqCst), before + 1);
    }

    #[tokio::test]
    async fn test_lagged_invalidations_trigger_refetch() {
        let client = Arc::new(QueryClient::new());
        let key = QueryKey::new("products");
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = gated_fetcher(Arc::clone(&calls), open_gate(), 6);
        let mut stream = Query::new(key.clone(), move || fetcher(), Arc::clone(&client)).stream();

        stream.next().await.expect("loading");
        stream.next().await.expect("loaded");

        // overflow the receiver with notices for other keys
        for n in 0..150 {
            client.invalidate_now(&QueryKey::new("product").with_id(n.to_string()));
        }

        let refreshing = stream.next().await.expect("refreshing");
        assert_eq!(refreshing.data(), Some(&6));
        let refreshed = stream.next().await.expect("refreshed");
        assert_eq!(refreshed.data(), Some(&6));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_query_never_fetches() {
        let client = Arc::new(QueryClient::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let query = Query::with_id(
            "product",
            None,
            move |_id: String| {
                counted.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(1) })
            },
            client,
        );

        let mut stream = query.stream();
        let first = stream.next().await.expect("idle state");
        assert!(first.state.is_idle());
        assert!(timeout(Duration::from_millis(30), stream.next()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enabled_query_fetches_exactly_once() {
        let client = Arc::new(QueryClient::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let query = Query::with_id(
            "product",
            Some("7".to_string()),
            move |id: String| {
                counted.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move { Ok(id.len()) })
            },
            client,
        );
        assert_eq!(query.key(), &QueryKey::new("product").with_id("7"));

        let mut stream = query.stream();
        stream.next().await.expect("loading");
        let loaded = stream.next().await.expect("loaded");

        assert_eq!(loaded.data(), Some(&1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_query_id_depends_on_key_and_enabled() {
        let client = Arc::new(QueryClient::new());
        let make = |key: QueryKey| {
            Query::new(
                key,
                || Box::pin(async { Ok::<i32, QueryError>(1) }),
                Arc::clone(&client),
            )
        };

        assert_eq!(
            make(QueryKey::new("products")).id(),
            make(QueryKey::new("products")).id()
        );
        assert_ne!(
            make(QueryKey::new("product").with_id("1")).id(),
            make(QueryKey::new("product").with_id("2")).id()
        );
        assert_ne!(
            make(QueryKey::new("products")).id(),
            make(QueryKey::new("products")).enabled(false).id()
        );
    }
}
