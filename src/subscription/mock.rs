//! Subscription source driven by hand, for tests.
//!
//! `MockSource` stands in for terminal input or any other external source so
//! page and runtime behaviour can be exercised deterministically:
//!
//! ```
//! use storefront::subscription::{Subscription, mock::MockSource};
//!
//! let keys = MockSource::<char>::new();
//! let subscription = Subscription::new(keys.clone()).map(|c| c.to_ascii_uppercase());
//!
//! // `emit` fails until the runtime has opened the stream.
//! assert!(keys.emit('d').is_err());
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::subscription::{SubscriptionId, SubscriptionSource};

static NEXT_MOCK_ID: AtomicU64 = AtomicU64::new(0);

/// A subscription source that emits values on demand.
///
/// Clones share the same channel and identity, so the test keeps one clone
/// and hands the other to the application.
#[derive(Debug, Clone)]
pub struct MockSource<T: Clone> {
    sender: broadcast::Sender<T>,
    id: SubscriptionId,
}

impl<T: Clone + 'static> MockSource<T> {
    /// Creates a mock buffering up to `capacity` values per receiver.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            id: SubscriptionId::of::<Self>(NEXT_MOCK_ID.fetch_add(1, Ordering::Relaxed)),
        }
    }

    /// Creates a mock with room for 100 buffered values.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Emits a value to every open stream.
    ///
    /// # Errors
    ///
    /// Returns an error if no stream is open.
    pub fn emit(&self, value: T) -> Result<usize, broadcast::error::SendError<T>> {
        self.sender.send(value)
    }

    /// Number of open streams.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone + 'static> Default for MockSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> SubscriptionSource for MockSource<T> {
    type Output = T;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        BroadcastStream::new(self.sender.subscribe())
            .filter_map(|result| async move { result.ok() })
            .boxed()
    }

    fn id(&self) -> SubscriptionId {
        self.id
    }
}
