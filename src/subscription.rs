//! Long-lived event sources.
//!
//! A [`Subscription`] wraps a [`SubscriptionSource`]: something that can open a
//! stream of values (terminal input, a cached query, a test mock). The
//! application returns the subscriptions it wants from
//! [`Application::subscriptions`](crate::application::Application::subscriptions)
//! after every update, and the [`SubscriptionManager`] reconciles that list
//! with what is already running using each source's [`SubscriptionId`].
//!
//! Identity is what makes gating work: a page that only wants a detail read
//! once it knows the product id simply stops returning (or starts returning)
//! that query, and the manager starts or cancels the stream accordingly.

pub mod http;
pub mod mock;
pub mod terminal;

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::command::Action;

/// Identity of a running subscription: the source type plus a hash of its
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    type_id: TypeId,
    hash: u64,
}

impl SubscriptionId {
    /// Builds an id for source type `T` with the given parameter hash.
    pub fn of<T: 'static>(hash: u64) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            hash,
        }
    }
}

/// A source of values that can be turned into a subscription.
pub trait SubscriptionSource: Send {
    /// The values produced by the stream.
    type Output;

    /// Opens a fresh stream. Called each time the subscription is (re)started.
    fn stream(&self) -> BoxStream<'static, Self::Output>;

    /// Identity used to decide whether two sources are the same subscription.
    fn id(&self) -> SubscriptionId;
}

/// A subscription producing application messages.
pub struct Subscription<Msg> {
    pub(crate) id: SubscriptionId,
    pub(crate) spawn: Arc<dyn Fn() -> BoxStream<'static, Msg> + Send + Sync>,
}

impl<T: 'static> Subscription<T> {
    /// Wraps a source into a subscription.
    pub fn new<S>(source: S) -> Self
    where
        S: SubscriptionSource<Output = T> + Sync + 'static,
    {
        let id = source.id();
        Self {
            id,
            spawn: Arc::new(move || source.stream()),
        }
    }

    /// The identity of this subscription.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Converts every value produced by the subscription.
    ///
    /// The identity is unchanged: mapping the same source twice yields the
    /// same subscription.
    pub fn map<U, F>(self, f: F) -> Subscription<U>
    where
        U: 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let spawn = self.spawn;
        let f = Arc::new(f);
        Subscription {
            id: self.id,
            spawn: Arc::new(move || {
                let f = Arc::clone(&f);
                spawn().map(move |value| f(value)).boxed()
            }),
        }
    }
}

/// Handle for a running subscription task.
struct Handle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl Handle {
    fn cancel(&self) {
        self.token.cancel();
    }
}

/// Starts and stops subscription tasks so the running set matches the list the
/// application last asked for.
pub struct SubscriptionManager<Msg> {
    running: HashMap<SubscriptionId, Handle>,
    tx: mpsc::UnboundedSender<Action<Msg>>,
}

impl<Msg: Send + 'static> SubscriptionManager<Msg> {
    pub fn new(tx: mpsc::UnboundedSender<Action<Msg>>) -> Self {
        Self {
            running: HashMap::new(),
            tx,
        }
    }

    /// Reconciles the running set with `subscriptions`.
    ///
    /// Subscriptions already running keep their stream; new ones are spawned;
    /// ones no longer requested are cancelled.
    pub fn update(&mut self, subscriptions: Vec<Subscription<Msg>>) {
        let mut wanted: HashMap<SubscriptionId, Subscription<Msg>> = subscriptions
            .into_iter()
            .map(|sub| (sub.id, sub))
            .collect();

        self.running.retain(|id, handle| {
            let keep = wanted.contains_key(id) && !handle.join.is_finished();
            if !keep {
                handle.cancel();
            }
            keep
        });

        wanted.retain(|id, _| !self.running.contains_key(id));

        for (id, sub) in wanted {
            let handle = self.spawn(&sub);
            self.running.insert(id, handle);
        }
    }

    /// Number of subscriptions currently running.
    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Cancels every running subscription and waits for the tasks to exit.
    pub async fn shutdown(&mut self) {
        for (_, handle) in self.running.drain() {
            handle.cancel();
            let _ = handle.join.await;
        }
    }

    fn spawn(&self, sub: &Subscription<Msg>) -> Handle {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = self.tx.clone();
        let mut stream = (sub.spawn)();

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    item = stream.next() => match item {
                        Some(msg) => {
                            if tx.send(Action::Message(msg)).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Handle { token, join }
    }
}

impl<Msg> Drop for SubscriptionManager<Msg> {
    fn drop(&mut self) {
        for handle in self.running.values() {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::mock::MockSource;
    use tokio::time::{Duration, timeout};

    async fn next_message<Msg>(rx: &mut mpsc::UnboundedReceiver<Action<Msg>>) -> Option<Msg> {
        match timeout(Duration::from_millis(200), rx.recv()).await {
            Ok(Some(Action::Message(msg))) => Some(msg),
            _ => None,
        }
    }

    async fn wait_for_receiver<T: Clone + 'static>(mock: &MockSource<T>) {
        for _ in 0..50 {
            if mock.receiver_count() > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    #[tokio::test]
    async fn test_update_starts_new_subscription() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut manager = SubscriptionManager::new(tx);
        let mock = MockSource::<u32>::new();

        manager.update(vec![Subscription::new(mock.clone())]);
        assert_eq!(manager.len(), 1);

        wait_for_receiver(&mock).await;
        mock.emit(7).expect("subscription should be listening");
        assert_eq!(next_message(&mut rx).await, Some(7));
    }

    #[tokio::test]
    async fn test_update_keeps_running_subscription() {
        let (tx, _rx) = mpsc::unbounded_channel::<Action<u32>>();
        let mut manager = SubscriptionManager::new(tx);
        let mock = MockSource::<u32>::new();

        manager.update(vec![Subscription::new(mock.clone())]);
        wait_for_receiver(&mock).await;
        manager.update(vec![Subscription::new(mock.clone())]);

        assert_eq!(manager.len(), 1);
        assert_eq!(mock.receiver_count(), 1, "stream must not be reopened");
    }

    #[tokio::test]
    async fn test_update_cancels_removed_subscription() {
        let (tx, _rx) = mpsc::unbounded_channel::<Action<u32>>();
        let mut manager = SubscriptionManager::new(tx);
        let mock = MockSource::<u32>::new();

        manager.update(vec![Subscription::new(mock.clone())]);
        wait_for_receiver(&mock).await;
        manager.update(vec![]);
        assert!(manager.is_empty());

        for _ in 0..50 {
            if mock.receiver_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(mock.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_map_preserves_identity() {
        let mock = MockSource::<u32>::new();
        let plain = Subscription::new(mock.clone());
        let mapped = Subscription::new(mock).map(|n| n * 2);
        assert_eq!(plain.id(), mapped.id());
    }

    #[tokio::test]
    async fn test_mapped_subscription_converts_values() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut manager = SubscriptionManager::new(tx);
        let mock = MockSource::<u32>::new();

        manager.update(vec![Subscription::new(mock.clone()).map(|n| format!("#{n}"))]);
        wait_for_receiver(&mock).await;
        mock.emit(3).expect("subscription should be listening");

        assert_eq!(next_message(&mut rx).await, Some("#3".to_string()));
        manager.shutdown().await;
    }
}
