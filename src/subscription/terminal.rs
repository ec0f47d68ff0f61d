use std::hash::{DefaultHasher, Hash, Hasher};
use std::io;

use crossterm::event::{Event, EventStream};
use futures::{StreamExt, stream::BoxStream};

use super::{SubscriptionId, SubscriptionSource};

/// Terminal input (keys, resize, paste) from crossterm's `EventStream`.
///
/// Read errors are forwarded so the application can surface them; the stream
/// ends when crossterm closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TerminalEvents;

impl TerminalEvents {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SubscriptionSource for TerminalEvents {
    type Output = io::Result<Event>;

    fn stream(&self) -> BoxStream<'static, Self::Output> {
        EventStream::new().boxed()
    }

    fn id(&self) -> SubscriptionId {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        SubscriptionId::of::<Self>(hasher.finish())
    }
}

impl Hash for TerminalEvents {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // singleton
        "terminal".hash(state);
    }
}
