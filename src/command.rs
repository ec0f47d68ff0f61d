use futures::{
    FutureExt, StreamExt,
    stream::{self, BoxStream, select_all},
};

/// An action emitted by a command and executed by the runtime.
pub enum Action<Msg> {
    /// Deliver a message to the application's `update` function.
    Message(Msg),

    /// Stop the event loop and shut the application down.
    Quit,
}

impl<Msg> Action<Msg> {
    /// Transforms the message carried by this action, leaving `Quit` untouched.
    pub fn map<U>(self, f: impl FnOnce(Msg) -> U) -> Action<U> {
        match self {
            Self::Message(msg) => Action::Message(f(msg)),
            Self::Quit => Action::Quit,
        }
    }
}

/// A side effect requested by `update`.
///
/// Commands are plain values: building one does nothing until the runtime
/// drives it. This is what lets page logic (fetch, mutate, navigate, notify)
/// be tested without a terminal.
///
/// # Examples
///
/// ```
/// use storefront::command::Command;
///
/// enum Message {
///     Loaded(usize),
/// }
///
/// let cmd = Command::perform(async { 3 }, Message::Loaded);
/// ```
pub struct Command<Msg: Send + 'static> {
    pub(crate) stream: Option<BoxStream<'static, Action<Msg>>>,
}

impl<Msg: Send + 'static> Command<Msg> {
    /// A command that does nothing.
    pub fn none() -> Self {
        Self { stream: None }
    }

    /// Returns `true` when the command carries no side effect.
    pub const fn is_none(&self) -> bool {
        self.stream.is_none()
    }

    /// Delivers `msg` back to `update` on the next turn of the loop.
    pub fn message(msg: Msg) -> Self {
        Self::effect(Action::Message(msg))
    }

    /// Runs `future` and converts its output into a message with `f`.
    ///
    /// ```
    /// use storefront::command::Command;
    ///
    /// async fn count_products() -> usize {
    ///     12
    /// }
    ///
    /// enum Message {
    ///     Counted(usize),
    /// }
    ///
    /// let cmd = Command::perform(count_products(), Message::Counted);
    /// ```
    pub fn perform<A>(
        future: impl Future<Output = A> + Send + 'static,
        f: impl FnOnce(A) -> Msg + Send + 'static,
    ) -> Self {
        Self::future(future.map(f))
    }

    /// Runs a future whose output already is a message.
    pub fn future(future: impl Future<Output = Msg> + Send + 'static) -> Self {
        Self {
            stream: Some(future.into_stream().map(Action::Message).boxed()),
        }
    }

    /// Performs a single action immediately.
    ///
    /// ```
    /// use storefront::command::{Action, Command};
    ///
    /// let quit: Command<()> = Command::effect(Action::Quit);
    /// ```
    pub fn effect(action: Action<Msg>) -> Self {
        Self {
            stream: Some(stream::once(async move { action }).boxed()),
        }
    }

    /// Runs several commands concurrently. Arrival order is not guaranteed.
    /// Empty commands are dropped.
    pub fn batch(commands: impl IntoIterator<Item = Command<Msg>>) -> Self {
        let streams: Vec<_> = commands.into_iter().filter_map(|cmd| cmd.stream).collect();

        if streams.is_empty() {
            Self::none()
        } else {
            Self {
                stream: Some(select_all(streams).boxed()),
            }
        }
    }

    /// Converts every message this command produces.
    ///
    /// Pages return `Command<page::Message>`; the root application maps them
    /// into its own message type with this.
    pub fn map<U: Send + 'static>(self, f: impl Fn(Msg) -> U + Send + 'static) -> Command<U> {
        Command {
            stream: self
                .stream
                .map(|stream| stream.map(move |action| action.map(&f)).boxed()),
        }
    }

    /// Drives the command to completion and returns the messages it produced.
    #[cfg(test)]
    pub(crate) async fn into_messages(self) -> Vec<Msg> {
        match self.stream {
            Some(stream) => {
                stream
                    .filter_map(|action| async move {
                        match action {
                            Action::Message(msg) => Some(msg),
                            Action::Quit => None,
                        }
                    })
                    .collect()
                    .await
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_batch_empty() {
        let cmd: Command<i32> = Command::batch(vec![]);
        assert!(cmd.is_none());
    }

    #[tokio::test]
    async fn test_batch_skips_none_commands() {
        let cmd = Command::batch(vec![
            Command::future(async { 1 }),
            Command::<i32>::none(),
            Command::future(async { 3 }),
        ]);

        let mut results = cmd.into_messages().await;
        results.sort_unstable();
        assert_eq!(results, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_batch_keeps_quit_action() {
        let cmd = Command::batch(vec![
            Command::future(async { 1 }),
            Command::effect(Action::Quit),
        ]);

        let mut stream = cmd.stream.expect("stream should exist");
        let mut has_quit = false;
        while let Some(action) = stream.next().await {
            if matches!(action, Action::Quit) {
                has_quit = true;
            }
        }

        assert!(has_quit, "should receive quit action");
    }

    #[tokio::test]
    async fn test_message_is_delivered_once() {
        let cmd = Command::message("refresh");
        assert_eq!(cmd.into_messages().await, vec!["refresh"]);
    }

    #[tokio::test]
    async fn test_perform_converts_output() {
        #[derive(Debug, PartialEq)]
        enum Message {
            Counted(usize),
        }

        let cmd = Command::perform(async { 2 + 2 }, Message::Counted);
        assert_eq!(cmd.into_messages().await, vec![Message::Counted(4)]);
    }

    #[tokio::test]
    async fn test_map_wraps_messages_and_preserves_quit() {
        #[derive(Debug, PartialEq)]
        enum Outer {
            Inner(u8),
        }

        let cmd = Command::batch(vec![Command::message(7u8), Command::effect(Action::Quit)])
            .map(Outer::Inner);

        let mut stream = cmd.stream.expect("stream should exist");
        let mut messages = vec![];
        let mut quits = 0;
        while let Some(action) = stream.next().await {
            match action {
                Action::Message(msg) => messages.push(msg),
                Action::Quit => quits += 1,
            }
        }

        assert_eq!(messages, vec![Outer::Inner(7)]);
        assert_eq!(quits, 1);
    }

    #[test]
    fn test_map_of_none_stays_none() {
        let cmd: Command<u8> = Command::none();
        assert!(cmd.map(|n| n + 1).is_none());
    }
}
