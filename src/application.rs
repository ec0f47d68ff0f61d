use ratatui::Frame;

use crate::{command::Command, subscription::Subscription};

/// A terminal application in the Elm Architecture.
///
/// The [`Runtime`](crate::runtime::Runtime) owns the value, calls [`update`](Self::update)
/// for every message, runs the returned commands, renders with
/// [`view`](Self::view) and keeps the [`subscriptions`](Self::subscriptions)
/// running.
///
/// # Example
///
/// ```
/// use ratatui::Frame;
/// use storefront::{application::Application, command::Command, subscription::Subscription};
///
/// enum Message {
///     Loaded(usize),
/// }
///
/// struct Counter {
///     products: usize,
/// }
///
/// impl Application for Counter {
///     type Message = Message;
///     type Flags = ();
///
///     fn new(_flags: ()) -> (Self, Command<Message>) {
///         (Counter { products: 0 }, Command::perform(async { 3 }, Message::Loaded))
///     }
///
///     fn update(&mut self, msg: Message) -> Command<Message> {
///         match msg {
///             Message::Loaded(n) => self.products = n,
///         }
///         Command::none()
///     }
///
///     fn view(&self, _frame: &mut Frame<'_>) {}
///
///     fn subscriptions(&self) -> Vec<Subscription<Message>> {
///         vec![]
///     }
/// }
/// ```
pub trait Application: Sized {
    /// Everything that can happen to the application.
    type Message: Send + 'static;

    /// Startup configuration passed to [`new`](Self::new).
    type Flags: Clone + Send;

    /// Builds the initial state and a command to run at startup.
    fn new(flags: Self::Flags) -> (Self, Command<Self::Message>);

    /// Applies a message. All state changes happen here.
    fn update(&mut self, msg: Self::Message) -> Command<Self::Message>;

    /// Renders the current state. Must not change it.
    fn view(&self, frame: &mut Frame<'_>);

    /// The event sources the application wants right now.
    ///
    /// Called after every update. Sources are matched by id: returning the
    /// same source again keeps it running, leaving it out cancels it.
    fn subscriptions(&self) -> Vec<Subscription<Self::Message>>;
}
