//! The root application: owns the current page, routes between pages and
//! shows notices.

use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Paragraph, Tabs};
use tracing::{debug, info, warn};

use crate::api::CatalogApi;
use crate::application::Application;
use crate::command::{Action, Command};
use crate::form::ResetPolicy;
use crate::pages::login::{self, LoginPage};
use crate::pages::product_detail::{self, ProductDetailPage};
use crate::pages::products::{self, ProductsPage};
use crate::pages::register::{self, RegisterPage};
use crate::pages::widgets::render_notice;
use crate::pages::{Context, Notice};
use crate::router::Route;
use crate::subscription::Subscription;
use crate::subscription::http::QueryClient;
use crate::subscription::terminal::TerminalEvents;

/// How long a notice stays up without a key press.
pub const NOTICE_TIMEOUT: Duration = Duration::from_secs(4);

/// Everything [`Storefront`] is started with.
#[derive(Clone)]
pub struct StorefrontFlags {
    pub api: Arc<dyn CatalogApi>,
    pub query_client: Arc<QueryClient>,
    pub route: Route,
    pub reset_policy: ResetPolicy,
}

#[derive(Debug)]
pub enum Message {
    Terminal(Event),
    TerminalError(String),
    Products(products::Message),
    Detail(product_detail::Message),
    Login(login::Message),
    Register(register::Message),
    Navigate(Route),
    Notify(Notice),
    DismissNotice(u64),
    Quit,
}

impl From<products::Message> for Message {
    fn from(msg: products::Message) -> Self {
        match msg {
            products::Message::Navigate(route) => Self::Navigate(route),
            products::Message::Notify(notice) => Self::Notify(notice),
            msg => Self::Products(msg),
        }
    }
}

impl From<product_detail::Message> for Message {
    fn from(msg: product_detail::Message) -> Self {
        match msg {
            product_detail::Message::Navigate(route) => Self::Navigate(route),
            product_detail::Message::Notify(notice) => Self::Notify(notice),
            msg => Self::Detail(msg),
        }
    }
}

impl From<login::Message> for Message {
    fn from(msg: login::Message) -> Self {
        match msg {
            login::Message::Navigate(route) => Self::Navigate(route),
            login::Message::Notify(notice) => Self::Notify(notice),
            msg => Self::Login(msg),
        }
    }
}

impl From<register::Message> for Message {
    fn from(msg: register::Message) -> Self {
        match msg {
            register::Message::Navigate(route) => Self::Navigate(route),
            register::Message::Notify(notice) => Self::Notify(notice),
            msg => Self::Register(msg),
        }
    }
}

/// The page currently mounted.
#[derive(Debug)]
pub enum Page {
    Products(ProductsPage),
    Detail(ProductDetailPage),
    Login(LoginPage),
    Register(RegisterPage),
}

impl Page {
    fn mount(ctx: &Context, route: &Route) -> Self {
        match route {
            Route::Products => Self::Products(ProductsPage::new(ctx.clone())),
            Route::Product(id) => Self::Detail(ProductDetailPage::new(ctx.clone(), id.clone())),
            Route::Login => Self::Login(LoginPage::new(ctx)),
            Route::Register => Self::Register(RegisterPage::new(ctx)),
        }
    }
}

#[derive(Debug)]
pub struct Storefront {
    ctx: Context,
    route: Route,
    page: Page,
    notice: Option<(u64, Notice)>,
    notice_seq: u64,
}

impl Storefront {
    pub const fn route(&self) -> &Route {
        &self.route
    }

    pub const fn page(&self) -> &Page {
        &self.page
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref().map(|(_, notice)| notice)
    }

    /// Mounts the page for `route`. The page already mounted stays as it is,
    /// form input included.
    fn navigate(&mut self, route: Route) -> Command<Message> {
        if route == self.route {
            debug!(%route, "already on route");
            return Command::none();
        }
        info!(from = %self.route, to = %route, "navigating");
        let evicted = self.ctx.query_client.collect_garbage();
        if evicted > 0 {
            debug!(evicted, "evicted expired query entries");
        }
        self.page = Page::mount(&self.ctx, &route);
        self.route = route;
        Command::none()
    }

    fn notify(&mut self, notice: Notice) -> Command<Message> {
        self.notice_seq += 1;
        let seq = self.notice_seq;
        self.notice = Some((seq, notice));
        Command::perform(tokio::time::sleep(NOTICE_TIMEOUT), move |()| {
            Message::DismissNotice(seq)
        })
    }

    fn handle_key(&mut self, key: KeyEvent) -> Command<Message> {
        if key.kind != KeyEventKind::Press {
            return Command::none();
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => Command::effect(Action::Quit),
                _ => Command::none(),
            };
        }
        if self.notice.take().is_some() {
            return Command::none();
        }

        match key.code {
            KeyCode::F(1) | KeyCode::Esc => self.navigate(Route::Products),
            KeyCode::F(2) => self.navigate(Route::Login),
            KeyCode::F(3) => self.navigate(Route::Register),
            _ if key.modifiers.contains(KeyModifiers::ALT) => Command::none(),
            _ => match &mut self.page {
                Page::Products(page) => page.update(products::Message::Key(key)).map(Message::from),
                Page::Detail(page) => page
                    .update(product_detail::Message::Key(key))
                    .map(Message::from),
                Page::Login(page) => page.update(login::Message::Key(key)).map(Message::from),
                Page::Register(page) => page.update(register::Message::Key(key)).map(Message::from),
            },
        }
    }

    /// Subscriptions of the mounted page, without terminal input.
    pub fn page_subscriptions(&self) -> Vec<Subscription<Message>> {
        match &self.page {
            Page::Products(page) => map_all(page.subscriptions()),
            Page::Detail(page) => map_all(page.subscriptions()),
            Page::Login(page) => map_all(page.subscriptions()),
            Page::Register(page) => map_all(page.subscriptions()),
        }
    }

    fn render_body(&self, frame: &mut Frame<'_>, area: Rect) {
        match &self.page {
            Page::Products(page) => page.view(frame, area),
            Page::Detail(page) => page.view(frame, area),
            Page::Login(page) => page.view(frame, area),
            Page::Register(page) => page.view(frame, area),
        }
    }
}

fn map_all<M>(subscriptions: Vec<Subscription<M>>) -> Vec<Subscription<Message>>
where
    M: 'static,
    Message: From<M>,
{
    subscriptions
        .into_iter()
        .map(|sub| sub.map(Message::from))
        .collect()
}

impl Application for Storefront {
    type Message = Message;
    type Flags = StorefrontFlags;

    fn new(flags: StorefrontFlags) -> (Self, Command<Message>) {
        let ctx = Context {
            api: flags.api,
            query_client: flags.query_client,
            reset_policy: flags.reset_policy,
        };
        info!(route = %flags.route, "starting storefront");
        let page = Page::mount(&ctx, &flags.route);

        let app = Self {
            ctx,
            route: flags.route,
            page,
            notice: None,
            notice_seq: 0,
        };
        (app, Command::none())
    }

    fn update(&mut self, msg: Message) -> Command<Message> {
        match msg {
            Message::Terminal(Event::Key(key)) => self.handle_key(key),
            Message::Terminal(_) => Command::none(),
            Message::TerminalError(error) => {
                warn!(%error, "terminal input failed");
                self.notify(Notice::error(format!("Terminal error: {error}")))
            }
            // outcomes of requests started by a page that was left are
            // still handled
            Message::Products(msg) => match &mut self.page {
                Page::Products(page) => page.update(msg).map(Message::from),
                _ => ProductsPage::detached(msg, &self.ctx.query_client).map(Message::from),
            },
            Message::Detail(msg) => match &mut self.page {
                Page::Detail(page) => page.update(msg).map(Message::from),
                _ => ProductDetailPage::detached(msg, &self.ctx.query_client).map(Message::from),
            },
            Message::Login(msg) => match &mut self.page {
                Page::Login(page) => page.update(msg).map(Message::from),
                _ => LoginPage::detached(msg).map(Message::from),
            },
            Message::Register(msg) => match &mut self.page {
                Page::Register(page) => page.update(msg).map(Message::from),
                _ => RegisterPage::detached(msg).map(Message::from),
            },
            Message::Navigate(route) => self.navigate(route),
            Message::Notify(notice) => self.notify(notice),
            Message::DismissNotice(seq) => {
                if self.notice.as_ref().is_some_and(|(current, _)| *current == seq) {
                    self.notice = None;
                }
                Command::none()
            }
            Message::Quit => Command::effect(Action::Quit),
        }
    }

    fn view(&self, frame: &mut Frame<'_>) {
        let notice_height = if self.notice.is_some() { 3 } else { 0 };
        let [tabs_area, notice_area, body_area, help_area] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Length(notice_height),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        let selected = match self.route {
            Route::Products | Route::Product(_) => 0,
            Route::Login => 1,
            Route::Register => 2,
        };
        let tabs = Tabs::new(["Products [F1]", "Login [F2]", "Register [F3]"])
            .select(selected)
            .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
            .block(Block::bordered().title(format!("Storefront {}", self.route)));
        frame.render_widget(tabs, tabs_area);

        if let Some((_, notice)) = &self.notice {
            render_notice(frame, notice_area, notice);
        }

        self.render_body(frame, body_area);

        let help = Paragraph::new(
            "Tab/Shift-Tab: focus  Enter: submit/open  d: delete  Esc: back  Ctrl-C: quit",
        )
        .style(Style::default().add_modifier(Modifier::DIM));
        frame.render_widget(help, help_area);
    }

    fn subscriptions(&self) -> Vec<Subscription<Message>> {
        let mut subscriptions = vec![
            Subscription::new(TerminalEvents::new()).map(|result| match result {
                Ok(event) => Message::Terminal(event),
                Err(e) => Message::TerminalError(e.to_string()),
            }),
        ];
        subscriptions.extend(self.page_subscriptions());
        subscriptions
    }
}
