//! `/products`: the product list and the create form.

use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent};
use futures::FutureExt;
use ratatui::prelude::*;
use ratatui::widgets::{Block, List, ListItem, ListState};
use tracing::debug;

use super::widgets::{form_height, render_form, render_status};
use super::{Context, Notice, take};
use crate::api::{NewProduct, Product};
use crate::command::Command;
use crate::form::{Field, Form, FormValues, Rule, Schema};
use crate::router::Route;
use crate::subscription::Subscription;
use crate::subscription::http::{
    Mutation, MutationSettled, Query, QueryClient, QueryError, QueryKey, QueryResult, QueryState,
};

/// Cache key of the product list.
pub fn products_key() -> QueryKey {
    QueryKey::new("products")
}

pub fn product_schema() -> Schema {
    Schema::new()
        .field(Field::new("name", "Name").rule(Rule::required("Required")))
        .field(
            Field::new("avatar", "Avatar URL")
                .rule(Rule::required("Required"))
                .rule(Rule::url("Invalid URL")),
        )
        .field(Field::new("description", "Description").rule(Rule::required("Required")))
        .field(Field::new("author", "Author").rule(Rule::required("Required")))
}

fn new_product(mut values: FormValues) -> NewProduct {
    NewProduct {
        name: take(&mut values, "name"),
        avatar: take(&mut values, "avatar"),
        description: take(&mut values, "description"),
        author: take(&mut values, "author"),
    }
}

fn created_effects(result: Result<(), QueryError>, query_client: &QueryClient) -> Command<Message> {
    match result {
        Ok(()) => Command::batch([
            query_client.invalidate(&products_key()),
            Command::message(Message::Notify(Notice::success(
                "Product created successfully!",
            ))),
        ]),
        Err(error) => Command::message(Message::Notify(Notice::error(format!("Error: {error}")))),
    }
}

#[derive(Debug)]
pub enum Message {
    Key(KeyEvent),
    Products(QueryResult<Vec<Product>>),
    Submit,
    Created(MutationSettled<()>),
    Navigate(Route),
    Notify(Notice),
}

/// Where keyboard input goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Form,
    List,
}

#[derive(Debug)]
pub struct ProductsPage {
    ctx: Context,
    products: QueryState<Vec<Product>>,
    form: Form,
    create: Mutation<NewProduct, ()>,
    focus: Focus,
    selected: usize,
}

impl ProductsPage {
    pub fn new(ctx: Context) -> Self {
        let api = Arc::clone(&ctx.api);
        let create = Mutation::new("create_product", move |product: NewProduct| {
            let api = Arc::clone(&api);
            async move { api.create_product(product).await }.boxed()
        });

        // a list already in the cache shows at once
        let products = match ctx.query_client.state(&products_key()) {
            QueryState::Idle => QueryState::Loading,
            state => state,
        };

        Self {
            form: Form::new(product_schema(), ctx.reset_policy),
            ctx,
            products,
            create,
            focus: Focus::Form,
            selected: 0,
        }
    }

    pub const fn products(&self) -> &QueryState<Vec<Product>> {
        &self.products
    }

    pub const fn form(&self) -> &Form {
        &self.form
    }

    pub const fn create(&self) -> &Mutation<NewProduct, ()> {
        &self.create
    }

    pub const fn focus(&self) -> Focus {
        self.focus
    }

    pub const fn selected(&self) -> usize {
        self.selected
    }

    pub fn update(&mut self, msg: Message) -> Command<Message> {
        match msg {
            Message::Key(key) => self.handle_key(key),
            Message::Products(result) => {
                self.products = result.state;
                let len = self.products.data().map_or(0, Vec::len);
                self.selected = self.selected.min(len.saturating_sub(1));
                Command::none()
            }
            Message::Submit => {
                if self.create.is_pending() {
                    debug!("create already pending, submit disabled");
                    return Command::none();
                }
                match self.form.submit() {
                    Some(values) => self.create.mutate(new_product(values)).map(Message::Created),
                    None => Command::none(),
                }
            }
            Message::Created(settled) if !self.create.owns(&settled) => {
                Self::detached(Message::Created(settled), &self.ctx.query_client)
            }
            Message::Created(settled) => match self.create.settle(settled) {
                Some(result) => {
                    self.form.on_settled(result.is_ok());
                    created_effects(result, &self.ctx.query_client)
                }
                None => Command::none(),
            },
            // handled by the root application
            Message::Navigate(_) | Message::Notify(_) => Command::none(),
        }
    }

    /// Handles a message whose page instance is gone. A create that settles
    /// after its page was left still refreshes the list and reports.
    pub fn detached(msg: Message, query_client: &QueryClient) -> Command<Message> {
        match msg {
            Message::Created(settled) => created_effects(settled.into_result(), query_client),
            msg => {
                debug!(?msg, "dropping message for an unmounted products page");
                Command::none()
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Command<Message> {
        match (self.focus, key.code) {
            (Focus::Form, KeyCode::Tab) => {
                if self.form.is_last_focused() {
                    self.focus = Focus::List;
                } else {
                    self.form.focus_next();
                }
                Command::none()
            }
            (Focus::Form, KeyCode::BackTab) => {
                if self.form.is_first_focused() {
                    self.focus = Focus::List;
                } else {
                    self.form.focus_prev();
                }
                Command::none()
            }
            (Focus::Form, KeyCode::Enter) => Command::message(Message::Submit),
            (Focus::Form, KeyCode::Char(c)) => {
                self.form.input(c);
                Command::none()
            }
            (Focus::Form, KeyCode::Backspace) => {
                self.form.backspace();
                Command::none()
            }
            (Focus::List, KeyCode::Tab) => {
                self.focus = Focus::Form;
                self.form.focus_first();
                Command::none()
            }
            (Focus::List, KeyCode::BackTab) => {
                self.focus = Focus::Form;
                self.form.focus_last();
                Command::none()
            }
            (Focus::List, KeyCode::Up) => {
                self.selected = self.selected.saturating_sub(1);
                Command::none()
            }
            (Focus::List, KeyCode::Down) => {
                let len = self.products.data().map_or(0, Vec::len);
                self.selected = (self.selected + 1).min(len.saturating_sub(1));
                Command::none()
            }
            (Focus::List, KeyCode::Enter) => self
                .products
                .data()
                .and_then(|products| products.get(self.selected))
                .map_or_else(Command::none, |product| {
                    Command::message(Message::Navigate(Route::Product(Some(product.id.clone()))))
                }),
            _ => Command::none(),
        }
    }

    pub fn subscriptions(&self) -> Vec<Subscription<Message>> {
        let api = Arc::clone(&self.ctx.api);
        vec![
            Subscription::new(Query::new(
                products_key(),
                move || {
                    let api = Arc::clone(&api);
                    async move { api.list_products().await }.boxed()
                },
                Arc::clone(&self.ctx.query_client),
            ))
            .map(Message::Products),
        ]
    }

    pub fn view(&self, frame: &mut Frame<'_>, area: Rect) {
        let [form_area, list_area] =
            Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)])
                .areas(area);

        let form_block = Block::bordered().title("New product");
        let inner = form_block.inner(form_area);
        frame.render_widget(form_block, form_area);
        let [inner, _] =
            Layout::vertical([Constraint::Length(form_height(&self.form)), Constraint::Min(0)])
                .areas(inner);
        render_form(
            frame,
            inner,
            &self.form,
            self.focus == Focus::Form,
            "Add product",
            self.create.is_pending(),
        );

        self.render_list(frame, list_area);
    }

    fn render_list(&self, frame: &mut Frame<'_>, area: Rect) {
        match &self.products {
            QueryState::Idle | QueryState::Loading => {
                render_status(frame, area, "Products", "Loading...", Color::Gray);
            }
            QueryState::Error(_) => {
                render_status(frame, area, "Products", "Error fetching products", Color::Red);
            }
            QueryState::Success { data, is_stale } => {
                let title = if *is_stale {
                    "Products (refreshing)"
                } else {
                    "Products"
                };
                let items: Vec<ListItem<'_>> = data.iter().map(product_card).collect();
                let highlight = if self.focus == Focus::List {
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().add_modifier(Modifier::BOLD)
                };
                let list = List::new(items)
                    .block(Block::bordered().title(title))
                    .highlight_style(highlight)
                    .highlight_symbol("> ");

                let mut state = ListState::default().with_selected(
                    (!data.is_empty()).then_some(self.selected),
                );
                frame.render_stateful_widget(list, area, &mut state);
            }
        }
    }
}

fn product_card(product: &Product) -> ListItem<'_> {
    ListItem::new(vec![
        Line::from(product.name.as_str()).bold(),
        Line::from(product.description.as_str()),
        Line::from(format!("Author: {}", product.author)).dim(),
        Line::from(product.avatar.as_str()).dim(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::MemoryCatalog;
    use crate::form::ResetPolicy;
    use crate::subscription::http::QueryClient;
    use crossterm::event::KeyModifiers;

    fn page(catalog: Arc<MemoryCatalog>, reset_policy: ResetPolicy) -> ProductsPage {
        ProductsPage::new(Context {
            api: catalog,
            query_client: Arc::new(QueryClient::new()),
            reset_policy,
        })
    }

    fn key(code: KeyCode) -> Message {
        Message::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn fill(page: &mut ProductsPage, name: &str) {
        for (field, value) in [
            ("name", name),
            ("avatar", "https://x.com/a.png"),
            ("description", "d"),
            ("author", "me"),
        ] {
            page.form.set_value(field, value);
        }
    }

    #[test]
    fn test_schema_messages() {
        let schema = product_schema();
        let mut values = FormValues::new();
        values.insert("avatar", "not a url".to_string());
        let errors = schema.validate(&values);
        assert_eq!(errors.get("name"), Some(&"Required"));
        assert_eq!(errors.get("avatar"), Some(&"Invalid URL"));
    }

    #[tokio::test]
    async fn test_invalid_submit_never_reaches_api() {
        let catalog = Arc::new(MemoryCatalog::new());
        let mut page = page(Arc::clone(&catalog), ResetPolicy::default());

        let cmd = page.update(Message::Submit);
        assert!(cmd.is_none());
        assert!(page.create().state().is_idle());
        assert_eq!(catalog.calls("create_product"), 0);
    }

    #[tokio::test]
    async fn test_create_resets_form_and_invalidates() {
        let catalog = Arc::new(MemoryCatalog::new());
        let mut page = page(Arc::clone(&catalog), ResetPolicy::OnSubmit);
        fill(&mut page, "A");

        let cmd = page.update(Message::Submit);
        assert_eq!(page.form().value("name"), "", "reset happens on submit");
        assert!(page.create().is_pending());

        let mut notices = Vec::new();
        for msg in cmd.into_messages().await {
            for follow_up in page.update(msg).into_messages().await {
                if let Message::Notify(notice) = follow_up {
                    notices.push(notice);
                }
            }
        }

        assert_eq!(notices, [Notice::success("Product created successfully!")]);
        assert_eq!(catalog.product_count(), 1);
    }

    #[tokio::test]
    async fn test_resubmit_while_pending_is_ignored() {
        let catalog = Arc::new(MemoryCatalog::new());
        let mut page = page(Arc::clone(&catalog), ResetPolicy::OnSuccess);
        fill(&mut page, "A");

        let first = page.update(Message::Submit);
        let second = page.update(Message::Submit);
        assert!(second.is_none());

        let mut successes = 0;
        for msg in first.into_messages().await {
            for follow_up in page.update(msg).into_messages().await {
                if matches!(follow_up, Message::Notify(_)) {
                    successes += 1;
                }
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(catalog.calls("create_product"), 1);
        assert_eq!(page.form().value("name"), "", "reset after success");
    }

    #[tokio::test]
    async fn test_failed_create_notifies_error() {
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.set_failing(true);
        let mut page = page(Arc::clone(&catalog), ResetPolicy::OnSuccess);
        fill(&mut page, "A");

        let settled = page.update(Message::Submit).into_messages().await;
        let follow_ups: Vec<_> = {
            let mut out = Vec::new();
            for msg in settled {
                out.extend(page.update(msg).into_messages().await);
            }
            out
        };

        assert!(matches!(
            follow_ups.as_slice(),
            [Message::Notify(Notice { text, .. })] if text.starts_with("Error: ")
        ));
        assert_eq!(page.form().value("name"), "A", "kept for another try");
    }

    #[tokio::test]
    async fn test_enter_on_list_opens_selected_product() {
        let catalog = Arc::new(MemoryCatalog::new());
        let mut page = page(catalog, ResetPolicy::default());
        let products = vec![
            NewProduct {
                name: "A".to_string(),
                avatar: "https://x.com/a.png".to_string(),
                description: "d".to_string(),
                author: "me".to_string(),
            }
            .with_id("1"),
            NewProduct {
                name: "B".to_string(),
                avatar: "https://x.com/b.png".to_string(),
                description: "d".to_string(),
                author: "me".to_string(),
            }
            .with_id("2"),
        ];
        page.update(Message::Products(QueryResult {
            key: products_key(),
            state: QueryState::Success {
                data: products,
                is_stale: false,
            },
        }));

        page.update(key(KeyCode::BackTab));
        assert_eq!(page.focus(), Focus::List);
        page.update(key(KeyCode::Down));
        page.update(key(KeyCode::Down));
        assert_eq!(page.selected(), 1);

        let messages = page.update(key(KeyCode::Enter)).into_messages().await;
        assert!(matches!(
            messages.as_slice(),
            [Message::Navigate(Route::Product(Some(id)))] if id == "2"
        ));
    }

    #[tokio::test]
    async fn test_mount_shows_cached_list() {
        let catalog = Arc::new(MemoryCatalog::new());
        let query_client = Arc::new(QueryClient::new());
        query_client
            .fetch(&products_key(), || {
                futures::future::ready(Ok(vec![NewProduct {
                    name: "A".to_string(),
                    avatar: "https://x.com/a.png".to_string(),
                    description: "d".to_string(),
                    author: "me".to_string(),
                }
                .with_id("1")]))
                .boxed()
            })
            .await
            .expect("fetch");

        let page = ProductsPage::new(Context {
            api: catalog,
            query_client,
            reset_policy: ResetPolicy::default(),
        });

        assert_eq!(page.products().data().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_create_outcome_for_replaced_page_still_reports() {
        let catalog = Arc::new(MemoryCatalog::new());
        let mut left = page(Arc::clone(&catalog), ResetPolicy::default());
        fill(&mut left, "A");
        let settled = left.update(Message::Submit).into_messages().await;

        let mut current = page(Arc::clone(&catalog), ResetPolicy::default());
        fill(&mut current, "B");
        let mut notices = Vec::new();
        for msg in settled {
            for follow_up in current.update(msg).into_messages().await {
                if let Message::Notify(notice) = follow_up {
                    notices.push(notice);
                }
            }
        }

        assert_eq!(notices, [Notice::success("Product created successfully!")]);
        assert_eq!(current.form().value("name"), "B", "other page's form untouched");
        assert!(current.create().state().is_idle());
    }

    #[tokio::test]
    async fn test_typing_edits_focused_field() {
        let catalog = Arc::new(MemoryCatalog::new());
        let mut page = page(catalog, ResetPolicy::default());

        page.update(key(KeyCode::Char('A')));
        page.update(key(KeyCode::Tab));
        page.update(key(KeyCode::Char('x')));
        page.update(key(KeyCode::Backspace));

        assert_eq!(page.form().value("name"), "A");
        assert_eq!(page.form().value("avatar"), "");
    }
}
