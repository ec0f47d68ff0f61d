//! `/products/:id`: one product and its delete action.

use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent};
use futures::FutureExt;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Paragraph, Wrap};
use tracing::debug;

use super::products::products_key;
use super::widgets::render_status;
use super::{Context, Notice};
use crate::api::Product;
use crate::command::Command;
use crate::router::Route;
use crate::subscription::Subscription;
use crate::subscription::http::{
    Mutation, MutationSettled, Query, QueryClient, QueryKey, QueryResult, QueryState,
};

pub fn product_key(id: &str) -> QueryKey {
    QueryKey::new("product").with_id(id)
}

fn deleted_effects(id: &str, query_client: &QueryClient) -> Command<Message> {
    Command::batch([
        query_client.invalidate(&products_key()),
        query_client.invalidate(&product_key(id)),
    ])
}

#[derive(Debug)]
pub enum Message {
    Key(KeyEvent),
    Product(QueryResult<Option<Product>>),
    Delete,
    /// Carries the deleted id on success.
    Deleted(MutationSettled<String>),
    Navigate(Route),
    Notify(Notice),
}

/// What the page body shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Display<'a> {
    Loading,
    /// A failed read or a failed delete; the two are not told apart.
    Error,
    NotFound,
    Found(&'a Product),
}

#[derive(Debug)]
pub struct ProductDetailPage {
    ctx: Context,
    id: Option<String>,
    product: QueryState<Option<Product>>,
    delete: Mutation<String, String>,
}

impl ProductDetailPage {
    /// `id` comes from the current route; `None` shows not-found without a
    /// request.
    pub fn new(ctx: Context, id: Option<String>) -> Self {
        let api = Arc::clone(&ctx.api);
        let delete = Mutation::new("delete_product", move |id: String| {
            let api = Arc::clone(&api);
            async move { api.delete_product(&id).await.map(|()| id) }.boxed()
        });

        let product = match &id {
            Some(id) => match ctx.query_client.state(&product_key(id)) {
                QueryState::Idle => QueryState::Loading,
                state => state,
            },
            None => QueryState::Idle,
        };

        Self {
            ctx,
            id,
            product,
            delete,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub const fn delete(&self) -> &Mutation<String, String> {
        &self.delete
    }

    pub fn display(&self) -> Display<'_> {
        if self.product.is_error() || self.delete.state().is_error() {
            return Display::Error;
        }
        match &self.product {
            QueryState::Loading => Display::Loading,
            QueryState::Success {
                data: Some(product),
                ..
            } => Display::Found(product),
            QueryState::Idle | QueryState::Success { data: None, .. } | QueryState::Error(_) => {
                Display::NotFound
            }
        }
    }

    pub fn update(&mut self, msg: Message) -> Command<Message> {
        match msg {
            Message::Key(key) => match key.code {
                KeyCode::Char('d') | KeyCode::Delete => Command::message(Message::Delete),
                _ => Command::none(),
            },
            Message::Product(result) => {
                if self
                    .id
                    .as_deref()
                    .is_some_and(|id| result.key != product_key(id))
                {
                    debug!(key = %result.key, "dropping result for another product");
                    return Command::none();
                }
                self.product = result.state;
                Command::none()
            }
            Message::Delete => {
                let Some(id) = self.id.clone() else {
                    return Command::none();
                };
                if !matches!(self.display(), Display::Found(_)) {
                    debug!(%id, "nothing to delete");
                    return Command::none();
                }
                self.delete.mutate(id).map(Message::Deleted)
            }
            Message::Deleted(settled) if !self.delete.owns(&settled) => {
                Self::detached(Message::Deleted(settled), &self.ctx.query_client)
            }
            Message::Deleted(settled) => {
                let query_client = Arc::clone(&self.ctx.query_client);
                self.delete
                    .settle_with(
                        settled,
                        |id| {
                            Command::batch([
                                deleted_effects(&id, &query_client),
                                Command::message(Message::Navigate(Route::Products)),
                            ])
                        },
                        // rendered through `display`
                        |_| Command::none(),
                    )
                    .unwrap_or_else(Command::none)
            }
            Message::Navigate(_) | Message::Notify(_) => Command::none(),
        }
    }

    /// Handles a message whose page instance is gone. A finished delete still
    /// refreshes the affected reads; a failed one is reported as a notice
    /// since its page can no longer show it.
    pub fn detached(msg: Message, query_client: &QueryClient) -> Command<Message> {
        match msg {
            Message::Deleted(settled) => match settled.into_result() {
                Ok(id) => deleted_effects(&id, query_client),
                Err(error) => Command::message(Message::Notify(Notice::error(format!(
                    "Error deleting product: {error}"
                )))),
            },
            msg => {
                debug!(?msg, "dropping message for an unmounted product page");
                Command::none()
            }
        }
    }

    pub fn subscriptions(&self) -> Vec<Subscription<Message>> {
        let api = Arc::clone(&self.ctx.api);
        vec![
            Subscription::new(Query::with_id(
                "product",
                self.id.clone(),
                move |id| {
                    let api = Arc::clone(&api);
                    async move { api.get_product(&id).await }.boxed()
                },
                Arc::clone(&self.ctx.query_client),
            ))
            .map(Message::Product),
        ]
    }

    pub fn view(&self, frame: &mut Frame<'_>, area: Rect) {
        match self.display() {
            Display::Loading => render_status(frame, area, "Product", "Loading...", Color::Gray),
            Display::Error => render_status(
                frame,
                area,
                "Product",
                "Error fetching/deleting product",
                Color::Red,
            ),
            Display::NotFound => {
                render_status(frame, area, "Product", "Product not found", Color::Yellow);
            }
            Display::Found(product) => {
                let action = if self.delete.is_pending() {
                    Line::from("Deleting...").dim()
                } else {
                    Line::from("[d] Delete  [Esc] Back")
                };
                let lines = vec![
                    Line::from(product.name.as_str()).bold(),
                    Line::from(""),
                    Line::from(product.description.as_str()),
                    Line::from(format!("Author: {}", product.author)),
                    Line::from(format!("Image: {}", product.avatar)).dim(),
                    Line::from(""),
                    action,
                ];
                let paragraph = Paragraph::new(lines)
                    .wrap(Wrap { trim: true })
                    .block(Block::bordered().title(format!("Product {}", product.id)));
                frame.render_widget(paragraph, area);
            }
        }
    }
}
