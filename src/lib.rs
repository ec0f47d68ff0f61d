//! # Storefront
//!
//! A terminal client for a product catalog service, built on a small Elm
//! Architecture runtime over [ratatui](https://ratatui.rs/).
//!
//! ## Layers
//!
//! - [`application`], [`command`], [`subscription`] and [`runtime`]: the
//!   message loop. An [`Application`](application::Application) owns its
//!   state, turns messages into [`Command`](command::Command)s and declares
//!   the [`Subscription`](subscription::Subscription)s it wants.
//! - [`subscription::http`]: a shared [`QueryClient`](subscription::http::QueryClient)
//!   that caches and deduplicates reads, the [`Query`](subscription::http::Query)
//!   subscription that observes them and [`Mutation`](subscription::http::Mutation)
//!   for writes.
//! - [`form`]: field schemas, validation rules and form state.
//! - [`api`]: the catalog service client and an in-memory stand-in.
//! - [`router`], [`pages`] and [`app`]: the screens and the root application
//!   that switches between them.
//! - [`config`] and [`logging`]: startup settings.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use storefront::api::{CatalogApi, MemoryCatalog};
//! use storefront::app::{Storefront, StorefrontFlags};
//! use storefront::form::ResetPolicy;
//! use storefront::router::Route;
//! use storefront::runtime::Runtime;
//! use storefront::subscription::http::QueryClient;
//!
//! #[tokio::main]
//! async fn main() -> color_eyre::Result<()> {
//!     let api: Arc<dyn CatalogApi> = Arc::new(MemoryCatalog::new());
//!     let flags = StorefrontFlags {
//!         api,
//!         query_client: Arc::new(QueryClient::new()),
//!         route: Route::Products,
//!         reset_policy: ResetPolicy::OnSubmit,
//!     };
//!
//!     let mut terminal = ratatui::init();
//!     let result = Runtime::<Storefront>::new(flags).run(&mut terminal, 30).await;
//!     ratatui::restore();
//!     result
//! }
//! ```

pub mod api;
pub mod app;
pub mod application;
pub mod command;
pub mod config;
pub mod form;
pub mod logging;
pub mod pages;
pub mod prelude;
pub mod router;
pub mod runtime;
pub mod subscription;
