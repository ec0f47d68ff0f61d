//! Cached reads and tracked writes against a remote API.
//!
//! Reads are subscriptions, writes are commands, similar to SWR or TanStack
//! Query:
//!
//! - [`Query`] subscribes to one [`QueryKey`] in a shared [`QueryClient`].
//!   Concurrent reads of a key share one request, fresh data is served from the
//!   cache and [`QueryClient::invalidate`] makes every active query of a key
//!   refetch.
//! - [`Mutation`] runs a write, tracks its pending/success/error state and hands
//!   the outcome to exactly one caller continuation.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use storefront::prelude::*;
//! use storefront::subscription::http::{Query, QueryClient, QueryKey, QueryState};
//!
//! struct Page {
//!     client: Arc<QueryClient>,
//!     products: QueryState<Vec<Product>>,
//! }
//!
//! impl Page {
//!     fn subscriptions(&self) -> Vec<Subscription<Message>> {
//!         let api = Arc::clone(&self.api);
//!         vec![
//!             Subscription::new(Query::new(
//!                 QueryKey::new("products"),
//!                 move || api.list_products(),
//!                 Arc::clone(&self.client),
//!             ))
//!             .map(Message::Products),
//!         ]
//!     }
//! }
//! ```

mod cache;
mod config;
pub mod mutation;
pub mod query;

pub use config::QueryConfig;
pub use mutation::{Mutation, MutationSettled, MutationState};
pub use query::{Query, QueryClient, QueryError, QueryKey, QueryResult, QueryState};
