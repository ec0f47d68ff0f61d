//! User-facing screens.
//!
//! Every page is a small Elm component of its own: a model, a `Message` enum,
//! `update`, `view` and `subscriptions`. The root [`Storefront`](crate::app::Storefront)
//! owns the current page and forwards key presses and page messages to it.
//!
//! Pages never navigate or show notices themselves. They emit their
//! `Navigate` and `Notify` messages, which the root intercepts when mapping
//! page commands into its own message type.

pub mod login;
pub mod product_detail;
pub mod products;
pub mod register;
pub mod widgets;

use std::fmt;
use std::sync::Arc;

use crate::api::CatalogApi;
use crate::form::{FormValues, ResetPolicy};
use crate::subscription::http::QueryClient;

/// What every page is built from.
#[derive(Clone)]
pub struct Context {
    pub api: Arc<dyn CatalogApi>,
    pub query_client: Arc<QueryClient>,
    pub reset_policy: ResetPolicy,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("query_client", &self.query_client)
            .field("reset_policy", &self.reset_policy)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// A one-shot message shown above the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            text: text.into(),
        }
    }
}

/// The submitted value of `name`, empty when absent.
fn take(values: &mut FormValues, name: &str) -> String {
    values.remove(name).unwrap_or_default()
}
