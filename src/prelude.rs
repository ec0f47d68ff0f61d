//! Common imports.
//!
//! ```
//! use storefront::prelude::*;
//! ```

pub use crate::application::Application;
pub use crate::command::{Action, Command};
pub use crate::runtime::Runtime;
pub use crate::subscription::Subscription;
pub use crate::subscription::http::{
    Mutation, MutationState, Query, QueryClient, QueryError, QueryKey, QueryState,
};
