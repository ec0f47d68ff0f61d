//! Writes with a pending/success/error lifecycle.
//!
//! A [`Mutation`] lives in the page model next to the form that triggers it.
//! `mutate` returns a [`Command`] running the request; its result comes back
//! to `update` as a [`MutationSettled`], which the page hands to
//! [`Mutation::settle_with`] together with its success and error
//! continuations:
//!
//! ```rust,ignore
//! Message::Submit => match self.form.submit() {
//!     Some(values) => self.create.mutate(NewProduct::from_values(&values)).map(Message::Created),
//!     None => Command::none(),
//! },
//! Message::Created(settled) => self
//!     .create
//!     .settle_with(
//!         settled,
//!         |()| self.query_client.invalidate(&QueryKey::new("products")),
//!         |_| Command::none(),
//!     )
//!     .unwrap_or_else(Command::none),
//! ```
//!
//! The runner guarantees ordering only: continuations run after the request
//! settles, exactly one of them runs per `mutate` call, and calling `mutate`
//! while a request is pending does nothing.
//!
//! An outcome can outlive the page that started it. [`Mutation::owns`] tells
//! whether an outcome came from this mutation; one that did not is handled
//! from [`MutationSettled::into_result`] alone.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::command::Command;

use super::query::QueryError;

/// The state of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationState<T> {
    /// Not started, or reset.
    Idle,
    /// A request is in flight.
    Pending,
    /// The last request succeeded.
    Success(T),
    /// The last request failed.
    Error(QueryError),
}

impl<T> MutationState<T> {
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    pub const fn error(&self) -> Option<&QueryError> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }

    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// The outcome of one `mutate` call, delivered back to `update`.
#[derive(Debug, Clone)]
pub struct MutationSettled<O> {
    instance: u64,
    generation: u64,
    result: Result<O, QueryError>,
}

impl<O> MutationSettled<O> {
    pub const fn result(&self) -> &Result<O, QueryError> {
        &self.result
    }

    pub fn into_result(self) -> Result<O, QueryError> {
        self.result
    }
}

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

type Mutator<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, QueryError>> + Send + Sync>;

/// A write operation with observable state.
pub struct Mutation<I, O> {
    name: &'static str,
    mutator: Mutator<I, O>,
    state: MutationState<O>,
    instance: u64,
    generation: u64,
}

impl<I, O> fmt::Debug for Mutation<I, O>
where
    O: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl<I, O> Mutation<I, O>
where
    I: Send + 'static,
    O: Clone + Send + 'static,
{
    /// Creates an idle mutation. `name` only appears in logs.
    pub fn new<F>(name: &'static str, mutator: F) -> Self
    where
        F: Fn(I) -> BoxFuture<'static, Result<O, QueryError>> + Send + Sync + 'static,
    {
        Self {
            name,
            mutator: Arc::new(mutator),
            state: MutationState::Idle,
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            generation: 0,
        }
    }

    pub const fn state(&self) -> &MutationState<O> {
        &self.state
    }

    /// Returns `true` while a request is in flight. Submit controls should be
    /// disabled then.
    pub const fn is_pending(&self) -> bool {
        self.state.is_pending()
    }

    /// Returns `true` if `settled` came from a `mutate` call on this
    /// mutation, current or superseded.
    pub const fn owns(&self, settled: &MutationSettled<O>) -> bool {
        settled.instance == self.instance
    }

    /// Starts the request, or does nothing if one is already pending.
    pub fn mutate(&mut self, input: I) -> Command<MutationSettled<O>> {
        if self.is_pending() {
            debug!(mutation = self.name, "mutation already pending, ignoring trigger");
            return Command::none();
        }

        self.generation += 1;
        self.state = MutationState::Pending;
        info!(mutation = self.name, generation = self.generation, "mutation started");

        let instance = self.instance;
        let generation = self.generation;
        let request = (self.mutator)(input);
        Command::future(async move {
            MutationSettled {
                instance,
                generation,
                result: request.await,
            }
        })
    }

    /// Records the outcome of the current request and returns it.
    ///
    /// Returns `None` for an outcome that does not belong to the pending
    /// request (another mutation's, a superseded or an already settled one),
    /// so continuations never run twice.
    pub fn settle(&mut self, settled: MutationSettled<O>) -> Option<Result<O, QueryError>> {
        if !self.owns(&settled) || settled.generation != self.generation || !self.is_pending() {
            debug!(
                mutation = self.name,
                generation = settled.generation,
                "ignoring outcome of a request that is not pending"
            );
            return None;
        }

        match &settled.result {
            Ok(data) => {
                info!(mutation = self.name, generation = settled.generation, "mutation succeeded");
                self.state = MutationState::Success(data.clone());
            }
            Err(error) => {
                warn!(mutation = self.name, generation = settled.generation, %error, "mutation failed");
                self.state = MutationState::Error(error.clone());
            }
        }
        Some(settled.result)
    }

    /// Settles and runs exactly one of the continuations.
    pub fn settle_with<R>(
        &mut self,
        settled: MutationSettled<O>,
        on_success: impl FnOnce(O) -> R,
        on_error: impl FnOnce(QueryError) -> R,
    ) -> Option<R> {
        self.settle(settled).map(|result| match result {
            Ok(data) => on_success(data),
            Err(error) => on_error(error),
        })
    }

    /// Back to idle. A request still in flight will be ignored when it settles.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = MutationState::Idle;
    }
}
