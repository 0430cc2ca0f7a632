//! The operation paradigms ([`SingleOperation`], [`PaginatedOperation`],
//! [`MutationOperation`]) and the uniform [`Runnable`] shape the
//! [`modifier`] chain and the [`Store`](crate::store::Store) drive them
//! through.
//!
//! Three paradigms share one supertrait, [`OperationCore`], rather than one
//! mega-trait with optional methods: a `fetch_page` that only paginated
//! operations implement would otherwise need a default that panics or a
//! sentinel return, and each paradigm's shape (single current value vs.
//! page sequence vs. bounded mutation history) is load-bearing, not
//! incidental.

pub mod modifier;
pub mod modifiers;

use async_trait::async_trait;

use crate::context::Context;
use crate::continuation::Continuation;
use crate::error::RuntimeError;
use crate::path::Path;

pub use modifier::{Modified, Modifier};

/// What every operation paradigm shares: an identity and a chance to seed
/// the `Context` new runs start from.
pub trait OperationCore: Send + Sync {
    /// The operation's identity within a [`Client`](crate::client::Client).
    fn path(&self) -> Path;

    /// Seeds `ctx` with this operation's defaults before a run begins.
    ///
    /// Called once per run, after every enclosing [`Modifier::setup`] has
    /// already run (outermost first) — an operation's own setup is the
    /// innermost and so has the final say over any key both it and an
    /// enclosing modifier write.
    fn setup(&self, _ctx: &mut Context) {}
}

/// The uniform shape [`Modifier`]s and the [`Store`](crate::store::Store)
/// drive every paradigm through.
///
/// `Input` varies per paradigm (`()` for [`SingleOperation`], [`Paging`]
/// for [`PaginatedOperation`], the mutation's arguments for
/// [`MutationOperation`]) so a single `execute` method can stand in for
/// `run`/`fetch_page`/`mutate` without either collapsing their different
/// call shapes or requiring three separate `Modifier` traits.
///
/// Implemented for each paradigm's authoring trait via the
/// [`Single`]/[`Paginated`]/[`Mutation`] adapters rather than a blanket
/// `impl<T: SingleOperation> Runnable for T`: three such blanket impls
/// would overlap from the coherence checker's point of view even though no
/// real type ever implements more than one paradigm trait.
#[async_trait]
pub trait Runnable: OperationCore {
    /// The shape of data one `execute` call is parameterized by: `()` for
    /// a plain fetch, a [`Paging`] target for a paginated sub-fetch, or a
    /// mutation's arguments.
    type Input: Clone + Send + Sync + 'static;
    /// The value a successful `execute` call produces.
    type Value: Clone + Send + Sync + 'static;
    /// The operation's failure type.
    type Failure: Clone + Send + Sync + 'static;

    /// Runs the operation once for `input`, reporting cancellation through
    /// [`RuntimeError::Cancelled`] alongside the operation's own
    /// [`RuntimeError::Operation`] failures.
    async fn execute(
        &self,
        input: Self::Input,
        ctx: Context,
        cont: Continuation<Self::Value, Self::Failure>,
    ) -> Result<Self::Value, RuntimeError<Self::Failure>>;
}

/// Convenience methods available on every [`Runnable`].
pub trait RunnableExt: Runnable + Sized {
    /// Wraps `self` with `modifier`, producing a [`Modified`] that is
    /// itself `Runnable` and so can be wrapped again.
    fn modified<M: Modifier<Self>>(self, modifier: M) -> Modified<Self, M> {
        Modified::new(self, modifier)
    }
}

impl<T: Runnable> RunnableExt for T {}

/// An operation that produces a single current value per run.
///
/// The common case: "fetch the user with this id", "load the current
/// weather". State is [`SingleState`](crate::state::single::SingleState):
/// one `current`, one `error`.
#[async_trait]
pub trait SingleOperation: OperationCore {
    /// The value this operation produces.
    type Value: Clone + Send + Sync + 'static;
    /// The operation's failure type.
    type Failure: Clone + Send + Sync + 'static;

    /// Runs the operation to completion, optionally pushing intermediate
    /// results through `cont` before the terminal return.
    async fn run(
        &self,
        ctx: Context,
        cont: Continuation<Self::Value, Self::Failure>,
    ) -> Result<Self::Value, Self::Failure>;
}

/// Which sub-fetch a [`PaginatedOperation`] run is servicing, and which
/// page id it targets.
#[derive(Debug, Clone)]
pub struct Paging<PID> {
    /// The page id this fetch should load.
    pub target_id: PID,
    /// Which sub-fetch this is, mirroring `context.paginated.fetch_type`.
    pub fetch_type: crate::context::keys::PaginatedFetchType,
}

/// An operation that produces a sequence of pages, fetched incrementally
/// forward (`next`), backward (`previous`), from scratch (`initial`), or
/// refetched in full (`all`).
///
/// State is [`PaginatedState`](crate::state::paginated::PaginatedState),
/// which segregates active tasks into four buckets because the
/// [paginated engine](crate::store::paginated_engine) runs `next` and
/// `previous` concurrently with each other but not with `initial`/`all`.
#[async_trait]
pub trait PaginatedOperation: OperationCore {
    /// Identifies one page; used to anchor `next`/`previous` insertion and
    /// as the engine's cursor.
    type PageId: Clone + Eq + Send + Sync + 'static;
    /// One page's payload.
    type PageValue: Clone + Send + Sync + 'static;
    /// The operation's failure type.
    type Failure: Clone + Send + Sync + 'static;

    /// The page id an `initial` fetch starts from.
    fn initial_page_id(&self) -> Self::PageId;

    /// The id of the page after `last_page`, or `None` if it is known to
    /// be the last page. Consulted after every successful fetch to decide
    /// whether `next` should remain available.
    fn next_id(&self, last_page: &Self::PageValue, ctx: &Context) -> Option<Self::PageId>;

    /// The id of the page before `first_page`. Defaults to `None`
    /// (backward pagination is opt-in).
    fn previous_id(&self, _first_page: &Self::PageValue, _ctx: &Context) -> Option<Self::PageId> {
        None
    }

    /// Fetches the page described by `paging`.
    async fn fetch_page(
        &self,
        paging: Paging<Self::PageId>,
        ctx: Context,
        cont: Continuation<Self::PageValue, Self::Failure>,
    ) -> Result<Self::PageValue, Self::Failure>;
}

/// An operation that performs a side-effecting write, submitted with
/// `Arguments` and tracked with a bounded history of recent attempts.
///
/// State is [`MutationState`](crate::state::mutation::MutationState).
/// Unlike the read paradigms, a mutation is not auto-run and is not
/// deduplicated by default — each submission is a deliberate, distinct
/// attempt.
#[async_trait]
pub trait MutationOperation: OperationCore {
    /// The arguments one mutation attempt is submitted with.
    type Arguments: Clone + Send + Sync + 'static;
    /// The value a successful mutation produces.
    type Value: Clone + Send + Sync + 'static;
    /// The operation's failure type.
    type Failure: Clone + Send + Sync + 'static;

    /// Performs the mutation for `arguments`.
    async fn mutate(
        &self,
        arguments: Self::Arguments,
        ctx: Context,
        cont: Continuation<Self::Value, Self::Failure>,
    ) -> Result<Self::Value, Self::Failure>;
}

/// Adapts a [`SingleOperation`] into a [`Runnable`] with `Input = ()`.
pub struct Single<O>(pub O);

impl<O: OperationCore> OperationCore for Single<O> {
    fn path(&self) -> Path {
        self.0.path()
    }
    fn setup(&self, ctx: &mut Context) {
        self.0.setup(ctx);
    }
}

#[async_trait]
impl<O: SingleOperation> Runnable for Single<O> {
    type Input = ();
    type Value = O::Value;
    type Failure = O::Failure;

    async fn execute(
        &self,
        _input: (),
        ctx: Context,
        cont: Continuation<Self::Value, Self::Failure>,
    ) -> Result<Self::Value, RuntimeError<Self::Failure>> {
        self.0.run(ctx, cont).await.map_err(RuntimeError::from)
    }
}

/// Adapts a [`PaginatedOperation`] into a [`Runnable`] with
/// `Input = Paging<O::PageId>`.
pub struct Paginated<O>(pub O);

impl<O: OperationCore> OperationCore for Paginated<O> {
    fn path(&self) -> Path {
        self.0.path()
    }
    fn setup(&self, ctx: &mut Context) {
        self.0.setup(ctx);
    }
}

#[async_trait]
impl<O: PaginatedOperation> Runnable for Paginated<O> {
    type Input = Paging<O::PageId>;
    type Value = O::PageValue;
    type Failure = O::Failure;

    async fn execute(
        &self,
        input: Paging<O::PageId>,
        ctx: Context,
        cont: Continuation<Self::Value, Self::Failure>,
    ) -> Result<Self::Value, RuntimeError<Self::Failure>> {
        self.0.fetch_page(input, ctx, cont).await.map_err(RuntimeError::from)
    }
}

/// Exposes a [`PaginatedOperation`]'s page-id logic independent of
/// whatever [`Modifier`] chain wraps its `fetch_page` call, so the
/// [paginated engine](crate::store::paginated_engine) can decide
/// `next_id`/`previous_id` without unwrapping the chain back down to the
/// original operation.
pub trait PageCursor: Runnable {
    /// Identifies one page; same type as the wrapped operation's
    /// `PageId`.
    type PageId: Clone + Eq + Send + Sync + 'static;

    /// The page id an `initial` fetch starts from.
    fn initial_page_id(&self) -> Self::PageId;
    /// The id of the page after `last_page`, or `None` if it is the last.
    fn next_id(&self, last_page: &Self::Value, ctx: &Context) -> Option<Self::PageId>;
    /// The id of the page before `first_page`.
    fn previous_id(&self, first_page: &Self::Value, ctx: &Context) -> Option<Self::PageId>;
}

impl<O: PaginatedOperation> PageCursor for Paginated<O> {
    type PageId = O::PageId;

    fn initial_page_id(&self) -> Self::PageId {
        self.0.initial_page_id()
    }

    fn next_id(&self, last_page: &Self::Value, ctx: &Context) -> Option<Self::PageId> {
        self.0.next_id(last_page, ctx)
    }

    fn previous_id(&self, first_page: &Self::Value, ctx: &Context) -> Option<Self::PageId> {
        self.0.previous_id(first_page, ctx)
    }
}

impl<Inner, M> PageCursor for Modified<Inner, M>
where
    Inner: PageCursor,
    M: Modifier<Inner>,
{
    type PageId = Inner::PageId;

    fn initial_page_id(&self) -> Self::PageId {
        self.inner().initial_page_id()
    }

    fn next_id(&self, last_page: &Self::Value, ctx: &Context) -> Option<Self::PageId> {
        self.inner().next_id(last_page, ctx)
    }

    fn previous_id(&self, first_page: &Self::Value, ctx: &Context) -> Option<Self::PageId> {
        self.inner().previous_id(first_page, ctx)
    }
}

/// Adapts a [`MutationOperation`] into a [`Runnable`] with
/// `Input = O::Arguments`.
pub struct Mutation<O>(pub O);

impl<O: OperationCore> OperationCore for Mutation<O> {
    fn path(&self) -> Path {
        self.0.path()
    }
    fn setup(&self, ctx: &mut Context) {
        self.0.setup(ctx);
    }
}

#[async_trait]
impl<O: MutationOperation> Runnable for Mutation<O> {
    type Input = O::Arguments;
    type Value = O::Value;
    type Failure = O::Failure;

    async fn execute(
        &self,
        input: O::Arguments,
        ctx: Context,
        cont: Continuation<Self::Value, Self::Failure>,
    ) -> Result<Self::Value, RuntimeError<Self::Failure>> {
        self.0.mutate(input, ctx, cont).await.map_err(RuntimeError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path as OpPath;

    struct Echo;

    impl OperationCore for Echo {
        fn path(&self) -> Path {
            OpPath::from(["echo"])
        }
    }

    #[async_trait]
    impl SingleOperation for Echo {
        type Value = i32;
        type Failure = String;

        async fn run(&self, _ctx: Context, _cont: Continuation<i32, String>) -> Result<i32, String> {
            Ok(7)
        }
    }

    #[tokio::test]
    async fn single_adapter_delegates_to_run() {
        let (cont, _rx) = crate::continuation::channel();
        let runnable = Single(Echo);
        let result = runnable.execute((), Context::new(), cont).await;
        assert_eq!(result.unwrap(), 7);
    }
}
