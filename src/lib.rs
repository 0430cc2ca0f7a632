//! Client-side asynchronous operation runtime.
//!
//! An [`Operation`](operation::Runnable) describes what to fetch or mutate
//! and where it lives (its [`Path`](path::Path)); a [`Client`](client::Client)
//! resolves operations to [`Store`](store::Store)s by path, one per
//! identity; a `Store` owns that operation's state, decides when to run it,
//! and fans results out to subscribers. [`Modifier`](operation::Modifier)s
//! wrap an operation to add retry, deduplication, staleness policy,
//! rerun-on-change, or controller-driven lifecycle without the operation
//! itself knowing about any of it.
//!
//! # Module organization
//!
//! - [`path`] - structural identity keys (`Path`) for addressing operations
//! - [`context`] - the typed key/value bag (`Context`) threaded through a run
//! - [`clock`] - `Clock`/`Delayer`/`Backoff` abstractions, faked under test
//! - [`continuation`] - the `Continuation` yield channel for intermediate results
//! - [`run_spec`] - composable `RunSpecification` predicates (stale/auto-run policy)
//! - [`controller`] - external imperative control (`refetch`/`reset`) over a store
//! - [`error`] - `RuntimeError<E>`, the taxonomy every run's result wears
//! - [`diagnostics`] - injectable sink for runtime-integrity diagnostics
//! - [`config`] - `RuntimeConfig`, the defaults a `Client` seeds every store with
//! - [`subscription`] - `Subscription` handles and the listener list they detach from
//! - [`task`] - `Task`, the memoized, cancellable unit of work a store schedules
//! - [`state`] - the three state shapes (single/paginated/mutation)
//! - [`operation`] - the three operation paradigms and the `Modifier` chain
//! - [`store`] - `Store`/`MutationStore`/`PaginatedStore`, the paradigm-specific engines
//! - [`client`] - `Client`, the path-keyed store registry
//! - [`testing`] - fakes (`ManualClock`, `ManualDelayer`) for deterministic tests

pub mod path;
pub mod context;
pub mod clock;
pub mod continuation;
pub mod run_spec;
pub mod controller;
pub mod error;
pub mod diagnostics;
pub mod config;
pub mod subscription;
pub mod task;
pub mod state;
pub mod operation;
pub mod store;
pub mod client;
pub mod testing;

pub use client::Client;
pub use config::RuntimeConfig;
pub use context::Context;
pub use error::RuntimeError;
pub use operation::{
    Modified, Modifier, Mutation, MutationOperation, PageCursor, Paginated, PaginatedOperation,
    Paging, Runnable, RunnableExt, Single, SingleOperation,
};
pub use path::Path;
pub use store::paginated_engine::PaginatedStore;
pub use store::{MutationStore, Store};
