//! [`Client`]: a registry of stores, keyed by [`Path`], with prefix
//! lookups.

use std::any::Any;
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::config::RuntimeConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::operation::{OperationCore, PageCursor, Paging, Runnable};
use crate::path::Path;
use crate::store::paginated_engine::{PaginatedInner, PaginatedStore};
use crate::store::{MutationStore, Store};

/// Object-safe view of a store a [`Client`] keeps bookkeeping for,
/// independent of the store's concrete value/failure/state types.
pub trait ErasedStore: Send + Sync + Any {
    /// The store's identity.
    fn path(&self) -> Path;

    /// Cancels active tasks and resets to the initial state.
    fn reset_state(&self);

    /// `true` while at least one task is active.
    fn is_loading(&self) -> bool;

    /// Downcasting hook for [`Client`]'s typed accessors.
    fn as_any(&self) -> &dyn Any;
}

struct ClientInner {
    stores: DashMap<Path, Arc<dyn ErasedStore>>,
    config: RuntimeConfig,
    diagnostics: Diagnostics,
}

/// Registry mapping [`Path`] to the store serving it.
///
/// Cloning a `Client` is cheap (`Arc`-backed) and shares the same
/// registry. Resolving the same path twice returns the same underlying
/// store; resolving a path that collides with one already registered for
/// a *different* operation type reports a
/// [`Diagnostic::DuplicatePathConflict`] and keeps the original store —
/// the conflicting registration is not retained.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// A fresh, empty client with `config` and the default `tracing`
    /// diagnostic sink.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_diagnostics(config, Diagnostics::default())
    }

    /// Like [`Client::new`], with an explicit diagnostic sink (mainly for
    /// tests that need to assert on [`Diagnostic`]s).
    pub fn with_diagnostics(config: RuntimeConfig, diagnostics: Diagnostics) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                stores: DashMap::new(),
                config,
                diagnostics,
            }),
        }
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> RuntimeConfig {
        self.inner.config.clone()
    }

    /// A weak, non-owning reference, suitable for `context.client`.
    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers a store built by `build` at `path` if none is registered
    /// there yet. If one already is, and it was built from the same
    /// operation type, returns that existing store unchanged. If it was
    /// built from a *different* operation type, reports a
    /// [`Diagnostic::DuplicatePathConflict`] and returns a fresh,
    /// unretained store built by `build` — the original registration is
    /// left untouched.
    pub fn register_or_get(&self, path: Path, build: impl FnOnce() -> Arc<dyn ErasedStore>) -> Arc<dyn ErasedStore> {
        match self.inner.stores.entry(path.clone()) {
            Entry::Occupied(occupied) => {
                let existing = Arc::clone(occupied.get());
                let candidate = build();
                if existing.as_any().type_id() == candidate.as_any().type_id() {
                    existing
                } else {
                    self.inner
                        .diagnostics
                        .report(Diagnostic::DuplicatePathConflict { path });
                    candidate
                }
            }
            Entry::Vacant(vacant) => {
                let store = build();
                vacant.insert(Arc::clone(&store));
                store
            }
        }
    }

    /// The store registered at exactly `path`, if any. Unlike
    /// [`Client::stores_matching`], this does not match descendants.
    pub fn store_with(&self, path: &Path) -> Option<Arc<dyn ErasedStore>> {
        self.inner.stores.get(path).map(|entry| Arc::clone(entry.value()))
    }

    /// Every store whose path is `path` or has `path` as a prefix.
    pub fn stores_matching(&self, path: &Path) -> Vec<Arc<dyn ErasedStore>> {
        self.inner
            .stores
            .iter()
            .filter(|entry| path.is_prefix_of(entry.key()))
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Like [`Client::stores_matching`], but downcast to `Store<Inner>`
    /// directly: stores under `path` that were not built from `Inner` are
    /// silently skipped, so a host matching a namespace it knows is
    /// homogeneous doesn't have to downcast by hand.
    pub fn typed_stores_matching<Inner>(&self, path: &Path) -> Vec<Store<Inner>>
    where
        Inner: Runnable<Input = ()> + 'static,
    {
        self.stores_matching(path)
            .into_iter()
            .filter_map(|erased| erased.as_any().downcast_ref::<Store<Inner>>().cloned())
            .collect()
    }

    /// Resets every store under `path` (itself or any descendant).
    pub fn reset_matching(&self, path: &Path) {
        for store in self.stores_matching(path) {
            store.reset_state();
        }
    }

    /// Total number of stores currently registered.
    pub fn store_count(&self) -> usize {
        self.inner.stores.len()
    }

    /// The [`Store`] for `operation`, building one (and registering it at
    /// `operation.path()`) on first access.
    pub fn store<Inner>(&self, operation: Inner) -> Store<Inner>
    where
        Inner: Runnable<Input = ()> + 'static,
    {
        let path = operation.path();
        let config = self.inner.config.clone();
        let diagnostics = self.inner.diagnostics.clone();
        let erased = self.register_or_get(path, move || {
            Arc::new(Store::new(operation, config, diagnostics)) as Arc<dyn ErasedStore>
        });
        erased
            .as_any()
            .downcast_ref::<Store<Inner>>()
            .expect("path already registered to a different operation type")
            .clone()
    }

    /// The [`MutationStore`] for `operation`, building one on first
    /// access.
    pub fn mutation_store<Inner>(&self, operation: Inner) -> MutationStore<Inner>
    where
        Inner: Runnable + 'static,
    {
        let path = operation.path();
        let config = self.inner.config.clone();
        let diagnostics = self.inner.diagnostics.clone();
        let erased = self.register_or_get(path, move || {
            Arc::new(MutationStore::new(operation, config, diagnostics)) as Arc<dyn ErasedStore>
        });
        erased
            .as_any()
            .downcast_ref::<MutationStore<Inner>>()
            .expect("path already registered to a different operation type")
            .clone()
    }

    /// The [`PaginatedStore`] for `operation`, building one on first
    /// access.
    pub fn paginated_store<Inner>(&self, operation: Inner) -> PaginatedStore<Inner>
    where
        Inner: PaginatedInner + Runnable<Input = Paging<<Inner as PageCursor>::PageId>>,
    {
        let path = operation.path();
        let config = self.inner.config.clone();
        let diagnostics = self.inner.diagnostics.clone();
        let erased = self.register_or_get(path, move || {
            Arc::new(PaginatedStore::new(operation, config, diagnostics)) as Arc<dyn ErasedStore>
        });
        erased
            .as_any()
            .downcast_ref::<PaginatedStore<Inner>>()
            .expect("path already registered to a different operation type")
            .clone()
    }
}

/// A weak, non-owning reference to a [`Client`], installed into
/// `context.client` so an operation resolved through a client can
/// navigate back to it (e.g. to look up a related store) without keeping
/// the client alive artificially.
#[derive(Clone)]
pub struct ClientHandle {
    inner: Weak<ClientInner>,
}

impl ClientHandle {
    /// Upgrades to an owning [`Client`], or `None` if the client has
    /// already been dropped.
    pub fn upgrade(&self) -> Option<Client> {
        self.inner.upgrade().map(|inner| Client { inner })
    }
}
