//! [`Context`]: the extensible, copy-on-write key/value bag threaded
//! through every operation run.
//!
//! Keys are typed: [`ContextKey<T>`] carries both the `TypeId` used to
//! index the map and the default value returned when a key has never been
//! set. Reads never fail. Writes clone the underlying map so a modifier
//! that mutates the context before delegating to its inner operation
//! never affects a sibling branch of the call tree — see
//! [`Context::child`].

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

/// A typed key into a [`Context`].
///
/// `T` must be `Clone + Send + Sync + 'static` so values can be cheaply
/// read out of the map and shared across the threads an operation may run
/// on. The `default` closure is called once per miss; its result is not
/// cached back into the map (so two reads of an unset key each get a
/// fresh default, matching "reads never fail, never mutate").
pub struct ContextKey<T> {
    name: &'static str,
    default: fn() -> T,
}

impl<T> ContextKey<T> {
    /// Declares a new key with the given debug name and default-value
    /// factory.
    pub const fn new(name: &'static str, default: fn() -> T) -> Self {
        Self { name, default }
    }

    /// The key's debug name, used in diagnostics and `Debug` output.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContextKey").field(&self.name).finish()
    }
}

type AnyValue = Arc<dyn Any + Send + Sync>;

/// Per-operation key → value bag with copy-on-write semantics.
///
/// Cloning a `Context` is O(1) (an `Arc`-backed map is shared) until one
/// side writes, at which point that side clones the map before mutating —
/// so a modifier's local `ctx.set(...)` before delegating to its inner
/// operation is visible only to that call's subtree, never to a sibling
/// that captured the context earlier.
#[derive(Clone, Default)]
pub struct Context {
    values: Arc<DashMap<TypeId, AnyValue>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("entries", &self.values.len())
            .finish()
    }
}

impl Context {
    /// An empty context; every key reads as its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the value for `key`, or its default if never set.
    pub fn get<T>(&self, key: &ContextKey<T>) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>().cloned())
            .unwrap_or_else(|| (key.default)())
    }

    /// Writes `value` for `key`.
    ///
    /// Clones the underlying map first (copy-on-write): a clone of this
    /// `Context` taken *before* this call is unaffected.
    pub fn set<T>(&mut self, _key: &ContextKey<T>, value: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        self.make_unique();
        self.values
            .insert(TypeId::of::<T>(), Arc::new(value) as AnyValue);
    }

    /// Returns a context that shares this one's values but can diverge
    /// independently: writes through the child are not observed by `self`
    /// and vice versa once the child makes its first write.
    ///
    /// Used by [`Modifier`](crate::operation::modifier::Modifier)s that
    /// adjust context before delegating to their inner operation.
    pub fn child(&self) -> Context {
        self.clone()
    }

    /// Forces copy-on-write: if other clones are alive, clones the map so
    /// subsequent writes are private to `self`.
    fn make_unique(&mut self) {
        if Arc::strong_count(&self.values) > 1 {
            let cloned: DashMap<TypeId, AnyValue> = self
                .values
                .iter()
                .map(|entry| (*entry.key(), entry.value().clone()))
                .collect();
            self.values = Arc::new(cloned);
        }
    }
}

/// Built-in, well-known context keys.
///
/// Every key here has a sensible out-of-the-box default:
/// `clock` → system time, `delayer` → task sleep, `backoff` →
/// fibonacci·1s, `retry_limit`/`retry_index` → 0, `auto_run_predicate` /
/// `stale_predicate` → always-true / always-stale.
pub mod keys {
    use super::ContextKey;
    use crate::client::{ClientHandle, ErasedStore};
    use crate::clock::{Backoff, Clock, Delayer, SystemClock, TokioDelayer};
    use crate::config::RuntimeConfig;
    use crate::diagnostics::Diagnostics;
    use crate::controller::Controller;
    use crate::run_spec::{AlwaysStale, AlwaysTrue, RunSpecification};
    use crate::task::TaskInfo;
    use std::sync::Arc;

    /// Current time source for staleness and timestamp bookkeeping.
    pub static CLOCK: ContextKey<Arc<dyn Clock>> =
        ContextKey::new("clock", || Arc::new(SystemClock));

    /// Async sleep used by retry backoff.
    pub static DELAYER: ContextKey<Arc<dyn Delayer>> =
        ContextKey::new("delayer", || Arc::new(TokioDelayer));

    /// Retry backoff policy, `attempt -> duration`.
    pub static BACKOFF: ContextKey<Backoff> = ContextKey::new("backoff", Backoff::fibonacci);

    /// Configured retry ceiling for the active `retry` modifier, if any.
    ///
    /// Wrapped in a distinct newtype rather than a bare `u32` because
    /// `Context` indexes its map by `TypeId::of::<T>()`: a bare
    /// `ContextKey<u32>` here would alias [`RetryIndex`]'s slot, since
    /// both would key off `TypeId::of::<u32>()`.
    #[derive(Debug, Clone, Copy)]
    pub struct RetryLimit(pub u32);
    pub static RETRY_LIMIT: ContextKey<RetryLimit> = ContextKey::new("retry_limit", || RetryLimit(0));

    /// Index of the attempt currently executing, `0`-based.
    #[derive(Debug, Clone, Copy)]
    pub struct RetryIndex(pub u32);
    pub static RETRY_INDEX: ContextKey<RetryIndex> = ContextKey::new("retry_index", || RetryIndex(0));

    /// Whether a `Store` should automatically run when subscribed to.
    ///
    /// Wrapped for the same reason as [`RetryLimit`]/[`RetryIndex`]: both
    /// this and [`StalePredicate`] would otherwise share
    /// `TypeId::of::<Arc<dyn RunSpecification>>()`.
    #[derive(Clone)]
    pub struct AutoRunPredicate(pub Arc<dyn RunSpecification>);
    pub static AUTO_RUN_PREDICATE: ContextKey<AutoRunPredicate> =
        ContextKey::new("auto_run_predicate", || AutoRunPredicate(Arc::new(AlwaysTrue)));

    /// Whether the current state counts as stale and should be refetched.
    #[derive(Clone)]
    pub struct StalePredicate(pub Arc<dyn RunSpecification>);
    pub static STALE_PREDICATE: ContextKey<StalePredicate> =
        ContextKey::new("stale_predicate", || StalePredicate(Arc::new(AlwaysStale)));

    /// Weak handle to the hosting `Client`, if the operation was resolved
    /// through one.
    pub static CLIENT: ContextKey<Option<ClientHandle>> = ContextKey::new("client", || None);

    /// Descriptor of the task currently executing this run, set by the
    /// `Store` before invoking the operation.
    pub static CURRENT_TASK_INFO: ContextKey<Option<TaskInfo>> =
        ContextKey::new("current_task_info", || None);

    /// Erased handle to the store driving the current run, set by the
    /// `Store`/`MutationStore` alongside `current_task_info` before
    /// invoking the operation, so a modifier or controller can navigate
    /// back to its own store (e.g. to reset or reread its own state).
    pub static CURRENT_STORE: ContextKey<Option<Arc<dyn ErasedStore>>> =
        ContextKey::new("current_store", || None);

    /// Reason the most recent state update occurred: a `Continuation`
    /// yield, or the operation's terminal return.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum ResultUpdateReason {
        /// Pushed through a `Continuation::yield_*` call mid-run.
        Yielded,
        /// The operation's `run`/`fetch_page`/`mutate` returned.
        #[default]
        FinalReturned,
    }
    pub static RESULT_UPDATE_REASON: ContextKey<ResultUpdateReason> =
        ContextKey::new("result_update_reason", ResultUpdateReason::default);

    /// Which paginated sub-fetch is executing. Only meaningful during a
    /// paginated run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PaginatedFetchType {
        /// Replaces/loads the first page.
        Initial,
        /// Fetches the page after `next_page_id`.
        Next,
        /// Fetches the page before `previous_page_id`.
        Previous,
        /// Refetches every page from the start.
        All,
    }
    pub static PAGINATED_FETCH_TYPE: ContextKey<Option<PaginatedFetchType>> =
        ContextKey::new("paginated.fetch_type", || None);

    /// Controllers attached by the `controller(...)` modifier, consumed by
    /// the `Store` at construction to install long-lived subscriptions.
    pub static CONTROLLERS: ContextKey<im_list::List<Arc<dyn Controller>>> =
        ContextKey::new("controllers", im_list::List::new);

    /// Ambient runtime configuration the hosting `Client` was built with.
    pub static CONFIG: ContextKey<RuntimeConfig> = ContextKey::new("config", RuntimeConfig::default);

    /// Diagnostic sink for cycle/duplicate-path reporting.
    pub static DIAGNOSTICS: ContextKey<Diagnostics> = ContextKey::new("diagnostics", Diagnostics::default);

    /// Optional span-producing handle the `log_duration` modifier records
    /// each run's elapsed time into. `None` (the default) means
    /// `log_duration` does nothing: it is opt-in, not wired into every
    /// `Store` automatically.
    pub static LOGGER: ContextKey<Option<Arc<dyn crate::operation::modifiers::log_duration::Logger>>> =
        ContextKey::new("logger", || None);

    /// Minimal append-only list so `Context::get` can clone a `Vec`-like
    /// value cheaply without requiring `Vec<Arc<dyn Trait>>` to implement
    /// `Clone` via deep copy (it already does; this just documents intent
    /// and keeps the key's type small and explicit).
    pub mod im_list {
        #[derive(Debug)]
        pub struct List<T>(Vec<T>);

        impl<T: Clone> Clone for List<T> {
            fn clone(&self) -> Self {
                Self(self.0.clone())
            }
        }

        impl<T> List<T> {
            pub fn new() -> Self {
                Self(Vec::new())
            }

            pub fn push(&mut self, value: T) {
                self.0.push(value);
            }

            pub fn iter(&self) -> std::slice::Iter<'_, T> {
                self.0.iter()
            }

            pub fn into_vec(self) -> Vec<T> {
                self.0
            }
        }

        impl<T> Default for List<T> {
            fn default() -> Self {
                Self::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static COUNT: ContextKey<i32> = ContextKey::new("count", || 0);

    #[test]
    fn unset_key_reads_as_default() {
        let ctx = Context::new();
        assert_eq!(ctx.get(&COUNT), 0);
    }

    #[test]
    fn write_is_visible_to_later_reads() {
        let mut ctx = Context::new();
        ctx.set(&COUNT, 5);
        assert_eq!(ctx.get(&COUNT), 5);
    }

    #[test]
    fn copy_on_write_isolates_clones() {
        let ctx = Context::new();
        let mut child = ctx.child();
        child.set(&COUNT, 42);
        assert_eq!(child.get(&COUNT), 42);
        assert_eq!(ctx.get(&COUNT), 0, "mutation must not leak to the parent");
    }

    #[test]
    fn two_children_diverge_independently() {
        let parent = Context::new();
        let mut a = parent.child();
        let mut b = parent.child();
        a.set(&COUNT, 1);
        b.set(&COUNT, 2);
        assert_eq!(a.get(&COUNT), 1);
        assert_eq!(b.get(&COUNT), 2);
        assert_eq!(parent.get(&COUNT), 0);
    }
}
