//! [`Store`]: drives a [`Runnable`] operation's runs, owns its state, and
//! fans state changes out to subscribers.
//!
//! [`Store`] serves [`SingleOperation`](crate::operation::SingleOperation)
//! and [`PaginatedOperation`](crate::operation::PaginatedOperation)
//! (via [`paginated_engine`]); [`MutationStore`] serves
//! [`MutationOperation`](crate::operation::MutationOperation) separately,
//! since a mutation's "run" is submitted with arguments rather than
//! triggered implicitly and is never deduplicated or auto-run.

pub mod paginated_engine;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::client::ErasedStore;
use crate::clock::TaskIdAllocator;
use crate::config::RuntimeConfig;
use crate::context::{keys, Context};
use crate::controller::{Controller, Controls};
use crate::diagnostics::Diagnostics;
use crate::error::{OperationFailure, RuntimeError};
use crate::operation::modifiers::default_value;
use crate::operation::Runnable;
use crate::path::Path;
use crate::run_spec::RunSpecification;
use crate::state::mutation::{MutationAttempt, MutationState};
use crate::state::single::SingleState;
use crate::state::{OperationState, StateSnapshot};
use crate::subscription::{Subscription, SubscriberList};
use crate::task::{Task, TaskConfig, TaskInfo, Work};

/// A subscriber callback, receiving a snapshot of the common state shape
/// every time it changes.
pub type Listener<V, E> = Box<dyn Fn(&StateSnapshot<Option<V>, E>) + Send + Sync>;

fn notify<V, E>(listeners: &SubscriberList<Listener<V, E>>, snapshot: &StateSnapshot<Option<V>, E>)
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    for listener in listeners.snapshot() {
        listener(snapshot);
    }
}

struct Shared<Inner: Runnable<Input = ()>> {
    inner: Arc<Inner>,
    path: Path,
    base_ctx: Context,
    state: SingleState<Inner::Value, Inner::Failure>,
    listeners: Arc<SubscriberList<Listener<Inner::Value, Inner::Failure>>>,
    controller_subs: Mutex<Vec<Subscription>>,
    task_ids: TaskIdAllocator,
    diagnostics: Diagnostics,
}

/// Drives a [`Runnable<Input = ()>`] operation: owns its
/// [`SingleState`], decides when a run is needed, and notifies
/// subscribers of every state transition.
///
/// Cloning a `Store` is cheap (`Arc`-backed) and shares the same
/// underlying run: two clones calling [`Store::run`] concurrently observe
/// the same in-flight task rather than triggering two fetches, matching
/// `Task`'s own sharing semantics.
pub struct Store<Inner: Runnable<Input = ()>> {
    shared: Arc<Shared<Inner>>,
}

impl<Inner> Clone for Store<Inner>
where
    Inner: Runnable<Input = ()>,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<Inner> Store<Inner>
where
    Inner: Runnable<Input = ()> + 'static,
{
    /// Builds a store for `inner`, running its `setup` (and every
    /// enclosing modifier's `setup`, outermost first) once to seed the
    /// base context every run starts from, then installs any
    /// `controller(...)`-supplied [`Controller`]s the setup pass
    /// collected.
    pub fn new(inner: Inner, config: RuntimeConfig, diagnostics: Diagnostics) -> Self {
        let path = inner.path();
        let mut ctx = Context::new();
        ctx.set(&keys::CONFIG, config.clone());
        ctx.set(&keys::DIAGNOSTICS, diagnostics.clone());
        inner.setup(&mut ctx);

        let initial_value = default_value::read_default::<Inner::Value>(&ctx);

        let shared = Arc::new(Shared {
            inner: Arc::new(inner),
            path,
            base_ctx: ctx.clone(),
            state: SingleState::new(initial_value),
            listeners: Arc::new(SubscriberList::new()),
            controller_subs: Mutex::new(Vec::new()),
            task_ids: TaskIdAllocator::new(),
            diagnostics,
        });

        let controllers = ctx.get(&keys::CONTROLLERS).into_vec();
        if !controllers.is_empty() {
            let mut subs = Vec::with_capacity(controllers.len());
            for controller in controllers {
                let controls: Box<dyn Controls> = Box::new(StoreControls {
                    shared: Arc::downgrade(&shared),
                });
                subs.push(controller.attach(&ctx, controls));
            }
            *shared.controller_subs.lock() = subs;
        }

        Self { shared }
    }

    /// This store's operation's identity.
    pub fn path(&self) -> Path {
        self.shared.path.clone()
    }

    /// A snapshot of the current state.
    pub fn snapshot(&self) -> StateSnapshot<Option<Inner::Value>, Inner::Failure> {
        self.shared.state.snapshot()
    }

    /// `true` if `context.stale_predicate` considers the current state
    /// stale and due for a refetch.
    pub fn is_stale(&self) -> bool {
        self.shared
            .base_ctx
            .get(&keys::STALE_PREDICATE)
            .0
            .is_satisfied(&self.shared.base_ctx)
    }

    /// `true` if `context.auto_run_predicate` allows this store to run
    /// automatically on subscribe.
    pub fn is_automatic_running_enabled(&self) -> bool {
        self.shared
            .base_ctx
            .get(&keys::AUTO_RUN_PREDICATE)
            .0
            .is_satisfied(&self.shared.base_ctx)
    }

    /// Runs the operation (reusing an already-active task if one exists)
    /// and awaits its result.
    pub async fn run(&self) -> Result<Inner::Value, RuntimeError<Inner::Failure>> {
        let task = self.run_task();
        Self::flatten(task.run_if_needed().await)
    }

    /// Reuses the current active task if one exists, or schedules a new
    /// one and lets it run in the background, feeding
    /// [`Continuation`](crate::continuation::Continuation) yields and the
    /// terminal result into state as they arrive.
    ///
    /// Returns immediately; the caller does not need to await the
    /// returned task to make progress happen — a background watcher
    /// always drives it to completion and clears it from the active set.
    pub fn run_task(&self) -> Task<Inner::Value, RuntimeError<Inner::Failure>> {
        if let Some(task) = self.shared.state.active_tasks().into_iter().next() {
            return task;
        }

        let id = self.shared.task_ids.next();
        let mut ctx = self.shared.base_ctx.child();
        ctx.set(
            &keys::CURRENT_TASK_INFO,
            Some(TaskInfo {
                id,
                name: None,
            }),
        );
        ctx.set(&keys::CURRENT_STORE, Some(Arc::new(self.clone()) as Arc<dyn ErasedStore>));

        let (cont, mut cont_rx) = crate::continuation::channel::<Inner::Value, Inner::Failure>();
        let inner_op = Arc::clone(&self.shared.inner);
        let shared_for_work = Arc::clone(&self.shared);

        let work: Work<Inner::Value, RuntimeError<Inner::Failure>> = Box::new(move |cfg: TaskConfig| {
            Box::pin(async move {
                let drain_shared = Arc::clone(&shared_for_work);
                let drain_handle = tokio::spawn(async move {
                    while let Some(yielded) = cont_rx.recv().await {
                        let now = drain_shared.base_ctx.get(&keys::CLOCK).now();
                        drain_shared
                            .state
                            .update(yielded.into_result(), keys::ResultUpdateReason::Yielded, now);
                        let snapshot = drain_shared.state.snapshot();
                        notify(&drain_shared.listeners, &snapshot);
                    }
                });

                let result = inner_op.execute((), cfg.context, cont).await;
                let _ = drain_handle.await;
                result
            })
        });

        let task = Task::new(id, TaskConfig { name: None, priority: None, context: ctx }, self.shared.diagnostics.clone(), work);
        self.shared.state.schedule_fetch_task(task.clone());

        let cleanup_task = task.clone();
        let shared_for_cleanup = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let result = cleanup_task.run_if_needed().await;
            shared_for_cleanup.state.finish_fetch_task(cleanup_task.id());

            let now = shared_for_cleanup.base_ctx.get(&keys::CLOCK).now();
            match Self::flatten(result) {
                Ok(value) => shared_for_cleanup
                    .state
                    .update(Ok(value), keys::ResultUpdateReason::FinalReturned, now),
                Err(RuntimeError::Operation(OperationFailure(e))) => shared_for_cleanup
                    .state
                    .update(Err(e), keys::ResultUpdateReason::FinalReturned, now),
                Err(_) => {}
            }
            let snapshot = shared_for_cleanup.state.snapshot();
            notify(&shared_for_cleanup.listeners, &snapshot);
        });

        task
    }

    /// Collapses the double-wrapped [`RuntimeError`] `run_if_needed`
    /// produces (the `Task`'s own cancellation/error layer around the
    /// operation's own `RuntimeError<Failure>`) back into one layer.
    fn flatten(
        result: Result<Inner::Value, RuntimeError<RuntimeError<Inner::Failure>>>,
    ) -> Result<Inner::Value, RuntimeError<Inner::Failure>> {
        match result {
            Ok(value) => Ok(value),
            Err(RuntimeError::Operation(OperationFailure(inner))) => Err(inner),
            Err(RuntimeError::Cancelled) => Err(RuntimeError::Cancelled),
            Err(RuntimeError::ClientUnavailable) => Err(RuntimeError::ClientUnavailable),
        }
    }

    /// Registers `listener`, and if automatic running is enabled and the
    /// current state is stale, kicks off a run in the background.
    pub fn subscribe(&self, listener: Listener<Inner::Value, Inner::Failure>) -> Subscription {
        let sub = self.shared.listeners.subscribe(listener);
        if self.is_automatic_running_enabled() && self.is_stale() {
            self.run_task();
        }
        sub
    }

    /// Cancels every active task, then resets state to its initial value.
    pub fn reset_state(&self) {
        for task in self.shared.state.active_tasks() {
            task.cancel();
        }
        self.shared.state.reset();
        let snapshot = self.shared.state.snapshot();
        notify(&self.shared.listeners, &snapshot);
    }

    /// The current value, without triggering a run.
    pub fn current_value(&self) -> Option<Inner::Value> {
        self.shared.state.snapshot().current
    }

    /// Directly sets the current value (tagged `final-returned`) without
    /// running the operation, and notifies subscribers.
    pub fn set_current_value(&self, value: Inner::Value) {
        let now = self.shared.base_ctx.get(&keys::CLOCK).now();
        self.shared.state.set_current_value(value, now);
        let snapshot = self.shared.state.snapshot();
        notify(&self.shared.listeners, &snapshot);
    }
}

impl<Inner> ErasedStore for Store<Inner>
where
    Inner: Runnable<Input = ()> + 'static,
{
    fn path(&self) -> Path {
        self.path()
    }

    fn reset_state(&self) {
        self.reset_state()
    }

    fn is_loading(&self) -> bool {
        self.shared.state.is_loading()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

struct StoreControls<Inner: Runnable<Input = ()>> {
    shared: Weak<Shared<Inner>>,
}

impl<Inner> Controls for StoreControls<Inner>
where
    Inner: Runnable<Input = ()> + 'static,
{
    fn refetch(&self) {
        if let Some(shared) = self.shared.upgrade() {
            Store { shared }.run_task();
        }
    }

    fn reset(&self) {
        if let Some(shared) = self.shared.upgrade() {
            Store { shared }.reset_state();
        }
    }

    fn yield_current_value_changed(&self) {
        if let Some(shared) = self.shared.upgrade() {
            let snapshot = shared.state.snapshot();
            notify(&shared.listeners, &snapshot);
        }
    }
}

struct MutationShared<Inner: Runnable> {
    inner: Arc<Inner>,
    path: Path,
    base_ctx: Context,
    state: MutationState<Inner::Input, Inner::Value, Inner::Failure>,
    listeners: Arc<SubscriberList<Listener<Inner::Value, Inner::Failure>>>,
    controller_subs: Mutex<Vec<Subscription>>,
    task_ids: TaskIdAllocator,
    diagnostics: Diagnostics,
}

/// Drives a [`MutationOperation`](crate::operation::MutationOperation):
/// each [`submit`](MutationStore::submit) call is a deliberate, distinct
/// attempt, tracked in a bounded history rather than replacing a single
/// shared in-flight task the way [`Store::run_task`] reuses one.
pub struct MutationStore<Inner: Runnable> {
    shared: Arc<MutationShared<Inner>>,
}

impl<Inner: Runnable> Clone for MutationStore<Inner> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<Inner> MutationStore<Inner>
where
    Inner: Runnable + 'static,
{
    /// Builds a mutation store for `inner`, with history bounded by
    /// `config.default_mutation_history_limit` unless a modifier
    /// overrode it during `setup`.
    pub fn new(inner: Inner, config: RuntimeConfig, diagnostics: Diagnostics) -> Self {
        let path = inner.path();
        let mut ctx = Context::new();
        ctx.set(&keys::CONFIG, config.clone());
        ctx.set(&keys::DIAGNOSTICS, diagnostics.clone());
        inner.setup(&mut ctx);

        let shared = Arc::new(MutationShared {
            inner: Arc::new(inner),
            path,
            base_ctx: ctx.clone(),
            state: MutationState::new(config.default_mutation_history_limit),
            listeners: Arc::new(SubscriberList::new()),
            controller_subs: Mutex::new(Vec::new()),
            task_ids: TaskIdAllocator::new(),
            diagnostics,
        });

        let controllers = ctx.get(&keys::CONTROLLERS).into_vec();
        if !controllers.is_empty() {
            let mut subs = Vec::with_capacity(controllers.len());
            for controller in controllers {
                let controls: Box<dyn Controls> = Box::new(MutationStoreControls {
                    shared: Arc::downgrade(&shared),
                });
                subs.push(controller.attach(&ctx, controls));
            }
            *shared.controller_subs.lock() = subs;
        }

        Self { shared }
    }

    /// This store's operation's identity.
    pub fn path(&self) -> Path {
        self.shared.path.clone()
    }

    /// A snapshot of the common state shape: the most recent attempt's
    /// outcome, independent of its bounded history.
    pub fn snapshot(&self) -> StateSnapshot<Option<Inner::Value>, Inner::Failure> {
        self.shared.state.snapshot()
    }

    /// The bounded history of recent attempts, oldest first.
    pub fn history(&self) -> Vec<MutationAttempt<Inner::Input, Inner::Value, Inner::Failure>> {
        self.shared.state.history()
    }

    /// Registers `listener`. Mutations are never auto-run, so subscribing
    /// never triggers a submission.
    pub fn subscribe(&self, listener: Listener<Inner::Value, Inner::Failure>) -> Subscription {
        self.shared.listeners.subscribe(listener)
    }

    /// Submits one mutation attempt with `arguments`, awaiting its
    /// terminal result and recording it in the bounded history.
    pub async fn submit(&self, arguments: Inner::Input) -> Result<Inner::Value, RuntimeError<Inner::Failure>> {
        let id = self.shared.task_ids.next();
        let started_at = self.shared.base_ctx.get(&keys::CLOCK).now();
        self.shared.state.begin_attempt(arguments.clone(), started_at);

        let mut ctx = self.shared.base_ctx.child();
        ctx.set(
            &keys::CURRENT_TASK_INFO,
            Some(TaskInfo {
                id,
                name: None,
            }),
        );
        ctx.set(&keys::CURRENT_STORE, Some(Arc::new(self.clone()) as Arc<dyn ErasedStore>));

        let (cont, mut cont_rx) = crate::continuation::channel::<Inner::Value, Inner::Failure>();
        let inner_op = Arc::clone(&self.shared.inner);
        let shared_for_yields = Arc::clone(&self.shared);

        let work: Work<Inner::Value, RuntimeError<Inner::Failure>> = Box::new(move |cfg: TaskConfig| {
            Box::pin(async move {
                let drain_shared = Arc::clone(&shared_for_yields);
                let drain_handle = tokio::spawn(async move {
                    while let Some(yielded) = cont_rx.recv().await {
                        let now = drain_shared.base_ctx.get(&keys::CLOCK).now();
                        drain_shared.state.record_yield(yielded.into_result(), now);
                        let snapshot = drain_shared.state.snapshot();
                        notify(&drain_shared.listeners, &snapshot);
                    }
                });

                let result = inner_op.execute(arguments, cfg.context, cont).await;
                let _ = drain_handle.await;
                result
            })
        });

        let task = Task::new(id, TaskConfig { name: None, priority: None, context: ctx }, self.shared.diagnostics.clone(), work);
        self.shared.state.schedule_fetch_task(task.clone());

        let result = Self::flatten(task.run_if_needed().await);
        self.shared.state.finish_fetch_task(task.id());

        let now = self.shared.base_ctx.get(&keys::CLOCK).now();
        match &result {
            Ok(value) => self
                .shared
                .state
                .complete_latest_pending(Ok(value.clone()), keys::ResultUpdateReason::FinalReturned, now),
            Err(e) => {
                if let Some(failure) = e.operation_failure() {
                    self.shared.state.complete_latest_pending(
                        Err(failure.clone()),
                        keys::ResultUpdateReason::FinalReturned,
                        now,
                    );
                }
            }
        }
        let snapshot = self.shared.state.snapshot();
        notify(&self.shared.listeners, &snapshot);

        result
    }

    fn flatten(
        result: Result<Inner::Value, RuntimeError<RuntimeError<Inner::Failure>>>,
    ) -> Result<Inner::Value, RuntimeError<Inner::Failure>> {
        match result {
            Ok(value) => Ok(value),
            Err(RuntimeError::Operation(OperationFailure(inner))) => Err(inner),
            Err(RuntimeError::Cancelled) => Err(RuntimeError::Cancelled),
            Err(RuntimeError::ClientUnavailable) => Err(RuntimeError::ClientUnavailable),
        }
    }
}

impl<Inner> ErasedStore for MutationStore<Inner>
where
    Inner: Runnable + 'static,
{
    fn path(&self) -> Path {
        self.path()
    }

    fn reset_state(&self) {
        self.shared.state.reset();
        let snapshot = self.shared.state.snapshot();
        notify(&self.shared.listeners, &snapshot);
    }

    fn is_loading(&self) -> bool {
        self.shared.state.is_loading()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

struct MutationStoreControls<Inner: Runnable> {
    shared: Weak<MutationShared<Inner>>,
}

impl<Inner> Controls for MutationStoreControls<Inner>
where
    Inner: Runnable + 'static,
{
    fn refetch(&self) {
        // Mutations are never auto-refetched; a controller targeting a
        // mutation store has nothing to do here.
    }

    fn reset(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.state.reset();
            let snapshot = shared.state.snapshot();
            notify(&shared.listeners, &snapshot);
        }
    }

    fn yield_current_value_changed(&self) {
        if let Some(shared) = self.shared.upgrade() {
            let snapshot = shared.state.snapshot();
            notify(&shared.listeners, &snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{OperationCore, Single, SingleOperation};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEcho {
        calls: Arc<AtomicUsize>,
    }

    impl OperationCore for CountingEcho {
        fn path(&self) -> Path {
            Path::from(["echo"])
        }
    }

    #[async_trait]
    impl SingleOperation for CountingEcho {
        type Value = i32;
        type Failure = String;

        async fn run(
            &self,
            _ctx: Context,
            _cont: crate::continuation::Continuation<i32, String>,
        ) -> Result<i32, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        }
    }

    #[tokio::test]
    async fn run_populates_current_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Store::new(
            Single(CountingEcho { calls: calls.clone() }),
            RuntimeConfig::default(),
            Diagnostics::default(),
        );
        let result = store.run().await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(store.current_value(), Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_run_calls_share_the_same_task() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Store::new(
            Single(CountingEcho { calls: calls.clone() }),
            RuntimeConfig::default(),
            Diagnostics::default(),
        );
        let (r1, r2) = tokio::join!(store.run(), store.run());
        assert_eq!(r1.unwrap(), 42);
        assert_eq!(r2.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_state_restores_initial_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Store::new(
            Single(CountingEcho { calls: calls.clone() }),
            RuntimeConfig::default(),
            Diagnostics::default(),
        );
        store.run().await.unwrap();
        store.reset_state();
        assert_eq!(store.current_value(), None);
    }

    struct CountingMutation {
        calls: Arc<AtomicUsize>,
    }

    impl OperationCore for CountingMutation {
        fn path(&self) -> Path {
            Path::from(["mutate"])
        }
    }

    #[async_trait]
    impl crate::operation::MutationOperation for CountingMutation {
        type Arguments = i32;
        type Value = i32;
        type Failure = String;

        async fn mutate(
            &self,
            arguments: i32,
            _ctx: Context,
            _cont: crate::continuation::Continuation<i32, String>,
        ) -> Result<i32, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(arguments * 2)
        }
    }

    #[tokio::test]
    async fn submit_records_history_and_updates_current() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = MutationStore::new(
            crate::operation::Mutation(CountingMutation { calls }),
            RuntimeConfig::default(),
            Diagnostics::default(),
        );
        assert_eq!(store.submit(3).await.unwrap(), 6);
        assert_eq!(store.submit(5).await.unwrap(), 10);

        let history = store.history();
        assert_eq!(history.len(), 2);
        assert_eq!(store.snapshot().current, Some(10));
    }
}
