//! [`PaginatedStore`]: drives a [`PaginatedOperation`](crate::operation::PaginatedOperation)
//! through its four sub-fetches (`initial`, `next`, `previous`, `all`),
//! enforcing the concurrency rule the other three `Store` paradigms don't
//! need: `next` and `previous` may run concurrently with each other, but
//! both must wait for an active `initial`/`all`, and `initial`/`all` are
//! mutually exclusive with everything else.
//!
//! Modeled as a reader/writer gate over a `tokio::sync::RwLock<()>`:
//! `next`/`previous` take the shared (read) side, `initial`/`all` take the
//! exclusive (write) side. The lock guards no data of its own — state still
//! lives in [`PaginatedState`] — it purely orders access.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::RwLock;

use crate::client::ErasedStore;
use crate::clock::TaskIdAllocator;
use crate::config::RuntimeConfig;
use crate::context::{keys, Context};
use crate::controller::{Controller, Controls};
use crate::diagnostics::Diagnostics;
use crate::error::{OperationFailure, RuntimeError};
use crate::operation::{PageCursor, Paging, Runnable};
use crate::path::Path;
use crate::run_spec::RunSpecification;
use crate::state::paginated::{
    FetchBucket, IdentifiedPage, PageSequence, PaginatedOperationValue, PaginatedState,
};
use crate::state::{OperationState, StateSnapshot};
use crate::subscription::{Subscription, SubscriberList};
use crate::task::{Task, TaskConfig, TaskInfo, Work};

/// A paginated store's subscriber callback.
pub type PaginatedListener<PID, PV, E> = Box<dyn Fn(&StateSnapshot<PageSequence<PID, PV>, E>) + Send + Sync>;

fn notify<PID, PV, E>(
    listeners: &SubscriberList<PaginatedListener<PID, PV, E>>,
    snapshot: &StateSnapshot<PageSequence<PID, PV>, E>,
) where
    PID: Clone + Send + Sync + 'static,
    PV: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    for listener in listeners.snapshot() {
        listener(snapshot);
    }
}

/// The bound every [`PaginatedStore`] operation satisfies: page-id logic
/// reachable through [`PageCursor`] independent of whatever modifier chain
/// wraps the `fetch_page` call `Runnable::execute` ultimately makes.
pub trait PaginatedInner: PageCursor + Runnable<Input = Paging<<Self as PageCursor>::PageId>> + 'static {}

impl<T> PaginatedInner for T where T: PageCursor + Runnable<Input = Paging<<T as PageCursor>::PageId>> + 'static {}

struct Shared<Inner: PaginatedInner> {
    inner: Arc<Inner>,
    path: Path,
    base_ctx: Context,
    state: PaginatedState<Inner::PageId, Inner::Value, Inner::Failure>,
    listeners: Arc<SubscriberList<PaginatedListener<Inner::PageId, Inner::Value, Inner::Failure>>>,
    controller_subs: Mutex<Vec<Subscription>>,
    task_ids: TaskIdAllocator,
    diagnostics: Diagnostics,
    /// Readers = `next`/`previous`; writers = `initial`/`all`.
    gate: RwLock<()>,
}

/// Drives a paginated operation's `initial`/`next`/`previous`/`all`
/// sub-fetches, owning a [`PaginatedState`] and fanning page-sequence
/// changes out to subscribers.
///
/// Cloning is cheap (`Arc`-backed) and shares the same underlying state and
/// gate, matching [`Store`](crate::store::Store)'s sharing semantics.
pub struct PaginatedStore<Inner: PaginatedInner> {
    shared: Arc<Shared<Inner>>,
}

impl<Inner: PaginatedInner> Clone for PaginatedStore<Inner> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<Inner: PaginatedInner> PaginatedStore<Inner> {
    /// Builds a store for `inner`, running its (and every enclosing
    /// modifier's) `setup` once to seed the base context, then installs
    /// any `controller(...)`-supplied [`Controller`]s the setup pass
    /// collected.
    pub fn new(inner: Inner, config: RuntimeConfig, diagnostics: Diagnostics) -> Self {
        let path = inner.path();
        let mut ctx = Context::new();
        ctx.set(&keys::CONFIG, config.clone());
        ctx.set(&keys::DIAGNOSTICS, diagnostics.clone());
        inner.setup(&mut ctx);

        let initial_page_id = inner.initial_page_id();

        let shared = Arc::new(Shared {
            inner: Arc::new(inner),
            path,
            base_ctx: ctx.clone(),
            state: PaginatedState::new(initial_page_id),
            listeners: Arc::new(SubscriberList::new()),
            controller_subs: Mutex::new(Vec::new()),
            task_ids: TaskIdAllocator::new(),
            diagnostics,
            gate: RwLock::new(()),
        });

        let controllers = ctx.get(&keys::CONTROLLERS).into_vec();
        if !controllers.is_empty() {
            let mut subs = Vec::with_capacity(controllers.len());
            for controller in controllers {
                let controls: Box<dyn Controls> = Box::new(PaginatedStoreControls {
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

    /// A snapshot of the current page sequence.
    pub fn snapshot(&self) -> StateSnapshot<PageSequence<Inner::PageId, Inner::Value>, Inner::Failure> {
        self.shared.state.snapshot()
    }

    /// `true` if `next_page_id` is known, i.e. [`PaginatedStore::fetch_next`]
    /// has somewhere to go.
    pub fn has_next_page(&self) -> bool {
        self.shared.state.has_next_page()
    }

    fn is_stale(&self) -> bool {
        self.shared
            .base_ctx
            .get(&keys::STALE_PREDICATE)
            .0
            .is_satisfied(&self.shared.base_ctx)
    }

    fn is_automatic_running_enabled(&self) -> bool {
        self.shared
            .base_ctx
            .get(&keys::AUTO_RUN_PREDICATE)
            .0
            .is_satisfied(&self.shared.base_ctx)
    }

    /// Registers `listener`, and if automatic running is enabled and the
    /// current state is stale, kicks off an `initial` fetch in the
    /// background.
    pub fn subscribe(
        &self,
        listener: PaginatedListener<Inner::PageId, Inner::Value, Inner::Failure>,
    ) -> Subscription {
        let sub = self.shared.listeners.subscribe(listener);
        if self.is_automatic_running_enabled() && self.is_stale() {
            let store = self.clone();
            tokio::spawn(async move {
                let _ = store.fetch_initial().await;
            });
        }
        sub
    }

    /// Loads or replaces the first page, waiting for any active
    /// `initial`/`all` fetch rather than reusing it (an `initial` fetch is
    /// always a deliberate reload).
    pub async fn fetch_initial(&self) -> Result<(), RuntimeError<Inner::Failure>> {
        let target = self.shared.inner.initial_page_id();
        self.run_exclusive(FetchBucket::Initial, target).await
    }

    /// Fetches the page after the current sequence's last page. A no-op if
    /// `next_page_id` is unknown.
    pub async fn fetch_next(&self) -> Result<(), RuntimeError<Inner::Failure>> {
        let Some(target) = self.shared.state.next_page_id() else {
            return Ok(());
        };
        self.run_shared(FetchBucket::Next, target).await
    }

    /// Fetches the page before the current sequence's first page. A no-op
    /// if `previous_page_id` is unknown.
    pub async fn fetch_previous(&self) -> Result<(), RuntimeError<Inner::Failure>> {
        let Some(target) = self.shared.state.previous_page_id() else {
            return Ok(());
        };
        self.run_shared(FetchBucket::Previous, target).await
    }

    /// Refetches every page from the start, stopping once `next_id`
    /// returns `None` or the refetched count reaches the prior sequence's
    /// page count (whichever comes first) — a refetch never grows the
    /// sequence past what was previously loaded.
    pub async fn fetch_all(&self) -> Result<(), RuntimeError<Inner::Failure>> {
        let target = self.shared.inner.initial_page_id();
        self.run_exclusive(FetchBucket::All, target).await
    }

    /// Cancels every active fetch across every bucket, then resets state
    /// back to its initial, empty sequence.
    pub fn reset_state(&self) {
        for bucket in [FetchBucket::Initial, FetchBucket::Next, FetchBucket::Previous, FetchBucket::All] {
            for task in self.shared.state.active_tasks_in(bucket) {
                task.cancel();
            }
        }
        self.shared.state.reset();
        let snapshot = self.shared.state.snapshot();
        notify(&self.shared.listeners, &snapshot);
    }

    /// `next`/`previous`: reuses an in-flight task in the same bucket if
    /// one exists, otherwise starts a new one holding the gate's shared
    /// (read) side for its duration.
    async fn run_shared(&self, bucket: FetchBucket, target: Inner::PageId) -> Result<(), RuntimeError<Inner::Failure>> {
        if let Some(task) = self.shared.state.active_tasks_in(bucket).into_iter().next() {
            return Self::flatten(task.run_if_needed().await).map(|_| ());
        }
        let anchor = match bucket {
            FetchBucket::Next => self.shared.state.page_ids().last().cloned(),
            FetchBucket::Previous => self.shared.state.page_ids().first().cloned(),
            _ => None,
        };
        self.spawn_fetch(bucket, target, anchor, false).await
    }

    /// `initial`/`all`: reuses an in-flight task in the same bucket if one
    /// exists, otherwise starts a new one holding the gate's exclusive
    /// (write) side for its duration.
    async fn run_exclusive(&self, bucket: FetchBucket, target: Inner::PageId) -> Result<(), RuntimeError<Inner::Failure>> {
        if let Some(task) = self.shared.state.active_tasks_in(bucket).into_iter().next() {
            return Self::flatten(task.run_if_needed().await).map(|_| ());
        }
        self.spawn_fetch(bucket, target, None, true).await
    }

    async fn spawn_fetch(
        &self,
        bucket: FetchBucket,
        target: Inner::PageId,
        anchor: Option<Inner::PageId>,
        exclusive: bool,
    ) -> Result<(), RuntimeError<Inner::Failure>> {
        let id = self.shared.task_ids.next();
        let mut ctx = self.shared.base_ctx.child();
        ctx.set(&keys::CURRENT_TASK_INFO, Some(TaskInfo { id, name: None }));
        ctx.set(&keys::CURRENT_STORE, Some(Arc::new(self.clone()) as Arc<dyn ErasedStore>));
        let fetch_type = match bucket {
            FetchBucket::Initial => keys::PaginatedFetchType::Initial,
            FetchBucket::Next => keys::PaginatedFetchType::Next,
            FetchBucket::Previous => keys::PaginatedFetchType::Previous,
            FetchBucket::All => keys::PaginatedFetchType::All,
        };
        ctx.set(&keys::PAGINATED_FETCH_TYPE, Some(fetch_type));

        let inner_op = Arc::clone(&self.shared.inner);
        let shared_for_work = Arc::clone(&self.shared);
        let prior_page_count = self.shared.state.page_count();
        let target_for_work = target.clone();

        // `PaginatedOperationValue<PV>` carries raw page payloads, not
        // `IdentifiedPage`s — the ids the fetch actually visited are
        // recorded here as they're discovered (trivial for
        // initial/next/previous; a chain for `all`) and zipped back onto
        // the pages once the task completes, in `apply_result`.
        let fetched_ids: Arc<Mutex<Vec<Inner::PageId>>> = Arc::new(Mutex::new(Vec::new()));
        let fetched_ids_for_work = Arc::clone(&fetched_ids);

        let work: Work<PaginatedOperationValue<Inner::Value>, RuntimeError<Inner::Failure>> =
            Box::new(move |cfg: TaskConfig| {
                Box::pin(async move {
                    let _guard = if exclusive {
                        Guard::Write(shared_for_work.gate.write().await)
                    } else {
                        Guard::Read(shared_for_work.gate.read().await)
                    };

                    match bucket {
                        FetchBucket::All => {
                            fetch_all(&inner_op, &cfg.context, prior_page_count.max(1), &fetched_ids_for_work).await
                        }
                        _ => {
                            let (cont, _rx) = crate::continuation::channel();
                            let paging = Paging {
                                target_id: target_for_work.clone(),
                                fetch_type,
                            };
                            let page = inner_op.execute(paging, cfg.context, cont).await?;
                            fetched_ids_for_work.lock().push(target_for_work.clone());
                            Ok(match bucket {
                                FetchBucket::Initial => PaginatedOperationValue::Initial(vec![page]),
                                FetchBucket::Next => PaginatedOperationValue::Next(vec![page]),
                                FetchBucket::Previous => PaginatedOperationValue::Previous(vec![page]),
                                FetchBucket::All => unreachable!("handled above"),
                            })
                        }
                    }
                })
            });

        let task = Task::new(
            id,
            TaskConfig {
                name: None,
                priority: None,
                context: ctx,
            },
            self.shared.diagnostics.clone(),
            work,
        );
        self.shared.state.schedule_fetch_task(bucket, task.clone());

        let result = Self::flatten(task.run_if_needed().await);
        self.shared.state.finish_fetch_task(bucket, task.id());
        let ids = fetched_ids.lock().clone();
        self.apply_result(bucket, anchor, ids, result)
    }

    fn apply_result(
        &self,
        bucket: FetchBucket,
        anchor: Option<Inner::PageId>,
        ids: Vec<Inner::PageId>,
        result: Result<PaginatedOperationValue<Inner::Value>, RuntimeError<Inner::Failure>>,
    ) -> Result<(), RuntimeError<Inner::Failure>> {
        let now = self.shared.base_ctx.get(&keys::CLOCK).now();
        match &result {
            Ok(value) => {
                let identified: Vec<IdentifiedPage<Inner::PageId, Inner::Value>> = ids
                    .iter()
                    .cloned()
                    .zip(value.pages().iter().cloned())
                    .map(|(id, value)| IdentifiedPage { id, value })
                    .collect();
                match bucket {
                    FetchBucket::Initial => {
                        self.shared.state.apply_initial(identified.clone(), false);
                    }
                    FetchBucket::Next => {
                        if let (Some(anchor), Some(page)) = (&anchor, identified.first()) {
                            self.shared.state.apply_next(anchor, page.clone());
                        }
                    }
                    FetchBucket::Previous => {
                        if let (Some(anchor), Some(page)) = (&anchor, identified.first()) {
                            self.shared.state.apply_previous(anchor, page.clone());
                        }
                    }
                    FetchBucket::All => {
                        self.shared.state.apply_all(identified.clone());
                    }
                }
                // `next`/`previous` only move the boundary they fetched
                // towards; the far boundary is untouched by that fetch, so
                // it's read back from the still-prior state rather than
                // recomputed from a page that isn't actually this
                // sequence's new edge.
                let next_page_id = match bucket {
                    FetchBucket::Initial | FetchBucket::All => value
                        .pages()
                        .last()
                        .and_then(|page| self.shared.inner.next_id(page, &self.shared.base_ctx)),
                    FetchBucket::Next => value
                        .pages()
                        .last()
                        .and_then(|page| self.shared.inner.next_id(page, &self.shared.base_ctx)),
                    FetchBucket::Previous => self.shared.state.next_page_id(),
                };
                let previous_page_id = match bucket {
                    FetchBucket::Initial | FetchBucket::All => value
                        .pages()
                        .first()
                        .and_then(|page| self.shared.inner.previous_id(page, &self.shared.base_ctx)),
                    FetchBucket::Previous => value
                        .pages()
                        .first()
                        .and_then(|page| self.shared.inner.previous_id(page, &self.shared.base_ctx)),
                    FetchBucket::Next => self.shared.state.previous_page_id(),
                };
                self.shared
                    .state
                    .record_value_update(next_page_id, previous_page_id, keys::ResultUpdateReason::FinalReturned, now);
            }
            Err(e) => {
                if let Some(failure) = e.operation_failure() {
                    self.shared.state.record_error(failure.clone(), now);
                }
            }
        }
        let snapshot = self.shared.state.snapshot();
        notify(&self.shared.listeners, &snapshot);
        result.map(|_| ())
    }

    /// Collapses the double-wrapped [`RuntimeError`] `run_if_needed`
    /// produces back into one layer, matching [`Store::flatten`](crate::store::Store).
    fn flatten(
        result: Result<PaginatedOperationValue<Inner::Value>, RuntimeError<RuntimeError<Inner::Failure>>>,
    ) -> Result<PaginatedOperationValue<Inner::Value>, RuntimeError<Inner::Failure>> {
        match result {
            Ok(value) => Ok(value),
            Err(RuntimeError::Operation(OperationFailure(inner))) => Err(inner),
            Err(RuntimeError::Cancelled) => Err(RuntimeError::Cancelled),
            Err(RuntimeError::ClientUnavailable) => Err(RuntimeError::ClientUnavailable),
        }
    }
}

/// Refetches pages in order from the operation's `initial_page_id`,
/// advancing via `next_id`, stopping once `next_id` returns `None` or
/// `stop_after` pages have been collected. Each page's id is pushed to
/// `ids_out` as it's visited, so the caller can re-pair ids with pages
/// once this returns (see the comment on `fetched_ids` in `spawn_fetch`).
async fn fetch_all<Inner: PaginatedInner>(
    inner: &Inner,
    ctx: &Context,
    stop_after: usize,
    ids_out: &Mutex<Vec<Inner::PageId>>,
) -> Result<PaginatedOperationValue<Inner::Value>, RuntimeError<Inner::Failure>> {
    let mut pages = Vec::new();
    let mut current_id = inner.initial_page_id();
    loop {
        let (cont, _rx) = crate::continuation::channel();
        let paging = Paging {
            target_id: current_id.clone(),
            fetch_type: keys::PaginatedFetchType::All,
        };
        let page = inner.execute(paging, ctx.clone(), cont).await?;
        let next = inner.next_id(&page, ctx);
        ids_out.lock().push(current_id.clone());
        pages.push(page);
        if pages.len() >= stop_after {
            break;
        }
        match next {
            Some(id) => current_id = id,
            None => break,
        }
    }
    Ok(PaginatedOperationValue::All(pages))
}

enum Guard<'a> {
    Read(tokio::sync::RwLockReadGuard<'a, ()>),
    Write(tokio::sync::RwLockWriteGuard<'a, ()>),
}

impl<Inner: PaginatedInner> ErasedStore for PaginatedStore<Inner> {
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

struct PaginatedStoreControls<Inner: PaginatedInner> {
    shared: Weak<Shared<Inner>>,
}

impl<Inner: PaginatedInner> Controls for PaginatedStoreControls<Inner> {
    fn refetch(&self) {
        if let Some(shared) = self.shared.upgrade() {
            let store = PaginatedStore { shared };
            tokio::spawn(async move {
                let _ = store.fetch_initial().await;
            });
        }
    }

    fn reset(&self) {
        if let Some(shared) = self.shared.upgrade() {
            PaginatedStore { shared }.reset_state();
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
    use crate::operation::{OperationCore, PaginatedOperation, Paginated};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Listing {
        calls: Arc<AtomicUsize>,
    }

    impl OperationCore for Listing {
        fn path(&self) -> Path {
            Path::from(["items"])
        }
    }

    #[async_trait]
    impl PaginatedOperation for Listing {
        type PageId = u64;
        type PageValue = String;
        type Failure = String;

        fn initial_page_id(&self) -> u64 {
            0
        }

        fn next_id(&self, last_page: &String, _ctx: &Context) -> Option<u64> {
            if last_page == "page-2" {
                None
            } else {
                last_page.rsplit('-').next().and_then(|n| n.parse::<u64>().ok()).map(|n| n + 1).or(Some(1))
            }
        }

        async fn fetch_page(
            &self,
            paging: Paging<u64>,
            _ctx: Context,
            _cont: crate::continuation::Continuation<String, String>,
        ) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("page-{}", paging.target_id))
        }
    }

    #[tokio::test]
    async fn initial_then_next_builds_a_two_page_sequence() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = PaginatedStore::new(
            Paginated(Listing { calls: calls.clone() }),
            RuntimeConfig::default(),
            Diagnostics::default(),
        );
        store.fetch_initial().await.unwrap();
        assert!(store.has_next_page());
        store.fetch_next().await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.current.pages.len(), 2);
        assert_eq!(snapshot.current.pages[0].id, 0);
        assert_eq!(snapshot.current.pages[1].id, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_all_stops_at_prior_page_count() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = PaginatedStore::new(
            Paginated(Listing { calls: calls.clone() }),
            RuntimeConfig::default(),
            Diagnostics::default(),
        );
        store.fetch_initial().await.unwrap();
        store.fetch_next().await.unwrap();
        assert_eq!(store.snapshot().current.pages.len(), 2);

        store.fetch_all().await.unwrap();
        assert_eq!(store.snapshot().current.pages.len(), 2);
    }

    #[tokio::test]
    async fn reset_state_clears_the_sequence() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = PaginatedStore::new(
            Paginated(Listing { calls }),
            RuntimeConfig::default(),
            Diagnostics::default(),
        );
        store.fetch_initial().await.unwrap();
        store.reset_state();
        assert_eq!(store.snapshot().current.pages.len(), 0);
    }
}
