//! [`PaginatedState`]: state for operations that fetch pages of a list.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::context::keys::ResultUpdateReason;
use crate::error::RuntimeError;
use crate::task::Task;

use super::{OperationState, StateSnapshot};

/// Which sub-fetch produced a [`PaginatedOperationValue`], carrying the
/// pages it fetched.
#[derive(Debug, Clone)]
pub enum PaginatedOperationValue<PV> {
    /// Loaded or replaced the first page(s).
    Initial(Vec<PV>),
    /// Fetched the page after the prior last page.
    Next(Vec<PV>),
    /// Fetched the page before the prior first page.
    Previous(Vec<PV>),
    /// Refetched every page from the start.
    All(Vec<PV>),
}

impl<PV> PaginatedOperationValue<PV> {
    /// The pages this value carries, regardless of which sub-fetch
    /// produced them.
    pub fn pages(&self) -> &[PV] {
        match self {
            Self::Initial(p) | Self::Next(p) | Self::Previous(p) | Self::All(p) => p,
        }
    }
}

/// One page in a `PaginatedState`'s sequence, tagged with the id the
/// operation's `next_id`/`prev_id` callbacks use to identify it.
#[derive(Debug, Clone)]
pub struct IdentifiedPage<PID, PV> {
    /// The page's identity, as returned by the operation's `initial_page_id`
    /// or computed via `next_id`/`prev_id`.
    pub id: PID,
    /// The page's payload.
    pub value: PV,
}

struct Inner<PID, PV, E> {
    pages: Vec<IdentifiedPage<PID, PV>>,
    initial_page_id: PID,
    next_page_id: Option<PID>,
    previous_page_id: Option<PID>,
    value_update_count: u64,
    value_last_updated_at: Option<DateTime<Utc>>,
    error: Option<E>,
    error_update_count: u64,
    error_last_updated_at: Option<DateTime<Utc>>,
}

type PaginatedTask<PID, PV, E> = Task<PaginatedOperationValue<PV>, RuntimeError<E>>;

/// State for a [`PaginatedOperation`](crate::operation::PaginatedOperation).
///
/// Tracks the current page sequence plus `next_page_id`/`previous_page_id`,
/// and segregates active tasks into four buckets (`initial`, `next`,
/// `previous`, `all`) because the [paginated engine](crate::store::paginated_engine)
/// enforces different concurrency rules per bucket.
pub struct PaginatedState<PID, PV, E>
where
    PID: Clone + Eq + Send + Sync + 'static,
    PV: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    inner: Mutex<Inner<PID, PV, E>>,
    initial_tasks: Mutex<BTreeMap<u64, PaginatedTask<PID, PV, E>>>,
    next_tasks: Mutex<BTreeMap<u64, PaginatedTask<PID, PV, E>>>,
    previous_tasks: Mutex<BTreeMap<u64, PaginatedTask<PID, PV, E>>>,
    all_tasks: Mutex<BTreeMap<u64, PaginatedTask<PID, PV, E>>>,
}

/// Which active-task bucket a paginated task belongs to, mirroring
/// `context.paginated.fetch_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchBucket {
    /// Loads or replaces the first page.
    Initial,
    /// Fetches the page after `next_page_id`.
    Next,
    /// Fetches the page before `previous_page_id`.
    Previous,
    /// Refetches every page from the start.
    All,
}

impl<PID, PV, E> PaginatedState<PID, PV, E>
where
    PID: Clone + Eq + Send + Sync + 'static,
    PV: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// A fresh, empty state rooted at `initial_page_id`.
    pub fn new(initial_page_id: PID) -> Self {
        Self {
            inner: Mutex::new(Inner {
                pages: Vec::new(),
                initial_page_id,
                next_page_id: None,
                previous_page_id: None,
                value_update_count: 0,
                value_last_updated_at: None,
                error: None,
                error_update_count: 0,
                error_last_updated_at: None,
            }),
            initial_tasks: Mutex::new(BTreeMap::new()),
            next_tasks: Mutex::new(BTreeMap::new()),
            previous_tasks: Mutex::new(BTreeMap::new()),
            all_tasks: Mutex::new(BTreeMap::new()),
        }
    }

    /// The page id an `initial` fetch should start from.
    pub fn initial_page_id(&self) -> PID {
        self.inner.lock().initial_page_id.clone()
    }

    /// The id of the page after the current sequence's last page, if any
    /// more pages are known to exist.
    pub fn next_page_id(&self) -> Option<PID> {
        self.inner.lock().next_page_id.clone()
    }

    /// The id of the page before the current sequence's first page.
    pub fn previous_page_id(&self) -> Option<PID> {
        self.inner.lock().previous_page_id.clone()
    }

    /// `true` when `next_page_id` is known, i.e. more pages can be
    /// fetched forward.
    pub fn has_next_page(&self) -> bool {
        self.next_page_id().is_some()
    }

    /// The current page ids, in order — handy for assertions in tests.
    pub fn page_ids(&self) -> Vec<PID> {
        self.inner.lock().pages.iter().map(|p| p.id.clone()).collect()
    }

    /// Number of pages currently held.
    pub fn page_count(&self) -> usize {
        self.inner.lock().pages.len()
    }

    /// Applies an `initial` fetch. `incremental` mirrors whether the
    /// operation asked to update in place by id rather than replace the
    /// whole sequence.
    pub fn apply_initial(&self, pages: Vec<IdentifiedPage<PID, PV>>, incremental: bool) {
        let mut inner = self.inner.lock();
        if incremental {
            for page in pages {
                if let Some(existing) = inner.pages.iter_mut().find(|p| p.id == page.id) {
                    existing.value = page.value;
                } else {
                    inner.pages.push(page);
                }
            }
        } else {
            inner.pages = pages;
        }
    }

    /// Applies a `next` fetch: inserts `page` immediately after the page
    /// whose id is `anchor` (the prior last page). If `anchor` is not
    /// present — the sequence moved under us — the page is dropped rather
    /// than inserted at a guessed position.
    pub fn apply_next(&self, anchor: &PID, page: IdentifiedPage<PID, PV>) {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.pages.iter().position(|p| &p.id == anchor) {
            inner.pages.insert(idx + 1, page);
        }
    }

    /// Applies a `previous` fetch: inserts `page` immediately before the
    /// page whose id is `anchor` (the prior first page). Dropped if
    /// `anchor` is absent.
    pub fn apply_previous(&self, anchor: &PID, page: IdentifiedPage<PID, PV>) {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.pages.iter().position(|p| &p.id == anchor) {
            inner.pages.insert(idx, page);
        }
    }

    /// Applies an `all` fetch: replaces the entire sequence.
    pub fn apply_all(&self, pages: Vec<IdentifiedPage<PID, PV>>) {
        self.inner.lock().pages = pages;
    }

    /// Updates `next_page_id`/`previous_page_id` after a fetch, and bumps
    /// the shared value counters/timestamp. Errors go through
    /// [`PaginatedState::record_error`] instead.
    pub fn record_value_update(
        &self,
        next_page_id: Option<PID>,
        previous_page_id: Option<PID>,
        _reason: ResultUpdateReason,
        now: DateTime<Utc>,
    ) {
        let mut inner = self.inner.lock();
        inner.next_page_id = next_page_id;
        inner.previous_page_id = previous_page_id;
        inner.value_update_count += 1;
        inner.value_last_updated_at = Some(now);
        inner.error = None;
    }

    /// Records a failed fetch without touching the page sequence.
    pub fn record_error(&self, error: E, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.error = Some(error);
        inner.error_update_count += 1;
        inner.error_last_updated_at = Some(now);
    }

    fn bucket(&self, which: FetchBucket) -> &Mutex<BTreeMap<u64, PaginatedTask<PID, PV, E>>> {
        match which {
            FetchBucket::Initial => &self.initial_tasks,
            FetchBucket::Next => &self.next_tasks,
            FetchBucket::Previous => &self.previous_tasks,
            FetchBucket::All => &self.all_tasks,
        }
    }

    /// Registers `task` as active in `which`'s bucket.
    pub fn schedule_fetch_task(&self, which: FetchBucket, task: PaginatedTask<PID, PV, E>) {
        self.bucket(which).lock().insert(task.id(), task);
    }

    /// Removes `task_id` from `which`'s bucket.
    pub fn finish_fetch_task(&self, which: FetchBucket, task_id: u64) {
        self.bucket(which).lock().remove(&task_id);
    }

    /// Every active task across every bucket, for waiting on "whatever is
    /// currently running" per the paginated engine's ordering rules.
    pub fn active_tasks_in(&self, which: FetchBucket) -> Vec<PaginatedTask<PID, PV, E>> {
        self.bucket(which).lock().values().cloned().collect()
    }

    /// `true` if `which`'s bucket has at least one active task.
    pub fn is_bucket_active(&self, which: FetchBucket) -> bool {
        !self.bucket(which).lock().is_empty()
    }

    /// Resets to an empty sequence, rooted back at the original
    /// `initial_page_id`, clearing every bucket. Tasks are cancelled by
    /// the `Store` before this is called.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.pages.clear();
        inner.next_page_id = None;
        inner.previous_page_id = None;
        inner.value_update_count = 0;
        inner.value_last_updated_at = None;
        inner.error = None;
        inner.error_update_count = 0;
        inner.error_last_updated_at = None;
        self.initial_tasks.lock().clear();
        self.next_tasks.lock().clear();
        self.previous_tasks.lock().clear();
        self.all_tasks.lock().clear();
    }
}

/// Snapshot of a `PaginatedState`'s page sequence, used as `Current` in
/// the shared [`OperationState`] trait.
#[derive(Debug, Clone)]
pub struct PageSequence<PID, PV> {
    /// Pages in order, with their ids.
    pub pages: Vec<IdentifiedPage<PID, PV>>,
    /// The page after the last one, if known.
    pub next_page_id: Option<PID>,
    /// The page before the first one, if known.
    pub previous_page_id: Option<PID>,
}

impl<PID, PV, E> OperationState for PaginatedState<PID, PV, E>
where
    PID: Clone + Eq + Send + Sync + 'static,
    PV: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    type Current = PageSequence<PID, PV>;
    type Failure = E;

    fn snapshot(&self) -> StateSnapshot<Self::Current, Self::Failure> {
        let inner = self.inner.lock();
        let current = PageSequence {
            pages: inner.pages.clone(),
            next_page_id: inner.next_page_id.clone(),
            previous_page_id: inner.previous_page_id.clone(),
        };
        StateSnapshot {
            current: current.clone(),
            initial: PageSequence {
                pages: Vec::new(),
                next_page_id: None,
                previous_page_id: None,
            },
            value_update_count: inner.value_update_count,
            value_last_updated_at: inner.value_last_updated_at,
            error: inner.error.clone(),
            error_update_count: inner.error_update_count,
            error_last_updated_at: inner.error_last_updated_at,
            is_loading: self.is_loading(),
        }
    }

    fn is_loading(&self) -> bool {
        [FetchBucket::Initial, FetchBucket::Next, FetchBucket::Previous, FetchBucket::All]
            .iter()
            .any(|b| self.is_bucket_active(*b))
    }

    fn active_task_count(&self) -> usize {
        self.initial_tasks.lock().len()
            + self.next_tasks.lock().len()
            + self.previous_tasks.lock().len()
            + self.all_tasks.lock().len()
    }
}
