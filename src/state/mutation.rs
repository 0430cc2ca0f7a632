//! [`MutationState`]: state for side-effecting write operations, with a
//! bounded history of recent attempts.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::context::keys::ResultUpdateReason;
use crate::error::RuntimeError;
use crate::task::Task;

use super::{OperationState, StateSnapshot};

/// How one historical mutation attempt ended.
#[derive(Debug, Clone)]
pub enum MutationStatus<V, E> {
    /// Still running; no terminal result yet.
    Pending,
    /// Completed successfully.
    Succeeded(V),
    /// Completed with a failure.
    Failed(E),
}

/// One entry in a `MutationState`'s bounded history.
#[derive(Debug, Clone)]
pub struct MutationAttempt<Args, V, E> {
    /// The arguments this attempt was submitted with.
    pub arguments: Args,
    /// How the attempt ended (or `Pending` if still in flight).
    pub status: MutationStatus<V, E>,
    /// When the attempt was submitted.
    pub started_at: DateTime<Utc>,
    /// When the attempt reached a terminal status, if it has.
    pub ended_at: Option<DateTime<Utc>>,
}

struct Inner<Args, V, E> {
    current: Option<V>,
    initial: Option<V>,
    value_update_count: u64,
    value_last_updated_at: Option<DateTime<Utc>>,
    error: Option<E>,
    error_update_count: u64,
    error_last_updated_at: Option<DateTime<Utc>>,
    history: VecDeque<MutationAttempt<Args, V, E>>,
    max_history: usize,
}

/// State for a [`MutationOperation`](crate::operation::MutationOperation).
///
/// Carries the same `current`/`error` shape as [`super::single::SingleState`]
/// (the most recent mutation's outcome) plus a history of the last
/// `max_history` attempts, oldest evicted first.
pub struct MutationState<Args, V, E>
where
    Args: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    inner: Mutex<Inner<Args, V, E>>,
    active_tasks: Mutex<BTreeMap<u64, Task<V, RuntimeError<E>>>>,
}

impl<Args, V, E> MutationState<Args, V, E>
where
    Args: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// A fresh state with an empty history bounded to `max_history`
    /// entries.
    pub fn new(max_history: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: None,
                initial: None,
                value_update_count: 0,
                value_last_updated_at: None,
                error: None,
                error_update_count: 0,
                error_last_updated_at: None,
                history: VecDeque::new(),
                max_history,
            }),
            active_tasks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Begins tracking a new attempt, returning its index in the history
    /// deque's eventual final ordering (callers key subsequent
    /// `complete_attempt` calls off identity, not index, since earlier
    /// entries may be evicted in the meantime — see
    /// [`MutationState::complete_latest_pending`]).
    pub fn begin_attempt(&self, arguments: Args, started_at: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.history.push_back(MutationAttempt {
            arguments,
            status: MutationStatus::Pending,
            started_at,
            ended_at: None,
        });
        let max_history = inner.max_history;
        while inner.history.len() > max_history {
            inner.history.pop_front();
        }
    }

    /// Completes the oldest still-pending attempt — correct as long as
    /// mutations are driven one at a time per the `Store`'s task
    /// scheduling, matching FIFO submission order.
    pub fn complete_latest_pending(&self, result: Result<V, E>, _reason: ResultUpdateReason, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner
            .history
            .iter_mut()
            .find(|e| matches!(e.status, MutationStatus::Pending))
        {
            entry.ended_at = Some(now);
            entry.status = match &result {
                Ok(v) => MutationStatus::Succeeded(v.clone()),
                Err(e) => MutationStatus::Failed(e.clone()),
            };
        }
        match result {
            Ok(value) => {
                inner.current = Some(value);
                inner.value_update_count += 1;
                inner.value_last_updated_at = Some(now);
                inner.error = None;
            }
            Err(error) => {
                inner.error = Some(error);
                inner.error_update_count += 1;
                inner.error_last_updated_at = Some(now);
            }
        }
    }

    /// Applies a yielded (non-terminal) result to the shared
    /// current/error track without touching history or completing the
    /// pending attempt — mirrors
    /// [`SingleState::update`](super::single::SingleState::update)'s
    /// success-clears-error / failure-preserves-current rule.
    pub fn record_yield(&self, result: Result<V, E>, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        match result {
            Ok(value) => {
                inner.current = Some(value);
                inner.value_update_count += 1;
                inner.value_last_updated_at = Some(now);
                inner.error = None;
            }
            Err(error) => {
                inner.error = Some(error);
                inner.error_update_count += 1;
                inner.error_last_updated_at = Some(now);
            }
        }
    }

    /// A snapshot of the bounded history, oldest first.
    pub fn history(&self) -> Vec<MutationAttempt<Args, V, E>> {
        self.inner.lock().history.iter().cloned().collect()
    }

    /// Registers `task` as active.
    pub fn schedule_fetch_task(&self, task: Task<V, RuntimeError<E>>) {
        self.active_tasks.lock().insert(task.id(), task);
    }

    /// Removes `task_id` from the active set.
    pub fn finish_fetch_task(&self, task_id: u64) {
        self.active_tasks.lock().remove(&task_id);
    }

    /// Resets to an empty state: no current value, no error, no history,
    /// no active tasks. Tasks are cancelled by the `Store` beforehand.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.current = inner.initial.clone();
        inner.value_update_count = 0;
        inner.value_last_updated_at = None;
        inner.error = None;
        inner.error_update_count = 0;
        inner.error_last_updated_at = None;
        inner.history.clear();
        self.active_tasks.lock().clear();
    }
}

impl<Args, V, E> OperationState for MutationState<Args, V, E>
where
    Args: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    type Current = Option<V>;
    type Failure = E;

    fn snapshot(&self) -> StateSnapshot<Self::Current, Self::Failure> {
        let inner = self.inner.lock();
        StateSnapshot {
            current: inner.current.clone(),
            initial: inner.initial.clone(),
            value_update_count: inner.value_update_count,
            value_last_updated_at: inner.value_last_updated_at,
            error: inner.error.clone(),
            error_update_count: inner.error_update_count,
            error_last_updated_at: inner.error_last_updated_at,
            is_loading: !self.active_tasks.lock().is_empty(),
        }
    }

    fn is_loading(&self) -> bool {
        !self.active_tasks.lock().is_empty()
    }

    fn active_task_count(&self) -> usize {
        self.active_tasks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_bounded_and_keeps_the_most_recent() {
        let state: MutationState<char, i32, String> = MutationState::new(3);
        for (args, value) in [('a', 1), ('b', 2), ('c', 3), ('d', 4)] {
            state.begin_attempt(args, Utc::now());
            state.complete_latest_pending(Ok(value), ResultUpdateReason::FinalReturned, Utc::now());
        }
        let history = state.history();
        assert_eq!(history.len(), 3);
        let args: Vec<char> = history.iter().map(|h| h.arguments).collect();
        assert_eq!(args, vec!['b', 'c', 'd']);
        for entry in &history {
            assert!(matches!(entry.status, MutationStatus::Succeeded(_)));
            assert!(entry.ended_at.is_some());
        }
    }

    #[test]
    fn timestamps_are_monotonic_across_attempts() {
        let state: MutationState<u32, u32, String> = MutationState::new(10);
        let mut last_started = None;
        for args in 0..5u32 {
            let now = Utc::now();
            state.begin_attempt(args, now);
            state.complete_latest_pending(Ok(args), ResultUpdateReason::FinalReturned, Utc::now());
            if let Some(prev) = last_started {
                assert!(now >= prev);
            }
            last_started = Some(now);
        }
    }
}
