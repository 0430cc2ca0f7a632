//! [`SingleState`]: state for operations that produce one value.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::context::keys::ResultUpdateReason;
use crate::error::RuntimeError;
use crate::task::Task;

use super::{OperationState, StateSnapshot};

struct Inner<V, E> {
    current: Option<V>,
    initial: Option<V>,
    value_update_count: u64,
    value_last_updated_at: Option<DateTime<Utc>>,
    error: Option<E>,
    error_update_count: u64,
    error_last_updated_at: Option<DateTime<Utc>>,
}

/// State for a [`SingleOperation`](crate::operation::SingleOperation):
/// one current value, one error track, one bucket of active tasks.
pub struct SingleState<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    inner: Mutex<Inner<V, E>>,
    active_tasks: Mutex<BTreeMap<u64, Task<V, RuntimeError<E>>>>,
}

impl<V, E> SingleState<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// A fresh state with `current = initial_value` (typically `None`,
    /// unless a `default_value` modifier supplied one).
    pub fn new(initial_value: Option<V>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: initial_value.clone(),
                initial: initial_value,
                value_update_count: 0,
                value_last_updated_at: None,
                error: None,
                error_update_count: 0,
                error_last_updated_at: None,
            }),
            active_tasks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Applies one result produced by an active task.
    ///
    /// A success overwrites `current` and clears `error` (a clean run
    /// should not leave a stale failure behind); a failure sets `error`
    /// but leaves `current` untouched, so the last good value stays
    /// readable alongside the new error. `reason` distinguishes a
    /// `Continuation` yield from the operation's terminal return for
    /// subscribers, but both update the same counters: every yield, like
    /// every terminal success, updates `current`.
    pub fn update(&self, result: Result<V, E>, _reason: ResultUpdateReason, now: DateTime<Utc>) {
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

    /// Registers `task` as active.
    pub fn schedule_fetch_task(&self, task: Task<V, RuntimeError<E>>) {
        self.active_tasks.lock().insert(task.id(), task);
    }

    /// Removes `task_id` from the active set; a no-op if it was already
    /// removed (e.g. by a concurrent `reset_state`).
    pub fn finish_fetch_task(&self, task_id: u64) {
        self.active_tasks.lock().remove(&task_id);
    }

    /// Every currently active task, ordered by task id.
    pub fn active_tasks(&self) -> Vec<Task<V, RuntimeError<E>>> {
        self.active_tasks.lock().values().cloned().collect()
    }

    /// Resets to the initial value, clearing counts, timestamps, error,
    /// and the active-task set. Does **not** cancel tasks itself — the
    /// `Store` cancels them first and then calls this.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.current = inner.initial.clone();
        inner.value_update_count = 0;
        inner.value_last_updated_at = None;
        inner.error = None;
        inner.error_update_count = 0;
        inner.error_last_updated_at = None;
        self.active_tasks.lock().clear();
    }

    /// Directly sets `current`, tagged as a final-returned update at
    /// `now`. Used by `Store::current_value`'s setter.
    pub fn set_current_value(&self, value: V, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.current = Some(value);
        inner.value_update_count += 1;
        inner.value_last_updated_at = Some(now);
    }
}

impl<V, E> OperationState for SingleState<V, E>
where
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
    fn success_clears_prior_error() {
        let state: SingleState<i32, String> = SingleState::new(None);
        state.update(Err("boom".into()), ResultUpdateReason::FinalReturned, Utc::now());
        assert!(state.snapshot().error.is_some());

        state.update(Ok(42), ResultUpdateReason::FinalReturned, Utc::now());
        let snap = state.snapshot();
        assert_eq!(snap.current, Some(42));
        assert!(snap.error.is_none());
        assert_eq!(snap.value_update_count, 1);
    }

    #[test]
    fn failure_does_not_clear_last_good_value() {
        let state: SingleState<i32, String> = SingleState::new(None);
        state.update(Ok(1), ResultUpdateReason::FinalReturned, Utc::now());
        state.update(Err("transient".into()), ResultUpdateReason::FinalReturned, Utc::now());
        let snap = state.snapshot();
        assert_eq!(snap.current, Some(1));
        assert_eq!(snap.error, Some("transient".to_string()));
    }

    #[test]
    fn reset_restores_initial_and_clears_bookkeeping() {
        let state: SingleState<i32, String> = SingleState::new(Some(0));
        state.update(Ok(9), ResultUpdateReason::FinalReturned, Utc::now());
        state.update(Err("e".into()), ResultUpdateReason::FinalReturned, Utc::now());
        state.reset();
        let snap = state.snapshot();
        assert_eq!(snap.current, Some(0));
        assert_eq!(snap.value_update_count, 0);
        assert!(snap.error.is_none());
        assert!(!snap.is_loading);
    }
}
