//! [`Subscription`]: a cancellable, composable handle with deterministic
//! cleanup.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

enum Cleanup {
    Fn(Box<dyn FnOnce() + Send>),
    Many(Vec<Subscription>),
    Noop,
}

/// A handle representing one active subscription (to a `Store`, a
/// `RunSpecification`, or a controller). Dropping it — or calling
/// [`cancel`](Subscription::cancel) explicitly — runs the cleanup exactly
/// once, deterministically, even if the `Subscription` was cloned or
/// combined with others.
pub struct Subscription {
    inner: Arc<Mutex<Option<Cleanup>>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.inner.lock().is_some())
            .finish()
    }
}

impl Subscription {
    /// Wraps a cleanup closure run on cancellation.
    pub fn new(cleanup: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Cleanup::Fn(Box::new(cleanup))))),
        }
    }

    /// A subscription whose cancellation does nothing. Useful as a
    /// placeholder return value.
    pub fn noop() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Cleanup::Noop))),
        }
    }

    /// Combines several subscriptions into one: cancelling the result
    /// cancels every member, in order.
    pub fn combined(subscriptions: Vec<Subscription>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Cleanup::Many(subscriptions)))),
        }
    }

    /// Runs the cleanup now. Idempotent: a second call is a no-op.
    pub fn cancel(&self) {
        let cleanup = self.inner.lock().take();
        match cleanup {
            Some(Cleanup::Fn(f)) => f(),
            Some(Cleanup::Many(subs)) => subs.iter().for_each(Subscription::cancel),
            Some(Cleanup::Noop) | None => {}
        }
    }

    /// `true` if this subscription has not yet been cancelled.
    pub fn is_active(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Only run cleanup when the last handle goes away: clones share
        // the same `Arc`, so `cancel()` through any clone already took
        // the cleanup; dropping further clones must not re-run it.
        if Arc::strong_count(&self.inner) == 1 {
            self.cancel();
        }
    }
}

/// A copy-on-write collection of subscribers' `Subscription`s and
/// callbacks, safe to iterate during dispatch while concurrent
/// `subscribe`/unsubscribe calls happen on other threads.
///
/// A dispatch clones the current `Vec` of handlers under the lock, then
/// calls each handler without holding the lock, so a handler that
/// subscribes or unsubscribes mid-dispatch never deadlocks or observes a
/// torn list.
pub struct SubscriberList<F> {
    handlers: Mutex<Vec<(u64, Arc<F>)>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl<F> Default for SubscriberList<F> {
    fn default() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

impl<F: Send + Sync + 'static> SubscriberList<F> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler`, returning a `Subscription` that removes it on
    /// cancellation.
    pub fn subscribe(self: &Arc<Self>, handler: F) -> Subscription {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.handlers.lock().push((id, Arc::new(handler)));
        let list = Arc::clone(self);
        Subscription::new(move || {
            list.handlers.lock().retain(|(h_id, _)| *h_id != id);
        })
    }

    /// A snapshot of the currently registered handlers, safe to iterate
    /// without holding the list's lock.
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.handlers.lock().iter().map(|(_, f)| Arc::clone(f)).collect()
    }

    /// Number of currently active subscribers.
    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    /// `true` when no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn cancel_runs_cleanup_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sub = Subscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        sub.cancel();
        sub.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_runs_cleanup() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        {
            let _sub = Subscription::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn combined_cancels_all_members() {
        let count = Arc::new(AtomicUsize::new(0));
        let subs: Vec<Subscription> = (0..3)
            .map(|_| {
                let c = Arc::clone(&count);
                Subscription::new(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        let combined = Subscription::combined(subs);
        combined.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn subscriber_list_removes_on_cancel() {
        let list: Arc<SubscriberList<fn() -> i32>> = Arc::new(SubscriberList::new());
        let sub = list.subscribe(|| 1);
        assert_eq!(list.len(), 1);
        sub.cancel();
        assert_eq!(list.len(), 0);
    }
}
