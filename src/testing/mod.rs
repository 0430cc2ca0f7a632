//! Fakes for deterministic tests: a settable [`ManualClock`] and a
//! [`ManualDelayer`] whose sleeps stay pending until the test releases
//! them, plus [`CountingOperation`] for building a minimal
//! [`SingleOperation`](crate::operation::SingleOperation) without
//! boilerplate.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::clock::{Clock, Delayer};
use crate::context::Context;
use crate::continuation::Continuation;
use crate::operation::{OperationCore, SingleOperation};
use crate::path::Path;

/// A [`Clock`] whose `now()` is set by the test rather than the wall
/// clock, for deterministic staleness and timestamp assertions.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Starts at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    /// Starts at the current wall-clock time, then only moves when the
    /// test calls [`advance`](Self::advance)/[`set`](Self::set).
    pub fn epoch() -> Self {
        Self::new(Utc::now())
    }

    /// Jumps `now()` forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let delta = chrono::Duration::from_std(duration).expect("duration fits in chrono::Duration");
        let mut now = self.now.lock();
        *now += delta;
    }

    /// Sets `now()` directly.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// A [`Delayer`] whose sleeps never resolve on their own: each call to
/// [`ManualDelayer::delay`] parks a waiter the test later releases with
/// [`ManualDelayer::release_all`], so retry/backoff timing can be driven
/// one step at a time instead of racing the real clock.
#[derive(Clone, Default)]
pub struct ManualDelayer {
    inner: Arc<Mutex<ManualDelayerState>>,
}

#[derive(Default)]
struct ManualDelayerState {
    requested: Vec<Duration>,
    waiters: Vec<oneshot::Sender<()>>,
}

impl ManualDelayer {
    /// A fresh delayer with no pending sleeps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every duration requested so far, in call order.
    pub fn requested_delays(&self) -> Vec<Duration> {
        self.inner.lock().requested.clone()
    }

    /// Number of sleeps currently parked, waiting on [`release_all`](Self::release_all).
    pub fn pending_count(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Resolves every currently parked sleep.
    pub fn release_all(&self) {
        let waiters = std::mem::take(&mut self.inner.lock().waiters);
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}

impl Delayer for ManualDelayer {
    fn delay(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.lock();
            state.requested.push(duration);
            state.waiters.push(tx);
        }
        Box::pin(async move {
            let _ = rx.await;
        })
    }
}

/// A minimal [`SingleOperation`] at `path` that counts how many times it
/// ran and always returns `result.clone()`, for tests that only care
/// about run count and final value.
pub struct CountingOperation<V, E> {
    path: Path,
    calls: Arc<std::sync::atomic::AtomicUsize>,
    result: Result<V, E>,
}

impl<V, E> CountingOperation<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Builds an operation at `path` that always resolves to `result`.
    pub fn new(path: impl Into<Path>, result: Result<V, E>) -> Self {
        Self {
            path: path.into(),
            calls: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            result,
        }
    }

    /// Shared call counter, readable after the operation has been moved
    /// into a `Store`.
    pub fn call_count_handle(&self) -> Arc<std::sync::atomic::AtomicUsize> {
        self.calls.clone()
    }
}

impl<V: Send + Sync, E: Send + Sync> OperationCore for CountingOperation<V, E> {
    fn path(&self) -> Path {
        self.path.clone()
    }
}

#[async_trait]
impl<V, E> SingleOperation for CountingOperation<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    type Value = V;
    type Failure = E;

    async fn run(&self, _ctx: Context, _cont: Continuation<V, E>) -> Result<V, E> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.result.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_by_exact_duration() {
        let clock = ManualClock::epoch();
        let start = clock.now();
        clock.advance(Duration::from_secs(60));
        assert_eq!(clock.now() - start, chrono::Duration::seconds(60));
    }

    #[tokio::test]
    async fn manual_delayer_parks_until_released() {
        let delayer = ManualDelayer::new();
        let delayer_for_task = delayer.clone();
        let handle = tokio::spawn(async move {
            delayer_for_task.delay(Duration::from_secs(5)).await;
        });

        tokio::task::yield_now().await;
        assert_eq!(delayer.pending_count(), 1);
        assert_eq!(delayer.requested_delays(), vec![Duration::from_secs(5)]);

        delayer.release_all();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn counting_operation_tracks_calls_and_returns_canned_result() {
        use crate::operation::{Runnable, Single};

        let op = CountingOperation::<i32, String>::new(Path::from(["counted"]), Ok(42));
        let calls = op.call_count_handle();
        let runnable = Single(op);

        let (cont, _rx) = crate::continuation::channel();
        let result = runnable.execute((), Context::new(), cont).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
