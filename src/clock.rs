//! Pluggable policies for "now" and retry timing: [`Clock`], [`Delayer`],
//! and [`Backoff`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// A source of the current time.
///
/// Abstracted so tests can inject a [`ManualClock`](crate::testing::ManualClock)
/// instead of depending on wall-clock time for staleness and timestamp
/// assertions.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> DateTime<Utc>;
}

/// `Clock` backed by the system wall clock. Default for `context.clock`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// An async sleep, abstracted so retry backoff can be driven by a fake in
/// tests.
pub trait Delayer: Send + Sync {
    /// Sleeps for `duration`, cooperatively cancellable by the calling
    /// task being cancelled.
    fn delay(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// `Delayer` backed by `tokio::time::sleep`. Default for `context.delayer`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelayer;

impl Delayer for TokioDelayer {
    fn delay(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Retry backoff policy: `attempt -> duration to wait before the next
/// attempt`.
///
/// `attempt` is `1`-based (the delay *after* the attempt numbered
/// `attempt - 1` failed), matching `retry`'s `backoff(i + 1)` call.
#[derive(Clone)]
pub struct Backoff(std::sync::Arc<dyn Fn(u32) -> Duration + Send + Sync>);

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Backoff(..)")
    }
}

impl Backoff {
    /// Wraps an arbitrary `attempt -> duration` function.
    pub fn new(f: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        Self(std::sync::Arc::new(f))
    }

    /// The delay for `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        (self.0)(attempt)
    }

    /// Always waits `duration`, regardless of attempt number.
    pub fn constant(duration: Duration) -> Self {
        Self::new(move |_| duration)
    }

    /// No delay at all. Used in tests and by modifiers that compose their
    /// own timing.
    pub fn none() -> Self {
        Self::constant(Duration::ZERO)
    }

    /// Fibonacci sequence scaled by one second: `1s, 1s, 2s, 3s, 5s, 8s,
    /// ...`. The default retry backoff.
    pub fn fibonacci() -> Self {
        Self::new(|attempt| {
            let (mut a, mut b) = (1u64, 1u64);
            for _ in 0..attempt.saturating_sub(1) {
                let next = a.saturating_add(b);
                a = b;
                b = next;
            }
            Duration::from_secs(a)
        })
    }

    /// Exponential backoff: `base * multiplier^attempt`, capped at `max`.
    pub fn exponential(base: Duration, multiplier: f64, max: Duration) -> Self {
        Self::new(move |attempt| {
            let scaled = base.as_secs_f64() * multiplier.powi(attempt as i32);
            Duration::from_secs_f64(scaled).min(max)
        })
    }
}

/// Monotonic, process-local counter used to allocate [`Task`](crate::task::Task)
/// ids. A single `AtomicI64` behind no lock, per the "global state" note in
/// the design notes: a single counter is the whole mechanism, no
/// process-wide registry needed.
#[derive(Debug, Default)]
pub struct TaskIdAllocator(AtomicI64);

impl TaskIdAllocator {
    /// A fresh allocator starting at `0`.
    pub const fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    /// Allocates the next id. Dense, monotonic, safe to call concurrently.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fibonacci_backoff_matches_sequence() {
        let backoff = Backoff::fibonacci();
        let secs: Vec<u64> = (1..=6).map(|a| backoff.delay_for(a).as_secs()).collect();
        assert_eq!(secs, vec![1, 1, 2, 3, 5, 8]);
    }

    #[test]
    fn task_id_allocator_is_dense_and_monotonic() {
        let allocator = TaskIdAllocator::new();
        let ids: Vec<u64> = (0..5).map(|_| allocator.next()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }
}
