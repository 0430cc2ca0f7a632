//! `deduplicate`: collapses concurrent calls that share a fingerprint into
//! one underlying run.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;

use crate::context::Context;
use crate::continuation::Continuation;
use crate::error::RuntimeError;
use crate::operation::{Modifier, Runnable};

/// Computes a string fingerprint for one `execute` call. Two calls with
/// the same fingerprint share a single underlying run.
pub type FingerprintFn<Input> = Arc<dyn Fn(&Input, &Context) -> String + Send + Sync>;

type SharedResult<V, E> = Result<V, RuntimeError<E>>;

/// Collapses concurrent `execute` calls that share a fingerprint into one
/// underlying run, so a burst of callers asking for the same thing
/// triggers exactly one call into `inner`.
///
/// The default fingerprint is a constant: every call to this operation
/// collapses onto whichever run is currently in flight (the only
/// identity non-paginated operations usually need). A paginated operation
/// typically supplies [`Deduplicate::fingerprint_by`] keyed on
/// `paging.fetch_type` and `paging.target_id`, since `next`/`previous`
/// fetches are distinct runs that should not collapse into each other.
///
/// The first caller for a fingerprint becomes the *driver*: it calls
/// `inner.execute` directly and broadcasts the result to every other
/// caller that arrived for the same fingerprint meanwhile, which instead
/// just await the broadcast. One consequence of driving inline rather
/// than through a detached task: if the driver's own call is the one that
/// gets cancelled, the shared run is cancelled with it even if other
/// awaiters are still attached — a caller that only ever awaits a
/// fingerprint someone else originated is unaffected by its own
/// cancellation.
pub struct Deduplicate<Inner: Runnable> {
    fingerprint_fn: FingerprintFn<Inner::Input>,
    in_flight: DashMap<String, watch::Receiver<Option<SharedResult<Inner::Value, Inner::Failure>>>>,
}

impl<Inner: Runnable> Deduplicate<Inner> {
    /// Deduplicates every call onto a single constant fingerprint.
    pub fn new() -> Self {
        Self::fingerprint_by(|_input, _ctx| "default".to_string())
    }

    /// Deduplicates calls by a custom fingerprint function.
    pub fn fingerprint_by<F>(f: F) -> Self
    where
        F: Fn(&Inner::Input, &Context) -> String + Send + Sync + 'static,
    {
        Self {
            fingerprint_fn: Arc::new(f),
            in_flight: DashMap::new(),
        }
    }

    async fn await_broadcast(
        mut rx: watch::Receiver<Option<SharedResult<Inner::Value, Inner::Failure>>>,
    ) -> SharedResult<Inner::Value, Inner::Failure> {
        loop {
            if let Some(result) = rx.borrow().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(RuntimeError::Cancelled);
            }
        }
    }
}

impl<Inner: Runnable> Default for Deduplicate<Inner> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<Inner: Runnable> Modifier<Inner> for Deduplicate<Inner> {
    async fn run(
        &self,
        input: Inner::Input,
        ctx: Context,
        cont: Continuation<Inner::Value, Inner::Failure>,
        inner: &Inner,
    ) -> Result<Inner::Value, RuntimeError<Inner::Failure>> {
        let fingerprint = (self.fingerprint_fn)(&input, &ctx);

        let existing = self.in_flight.get(&fingerprint).map(|r| r.clone());
        if let Some(existing) = existing {
            return Self::await_broadcast(existing).await;
        }

        let (tx, rx) = watch::channel(None);
        let joined = match self.in_flight.entry(fingerprint.clone()) {
            Entry::Occupied(occupied) => Some(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                vacant.insert(rx);
                None
            }
        };
        if let Some(joined) = joined {
            return Self::await_broadcast(joined).await;
        }

        let result = inner.execute(input, ctx, cont).await;
        let _ = tx.send(Some(result.clone()));
        self.in_flight.remove(&fingerprint);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{OperationCore, Single, SingleOperation};
    use crate::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Clone)]
    struct CountingOp {
        calls: Arc<AtomicU32>,
    }

    impl OperationCore for CountingOp {
        fn path(&self) -> Path {
            Path::from(["counted"])
        }
    }

    #[async_trait]
    impl SingleOperation for CountingOp {
        type Value = i32;
        type Failure = String;

        async fn run(&self, _ctx: Context, _cont: Continuation<i32, String>) -> Result<i32, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            Ok(1)
        }
    }

    #[tokio::test]
    async fn concurrent_calls_with_same_fingerprint_run_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let op = Single(CountingOp { calls: calls.clone() });
        let modified = crate::operation::RunnableExt::modified(op, Deduplicate::new());

        let (cont1, _rx1) = crate::continuation::channel();
        let (cont2, _rx2) = crate::continuation::channel();
        let ctx = Context::new();
        let (r1, r2) = tokio::join!(
            modified.execute((), ctx.clone(), cont1),
            modified.execute((), ctx.clone(), cont2)
        );
        assert_eq!(r1.unwrap(), 1);
        assert_eq!(r2.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sequential_calls_each_run_independently() {
        let calls = Arc::new(AtomicU32::new(0));
        let op = Single(CountingOp { calls: calls.clone() });
        let modified = crate::operation::RunnableExt::modified(op, Deduplicate::new());

        let (cont1, _rx1) = crate::continuation::channel();
        modified.execute((), Context::new(), cont1).await.unwrap();
        let (cont2, _rx2) = crate::continuation::channel();
        modified.execute((), Context::new(), cont2).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
