//! Retry-then-success: an operation that fails twice and succeeds with
//! `42` on its third attempt, wrapped in a `retry(limit=3)` modifier with
//! no backoff delay.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use operon::config::RuntimeConfig;
use operon::context::{keys, Context};
use operon::continuation::Continuation;
use operon::diagnostics::Diagnostics;
use operon::operation::modifiers::Retry;
use operon::operation::{OperationCore, RunnableExt, Single, SingleOperation};
use operon::path::Path;
use operon::store::Store;

struct FlakyTwice {
    remaining_failures: AtomicU32,
    seen_retry_indices: Arc<Mutex<Vec<u32>>>,
}

impl OperationCore for FlakyTwice {
    fn path(&self) -> Path {
        Path::from(["flaky-twice"])
    }
}

#[async_trait]
impl SingleOperation for FlakyTwice {
    type Value = i32;
    type Failure = String;

    async fn run(&self, ctx: Context, _cont: Continuation<i32, String>) -> Result<i32, String> {
        let keys::RetryIndex(index) = ctx.get(&keys::RETRY_INDEX);
        self.seen_retry_indices.lock().push(index);

        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| if n == 0 { None } else { Some(n - 1) })
            .is_ok();
        if failed {
            Err("transient".to_string())
        } else {
            Ok(42)
        }
    }
}

#[tokio::test]
async fn retries_twice_then_succeeds_with_42() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let op = Single(FlakyTwice {
        remaining_failures: AtomicU32::new(2),
        seen_retry_indices: seen.clone(),
    })
    .modified(Retry::new(3).with_backoff(operon::clock::Backoff::constant(std::time::Duration::ZERO)));

    let store = Store::new(op, RuntimeConfig::default(), Diagnostics::default());

    let observed: Arc<Mutex<Vec<Option<i32>>>> = Arc::new(Mutex::new(Vec::new()));
    let observed_for_listener = observed.clone();
    let _sub = store.subscribe(Box::new(move |snapshot| {
        observed_for_listener.lock().push(snapshot.current);
    }));

    let result = store.run().await;
    assert_eq!(result.unwrap(), 42);

    let snapshot = store.snapshot();
    assert_eq!(snapshot.current, Some(42));
    assert_eq!(snapshot.value_update_count, 1);
    assert!(snapshot.error.is_none());

    let mut indices = seen.lock().clone();
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2]);

    assert_eq!(observed.lock().last(), Some(&Some(42)), "subscriber's last snapshot carries the final value");
}
