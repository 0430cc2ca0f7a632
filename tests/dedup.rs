//! Deduplication: two concurrent `store.run()` calls on an operation
//! wrapped in a `deduplicate()` modifier collapse onto one underlying
//! execution.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use operon::config::RuntimeConfig;
use operon::context::Context;
use operon::continuation::Continuation;
use operon::diagnostics::Diagnostics;
use operon::operation::modifiers::Deduplicate;
use operon::operation::{OperationCore, RunnableExt, Single, SingleOperation};
use operon::path::Path;
use operon::store::Store;

struct SlowCounted {
    calls: Arc<AtomicU32>,
}

impl OperationCore for SlowCounted {
    fn path(&self) -> Path {
        Path::from(["slow-counted"])
    }
}

#[async_trait]
impl SingleOperation for SlowCounted {
    type Value = i32;
    type Failure = String;

    async fn run(&self, _ctx: Context, _cont: Continuation<i32, String>) -> Result<i32, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(7)
    }
}

#[tokio::test]
async fn concurrent_runs_collapse_to_one_underlying_call() {
    let calls = Arc::new(AtomicU32::new(0));
    let op = Single(SlowCounted { calls: calls.clone() }).modified(Deduplicate::new());
    let store = Store::new(op, RuntimeConfig::default(), Diagnostics::default());

    let (r1, r2) = tokio::join!(store.run(), store.run());

    assert_eq!(r1.unwrap(), 7);
    assert_eq!(r2.unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
