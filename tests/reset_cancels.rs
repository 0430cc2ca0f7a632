//! Reset cancels: starting a slow operation then calling `reset_state`
//! shortly after cancels the in-flight run and restores the store to its
//! initial, empty state.

use std::time::Duration;

use async_trait::async_trait;

use operon::config::RuntimeConfig;
use operon::context::Context;
use operon::continuation::Continuation;
use operon::diagnostics::Diagnostics;
use operon::operation::{OperationCore, Single, SingleOperation};
use operon::path::Path;
use operon::store::Store;

struct SlowOperation;

impl OperationCore for SlowOperation {
    fn path(&self) -> Path {
        Path::from(["slow"])
    }
}

#[async_trait]
impl SingleOperation for SlowOperation {
    type Value = i32;
    type Failure = String;

    async fn run(&self, _ctx: Context, _cont: Continuation<i32, String>) -> Result<i32, String> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(1)
    }
}

#[tokio::test]
async fn reset_state_cancels_the_in_flight_run() {
    let store = Store::new(Single(SlowOperation), RuntimeConfig::default(), Diagnostics::default());

    let run_handle = {
        let store = store.clone();
        tokio::spawn(async move { store.run().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    store.reset_state();

    let result = run_handle.await.unwrap();
    assert!(result.unwrap_err().is_cancelled());

    let snapshot = store.snapshot();
    assert_eq!(snapshot.current, None);
    assert!(snapshot.error.is_none());
    assert!(!snapshot.is_loading);
}
