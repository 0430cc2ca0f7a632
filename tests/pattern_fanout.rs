//! Pattern-matched fanout: given several stores registered under a shared
//! path prefix, `client.typed_stores_matching` finds exactly those stores
//! (and no others), and directly pushing a value into each via
//! `set_current_value` notifies only that store's subscribers, once.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use operon::client::Client;
use operon::config::RuntimeConfig;
use operon::context::Context;
use operon::continuation::Continuation;
use operon::operation::{OperationCore, Single, SingleOperation};
use operon::path::Path;

struct FriendsList {
    user_id: u64,
}

impl OperationCore for FriendsList {
    fn path(&self) -> Path {
        Path::from(["user-friends", self.user_id])
    }
}

#[async_trait]
impl SingleOperation for FriendsList {
    type Value = Vec<String>;
    type Failure = String;

    async fn run(&self, _ctx: Context, _cont: Continuation<Vec<String>, String>) -> Result<Vec<String>, String> {
        Ok(Vec::new())
    }
}

struct Unrelated;

impl OperationCore for Unrelated {
    fn path(&self) -> Path {
        Path::from(["other-thing"])
    }
}

#[async_trait]
impl SingleOperation for Unrelated {
    type Value = i32;
    type Failure = String;

    async fn run(&self, _ctx: Context, _cont: Continuation<i32, String>) -> Result<i32, String> {
        Ok(0)
    }
}

#[tokio::test]
async fn fanout_updates_only_matched_stores_once_each() {
    let client = Client::new(RuntimeConfig::default());

    let friends_1 = client.store(Single(FriendsList { user_id: 1 }));
    let friends_2 = client.store(Single(FriendsList { user_id: 2 }));
    let unrelated = client.store(Single(Unrelated));

    let friends_1_notifications = Arc::new(AtomicU32::new(0));
    let friends_1_last: Arc<Mutex<Option<Vec<String>>>> = Arc::new(Mutex::new(None));
    let count = friends_1_notifications.clone();
    let last = friends_1_last.clone();
    let _sub1 = friends_1.subscribe(Box::new(move |snapshot| {
        count.fetch_add(1, Ordering::SeqCst);
        *last.lock() = snapshot.current.clone();
    }));

    let friends_2_notifications = Arc::new(AtomicU32::new(0));
    let count2 = friends_2_notifications.clone();
    let _sub2 = friends_2.subscribe(Box::new(move |_snapshot| {
        count2.fetch_add(1, Ordering::SeqCst);
    }));

    let unrelated_notifications = Arc::new(AtomicU32::new(0));
    let count3 = unrelated_notifications.clone();
    let _sub3 = unrelated.subscribe(Box::new(move |_snapshot| {
        count3.fetch_add(1, Ordering::SeqCst);
    }));

    let matched = client.typed_stores_matching::<Single<FriendsList>>(&Path::from(["user-friends"]));
    assert_eq!(matched.len(), 2);

    for store in &matched {
        store.set_current_value(vec!["updated".to_string()]);
    }

    assert!(client.store_with(&Path::from(["user-friends", 1u64])).is_some());
    assert!(client.store_with(&Path::from(["user-friends"])).is_none());

    assert_eq!(friends_1_notifications.load(Ordering::SeqCst), 1);
    assert_eq!(friends_2_notifications.load(Ordering::SeqCst), 1);
    assert_eq!(unrelated_notifications.load(Ordering::SeqCst), 0);

    assert_eq!(friends_1_last.lock().clone(), Some(vec!["updated".to_string()]));
    assert_eq!(friends_1.current_value(), Some(vec!["updated".to_string()]));
    assert_eq!(friends_2.current_value(), Some(vec!["updated".to_string()]));
    assert_eq!(unrelated.current_value(), Some(0));
}
