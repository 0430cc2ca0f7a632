//! [`Continuation`]: the sink operations push intermediate results through
//! before their terminal return.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

/// One value pushed through a [`Continuation`]: either a value or a
/// failure, tagged with whether it was yielded mid-run or is the run's
/// terminal return.
#[derive(Debug, Clone)]
pub enum YieldedResult<V, E> {
    /// A successful intermediate or final value.
    Value(V),
    /// An intermediate or final failure.
    Error(E),
}

impl<V, E> YieldedResult<V, E> {
    /// Converts to `Result<V, E>`, discarding the yield/final distinction.
    pub fn into_result(self) -> Result<V, E> {
        match self {
            Self::Value(v) => Ok(v),
            Self::Error(e) => Err(e),
        }
    }
}

/// A thread-safe sink handed to an operation's `run`/`fetch_page`/`mutate`
/// body for pushing intermediate results before the final return.
///
/// Every push before the terminal return carries
/// `result_update_reason = yielded`; the operation's actual `Result`
/// return is tagged `final-returned` by the [`Store`](crate::store::Store)
/// that drives the run, not by the `Continuation` itself. Cloning a
/// `Continuation` is cheap (it wraps an `mpsc::UnboundedSender`); calling
/// any `yield_*` method after the run has finished is a silent no-op
/// because the receiving end has already been dropped.
#[derive(Clone)]
pub struct Continuation<V, E> {
    sender: mpsc::UnboundedSender<YieldedResult<V, E>>,
}

impl<V, E> fmt::Debug for Continuation<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Continuation(..)")
    }
}

impl<V, E> Continuation<V, E> {
    /// Pushes a successful intermediate value.
    pub fn yield_value(&self, value: V) {
        let _ = self.sender.send(YieldedResult::Value(value));
    }

    /// Pushes an intermediate failure.
    pub fn yield_error(&self, error: E) {
        let _ = self.sender.send(YieldedResult::Error(error));
    }

    /// Pushes an intermediate `Result` directly.
    pub fn yield_result(&self, result: Result<V, E>) {
        match result {
            Ok(v) => self.yield_value(v),
            Err(e) => self.yield_error(e),
        }
    }
}

/// The receiving half, held by the `Store` while it drains yields into
/// state transitions.
pub(crate) struct ContinuationReceiver<V, E> {
    receiver: mpsc::UnboundedReceiver<YieldedResult<V, E>>,
}

impl<V, E> ContinuationReceiver<V, E> {
    pub(crate) async fn recv(&mut self) -> Option<YieldedResult<V, E>> {
        self.receiver.recv().await
    }
}

/// Creates a linked `Continuation`/receiver pair for one operation run.
pub(crate) fn channel<V, E>() -> (Continuation<V, E>, ContinuationReceiver<V, E>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Continuation { sender }, ContinuationReceiver { receiver })
}

/// Shared handle allowing multiple clones of a [`Continuation`] to be
/// handed to a user's operation closure across threads, e.g. when a
/// `fetch_page` spawns helper tasks that each yield partial progress.
pub type SharedContinuation<V, E> = Arc<Continuation<V, E>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_are_received_in_order() {
        let (cont, mut rx) = channel::<i32, String>();
        cont.yield_value(1);
        cont.yield_value(2);
        cont.yield_error("transient".to_string());
        drop(cont);

        let mut seen = Vec::new();
        while let Some(r) = rx.recv().await {
            seen.push(r.into_result());
        }
        assert_eq!(seen, vec![Ok(1), Ok(2), Err("transient".to_string())]);
    }

    #[tokio::test]
    async fn yield_after_receiver_dropped_is_a_noop() {
        let (cont, rx) = channel::<i32, String>();
        drop(rx);
        cont.yield_value(1); // must not panic
    }
}
