//! `retry`: re-runs a failed operation up to a fixed number of times, with
//! a configurable [`Backoff`] between attempts.

use std::sync::Arc;

use async_trait::async_trait;

use crate::clock::{Backoff, Delayer};
use crate::context::{keys, Context};
use crate::continuation::Continuation;
use crate::error::RuntimeError;
use crate::operation::{Modifier, Runnable};

/// Re-runs the wrapped operation on failure, up to `limit` extra attempts
/// beyond the first.
///
/// `retry_index` is set in the `Context` before each attempt (`0`-based),
/// readable by the operation itself or by diagnostics. Attempts
/// `0..limit` are retried on failure, after a delay from `backoff`;
/// attempt `limit` is final and its result — success or failure — is
/// returned directly with no further delay. A [`RuntimeError::Cancelled`]
/// or [`RuntimeError::ClientUnavailable`] from the inner operation is
/// never retried and propagates immediately.
pub struct Retry {
    limit: u32,
    backoff: Option<Backoff>,
    delayer: Option<Arc<dyn Delayer>>,
}

impl Retry {
    /// Retries up to `limit` times using the ambient `context.backoff`
    /// and `context.delayer`.
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            backoff: None,
            delayer: None,
        }
    }

    /// Overrides the backoff policy for this modifier instance.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Overrides the delayer for this modifier instance (mainly for
    /// tests).
    pub fn with_delayer(mut self, delayer: Arc<dyn Delayer>) -> Self {
        self.delayer = Some(delayer);
        self
    }
}

#[async_trait]
impl<Inner: Runnable> Modifier<Inner> for Retry {
    fn setup(&self, ctx: &mut Context, _inner: &Inner) {
        ctx.set(&keys::RETRY_LIMIT, keys::RetryLimit(self.limit));
        if let Some(backoff) = &self.backoff {
            ctx.set(&keys::BACKOFF, backoff.clone());
        }
    }

    async fn run(
        &self,
        input: Inner::Input,
        ctx: Context,
        cont: Continuation<Inner::Value, Inner::Failure>,
        inner: &Inner,
    ) -> Result<Inner::Value, RuntimeError<Inner::Failure>> {
        let backoff = self.backoff.clone().unwrap_or_else(|| ctx.get(&keys::BACKOFF));
        let delayer = self.delayer.clone().unwrap_or_else(|| ctx.get(&keys::DELAYER));

        for attempt in 0..self.limit {
            let mut run_ctx = ctx.child();
            run_ctx.set(&keys::RETRY_INDEX, keys::RetryIndex(attempt));
            match inner.execute(input.clone(), run_ctx, cont.clone()).await {
                Ok(value) => return Ok(value),
                Err(RuntimeError::Operation(_)) => {
                    delayer.delay(backoff.delay_for(attempt + 1)).await;
                }
                Err(other) => return Err(other),
            }
        }

        let mut final_ctx = ctx.child();
        final_ctx.set(&keys::RETRY_INDEX, keys::RetryIndex(self.limit));
        inner.execute(input, final_ctx, cont).await
    }
}
