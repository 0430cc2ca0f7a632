//! [`Modifier`]: the unit of composition that wraps a [`Runnable`] into
//! another [`Runnable`] with augmented behavior.

use async_trait::async_trait;

use crate::context::Context;
use crate::continuation::Continuation;
use crate::error::RuntimeError;
use crate::path::Path;

use super::{OperationCore, Runnable};

/// Intercepts a [`Runnable`]'s `execute` call.
///
/// A modifier's `run` receives the inner operation by reference and
/// decides how (and how many times) to call `inner.execute(..)` — `retry`
/// calls it in a loop, `deduplicate` calls it once per distinct
/// fingerprint and fans the result out, `log_duration` calls it exactly
/// once either side of a timer. `setup` lets a modifier seed the `Context`
/// before any `execute` call happens; it runs *before* the inner
/// operation's own `setup`, so the inner operation's defaults win when
/// both set the same key.
#[async_trait]
pub trait Modifier<Inner: Runnable>: Send + Sync {
    /// Seeds `ctx` with this modifier's defaults. Called once per run,
    /// before `inner`'s own `setup`.
    fn setup(&self, _ctx: &mut Context, _inner: &Inner) {}

    /// Drives one call through `inner`, applying this modifier's behavior.
    async fn run(
        &self,
        input: Inner::Input,
        ctx: Context,
        cont: Continuation<Inner::Value, Inner::Failure>,
        inner: &Inner,
    ) -> Result<Inner::Value, RuntimeError<Inner::Failure>>;
}

/// The result of [`RunnableExt::modified`](super::RunnableExt::modified):
/// an `Inner` wrapped by a `Modifier<Inner>`, itself `Runnable` so
/// modifiers stack.
pub struct Modified<Inner, M> {
    inner: Inner,
    modifier: M,
}

impl<Inner, M> Modified<Inner, M> {
    /// Wraps `inner` with `modifier`.
    pub fn new(inner: Inner, modifier: M) -> Self {
        Self { inner, modifier }
    }

    /// The wrapped operation, before this modifier's effect.
    pub fn inner(&self) -> &Inner {
        &self.inner
    }

    /// The modifier itself.
    pub fn modifier(&self) -> &M {
        &self.modifier
    }
}

impl<Inner: Runnable, M: Modifier<Inner>> OperationCore for Modified<Inner, M> {
    fn path(&self) -> Path {
        self.inner.path()
    }

    fn setup(&self, ctx: &mut Context) {
        self.modifier.setup(ctx, &self.inner);
        self.inner.setup(ctx);
    }
}

#[async_trait]
impl<Inner: Runnable, M: Modifier<Inner>> Runnable for Modified<Inner, M> {
    type Input = Inner::Input;
    type Value = Inner::Value;
    type Failure = Inner::Failure;

    async fn execute(
        &self,
        input: Self::Input,
        ctx: Context,
        cont: Continuation<Self::Value, Self::Failure>,
    ) -> Result<Self::Value, RuntimeError<Self::Failure>> {
        self.modifier.run(input, ctx, cont, &self.inner).await
    }
}
