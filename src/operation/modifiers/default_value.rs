//! `default_value`: seeds a store's `current` before it has ever run.

use async_trait::async_trait;

use crate::context::{Context, ContextKey};
use crate::continuation::Continuation;
use crate::error::RuntimeError;
use crate::operation::{Modifier, Runnable};

/// The per-value-type context slot `default_value` writes into. Keyed
/// purely by `V`'s `TypeId`, so two `default_value` modifiers over the
/// same `V` in one chain overwrite rather than accumulate — matching
/// "last one wins" for a single scalar default.
fn default_value_key<V: Clone + Send + Sync + 'static>() -> ContextKey<Option<V>> {
    ContextKey::new("operation.default_value", || None)
}

/// Reads the default value `default_value` (if any) seeded for `V`. Used
/// by [`Store`](crate::store::Store) construction to pick a state's
/// initial value.
pub fn read_default<V: Clone + Send + Sync + 'static>(ctx: &Context) -> Option<V> {
    ctx.get(&default_value_key::<V>())
}

/// Seeds `context`'s default-value slot for `V`, read by the
/// [`Store`](crate::store::Store) when it constructs the operation's
/// initial state, before any run has happened.
pub struct DefaultValue<V> {
    value: V,
}

impl<V: Clone + Send + Sync + 'static> DefaultValue<V> {
    /// The store's `current` reads as `value` until the first run
    /// completes.
    pub fn new(value: V) -> Self {
        Self { value }
    }
}

#[async_trait]
impl<Inner> Modifier<Inner> for DefaultValue<Inner::Value>
where
    Inner: Runnable,
{
    fn setup(&self, ctx: &mut Context, _inner: &Inner) {
        ctx.set(&default_value_key::<Inner::Value>(), Some(self.value.clone()));
    }

    async fn run(
        &self,
        input: Inner::Input,
        ctx: Context,
        cont: Continuation<Inner::Value, Inner::Failure>,
        inner: &Inner,
    ) -> Result<Inner::Value, RuntimeError<Inner::Failure>> {
        inner.execute(input, ctx, cont).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_default_reads_as_none() {
        let ctx = Context::new();
        assert_eq!(read_default::<i32>(&ctx), None);
    }

    #[test]
    fn setup_seeds_the_typed_slot() {
        let mut ctx = Context::new();
        ctx.set(&default_value_key::<i32>(), Some(9));
        assert_eq!(read_default::<i32>(&ctx), Some(9));
    }
}
