//! `stale_when`: narrows when a store's current state is considered
//! stale and eligible for an automatic refetch.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{keys, Context};
use crate::continuation::Continuation;
use crate::error::RuntimeError;
use crate::operation::{Modifier, Runnable};
use crate::run_spec::{RunSpecification, RunSpecificationExt};

/// Conjoins `predicate` onto `context.stale_predicate`.
///
/// The default predicate is "always stale"; each `stale_when` further
/// restricts it by conjunction, so state is only considered stale once
/// *every* registered predicate agrees. Composing zero `stale_when`
/// modifiers leaves the default untouched.
pub struct StaleWhen {
    predicate: Arc<dyn RunSpecification>,
}

impl StaleWhen {
    /// Narrows staleness to when `predicate` holds.
    pub fn new(predicate: Arc<dyn RunSpecification>) -> Self {
        Self { predicate }
    }
}

#[async_trait]
impl<Inner: Runnable> Modifier<Inner> for StaleWhen {
    fn setup(&self, ctx: &mut Context, _inner: &Inner) {
        let existing = ctx.get(&keys::STALE_PREDICATE);
        ctx.set(
            &keys::STALE_PREDICATE,
            keys::StalePredicate(existing.0.and(Arc::clone(&self.predicate))),
        );
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
    use crate::run_spec::{AlwaysStale, Never, Predicate};

    #[test]
    fn first_application_narrows_default_always_stale() {
        let mut ctx = Context::new();
        assert!(ctx.get(&keys::STALE_PREDICATE).0.is_satisfied(&ctx));

        let modifier = StaleWhen::new(Arc::new(Never));
        Modifier::<crate::operation::Single<Noop>>::setup(&modifier, &mut ctx, &crate::operation::Single(Noop));
        assert!(!ctx.get(&keys::STALE_PREDICATE).0.is_satisfied(&ctx));
    }

    #[test]
    fn predicate_identity_matches_always_stale() {
        let ctx = Context::new();
        assert_eq!(
            AlwaysStale.is_satisfied(&ctx),
            Predicate::new(|_: &Context| true).is_satisfied(&ctx)
        );
    }

    struct Noop;
    impl crate::operation::OperationCore for Noop {
        fn path(&self) -> crate::path::Path {
            crate::path::Path::from(["noop"])
        }
    }
    #[async_trait]
    impl crate::operation::SingleOperation for Noop {
        type Value = ();
        type Failure = ();
        async fn run(&self, _ctx: Context, _cont: Continuation<(), ()>) -> Result<(), ()> {
            Ok(())
        }
    }
}
