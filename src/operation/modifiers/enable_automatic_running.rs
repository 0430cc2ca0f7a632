//! `enable_automatic_running`: overrides whether a store runs automatically
//! when subscribed to.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{keys, Context};
use crate::continuation::Continuation;
use crate::error::RuntimeError;
use crate::operation::{Modifier, Runnable};
use crate::run_spec::RunSpecification;

/// Overrides `context.auto_run_predicate` with `predicate`, replacing
/// whatever the default (or an earlier `enable_automatic_running`) left in
/// place — unlike `stale_when`, this does not conjoin.
pub struct EnableAutomaticRunning {
    predicate: Arc<dyn RunSpecification>,
}

impl EnableAutomaticRunning {
    /// Automatic running is permitted only while `predicate` holds.
    pub fn new(predicate: Arc<dyn RunSpecification>) -> Self {
        Self { predicate }
    }

    /// Disables automatic running unconditionally.
    pub fn disabled() -> Self {
        Self::new(Arc::new(crate::run_spec::Never))
    }
}

#[async_trait]
impl<Inner: Runnable> Modifier<Inner> for EnableAutomaticRunning {
    fn setup(&self, ctx: &mut Context, _inner: &Inner) {
        ctx.set(&keys::AUTO_RUN_PREDICATE, keys::AutoRunPredicate(Arc::clone(&self.predicate)));
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
    use crate::run_spec::AlwaysTrue;

    #[test]
    fn default_is_always_true() {
        let ctx = Context::new();
        assert!(ctx.get(&keys::AUTO_RUN_PREDICATE).0.is_satisfied(&ctx));
    }

    #[test]
    fn disabled_overrides_the_default_rather_than_conjoining() {
        let mut ctx = Context::new();
        let modifier = EnableAutomaticRunning::disabled();
        Modifier::<crate::operation::Single<Noop>>::setup(&modifier, &mut ctx, &crate::operation::Single(Noop));
        assert!(!ctx.get(&keys::AUTO_RUN_PREDICATE).0.is_satisfied(&ctx));
    }

    #[test]
    fn a_second_application_replaces_the_first() {
        let mut ctx = Context::new();
        let first = EnableAutomaticRunning::disabled();
        Modifier::<crate::operation::Single<Noop>>::setup(&first, &mut ctx, &crate::operation::Single(Noop));
        assert!(!ctx.get(&keys::AUTO_RUN_PREDICATE).0.is_satisfied(&ctx));

        let second = EnableAutomaticRunning::new(Arc::new(AlwaysTrue));
        Modifier::<crate::operation::Single<Noop>>::setup(&second, &mut ctx, &crate::operation::Single(Noop));
        assert!(ctx.get(&keys::AUTO_RUN_PREDICATE).0.is_satisfied(&ctx));
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
