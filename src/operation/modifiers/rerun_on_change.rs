//! `rerun_on_change`: installs a long-lived controller that refetches
//! whenever an external [`RunSpecification`] becomes true.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{keys, Context};
use crate::continuation::Continuation;
use crate::controller::{Controller, Controls};
use crate::error::RuntimeError;
use crate::operation::{Modifier, Runnable};
use crate::run_spec::RunSpecification;
use crate::subscription::Subscription;

/// A [`Controller`] that calls [`Controls::refetch`] whenever `spec`
/// transitions to `true`.
///
/// This is the concrete controller `rerun_on_change` installs; it is
/// itself just a [`Controller`] implementation, so a host can use it (or
/// one like it) directly via the `controller(...)` modifier instead of
/// `rerun_on_change` if it wants a custom trigger condition plumbed the
/// same way.
pub struct RerunOnChangeController {
    spec: Arc<dyn RunSpecification>,
}

impl RerunOnChangeController {
    /// Refetches whenever `spec` becomes `true`.
    pub fn new(spec: Arc<dyn RunSpecification>) -> Self {
        Self { spec }
    }
}

impl Controller for RerunOnChangeController {
    fn attach(&self, ctx: &Context, controls: Box<dyn Controls>) -> Subscription {
        let controls: Arc<dyn Controls> = Arc::from(controls);
        self.spec.subscribe(
            ctx,
            Box::new(move |became_true| {
                if became_true {
                    controls.refetch();
                }
            }),
        )
    }
}

/// Registers a [`RerunOnChangeController`] for `spec` on the hosting
/// `Store`, installed at construction and retained for the store's
/// lifetime.
pub struct RerunOnChange {
    spec: Arc<dyn RunSpecification>,
}

impl RerunOnChange {
    /// Refetches the hosting store whenever `spec` becomes `true`.
    pub fn new(spec: Arc<dyn RunSpecification>) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl<Inner: Runnable> Modifier<Inner> for RerunOnChange {
    fn setup(&self, ctx: &mut Context, _inner: &Inner) {
        let mut controllers = ctx.get(&keys::CONTROLLERS);
        controllers.push(Arc::new(RerunOnChangeController::new(Arc::clone(&self.spec))) as Arc<dyn Controller>);
        ctx.set(&keys::CONTROLLERS, controllers);
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
    use crate::run_spec::Predicate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingControls(Arc<AtomicUsize>);
    impl Controls for RecordingControls {
        fn refetch(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn reset(&self) {}
        fn yield_current_value_changed(&self) {}
    }

    #[test]
    fn attach_registers_a_subscription() {
        let ctx = Context::new();
        let spec: Arc<dyn RunSpecification> = Arc::new(Predicate::new(|_: &Context| true));
        let controller = RerunOnChangeController::new(spec);
        let refetches = Arc::new(AtomicUsize::new(0));
        let sub = controller.attach(&ctx, Box::new(RecordingControls(refetches)));
        assert!(sub.is_active());
    }
}
