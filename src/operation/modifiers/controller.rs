//! `controller`: installs an arbitrary, host-supplied [`Controller`] on
//! the hosting store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{keys, Context};
use crate::continuation::Continuation;
use crate::controller::Controller;
use crate::error::RuntimeError;
use crate::operation::{Modifier, Runnable};

/// Registers `controller` on the hosting `Store`, installed at
/// construction and retained for the store's lifetime.
///
/// Unlike [`super::rerun_on_change::RerunOnChange`], which installs a
/// fixed refetch-on-change controller, this accepts any
/// [`Controller`] implementation — a network-reachability watcher, an
/// app-foreground observer, anything that needs a `Controls` handle into
/// its hosting store.
pub struct WithController {
    controller: Arc<dyn Controller>,
}

impl WithController {
    /// Installs `controller` on the hosting store.
    pub fn new(controller: Arc<dyn Controller>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl<Inner: Runnable> Modifier<Inner> for WithController {
    fn setup(&self, ctx: &mut Context, _inner: &Inner) {
        let mut controllers = ctx.get(&keys::CONTROLLERS);
        controllers.push(Arc::clone(&self.controller));
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
    use crate::context::keys;
    use crate::subscription::Subscription;

    struct Noop;
    impl Controller for Noop {
        fn attach(&self, _ctx: &Context, _controls: Box<dyn crate::controller::Controls>) -> Subscription {
            Subscription::noop()
        }
    }

    struct DummyInner;
    impl crate::operation::OperationCore for DummyInner {
        fn path(&self) -> crate::path::Path {
            crate::path::Path::from(["dummy"])
        }
    }
    #[async_trait]
    impl crate::operation::SingleOperation for DummyInner {
        type Value = ();
        type Failure = ();
        async fn run(&self, _ctx: Context, _cont: Continuation<(), ()>) -> Result<(), ()> {
            Ok(())
        }
    }

    #[test]
    fn setup_appends_to_controllers_list() {
        let mut ctx = Context::new();
        let modifier = WithController::new(Arc::new(Noop));
        let inner = crate::operation::Single(DummyInner);
        Modifier::<crate::operation::Single<DummyInner>>::setup(&modifier, &mut ctx, &inner);
        assert_eq!(ctx.get(&keys::CONTROLLERS).iter().count(), 1);
    }
}
