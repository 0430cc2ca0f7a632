//! [`RunSpecification`]: boolean-composable observable predicates used to
//! build auto-run toggles, stale conditions, and rerun-on-change triggers.

use std::sync::Arc;

use crate::context::Context;
use crate::subscription::Subscription;

/// An observable boolean predicate over a `Context`.
///
/// Implementors drive modifiers like `enable_automatic_running`,
/// `stale_when`, and `rerun_on_change`. Boolean operators (`!`, `&&`,
/// `||`) compose specs into derived ones whose `subscribe` recomputes
/// from the inputs — see [`Not`], [`And`], [`Or`].
pub trait RunSpecification: Send + Sync {
    /// The predicate's current value.
    fn is_satisfied(&self, ctx: &Context) -> bool;

    /// Registers `on_change`, invoked with the new value whenever this
    /// spec's truth value could have changed. Implementations that have
    /// no underlying signal (e.g. [`AlwaysTrue`]) return a no-op
    /// subscription and never invoke the callback.
    fn subscribe(&self, ctx: &Context, on_change: Box<dyn Fn(bool) + Send + Sync>) -> Subscription;
}

/// Always `true`. Default for `auto_run_predicate`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysTrue;

impl RunSpecification for AlwaysTrue {
    fn is_satisfied(&self, _ctx: &Context) -> bool {
        true
    }
    fn subscribe(&self, _ctx: &Context, _on_change: Box<dyn Fn(bool) + Send + Sync>) -> Subscription {
        Subscription::noop()
    }
}

/// Always `true`, used as `stale_predicate`'s conjunction identity so
/// composing no `stale_when` modifiers still means "always stale".
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysStale;

impl RunSpecification for AlwaysStale {
    fn is_satisfied(&self, _ctx: &Context) -> bool {
        true
    }
    fn subscribe(&self, _ctx: &Context, _on_change: Box<dyn Fn(bool) + Send + Sync>) -> Subscription {
        Subscription::noop()
    }
}

/// Always `false`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Never;

impl RunSpecification for Never {
    fn is_satisfied(&self, _ctx: &Context) -> bool {
        false
    }
    fn subscribe(&self, _ctx: &Context, _on_change: Box<dyn Fn(bool) + Send + Sync>) -> Subscription {
        Subscription::noop()
    }
}

/// A boolean-valued [`RunSpecification`] backed by a plain closure, with
/// no notion of change notification. Useful for `stale_when`'s
/// state-predicate variant.
pub struct Predicate<F>(F);

impl<F> Predicate<F>
where
    F: Fn(&Context) -> bool + Send + Sync,
{
    /// Wraps `f` as a `RunSpecification`.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> RunSpecification for Predicate<F>
where
    F: Fn(&Context) -> bool + Send + Sync,
{
    fn is_satisfied(&self, ctx: &Context) -> bool {
        (self.0)(ctx)
    }
    fn subscribe(&self, _ctx: &Context, _on_change: Box<dyn Fn(bool) + Send + Sync>) -> Subscription {
        Subscription::noop()
    }
}

/// Logical negation of an inner spec.
pub struct Not(pub Arc<dyn RunSpecification>);

impl RunSpecification for Not {
    fn is_satisfied(&self, ctx: &Context) -> bool {
        !self.0.is_satisfied(ctx)
    }
    fn subscribe(&self, ctx: &Context, on_change: Box<dyn Fn(bool) + Send + Sync>) -> Subscription {
        self.0.subscribe(ctx, Box::new(move |v| on_change(!v)))
    }
}

/// Logical conjunction of two specs: recomputes when either changes.
pub struct And(pub Arc<dyn RunSpecification>, pub Arc<dyn RunSpecification>);

impl RunSpecification for And {
    fn is_satisfied(&self, ctx: &Context) -> bool {
        self.0.is_satisfied(ctx) && self.1.is_satisfied(ctx)
    }
    fn subscribe(&self, ctx: &Context, on_change: Box<dyn Fn(bool) + Send + Sync>) -> Subscription {
        let on_change = Arc::new(on_change);
        let a = Arc::clone(&self.0);
        let b = Arc::clone(&self.1);
        let ctx_a = ctx.clone();
        let ctx_b = ctx.clone();
        let oc1 = Arc::clone(&on_change);
        let sub_a = self.0.subscribe(
            ctx,
            Box::new(move |_| oc1(a.is_satisfied(&ctx_a) && b.is_satisfied(&ctx_a))),
        );
        let a2 = Arc::clone(&self.0);
        let b2 = Arc::clone(&self.1);
        let sub_b = self.1.subscribe(
            ctx,
            Box::new(move |_| on_change(a2.is_satisfied(&ctx_b) && b2.is_satisfied(&ctx_b))),
        );
        Subscription::combined(vec![sub_a, sub_b])
    }
}

/// Logical disjunction of two specs: recomputes when either changes.
pub struct Or(pub Arc<dyn RunSpecification>, pub Arc<dyn RunSpecification>);

impl RunSpecification for Or {
    fn is_satisfied(&self, ctx: &Context) -> bool {
        self.0.is_satisfied(ctx) || self.1.is_satisfied(ctx)
    }
    fn subscribe(&self, ctx: &Context, on_change: Box<dyn Fn(bool) + Send + Sync>) -> Subscription {
        let on_change = Arc::new(on_change);
        let a = Arc::clone(&self.0);
        let b = Arc::clone(&self.1);
        let ctx_a = ctx.clone();
        let ctx_b = ctx.clone();
        let oc1 = Arc::clone(&on_change);
        let sub_a = self.0.subscribe(
            ctx,
            Box::new(move |_| oc1(a.is_satisfied(&ctx_a) || b.is_satisfied(&ctx_a))),
        );
        let a2 = Arc::clone(&self.0);
        let b2 = Arc::clone(&self.1);
        let sub_b = self.1.subscribe(
            ctx,
            Box::new(move |_| on_change(a2.is_satisfied(&ctx_b) || b2.is_satisfied(&ctx_b))),
        );
        Subscription::combined(vec![sub_a, sub_b])
    }
}

/// Extension methods for composing `Arc<dyn RunSpecification>` values with
/// `!`/`&`/`|`-like ergonomics without operator-overload trait gymnastics
/// over `dyn` objects.
pub trait RunSpecificationExt {
    /// `!self`.
    fn negated(self) -> Arc<dyn RunSpecification>;
    /// `self && other`.
    fn and(self, other: Arc<dyn RunSpecification>) -> Arc<dyn RunSpecification>;
    /// `self || other`.
    fn or(self, other: Arc<dyn RunSpecification>) -> Arc<dyn RunSpecification>;
}

impl RunSpecificationExt for Arc<dyn RunSpecification> {
    fn negated(self) -> Arc<dyn RunSpecification> {
        Arc::new(Not(self))
    }
    fn and(self, other: Arc<dyn RunSpecification>) -> Arc<dyn RunSpecification> {
        Arc::new(And(self, other))
    }
    fn or(self, other: Arc<dyn RunSpecification>) -> Arc<dyn RunSpecification> {
        Arc::new(Or(self, other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_or_not_compose() {
        let ctx = Context::new();
        let t: Arc<dyn RunSpecification> = Arc::new(AlwaysTrue);
        let f: Arc<dyn RunSpecification> = Arc::new(Never);

        assert!(t.clone().and(t.clone()).is_satisfied(&ctx));
        assert!(!t.clone().and(f.clone()).is_satisfied(&ctx));
        assert!(t.clone().or(f.clone()).is_satisfied(&ctx));
        assert!(!f.clone().or(f.clone()).is_satisfied(&ctx));
        assert!(!t.negated().is_satisfied(&ctx));
    }
}
