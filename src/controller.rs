//! [`Controller`]: a long-lived component driven by a `controller(...)`
//! modifier that can yield, refetch, or reset its hosting `Store` from
//! outside signals.

use std::fmt;

use crate::context::Context;
use crate::subscription::Subscription;

/// A handle a [`Controller`] uses to drive its hosting
/// [`Store`](crate::store::Store) without depending on the store's
/// concrete value/failure/state types.
///
/// `Controls` is handed to each controller exactly once, at `Store`
/// construction, and is valid for the controller's lifetime; the
/// `Subscription` the controller's `attach` call returns is retained by
/// the `Store` and cancelled when the `Store` drops.
pub trait Controls: Send + Sync {
    /// Requests a refetch as if staleness had just become true.
    fn refetch(&self);

    /// Resets the hosting store's state to its initial value, cancelling
    /// any active tasks.
    fn reset(&self);

    /// Pushes a value directly into the hosting store's state, tagged
    /// `result_update_reason = final-returned`, without running the
    /// operation.
    fn yield_current_value_changed(&self);
}

impl fmt::Debug for dyn Controls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Controls(..)")
    }
}

/// A long-lived component installed by the `controller(...)` modifier.
///
/// `attach` is called once at `Store` construction with a `Controls`
/// handle; the returned `Subscription` is retained by the `Store` until
/// it drops. Typical controllers subscribe to an external
/// [`RunSpecification`](crate::run_spec::RunSpecification) (network
/// reachability, app activity) and call `controls.refetch()` on the
/// relevant transition — this is exactly what
/// [`crate::operation::modifiers::rerun_on_change`] installs.
pub trait Controller: Send + Sync {
    /// Wires this controller to its hosting store.
    fn attach(&self, ctx: &Context, controls: Box<dyn Controls>) -> Subscription;
}
