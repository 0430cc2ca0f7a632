//! Error types surfaced to callers of the runtime.
//!
//! The taxonomy follows the separation the rest of the crate relies on:
//! user operation failures and cancellation travel through [`RuntimeError`]
//! and are returned to callers, while integrity problems inside the runtime
//! itself ([`DuplicatePathConflict`](crate::diagnostics::Diagnostic::DuplicatePathConflict)
//! and [`CycleDetected`](crate::diagnostics::Diagnostic::CycleDetected)) are
//! diagnostics that never propagate as errors — see [`crate::diagnostics`].

use std::fmt;

/// Errors an awaiter of a [`Task`](crate::task::Task) or
/// [`Store::run`](crate::store::Store::run) can observe.
///
/// `E` is the user operation's own failure type and is carried through
/// transparently; the runtime never inspects it.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError<E> {
    /// The user operation returned a failure.
    #[error(transparent)]
    Operation(#[from] OperationFailure<E>),

    /// The run was cancelled: the awaiting scope was dropped, the task's
    /// join handle was cancelled, or [`Store::reset_state`](crate::store::Store::reset_state)
    /// cancelled every active task.
    #[error("operation run was cancelled")]
    Cancelled,

    /// `context.client` held a weak handle whose [`Client`](crate::client::Client)
    /// had already been dropped.
    #[error("client is no longer available")]
    ClientUnavailable,
}

impl<E> RuntimeError<E> {
    /// `true` if this is a [`RuntimeError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The user operation failure, if that's what this is.
    pub fn operation_failure(&self) -> Option<&E> {
        match self {
            Self::Operation(OperationFailure(e)) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<E> for RuntimeError<E> {
    fn from(e: E) -> Self {
        Self::Operation(OperationFailure(e))
    }
}

impl<E> Clone for RuntimeError<E>
where
    E: Clone,
{
    fn clone(&self) -> Self {
        match self {
            Self::Operation(f) => Self::Operation(f.clone()),
            Self::Cancelled => Self::Cancelled,
            Self::ClientUnavailable => Self::ClientUnavailable,
        }
    }
}

/// Thin wrapper distinguishing "the user operation failed with `E`" from
/// the runtime's own error variants, so `#[from]` doesn't collide with
/// a blanket `From<E>`.
#[derive(Debug, Clone)]
pub struct OperationFailure<E>(pub E);

impl<E: fmt::Display> fmt::Display for OperationFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for OperationFailure<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom")
        }
    }
    impl std::error::Error for Boom {}

    #[test]
    fn operation_failure_roundtrips() {
        let err: RuntimeError<Boom> = Boom.into();
        assert_eq!(err.operation_failure(), Some(&Boom));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn cancelled_is_not_an_operation_failure() {
        let err: RuntimeError<Boom> = RuntimeError::Cancelled;
        assert!(err.is_cancelled());
        assert_eq!(err.operation_failure(), None);
    }
}
