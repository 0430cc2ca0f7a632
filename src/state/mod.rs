//! The three state variants ([`single`], [`paginated`], [`mutation`]) and
//! the shape they share.

pub mod mutation;
pub mod paginated;
pub mod single;

use chrono::{DateTime, Utc};

/// A read-only snapshot of an [`OperationState`]'s common shape, the part
/// every paradigm shares: `current`/`initial` (shape varies
/// per paradigm, hence the type parameter), update counts and timestamps
/// for both value and error tracks, and `is_loading`.
#[derive(Debug, Clone)]
pub struct StateSnapshot<V, E> {
    /// The most recently produced value (or the paradigm's "empty" shape
    /// before anything has loaded).
    pub current: V,
    /// The value the state was constructed with, before any update.
    pub initial: V,
    /// How many times `current` has been updated.
    pub value_update_count: u64,
    /// When `current` was last updated, per `context.clock`.
    pub value_last_updated_at: Option<DateTime<Utc>>,
    /// The most recent failure, if the last run (or the run before a
    /// subsequent success cleared it) failed.
    pub error: Option<E>,
    /// How many times `error` has been set.
    pub error_update_count: u64,
    /// When `error` was last set.
    pub error_last_updated_at: Option<DateTime<Utc>>,
    /// `true` while at least one task is active.
    pub is_loading: bool,
}

/// The shape every `State` variant shares, independent of which paradigm
/// (single/paginated/mutation) produced it.
///
/// Paradigm-specific update/insertion rules (paginated page insertion,
/// bounded mutation history) live as inherent
/// methods on the concrete state types; this trait only exposes the
/// read-only common shape a `Store` and its subscribers observe
/// regardless of paradigm.
pub trait OperationState: Send + Sync {
    /// The paradigm-specific shape of `current`/`initial`.
    type Current: Clone + Send + Sync;
    /// The operation's failure type.
    type Failure: Clone + Send + Sync;

    /// A snapshot of the common shape.
    fn snapshot(&self) -> StateSnapshot<Self::Current, Self::Failure>;

    /// `true` while at least one task is active. Equivalent to
    /// `!active_tasks.is_empty()`.
    fn is_loading(&self) -> bool;

    /// Number of currently active tasks across every bucket this state
    /// variant tracks.
    fn active_task_count(&self) -> usize;
}
