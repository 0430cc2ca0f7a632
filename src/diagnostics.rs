//! Injectable sink for runtime-integrity diagnostics.
//!
//! Cycle detection and duplicate-path conflicts are diagnostics that
//! never throw — they preserve best-effort correctness rather than
//! unwinding the caller. [`DiagnosticSink`] lets a host application observe
//! them (log, metric, panic-in-tests) without the runtime itself taking a
//! position on how they should be reported.

use std::fmt;
use std::sync::Arc;

use crate::path::Path;

/// A runtime-integrity problem that was handled internally.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    /// Two different operation types were registered under the same
    /// [`Path`]. The second registration gets an unretained `Store`; the
    /// first remains canonical.
    DuplicatePathConflict {
        /// The path both operations share.
        path: Path,
    },
    /// Adding a task dependency would have introduced a cycle. The
    /// offending edge was not added.
    CycleDetected {
        /// The task that attempted to schedule after a dependency that
        /// would cycle back to it.
        task_id: u64,
        /// The dependency task id that would have closed the cycle.
        dependency_id: u64,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicatePathConflict { path } => {
                write!(f, "duplicate path conflict at {path}: a different operation type is already registered here")
            }
            Self::CycleDetected {
                task_id,
                dependency_id,
            } => write!(
                f,
                "cycle detected: task {task_id} cannot depend on task {dependency_id}"
            ),
        }
    }
}

/// Receives [`Diagnostic`]s as they occur.
///
/// The default sink logs via `tracing::warn!` and keeps no history. Tests
/// that need to assert a diagnostic fired should install a
/// [`RecordingDiagnosticSink`].
pub trait DiagnosticSink: Send + Sync {
    /// Called synchronously from wherever the diagnostic was detected.
    fn report(&self, diagnostic: Diagnostic);
}

/// Logs every diagnostic at `warn` level via `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnosticSink;

impl DiagnosticSink for TracingDiagnosticSink {
    fn report(&self, diagnostic: Diagnostic) {
        tracing::warn!(%diagnostic, "operon runtime diagnostic");
    }
}

/// Collects diagnostics into a `Vec` behind a mutex, for assertions in
/// tests.
#[derive(Debug, Default)]
pub struct RecordingDiagnosticSink {
    events: parking_lot::Mutex<Vec<Diagnostic>>,
}

impl RecordingDiagnosticSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every diagnostic reported so far, in order.
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events.lock().clone()
    }
}

impl DiagnosticSink for RecordingDiagnosticSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.events.lock().push(diagnostic);
    }
}

/// Type-erased handle to a [`DiagnosticSink`], cheap to clone and share
/// across `Store`s and `Task`s.
#[derive(Clone)]
pub struct Diagnostics(Arc<dyn DiagnosticSink>);

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Diagnostics(..)")
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self(Arc::new(TracingDiagnosticSink))
    }
}

impl Diagnostics {
    /// Wraps an arbitrary sink.
    pub fn new(sink: Arc<dyn DiagnosticSink>) -> Self {
        Self(sink)
    }

    /// Reports a diagnostic to the underlying sink.
    pub fn report(&self, diagnostic: Diagnostic) {
        self.0.report(diagnostic);
    }
}
