//! `log_duration`: records one run's wall-clock time into
//! `context.logger`, when a host has configured one. Opt-in, not wired
//! into any `Store` automatically.

use std::time::Duration;

use async_trait::async_trait;

use crate::context::{keys, Context};
use crate::continuation::Continuation;
use crate::error::RuntimeError;
use crate::operation::{Modifier, Runnable};
use crate::path::Path;
use tracing::Instrument;

/// How a logged run ended, passed to [`Logger::record`] alongside its
/// elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    /// The operation returned successfully.
    Succeeded,
    /// The run was cancelled before it completed.
    Cancelled,
    /// The operation returned a failure.
    Failed,
}

/// A host-supplied sink for `log_duration`'s timing records.
///
/// Installed into `context.logger`; `log_duration` calls
/// [`Logger::span`] once per run and enters the returned span for the
/// call's duration, then calls [`Logger::record`] with the outcome.
pub trait Logger: Send + Sync {
    /// A `tracing::Span` to enter for the duration of one run at `path`.
    fn span(&self, path: &Path) -> tracing::Span;

    /// Called once the run completes, with its wall-clock duration.
    fn record(&self, path: &Path, elapsed: Duration, outcome: LogOutcome);
}

/// Enters `context.logger`'s span (if one is configured) for the duration
/// of the wrapped run and reports the elapsed time and outcome to it.
/// With no logger configured, this modifier does nothing.
pub struct LogDuration;

#[async_trait]
impl<Inner: Runnable> Modifier<Inner> for LogDuration {
    async fn run(
        &self,
        input: Inner::Input,
        ctx: Context,
        cont: Continuation<Inner::Value, Inner::Failure>,
        inner: &Inner,
    ) -> Result<Inner::Value, RuntimeError<Inner::Failure>> {
        let logger = ctx.get(&keys::LOGGER);
        let Some(logger) = logger else {
            return inner.execute(input, ctx, cont).await;
        };

        let path = inner.path();
        let span = logger.span(&path);

        let start = std::time::Instant::now();
        let result = inner.execute(input, ctx, cont).instrument(span).await;
        let elapsed = start.elapsed();

        let outcome = match &result {
            Ok(_) => LogOutcome::Succeeded,
            Err(e) if e.is_cancelled() => LogOutcome::Cancelled,
            Err(_) => LogOutcome::Failed,
        };
        logger.record(&path, elapsed, outcome);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{OperationCore, RunnableExt, Single, SingleOperation};
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct AlwaysOk;
    impl OperationCore for AlwaysOk {
        fn path(&self) -> Path {
            Path::from(["timed"])
        }
    }
    #[async_trait]
    impl SingleOperation for AlwaysOk {
        type Value = i32;
        type Failure = String;
        async fn run(&self, _ctx: Context, _cont: Continuation<i32, String>) -> Result<i32, String> {
            Ok(1)
        }
    }

    #[tokio::test]
    async fn with_no_logger_configured_the_result_passes_through_unchanged() {
        let modified = Single(AlwaysOk).modified(LogDuration);
        let (cont, _rx) = crate::continuation::channel();
        let result = modified.execute((), Context::new(), cont).await;
        assert_eq!(result.unwrap(), 1);
    }

    struct RecordingLogger {
        records: Mutex<Vec<(Path, LogOutcome)>>,
    }

    impl Logger for RecordingLogger {
        fn span(&self, path: &Path) -> tracing::Span {
            tracing::debug_span!("run", %path)
        }

        fn record(&self, path: &Path, _elapsed: Duration, outcome: LogOutcome) {
            self.records.lock().push((path.clone(), outcome));
        }
    }

    #[tokio::test]
    async fn a_configured_logger_records_one_entry_per_run() {
        let logger = Arc::new(RecordingLogger { records: Mutex::new(Vec::new()) });
        let mut ctx = Context::new();
        ctx.set(&keys::LOGGER, Some(Arc::clone(&logger) as Arc<dyn Logger>));

        let modified = Single(AlwaysOk).modified(LogDuration);
        let (cont, _rx) = crate::continuation::channel();
        let result = modified.execute((), ctx, cont).await;
        assert_eq!(result.unwrap(), 1);

        let records = logger.records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], (Path::from(["timed"]), LogOutcome::Succeeded));
    }
}
