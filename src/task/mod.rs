//! [`Task`]: a cancellable, memoized unit of async work with dependency
//! ordering.
//!
//! A `Task` transitions `unstarted -> running -> finished` at most once;
//! [`Task::run_if_needed`] is idempotent — concurrent callers serialize on
//! the task's internal state and all observe the same result. Dependencies
//! added through [`Task::schedule_after`] must complete (success or
//! failure) before the task's own work begins; multiple dependencies run
//! concurrently with respect to each other.

mod dependency;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::context::Context;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::RuntimeError;

pub use dependency::would_cycle;

/// Boxed async work a `Task` executes exactly once.
pub type Work<V, E> =
    Box<dyn FnOnce(TaskConfig) -> Pin<Box<dyn Future<Output = Result<V, E>> + Send>> + Send>;

/// Static configuration handed to a task's work closure: name/priority for
/// diagnostics and scheduling hints, plus the `Context` it runs under.
#[derive(Clone)]
pub struct TaskConfig {
    /// Human-readable name, surfaced in `tracing` spans and diagnostics.
    pub name: Option<String>,
    /// Scheduling priority hint; the runtime does not interpret this
    /// itself (no priority scheduler is specified), but it is threaded
    /// through for a host's own executor integration.
    pub priority: Option<i32>,
    /// The context this task runs under, including `current_task_info`
    /// and `current_store` set by the `Store` before scheduling.
    pub context: Context,
}

/// A lightweight, `Clone + Send + Sync + 'static` descriptor of a running
/// task, installed into `context.current_task_info` for the duration of a
/// run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    /// The task's dense, monotonic, process-local id.
    pub id: u64,
    /// The task's configured name, if any.
    pub name: Option<Arc<str>>,
}

/// How a task's single execution ended.
#[derive(Debug, Clone)]
enum Outcome<V, E> {
    Completed(Result<V, E>),
    Cancelled,
}

impl<V: Clone, E: Clone> Outcome<V, E> {
    fn into_runtime_result(self) -> Result<V, RuntimeError<E>> {
        match self {
            Self::Completed(Ok(v)) => Ok(v),
            Self::Completed(Err(e)) => Err(RuntimeError::from(e)),
            Self::Cancelled => Err(RuntimeError::Cancelled),
        }
    }
}

enum Phase<V, E> {
    Unstarted,
    Running(tokio::task::JoinHandle<()>),
    Finished(Outcome<V, E>),
}

/// Type-erased view of a `Task`, used to build heterogeneous dependency
/// graphs: a `Task<A, EA>` can depend on a `Task<B, EB>` without either
/// side needing to know the other's value/failure types.
#[async_trait]
pub trait ErasedTask: Send + Sync {
    /// The task's id.
    fn id(&self) -> u64;

    /// Awaits the task's completion (success, failure, or cancellation)
    /// without exposing its result.
    async fn wait_done(&self);

    /// The task's direct dependencies, for cycle-detection traversal.
    fn dependency_snapshot(&self) -> Vec<Arc<dyn ErasedTask>>;
}

struct TaskInner<V, E> {
    id: u64,
    config: TaskConfig,
    dependencies: Mutex<Vec<Arc<dyn ErasedTask>>>,
    work: Mutex<Option<Work<V, E>>>,
    phase: Mutex<Phase<V, E>>,
    result_tx: watch::Sender<Option<Outcome<V, E>>>,
    result_rx: watch::Receiver<Option<Outcome<V, E>>>,
    awaiters: AtomicUsize,
    diagnostics: Diagnostics,
}

/// A cancellable, memoized unit of executable work.
///
/// Cloning a `Task` is cheap (it wraps an `Arc`) and shares the same
/// underlying execution: two clones calling `run_if_needed` concurrently
/// trigger exactly one run of the work closure.
pub struct Task<V, E> {
    inner: Arc<TaskInner<V, E>>,
}

impl<V, E> Clone for Task<V, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, E> Task<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Builds a new, unstarted task.
    pub fn new(id: u64, config: TaskConfig, diagnostics: Diagnostics, work: Work<V, E>) -> Self {
        let (result_tx, result_rx) = watch::channel(None);
        Self {
            inner: Arc::new(TaskInner {
                id,
                config,
                dependencies: Mutex::new(Vec::new()),
                work: Mutex::new(Some(work)),
                phase: Mutex::new(Phase::Unstarted),
                result_tx,
                result_rx,
                awaiters: AtomicUsize::new(0),
                diagnostics,
            }),
        }
    }

    /// The task's dense, monotonic, process-local id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// A lightweight descriptor suitable for `context.current_task_info`.
    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.inner.id,
            name: self.inner.config.name.as_deref().map(Arc::from),
        }
    }

    /// Registers `dependency` as something this task must wait on before
    /// its own work begins.
    ///
    /// If adding the edge would introduce a cycle (detected via DFS with
    /// a visited set, rooted at `dependency`, searching for `self.id()`),
    /// the edge is **not** added and a [`Diagnostic::CycleDetected`] is
    /// reported instead of failing.
    pub fn schedule_after(&self, dependency: Arc<dyn ErasedTask>) {
        if dependency::would_cycle(&dependency, self.id()) {
            self.inner.diagnostics.report(Diagnostic::CycleDetected {
                task_id: self.id(),
                dependency_id: dependency.id(),
            });
            return;
        }
        self.inner.dependencies.lock().push(dependency);
    }

    /// Runs the task if it hasn't started, or awaits its existing run
    /// otherwise. Idempotent: every caller, concurrent or sequential,
    /// observes the same result.
    ///
    /// If the future returned by this call is dropped before completion
    /// and it was the last outstanding awaiter, the task's underlying
    /// execution is aborted and the task transitions to
    /// `finished(Err(Cancelled))`; subsequent callers observe that same
    /// cancellation.
    #[tracing::instrument(skip(self), fields(task_id = self.id()))]
    pub async fn run_if_needed(&self) -> Result<V, RuntimeError<E>> {
        self.inner.awaiters.fetch_add(1, Ordering::SeqCst);
        let _guard = AwaiterGuard {
            inner: Arc::clone(&self.inner),
        };

        self.ensure_started();

        let mut rx = self.inner.result_rx.clone();
        loop {
            if let Some(outcome) = rx.borrow().clone() {
                return outcome.into_runtime_result();
            }
            if rx.changed().await.is_err() {
                return Err(RuntimeError::Cancelled);
            }
        }
    }

    /// Produces a lightweight task sharing this task's underlying
    /// execution (no re-run) but transforming its successful value.
    pub fn map<V2, F>(&self, f: F) -> Mapped<V, E, V2>
    where
        V2: Send + Sync + 'static,
        F: Fn(V) -> V2 + Send + Sync + 'static,
    {
        Mapped {
            inner: self.clone(),
            map: Arc::new(f),
        }
    }

    /// Forcibly cancels this task regardless of how many awaiters remain.
    /// A no-op if the task has already finished or never started. Used by
    /// [`Store::reset_state`](crate::store::Store::reset_state) to tear
    /// down active tasks before resetting state.
    pub fn cancel(&self) {
        let mut phase = self.inner.phase.lock();
        if let Phase::Running(handle) = &*phase {
            handle.abort();
            *phase = Phase::Finished(Outcome::Cancelled);
            let _ = self.inner.result_tx.send(Some(Outcome::Cancelled));
        }
    }

    fn ensure_started(&self) {
        let mut phase = self.inner.phase.lock();
        if matches!(&*phase, Phase::Unstarted) {
            let Some(work) = self.inner.work.lock().take() else {
                return;
            };
            let config = self.inner.config.clone();
            let deps = self.inner.dependencies.lock().clone();
            let inner = Arc::clone(&self.inner);
            let handle = tokio::spawn(async move {
                join_all(deps.iter().map(|d| d.wait_done())).await;
                let result = work(config).await;
                let outcome = Outcome::Completed(result);
                *inner.phase.lock() = Phase::Finished(outcome.clone());
                let _ = inner.result_tx.send(Some(outcome));
            });
            *phase = Phase::Running(handle);
        }
    }
}

#[async_trait]
impl<V, E> ErasedTask for Task<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn id(&self) -> u64 {
        self.id()
    }

    async fn wait_done(&self) {
        let _ = self.run_if_needed().await;
    }

    fn dependency_snapshot(&self) -> Vec<Arc<dyn ErasedTask>> {
        self.inner.dependencies.lock().clone()
    }
}

/// The result of [`Task::map`]: shares its source task's execution and
/// transforms the successful value on read.
pub struct Mapped<V, E, V2> {
    inner: Task<V, E>,
    map: Arc<dyn Fn(V) -> V2 + Send + Sync>,
}

impl<V, E, V2> Mapped<V, E, V2>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// The underlying task's id.
    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    /// Awaits the underlying task (triggering it if needed) and maps its
    /// successful value.
    pub async fn run_if_needed(&self) -> Result<V2, RuntimeError<E>> {
        self.inner.run_if_needed().await.map(|v| (self.map)(v))
    }
}

struct AwaiterGuard<V, E> {
    inner: Arc<TaskInner<V, E>>,
}

impl<V, E> Drop for AwaiterGuard<V, E> {
    fn drop(&mut self) {
        if self.inner.awaiters.fetch_sub(1, Ordering::SeqCst) != 1 {
            return;
        }
        // We were the last outstanding awaiter. If the task is still
        // running, nobody is left to observe its result: abort the
        // underlying handle and record a cancellation so any awaiter
        // that arrives later sees it immediately.
        let mut phase = self.inner.phase.lock();
        if let Phase::Running(handle) = &*phase {
            handle.abort();
            *phase = Phase::Finished(Outcome::Cancelled);
            let _ = self.inner.result_tx.send(Some(Outcome::Cancelled));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use std::sync::atomic::AtomicU32;

    fn config() -> TaskConfig {
        TaskConfig {
            name: None,
            priority: None,
            context: Context::new(),
        }
    }

    fn make_task<F>(id: u64, work: F) -> Task<i32, String>
    where
        F: FnOnce(TaskConfig) -> Pin<Box<dyn Future<Output = Result<i32, String>> + Send>>
            + Send
            + 'static,
    {
        Task::new(id, config(), Diagnostics::default(), Box::new(work))
    }

    #[tokio::test]
    async fn run_if_needed_executes_work_exactly_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let task = make_task(0, move |_| {
            let calls = Arc::clone(&calls_clone);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
        });

        let t1 = task.clone();
        let t2 = task.clone();
        let (r1, r2) = tokio::join!(t1.run_if_needed(), t2.run_if_needed());
        assert_eq!(r1.unwrap(), 42);
        assert_eq!(r2.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_if_needed_is_idempotent() {
        let task = make_task(1, |_| Box::pin(async { Ok(7) }));
        for _ in 0..5 {
            assert_eq!(task.run_if_needed().await.unwrap(), 7);
        }
    }

    #[tokio::test]
    async fn dependencies_run_before_this_tasks_work() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_dep = Arc::clone(&order);
        let dep: Arc<dyn ErasedTask> = Arc::new(make_task(0, move |_| {
            let order = Arc::clone(&order_dep);
            Box::pin(async move {
                order.lock().push("dep");
                Ok(1)
            })
        }));

        let order_main = Arc::clone(&order);
        let task = make_task(1, move |_| {
            let order = Arc::clone(&order_main);
            Box::pin(async move {
                order.lock().push("main");
                Ok(2)
            })
        });
        task.schedule_after(dep);

        task.run_if_needed().await.unwrap();
        assert_eq!(*order.lock(), vec!["dep", "main"]);
    }

    #[tokio::test]
    async fn cycle_is_rejected_and_reported() {
        let sink = Arc::new(crate::diagnostics::RecordingDiagnosticSink::new());
        let diagnostics = Diagnostics::new(sink.clone());

        let a = Task::new(10, config(), diagnostics.clone(), Box::new(|_| Box::pin(async { Ok(1) })));
        let b = Task::new(11, config(), diagnostics, Box::new(|_| Box::pin(async { Ok(2) })));

        let a_erased: Arc<dyn ErasedTask> = Arc::new(a.clone());
        let b_erased: Arc<dyn ErasedTask> = Arc::new(b.clone());

        b.schedule_after(a_erased);
        // a depending on b would close a cycle (a -> b -> a).
        a.schedule_after(b_erased);

        assert_eq!(sink.events().len(), 1);
        assert!(a.inner.dependencies.lock().is_empty());
    }
}
