//! Adapters from existing executors to [`Scheduler`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Job, Scheduler, TaskHandle, guarded};

/// Default time an owned executor is given to drain on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Something that can run a [`Job`] somewhere.
pub trait Executor: Send + Sync + 'static {
    /// Submits a job.
    fn execute(&self, job: Job);

    /// Releases the executor, waiting at most `grace` for running work.
    ///
    /// The default simply drops it.
    fn shutdown(self, grace: Duration)
    where
        Self: Sized,
    {
        let _ = grace;
    }
}

impl Executor for tokio::runtime::Runtime {
    fn execute(&self, job: Job) {
        self.spawn_blocking(job);
    }

    fn shutdown(self, grace: Duration) {
        // Blocking shutdown is not allowed from inside a runtime.
        if tokio::runtime::Handle::try_current().is_ok() {
            self.shutdown_background();
        } else {
            self.shutdown_timeout(grace);
        }
    }
}

/// Borrowed runtime. Shutdown leaves the runtime running.
impl Executor for tokio::runtime::Handle {
    fn execute(&self, job: Job) {
        self.spawn_blocking(job);
    }
}

impl Executor for rayon::ThreadPool {
    fn execute(&self, job: Job) {
        self.spawn(job);
    }
}

impl Executor for Arc<rayon::ThreadPool> {
    fn execute(&self, job: Job) {
        self.spawn(job);
    }
}

/// Executor backed by a closure.
///
/// ```rust,ignore
/// let scheduler = ExecutorScheduler::new(FnExecutor(|job| {
///     std::thread::spawn(job);
/// }));
/// ```
pub struct FnExecutor<F>(pub F);

impl<F> Executor for FnExecutor<F>
where
    F: Fn(Job) + Send + Sync + 'static,
{
    fn execute(&self, job: Job) {
        (self.0)(job)
    }
}

// ─── ExecutorScheduler ──────────────────────────────────────────────────────

/// A [`Scheduler`] over any [`Executor`].
pub struct ExecutorScheduler<E> {
    name: &'static str,
    executor: RwLock<Option<E>>,
    root: CancellationToken,
    grace: Duration,
}

impl<E: Executor> ExecutorScheduler<E> {
    pub fn new(executor: E) -> Self {
        Self::with_grace(executor, DEFAULT_SHUTDOWN_GRACE)
    }

    pub fn with_grace(executor: E, grace: Duration) -> Self {
        Self {
            name: "executor",
            executor: RwLock::new(Some(executor)),
            root: CancellationToken::new(),
            grace,
        }
    }

    /// Sets the name used in log records.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Returns true once [`shutdown`](Scheduler::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.root.is_cancelled()
    }
}

impl<E: Executor> Scheduler for ExecutorScheduler<E> {
    fn schedule(&self, job: Job) -> TaskHandle {
        let executor = self.executor.read();
        let Some(executor) = executor.as_ref() else {
            warn!(scheduler = self.name, "Scheduler is shut down, job rejected");
            return TaskHandle::rejected();
        };

        let token = self.root.child_token();
        executor.execute(guarded(token.clone(), job));
        TaskHandle::new(token)
    }

    fn shutdown(&self) {
        self.root.cancel();
        let executor = self.executor.write().take();
        if let Some(executor) = executor {
            debug!(scheduler = self.name, grace = ?self.grace, "Shutting down scheduler");
            executor.shutdown(self.grace);
        }
    }
}

/// Wraps an executor as a shareable scheduler.
pub fn from_executor<E: Executor>(executor: E) -> Arc<dyn Scheduler> {
    Arc::new(ExecutorScheduler::new(executor))
}
