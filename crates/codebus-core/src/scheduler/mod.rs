//! Execution contexts for handler invocations.
//!
//! Every handler names a scheduler code. The built-in codes are:
//!
//! | code | scheduler |
//! |------|-----------|
//! | [`CURRENT_THREAD`] | inline, before `post` returns |
//! | [`NEW_THREAD`] | one dedicated OS thread per job |
//! | [`IO_POOL`] | shared, growable blocking pool |
//! | [`COMPUTE_POOL`] | shared, fixed-size pool |
//!
//! Codes from [`FIRST_CUSTOM`] upward are free for caller-supplied
//! schedulers, see [`Bus::add_scheduler`](crate::Bus::add_scheduler).
//!
//! Cancellation is cooperative: a cancelled job that has not started is
//! skipped, a running job is never interrupted.

mod builtin;
mod executor;
mod table;

pub use builtin::{CurrentThreadScheduler, NewThreadScheduler};
pub use executor::{
    DEFAULT_SHUTDOWN_GRACE, Executor, ExecutorScheduler, FnExecutor, from_executor,
};
pub(crate) use table::SchedulerTable;

use tokio_util::sync::CancellationToken;

/// Runs the job on the posting thread.
pub const CURRENT_THREAD: i32 = 0;
/// Runs the job on a new thread.
pub const NEW_THREAD: i32 = 1;
/// Runs the job on the shared I/O pool.
pub const IO_POOL: i32 = 2;
/// Runs the job on the shared compute pool.
pub const COMPUTE_POOL: i32 = 4;
/// The first code available to custom schedulers.
pub const FIRST_CUSTOM: i32 = 1024;

/// A unit of work handed to a scheduler.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// An execution context.
pub trait Scheduler: Send + Sync + 'static {
    /// Submits a job.
    fn schedule(&self, job: Job) -> TaskHandle;

    /// Stops accepting work and cancels queued jobs on a best-effort basis.
    fn shutdown(&self) {}
}

/// Handle to one scheduled job.
#[derive(Clone, Debug, Default)]
pub struct TaskHandle {
    token: Option<CancellationToken>,
}

impl TaskHandle {
    /// A handle that cannot be cancelled (the job already ran).
    pub fn completed() -> Self {
        Self { token: None }
    }

    /// A handle for work that was rejected before it was queued.
    pub fn rejected() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self { token: Some(token) }
    }

    /// Wraps a job's cancellation token.
    pub fn new(token: CancellationToken) -> Self {
        Self { token: Some(token) }
    }

    /// Requests cancellation. No effect once the job has started.
    pub fn cancel(&self) {
        if let Some(token) = &self.token {
            token.cancel();
        }
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// Wraps `job` so it is skipped if `token` is cancelled before it starts.
pub(crate) fn guarded(token: CancellationToken, job: Job) -> Job {
    Box::new(move || {
        if token.is_cancelled() {
            tracing::trace!("Skipped cancelled job");
            return;
        }
        job();
    })
}
