use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Job, Scheduler, TaskHandle, guarded};

// ─── Current thread ─────────────────────────────────────────────────────────

/// Runs each job inline, before [`schedule`](Scheduler::schedule) returns.
#[derive(Debug, Default)]
pub struct CurrentThreadScheduler;

impl Scheduler for CurrentThreadScheduler {
    fn schedule(&self, job: Job) -> TaskHandle {
        job();
        TaskHandle::completed()
    }
}

// ─── New thread ─────────────────────────────────────────────────────────────

/// Spawns one named OS thread per job.
#[derive(Debug)]
pub struct NewThreadScheduler {
    root: CancellationToken,
    spawned: AtomicUsize,
}

impl NewThreadScheduler {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            spawned: AtomicUsize::new(0),
        }
    }
}

impl Default for NewThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for NewThreadScheduler {
    fn schedule(&self, job: Job) -> TaskHandle {
        if self.root.is_cancelled() {
            warn!("New-thread scheduler is shut down, job rejected");
            return TaskHandle::rejected();
        }

        let token = self.root.child_token();
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let spawned = thread::Builder::new()
            .name(format!("codebus-thread-{n}"))
            .spawn(guarded(token.clone(), job));

        if let Err(e) = spawned {
            warn!(error = %e, "Failed to spawn handler thread");
            token.cancel();
        }
        TaskHandle::new(token)
    }

    fn shutdown(&self) {
        self.root.cancel();
    }
}
