use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{
    COMPUTE_POOL, CURRENT_THREAD, CurrentThreadScheduler, ExecutorScheduler, FIRST_CUSTOM, IO_POOL,
    NEW_THREAD, NewThreadScheduler, Scheduler,
};
use crate::config::BusConfig;
use crate::error::{BusError, BusResult};

type IoScheduler = ExecutorScheduler<tokio::runtime::Runtime>;
type ComputeScheduler = ExecutorScheduler<rayon::ThreadPool>;

/// Scheduler code → scheduler, for one bus.
///
/// The I/O and compute pools are built on first use.
pub(crate) struct SchedulerTable {
    config: BusConfig,
    current: Arc<CurrentThreadScheduler>,
    new_thread: Arc<NewThreadScheduler>,
    io: OnceLock<Arc<IoScheduler>>,
    compute: OnceLock<Arc<ComputeScheduler>>,
    init: Mutex<()>,
    custom: RwLock<HashMap<i32, Arc<dyn Scheduler>>>,
    closed: AtomicBool,
}

impl SchedulerTable {
    pub(crate) fn new(config: BusConfig) -> Self {
        Self {
            config,
            current: Arc::new(CurrentThreadScheduler),
            new_thread: Arc::new(NewThreadScheduler::new()),
            io: OnceLock::new(),
            compute: OnceLock::new(),
            init: Mutex::new(()),
            custom: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn resolve(&self, code: i32) -> BusResult<Arc<dyn Scheduler>> {
        match code {
            CURRENT_THREAD => Ok(Arc::clone(&self.current) as Arc<dyn Scheduler>),
            NEW_THREAD => Ok(Arc::clone(&self.new_thread) as Arc<dyn Scheduler>),
            IO_POOL => Ok(self.io()? as Arc<dyn Scheduler>),
            COMPUTE_POOL => Ok(self.compute()? as Arc<dyn Scheduler>),
            _ => self
                .custom
                .read()
                .get(&code)
                .cloned()
                .ok_or(BusError::UnsupportedScheduler(code)),
        }
    }

    pub(crate) fn io(&self) -> BusResult<Arc<IoScheduler>> {
        if let Some(io) = self.io.get() {
            return Ok(Arc::clone(io));
        }
        let _guard = self.init.lock();
        if let Some(io) = self.io.get() {
            return Ok(Arc::clone(io));
        }
        self.ensure_open()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(self.config.io_max_threads.max(1))
            .thread_keep_alive(self.config.io_keep_alive())
            .thread_name("codebus-io")
            .build()
            .map_err(|e| BusError::PoolBuild(e.to_string()))?;
        let io = Arc::new(
            ExecutorScheduler::with_grace(runtime, self.config.shutdown_grace()).named("io"),
        );
        let _ = self.io.set(Arc::clone(&io));
        debug!(max_threads = self.config.io_max_threads, "Started I/O pool");
        Ok(io)
    }

    fn compute(&self) -> BusResult<Arc<ComputeScheduler>> {
        if let Some(compute) = self.compute.get() {
            return Ok(Arc::clone(compute));
        }
        let _guard = self.init.lock();
        if let Some(compute) = self.compute.get() {
            return Ok(Arc::clone(compute));
        }
        self.ensure_open()?;

        let threads = self.config.compute_pool_size();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("codebus-compute-{i}"))
            .build()
            .map_err(|e| BusError::PoolBuild(e.to_string()))?;
        let compute = Arc::new(
            ExecutorScheduler::with_grace(pool, self.config.shutdown_grace()).named("compute"),
        );
        let _ = self.compute.set(Arc::clone(&compute));
        debug!(threads, "Started compute pool");
        Ok(compute)
    }

    fn ensure_open(&self) -> BusResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(BusError::ShutDown)
        } else {
            Ok(())
        }
    }

    pub(crate) fn add(&self, id: i32, scheduler: Arc<dyn Scheduler>) -> BusResult<()> {
        if id < FIRST_CUSTOM {
            return Err(BusError::InvalidSchedulerId {
                id,
                min: FIRST_CUSTOM,
            });
        }
        self.ensure_open()?;
        self.custom.write().insert(id, scheduler);
        Ok(())
    }

    pub(crate) fn remove(&self, id: i32) -> Option<Arc<dyn Scheduler>> {
        self.custom.write().remove(&id)
    }

    /// Forgets custom schedulers and stops the owned ones.
    pub(crate) fn shutdown(&self) {
        let _guard = self.init.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.custom.write().clear();
        self.new_thread.shutdown();
        if let Some(io) = self.io.get() {
            io.shutdown();
        }
        if let Some(compute) = self.compute.get() {
            compute.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{FnExecutor, Job, from_executor};
    use std::sync::mpsc;
    use std::time::Duration;

    fn table() -> SchedulerTable {
        SchedulerTable::new(BusConfig {
            compute_threads: Some(2),
            ..Default::default()
        })
    }

    #[test]
    fn test_pools_are_built_once() {
        let table = table();
        let first = table.io().unwrap();
        let second = table.io().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        table.shutdown();
    }

    #[test]
    fn test_io_pool_runs_on_named_thread() {
        let table = table();
        let (tx, rx) = mpsc::channel();
        table.resolve(IO_POOL).unwrap().schedule(Box::new(move || {
            let name = std::thread::current().name().map(str::to_owned);
            tx.send(name).unwrap();
        }));
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("codebus-io"));
        table.shutdown();
    }

    #[test]
    fn test_compute_pool_runs_jobs() {
        let table = table();
        let (tx, rx) = mpsc::channel();
        table
            .resolve(COMPUTE_POOL)
            .unwrap()
            .schedule(Box::new(move || tx.send(()).unwrap()));
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        table.shutdown();
    }

    #[test]
    fn test_custom_ids_are_range_checked() {
        let table = table();
        let inline = from_executor(FnExecutor(|job: Job| job()));

        assert_eq!(
            table.add(3, Arc::clone(&inline)),
            Err(BusError::InvalidSchedulerId { id: 3, min: 1024 })
        );
        assert!(matches!(
            table.resolve(1024),
            Err(BusError::UnsupportedScheduler(1024))
        ));

        table.add(1024, inline).unwrap();
        assert!(table.resolve(1024).is_ok());
        assert!(table.remove(1024).is_some());
        assert!(table.resolve(1024).is_err());
    }

    #[test]
    fn test_unknown_builtin_code_is_unsupported() {
        assert!(matches!(
            table().resolve(3),
            Err(BusError::UnsupportedScheduler(3))
        ));
    }

    #[test]
    fn test_no_pools_after_shutdown() {
        let table = table();
        table.shutdown();
        assert!(matches!(table.resolve(IO_POOL), Err(BusError::ShutDown)));
        assert!(matches!(table.resolve(COMPUTE_POOL), Err(BusError::ShutDown)));
    }
}
