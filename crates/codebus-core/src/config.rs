//! Bus configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_CAPACITY;

/// Settings for one [`Bus`](crate::Bus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Number of subscriber types kept in the discovery cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Whether posted arguments are checked against handler parameters
    /// before invocation.
    #[serde(default = "default_validate_arguments")]
    pub validate_arguments: bool,

    /// How long owned pools may drain on shutdown, in milliseconds.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Compute pool size. Defaults to twice the available parallelism plus one.
    #[serde(default)]
    pub compute_threads: Option<usize>,

    /// Upper bound on I/O pool threads.
    #[serde(default = "default_io_max_threads")]
    pub io_max_threads: usize,

    /// How long an idle I/O pool thread lingers, in seconds.
    #[serde(default = "default_io_keep_alive_secs")]
    pub io_keep_alive_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            validate_arguments: default_validate_arguments(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            compute_threads: None,
            io_max_threads: default_io_max_threads(),
            io_keep_alive_secs: default_io_keep_alive_secs(),
        }
    }
}

impl BusConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn io_keep_alive(&self) -> Duration {
        Duration::from_secs(self.io_keep_alive_secs)
    }

    /// The compute pool size after applying the default.
    pub fn compute_pool_size(&self) -> usize {
        self.compute_threads.filter(|n| *n > 0).unwrap_or_else(|| {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            cores * 2 + 1
        })
    }
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_validate_arguments() -> bool {
    true
}

fn default_shutdown_grace_ms() -> u64 {
    1000
}

fn default_io_max_threads() -> usize {
    512
}

fn default_io_keep_alive_secs() -> u64 {
    60
}
