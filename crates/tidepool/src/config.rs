//! Pool configuration

use tidepool_core::env::env_get;
use tidepool_core::error::{PoolError, PoolResult};

/// Configuration for the fixed pools
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads (0 = hardware concurrency hint)
    pub workers: usize,

    /// Total task capacity across the pool (0 = unbounded)
    pub task_capacity: usize,

    /// Steal budget applied after construction (Some(0) = default budget)
    pub steal: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            task_capacity: 0,
            steal: None,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    /// Set the total task capacity (0 = unbounded)
    pub fn task_capacity(mut self, n: usize) -> Self {
        self.task_capacity = n;
        self
    }

    /// Enable task stealing with the given budget (0 = default budget)
    pub fn steal(mut self, max: usize) -> Self {
        self.steal = Some(max);
        self
    }

    /// Read configuration overrides from the environment
    /// (`TP_WORKERS`, `TP_TASK_CAPACITY`).
    pub fn from_env() -> Self {
        Self {
            workers: env_get("TP_WORKERS", 0),
            task_capacity: env_get("TP_TASK_CAPACITY", 0),
            steal: None,
        }
    }

    /// Worker count after applying the hardware fallback.
    pub fn resolved_workers(&self) -> usize {
        if self.workers != 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Per-worker capacity derived from the total (`None` = unbounded).
    pub(crate) fn per_worker_capacity(&self) -> Option<usize> {
        if self.task_capacity == 0 {
            None
        } else {
            Some((self.task_capacity / self.resolved_workers()).max(1))
        }
    }

    /// Steal budget after applying the default clamp, if stealing is on.
    pub(crate) fn resolved_steal(&self) -> Option<usize> {
        let n = self.resolved_workers();
        self.steal
            .map(|max| if max == 0 { (n / 4).clamp(1, 8) } else { max })
    }

    /// Validate configuration
    pub fn validate(&self) -> PoolResult<()> {
        if let Some(max) = self.resolved_steal() {
            if max >= self.resolved_workers() {
                return Err(PoolError::InvalidArgument(
                    "steal budget must be below the worker count",
                ));
            }
        }
        Ok(())
    }
}
