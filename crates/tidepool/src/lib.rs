//! # tidepool
//!
//! In-process worker-pool engines. Tasks are opaque nullary callables,
//! submitted from any number of producer threads and executed on
//! long-lived workers. Three engines share one submission contract and
//! differ in queue topology:
//!
//! - [`SteadyPool`] - fixed worker count, per-worker paired
//!   public/private queues, O(1) queue-swap transfer. Highest throughput
//!   on steady streams of short uniform tasks.
//! - [`BalancedPool`] - fixed worker count, per-worker single queue,
//!   one-task-at-a-time donation. Degrades more gracefully when task
//!   durations are uneven.
//! - [`DynamicPool`] - resizable worker count, single shared queue,
//!   condition-variable wakeups. Idle workers cost no CPU.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tidepool::SteadyPool;
//!
//! let mut pool = SteadyPool::new(4, 0);
//!
//! pool.submit(|| println!("hello from a worker")).unwrap();
//!
//! let answer = pool.submit_for_return(|| 6 * 7);
//! assert_eq!(answer.get(), Some(42));
//!
//! pool.wait_for_tasks();
//! pool.close();
//! ```
//!
//! ## Overflow rehoming
//!
//! A bounded pool refuses tasks past its per-worker capacity. Install a
//! refuse callback to catch them and rehome them, typically into a
//! [`DynamicPool`] acting as a cache tier:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tidepool::{DynamicPool, SteadyPool};
//!
//! let core = SteadyPool::new(4, 40);
//! let cache = Arc::new(DynamicPool::new(2));
//!
//! let puller = core.overflow_puller();
//! let cache_tier = Arc::clone(&cache);
//! core.set_refuse_callback(move || {
//!     cache_tier.submit_batch(puller.pull()).unwrap();
//! }).unwrap();
//! ```
//!
//! ## Modules
//!
//! - `config` - pool configuration builder
//! - `fixed` - shared controller for the fixed-worker-count engines
//! - `steady` - queue-swap workers
//! - `balanced` - donation workers
//! - `dynamic` - resizable shared-queue pool
//! - `result` - one-shot result handles
//! - `worker` - per-worker coordination state

pub mod balanced;
pub mod config;
pub mod dynamic;
pub mod fixed;
pub mod result;
pub mod steady;
pub mod worker;

// Re-exports for convenience
pub use balanced::{BalancedPool, DonateWorker};
pub use config::PoolConfig;
pub use dynamic::DynamicPool;
pub use fixed::{FixedPool, FixedWorker, OverflowPuller};
pub use result::{ResultHandle, ResultSet};
pub use steady::{SteadyPool, SwapWorker};
pub use tidepool_core::error::{PoolError, PoolResult};
pub use tidepool_core::task::Task;
