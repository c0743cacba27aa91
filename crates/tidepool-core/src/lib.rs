//! # tidepool-core
//!
//! Core types and primitives for the tidepool worker-pool engines.
//!
//! This crate is pool-agnostic: it knows nothing about cursors, workers,
//! or queues. The engines live in the `tidepool` crate.
//!
//! ## Modules
//!
//! - `task` - type-erased, move-only task objects
//! - `spinlock` - spin lock and scoped guard for short queue sections
//! - `error` - error types
//! - `plog` - env-configured leveled logging macros
//! - `env` - environment variable utilities
//! - `util` - test/demo helpers (synchronised output, sleep, timing)

pub mod env;
pub mod error;
pub mod plog;
pub mod spinlock;
pub mod task;
pub mod util;

// Re-exports for convenience
pub use error::{PoolError, PoolResult};
pub use spinlock::{SpinLock, SpinLockGuard};
pub use task::Task;
