//! Per-worker coordination state
//!
//! Every fixed-pool worker owns a `WorkerCore`: its task counter, the
//! quiescence-request flag, and the condvar a `wait_for_tasks` caller
//! blocks on. The queues themselves live in the variant-specific worker
//! types (`SwapWorker`, `DonateWorker`).

use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};

use parking_lot::{Condvar, Mutex};

/// Coordination state shared by both fixed-pool worker variants.
///
/// `task_count` covers every task this worker owns: queued plus the one
/// in flight. Decrements use release ordering; the quiescence waiter
/// acquires through the condvar mutex.
pub struct WorkerCore {
    task_count: AtomicIsize,
    waiting: AtomicBool,
    done_mu: Mutex<()>,
    done_cv: Condvar,
}

impl WorkerCore {
    pub fn new() -> Self {
        WorkerCore {
            task_count: AtomicIsize::new(0),
            waiting: AtomicBool::new(false),
            done_mu: Mutex::new(()),
            done_cv: Condvar::new(),
        }
    }

    /// Tasks currently owned by this worker (queued + in flight).
    #[inline]
    pub fn count(&self) -> isize {
        self.task_count.load(Ordering::Acquire)
    }

    /// Credit newly enqueued tasks. Called under the worker's queue lock.
    #[inline]
    pub fn add(&self, n: isize) {
        self.task_count.fetch_add(n, Ordering::Relaxed);
    }

    /// Debit one completed task.
    #[inline]
    pub fn finish_one(&self) {
        self.task_count.fetch_sub(1, Ordering::Release);
    }

    /// Move `n` units of count from this worker to `thief`.
    ///
    /// Debit before credit: the gap where a quiescence waiter can see
    /// the thief at zero is the window the second wait pass covers.
    #[inline]
    pub fn transfer(&self, thief: &WorkerCore, n: isize) {
        self.task_count.fetch_sub(n, Ordering::Release);
        thief.task_count.fetch_add(n, Ordering::Release);
    }

    /// True while a `wait_for_tasks` caller wants this worker drained.
    #[inline]
    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_waiting(&self, on: bool) {
        self.waiting.store(on, Ordering::Release);
    }

    /// Wake any quiescence waiter. Notification is posted while the
    /// condvar mutex is held so the waiter cannot miss it.
    pub fn signal_done(&self) {
        let _g = self.done_mu.lock();
        self.done_cv.notify_all();
    }

    /// Block until this worker's count reaches zero.
    pub fn wait_until_drained(&self) {
        let mut g = self.done_mu.lock();
        while self.count() != 0 {
            self.done_cv.wait(&mut g);
        }
    }
}

impl Default for WorkerCore {
    fn default() -> Self {
        WorkerCore::new()
    }
}
