//! Dynamic pool: resizable workers over one shared queue
//!
//! All workers block on a single condition variable and drain one shared
//! FIFO. Idle workers cost no CPU, and the worker count can be adjusted
//! at any time: `remove` is non-blocking and hands out shrink credits
//! that workers consume in their own loops. A retiring worker moves its
//! join handle into a retirement queue that `join_retired` (or `close`)
//! drains.
//!
//! Suited to variable workloads, and to serving as the cache tier that a
//! fixed pool's refuse callback rehomes overflow into.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use tidepool_core::error::{PoolError, PoolResult};
use tidepool_core::task::Task;
use tidepool_core::tp_debug;

use crate::result::ResultHandle;

/// Queue state guarded by the shared mutex.
struct DynInner {
    queue: VecDeque<Task>,
    /// Outstanding worker-removal requests.
    shrink_credit: usize,
    /// Live workers, keyed by their thread id.
    handles: HashMap<ThreadId, JoinHandle<()>>,
}

struct DynShared {
    inner: Mutex<DynInner>,
    /// Wakes idle workers for new tasks or shrink credits.
    awake_cv: Condvar,
    done_mu: Mutex<()>,
    done_cv: Condvar,
    thread_mu: Mutex<()>,
    thread_cv: Condvar,
    /// Tasks accepted and not yet finished.
    total_tasks: AtomicIsize,
    expect_count: AtomicIsize,
    running_count: AtomicIsize,
    stopping: AtomicBool,
    /// Handles of retired workers, awaiting a join.
    retired: SegQueue<JoinHandle<()>>,
    spawn_serial: AtomicUsize,
}

impl DynShared {
    fn notify_done(&self) {
        let _g = self.done_mu.lock();
        self.done_cv.notify_all();
    }

    fn notify_threads(&self) {
        let _g = self.thread_mu.lock();
        self.thread_cv.notify_all();
    }
}

/// A worker pool whose thread count can be changed at runtime.
pub struct DynamicPool {
    shared: Arc<DynShared>,
}

impl DynamicPool {
    /// Create a pool with `workers` threads. Zero is a legitimate start:
    /// tasks queue up until `add` provides workers.
    pub fn new(workers: usize) -> Self {
        let pool = DynamicPool {
            shared: Arc::new(DynShared {
                inner: Mutex::new(DynInner {
                    queue: VecDeque::new(),
                    shrink_credit: 0,
                    handles: HashMap::new(),
                }),
                awake_cv: Condvar::new(),
                done_mu: Mutex::new(()),
                done_cv: Condvar::new(),
                thread_mu: Mutex::new(()),
                thread_cv: Condvar::new(),
                total_tasks: AtomicIsize::new(0),
                expect_count: AtomicIsize::new(0),
                running_count: AtomicIsize::new(0),
                stopping: AtomicBool::new(false),
                retired: SegQueue::new(),
                spawn_serial: AtomicUsize::new(0),
            }),
        };
        pool.add(workers);
        pool
    }

    /// Spawn `n` additional workers.
    ///
    /// Registration happens under the shared mutex, so a new worker's
    /// first queue access observes its own map entry.
    pub fn add(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut inner = self.shared.inner.lock();
        for _ in 0..n {
            let serial = self.shared.spawn_serial.fetch_add(1, Ordering::Relaxed);
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(format!("tidepool-dyn-{}", serial))
                .spawn(move || worker_loop(shared))
                .expect("failed to spawn worker thread");
            inner.handles.insert(handle.thread().id(), handle);
        }
        self.shared.expect_count.fetch_add(n as isize, Ordering::SeqCst);
        tp_debug!("dynamic pool grew by {}", n);
    }

    /// Request removal of `n` workers. Non-blocking: workers consume the
    /// shrink credits in their own loops and retire.
    pub fn remove(&self, n: usize) -> PoolResult<()> {
        if n == 0 {
            return Ok(());
        }
        {
            let mut inner = self.shared.inner.lock();
            if (n as isize) > self.shared.expect_count.load(Ordering::SeqCst) {
                return Err(PoolError::InvalidArgument(
                    "cannot remove more workers than expected",
                ));
            }
            self.shared.expect_count.fetch_sub(n as isize, Ordering::SeqCst);
            inner.shrink_credit += n;
        }
        self.shared.awake_cv.notify_all();
        tp_debug!("dynamic pool shrinking by {}", n);
        Ok(())
    }

    /// Grow or shrink to exactly `k` workers.
    pub fn resize_to(&self, k: usize) -> PoolResult<()> {
        let expect = self.expected_count();
        if k >= expect {
            self.add(k - expect);
            Ok(())
        } else {
            self.remove(expect - k)
        }
    }

    /// Submit one callable. Wakes one idle worker.
    pub fn submit<F>(&self, f: F) -> PoolResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_task(Task::new(f))
    }

    /// Submit a prepared task object.
    pub fn submit_task(&self, task: Task) -> PoolResult<()> {
        if self.shared.stopping.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        // Credit before enqueue: a quiescence waiter must never observe
        // zero while a task is queued.
        self.shared.total_tasks.fetch_add(1, Ordering::SeqCst);
        {
            let mut inner = self.shared.inner.lock();
            inner.queue.push_back(task);
        }
        self.shared.awake_cv.notify_one();
        Ok(())
    }

    /// Submit a callable and receive a handle to its return value.
    pub fn submit_for_return<F, R>(&self, f: F) -> ResultHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (task, handle) = ResultHandle::package(f);
        match self.submit_task(task) {
            Ok(()) => handle,
            Err(_) => ResultHandle::empty(),
        }
    }

    /// Submit a container of tasks in one lock span. Wakes all workers.
    pub fn submit_batch(&self, tasks: Vec<Task>) -> PoolResult<()> {
        if self.shared.stopping.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        if tasks.is_empty() {
            return Ok(());
        }
        self.shared
            .total_tasks
            .fetch_add(tasks.len() as isize, Ordering::SeqCst);
        {
            let mut inner = self.shared.inner.lock();
            inner.queue.extend(tasks);
        }
        self.shared.awake_cv.notify_all();
        Ok(())
    }

    /// Block until every accepted task has finished.
    pub fn wait_for_tasks(&self) {
        let mut g = self.shared.done_mu.lock();
        while self.shared.total_tasks.load(Ordering::SeqCst) != 0 {
            self.shared.done_cv.wait(&mut g);
        }
    }

    /// Block until the running worker count matches the expected count.
    pub fn wait_for_threads(&self) {
        let mut g = self.shared.thread_mu.lock();
        while self.shared.running_count.load(Ordering::SeqCst)
            != self.shared.expect_count.load(Ordering::SeqCst)
        {
            self.shared.thread_cv.wait(&mut g);
        }
    }

    /// Join every retired worker thread, reclaiming its resources.
    pub fn join_retired(&self) {
        while let Some(handle) = self.shared.retired.pop() {
            let _ = handle.join();
        }
    }

    /// Stop the pool: retire every worker, wait for them, join them.
    /// Tasks still queued are discarded. Idempotent.
    pub fn close(&mut self) {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.resize_to(0);
        self.wait_for_threads();
        self.join_retired();
        tp_debug!("dynamic pool closed");
    }

    /// Tasks accepted and not yet finished.
    pub fn tasks_remaining(&self) -> usize {
        self.shared.total_tasks.load(Ordering::SeqCst).max(0) as usize
    }

    /// Workers currently executing their loop.
    pub fn running_count(&self) -> usize {
        self.shared.running_count.load(Ordering::SeqCst).max(0) as usize
    }

    /// Workers the pool is expected to converge to.
    pub fn expected_count(&self) -> usize {
        self.shared.expect_count.load(Ordering::SeqCst).max(0) as usize
    }
}

impl Drop for DynamicPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(shared: Arc<DynShared>) {
    shared.running_count.fetch_add(1, Ordering::SeqCst);
    shared.notify_threads();

    loop {
        let mut inner = shared.inner.lock();
        while inner.queue.is_empty() && inner.shrink_credit == 0 {
            shared.awake_cv.wait(&mut inner);
        }

        // Shrink beats work: a pending removal is honoured before more
        // queue work.
        if inner.shrink_credit > 0 {
            inner.shrink_credit -= 1;
            if let Some(handle) = inner.handles.remove(&thread::current().id()) {
                shared.retired.push(handle);
            }
            break;
        }

        let Some(task) = inner.queue.pop_front() else {
            continue;
        };
        drop(inner);

        task.run();
        if shared.total_tasks.fetch_sub(1, Ordering::SeqCst) == 1 {
            shared.notify_done();
        }
    }

    shared.running_count.fetch_sub(1, Ordering::SeqCst);
    shared.notify_threads();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    #[test]
    fn test_submit_and_return() {
        let mut pool = DynamicPool::new(2);
        let handle = pool.submit_for_return(|| 2023);
        assert_eq!(handle.get(), Some(2023));
        pool.close();
    }

    #[test]
    fn test_batched_counting() {
        const TOTAL: usize = 10_000;
        const BATCH: usize = 10;

        let mut pool = DynamicPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..(TOTAL / BATCH) {
            let tasks: Vec<Task> = (0..BATCH)
                .map(|_| {
                    let counter = Arc::clone(&counter);
                    Task::new(move || {
                        counter.fetch_add(1, Ordering::Relaxed);
                    })
                })
                .collect();
            pool.submit_batch(tasks).unwrap();
        }

        pool.wait_for_tasks();
        assert_eq!(counter.load(Ordering::Relaxed), TOTAL);
        pool.close();
    }

    #[test]
    fn test_shrink_under_load() {
        let mut pool = DynamicPool::new(4);
        pool.wait_for_threads();
        assert_eq!(pool.running_count(), 4);

        let executed = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let executed = Arc::clone(&executed);
            pool.submit(move || {
                thread::sleep(Duration::from_millis(300));
                executed.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }

        thread::sleep(Duration::from_millis(100));

        // The removal request must not block on the in-flight tasks.
        let asked = Instant::now();
        pool.remove(4).unwrap();
        assert!(asked.elapsed() < Duration::from_millis(50));
        assert_eq!(pool.expected_count(), 0);

        pool.wait_for_threads();
        assert!(asked.elapsed() < Duration::from_millis(500));
        assert_eq!(pool.running_count(), 0);
        assert_eq!(executed.load(Ordering::Relaxed), 4);

        pool.join_retired();
        pool.close();
    }

    #[test]
    fn test_shrink_wins_over_queued_work() {
        use std::sync::atomic::AtomicBool;

        let mut pool = DynamicPool::new(1);
        pool.wait_for_threads();

        let gate = Arc::new(AtomicBool::new(false));
        let executed = Arc::new(AtomicUsize::new(0));

        {
            let gate = Arc::clone(&gate);
            let executed = Arc::clone(&executed);
            pool.submit(move || {
                while !gate.load(Ordering::Acquire) {
                    thread::yield_now();
                }
                executed.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }
        // Queue more work behind the gated task.
        for _ in 0..3 {
            let executed = Arc::clone(&executed);
            pool.submit(move || {
                executed.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }

        pool.remove(1).unwrap();
        gate.store(true, Ordering::Release);
        pool.wait_for_threads();

        // The worker retired instead of draining the queue.
        assert_eq!(pool.running_count(), 0);
        assert_eq!(executed.load(Ordering::Relaxed), 1);
        assert_eq!(pool.tasks_remaining(), 3);

        // A fresh worker picks the queue back up.
        pool.add(1);
        pool.wait_for_tasks();
        assert_eq!(executed.load(Ordering::Relaxed), 4);
        pool.close();
    }

    #[test]
    fn test_queue_holds_tasks_with_zero_workers() {
        let mut pool = DynamicPool::new(0);
        assert_eq!(pool.running_count(), 0);

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }
        assert_eq!(pool.tasks_remaining(), 3);
        assert_eq!(counter.load(Ordering::Relaxed), 0);

        pool.add(1);
        pool.wait_for_tasks();
        assert_eq!(counter.load(Ordering::Relaxed), 3);
        pool.close();
    }

    #[test]
    fn test_resize_to() {
        let mut pool = DynamicPool::new(2);
        pool.wait_for_threads();

        pool.resize_to(5).unwrap();
        pool.wait_for_threads();
        assert_eq!(pool.running_count(), 5);

        pool.resize_to(1).unwrap();
        pool.wait_for_threads();
        assert_eq!(pool.running_count(), 1);
        pool.join_retired();

        pool.close();
        assert_eq!(pool.running_count(), 0);
    }

    #[test]
    fn test_remove_more_than_expected() {
        let mut pool = DynamicPool::new(2);
        assert!(pool.remove(3).is_err());
        assert_eq!(pool.expected_count(), 2);
        pool.close();
    }

    #[test]
    fn test_submit_after_close() {
        let mut pool = DynamicPool::new(1);
        pool.close();
        assert_eq!(pool.submit(|| {}), Err(PoolError::Closed));
        assert!(pool.submit_for_return(|| 1).is_empty());
    }

    #[test]
    fn test_close_discards_queue() {
        let mut pool = DynamicPool::new(0);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }
        pool.close();
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }
}
