//! Fixed-pool controller
//!
//! Shared machinery for the two fixed-worker-count engines. The
//! controller owns the worker array, routes submissions through a
//! load-balancing cursor with a bounded least-busy search, enforces the
//! per-worker capacity on admission, and handles overflow, quiescence and
//! shutdown. The queue topology and the worker loop are supplied by the
//! variant through the [`FixedWorker`] trait.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tidepool_core::error::{PoolError, PoolResult};
use tidepool_core::task::Task;
use tidepool_core::tp_debug;

use crate::config::PoolConfig;
use crate::result::ResultHandle;
use crate::worker::WorkerCore;

/// The seam between the controller and a queue-topology variant.
///
/// Implementations own their queues and keep their `WorkerCore` counter
/// in step with every enqueue, execution, and transfer.
pub trait FixedWorker: Send + Sync + Sized + 'static {
    fn new() -> Self;

    /// The worker's coordination state.
    fn core(&self) -> &WorkerCore;

    /// Append one task to the worker's producer-side queue.
    fn enqueue(&self, task: Task);

    /// Append a whole container in one lock span.
    fn enqueue_batch(&self, tasks: Vec<Task>);

    /// The variant's worker loop; runs on a dedicated thread until
    /// `shared.stopping` is observed.
    fn run(shared: Arc<PoolShared<Self>>, index: usize);
}

/// State shared between the controller and every worker thread.
pub struct PoolShared<W> {
    pub(crate) workers: Box<[W]>,
    pub(crate) stopping: AtomicBool,
    pub(crate) steal_enabled: AtomicBool,
    pub(crate) steal_max: AtomicUsize,
}

/// A cloneable handle to a pool's overflow buffer.
///
/// Lets a refuse callback drain rejected tasks without capturing the
/// pool itself.
#[derive(Clone)]
pub struct OverflowPuller {
    buf: Arc<Mutex<Vec<Task>>>,
}

impl OverflowPuller {
    fn new() -> Self {
        OverflowPuller {
            buf: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Take every task currently held in the overflow buffer.
    pub fn pull(&self) -> Vec<Task> {
        std::mem::take(&mut *self.buf.lock())
    }

    /// Number of tasks currently held.
    pub fn len(&self) -> usize {
        self.buf.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.lock().is_empty()
    }
}

type RefuseCallback = Arc<dyn Fn() + Send + Sync>;

/// A fixed-worker-count pool, generic over its queue topology.
///
/// Use through the [`SteadyPool`](crate::SteadyPool) and
/// [`BalancedPool`](crate::BalancedPool) aliases.
pub struct FixedPool<W: FixedWorker> {
    shared: Arc<PoolShared<W>>,
    handles: Vec<JoinHandle<()>>,
    cursor: AtomicUsize,
    cursor_move_limit: usize,
    per_worker_capacity: Option<usize>,
    overflow: OverflowPuller,
    refuse_cb: Mutex<Option<RefuseCallback>>,
}

impl<W: FixedWorker> FixedPool<W> {
    /// Create a pool with `workers` threads (0 = hardware concurrency)
    /// and a total task capacity (0 = unbounded).
    pub fn new(workers: usize, task_capacity: usize) -> Self {
        Self::build(PoolConfig::new().workers(workers).task_capacity(task_capacity))
    }

    /// Create a pool from a full configuration.
    pub fn with_config(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        let steal = config.resolved_steal();
        let pool = Self::build(config);
        if let Some(max) = steal {
            pool.enable_steal(max)?;
        }
        Ok(pool)
    }

    fn build(config: PoolConfig) -> Self {
        let n = config.resolved_workers();
        let per_worker_capacity = config.per_worker_capacity();

        let workers: Box<[W]> = (0..n).map(|_| W::new()).collect();
        let shared = Arc::new(PoolShared {
            workers,
            stopping: AtomicBool::new(false),
            steal_enabled: AtomicBool::new(false),
            steal_max: AtomicUsize::new(0),
        });

        let mut handles = Vec::with_capacity(n);
        for i in 0..n {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("tidepool-worker-{}", i))
                .spawn(move || W::run(shared, i))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }
        tp_debug!("fixed pool up: {} workers, capacity {:?}", n, per_worker_capacity);

        FixedPool {
            shared,
            handles,
            cursor: AtomicUsize::new(0),
            cursor_move_limit: cursor_move_limit(n),
            per_worker_capacity,
            overflow: OverflowPuller::new(),
            refuse_cb: Mutex::new(None),
        }
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.shared.workers.len()
    }

    /// Tasks queued or in flight across all workers.
    pub fn tasks_remaining(&self) -> usize {
        self.shared
            .workers
            .iter()
            .map(|w| w.core().count().max(0) as usize)
            .sum()
    }

    /// Submit one callable.
    ///
    /// Fails with [`PoolError::Overflow`] when admission is refused and
    /// no refuse callback is installed, and with [`PoolError::Closed`]
    /// after `close()`.
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
        if !self.admit(1) {
            return self.overflow_one(task);
        }
        self.move_cursor_to_least_busy();
        let index = self.cursor.load(Ordering::Relaxed);
        self.shared.workers[index].enqueue(task);
        Ok(())
    }

    /// Submit a callable and receive a handle to its return value.
    ///
    /// On overflow with a refuse callback installed the handle stays
    /// live: the packaged task moved to the overflow buffer still drives
    /// it once rehomed. On refusal without a callback (or after close)
    /// the returned handle is empty.
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

    /// Submit a container of tasks.
    ///
    /// Unbounded pools enqueue the whole container into one worker in a
    /// single lock span. Bounded pools admit item by item from the
    /// currently selected worker without re-running the least-busy
    /// search; the first refusal moves the remaining tasks to the
    /// overflow buffer.
    pub fn submit_batch(&self, mut tasks: Vec<Task>) -> PoolResult<()> {
        if self.shared.stopping.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        if tasks.is_empty() {
            return Ok(());
        }

        self.move_cursor_to_least_busy();

        if self.per_worker_capacity.is_none() {
            let index = self.cursor.load(Ordering::Relaxed);
            self.shared.workers[index].enqueue_batch(tasks);
            return Ok(());
        }

        let n = tasks.len();
        for i in 0..n {
            if !self.admit(1) {
                return self.overflow_rest(tasks, i);
            }
            let index = self.cursor.load(Ordering::Relaxed);
            self.shared.workers[index].enqueue(tasks[i].take());
        }
        Ok(())
    }

    /// Enable stealing with the given budget (0 = default budget of
    /// `clamp(workers / 4, 1, 8)`). The budget must be below the worker
    /// count, so a single-worker pool cannot enable stealing.
    pub fn enable_steal(&self, max: usize) -> PoolResult<()> {
        let n = self.worker_count();
        let max = if max == 0 { (n / 4).clamp(1, 8) } else { max };
        if max >= n {
            return Err(PoolError::InvalidArgument(
                "steal budget must be below the worker count",
            ));
        }
        self.shared.steal_max.store(max, Ordering::Relaxed);
        self.shared.steal_enabled.store(true, Ordering::Release);
        Ok(())
    }

    /// Disable stealing.
    pub fn disable_steal(&self) {
        self.shared.steal_enabled.store(false, Ordering::Release);
    }

    /// Install the callback invoked on the submitting thread whenever
    /// admission fails. Rejected on an unbounded pool, where overflow
    /// cannot occur.
    pub fn set_refuse_callback<F>(&self, f: F) -> PoolResult<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.per_worker_capacity.is_none() {
            return Err(PoolError::InvalidArgument(
                "refuse callback requires a bounded pool",
            ));
        }
        *self.refuse_cb.lock() = Some(Arc::new(f));
        Ok(())
    }

    /// Take every task held in the overflow buffer.
    pub fn pull_overflow(&self) -> Vec<Task> {
        self.overflow.pull()
    }

    /// A cloneable handle to the overflow buffer, for refuse callbacks.
    pub fn overflow_puller(&self) -> OverflowPuller {
        self.overflow.clone()
    }

    /// Block until every worker has drained.
    ///
    /// Runs two full passes over the workers: a donation can move tasks
    /// onto a worker after it was observed empty, and the second pass
    /// covers that window.
    pub fn wait_for_tasks(&self) {
        let workers = &self.shared.workers;
        for w in workers.iter() {
            w.core().set_waiting(true);
        }
        for _pass in 0..2 {
            for w in workers.iter() {
                w.core().wait_until_drained();
            }
        }
        for w in workers.iter() {
            w.core().set_waiting(false);
        }
    }

    /// Stop and join every worker. Tasks still queued are discarded;
    /// call [`wait_for_tasks`](Self::wait_for_tasks) first if they must
    /// complete. Idempotent.
    pub fn close(&mut self) {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        tp_debug!("fixed pool closed");
    }

    // --- routing internals ---

    /// Bounded approximate search for a lightly loaded worker.
    ///
    /// Takes up to `cursor_move_limit` single steps of a scratch index,
    /// keeping whichever of cursor/scratch currently owns fewer tasks.
    /// Stops early when the cursor worker is already idle. Not a global
    /// minimum.
    fn move_cursor_to_least_busy(&self) {
        if self.cursor_move_limit == 0 {
            return;
        }
        let workers = &self.shared.workers;
        let n = workers.len();
        let mut best = self.cursor.load(Ordering::Relaxed) % n;
        let mut scratch = best;
        for _ in 0..self.cursor_move_limit {
            let best_count = workers[best].core().count();
            if best_count == 0 {
                break;
            }
            scratch = (scratch + 1) % n;
            if workers[scratch].core().count() < best_count {
                best = scratch;
            }
        }
        self.cursor.store(best, Ordering::Relaxed);
    }

    /// Capacity check: walk the cursor at most one full revolution to a
    /// worker that can take `need` more tasks. On failure the cursor is
    /// left where the walk started.
    fn admit(&self, need: usize) -> bool {
        let cap = match self.per_worker_capacity {
            None => return true,
            Some(cap) => cap,
        };
        let workers = &self.shared.workers;
        let n = workers.len();
        let start = self.cursor.load(Ordering::Relaxed) % n;
        let mut current = start;
        for _ in 0..n {
            let count = workers[current].core().count().max(0) as usize;
            if count + need <= cap {
                self.cursor.store(current, Ordering::Relaxed);
                return true;
            }
            current = (current + 1) % n;
        }
        self.cursor.store(start, Ordering::Relaxed);
        false
    }

    fn overflow_one(&self, task: Task) -> PoolResult<()> {
        {
            let mut buf = self.overflow.buf.lock();
            buf.clear();
            buf.push(task);
        }
        tp_debug!("overflowed 1 task");
        self.invoke_refuse()
    }

    fn overflow_rest(&self, mut tasks: Vec<Task>, from: usize) -> PoolResult<()> {
        let refused = tasks.len() - from;
        {
            let mut buf = self.overflow.buf.lock();
            buf.clear();
            buf.reserve(refused);
            buf.extend(tasks.drain(from..));
        }
        tp_debug!("overflowed {} tasks from a batch", refused);
        self.invoke_refuse()
    }

    /// The callback runs outside the buffer lock: it is expected to call
    /// back into `pull_overflow`.
    fn invoke_refuse(&self) -> PoolResult<()> {
        let cb = self.refuse_cb.lock().clone();
        match cb {
            Some(cb) => {
                cb();
                Ok(())
            }
            None => Err(PoolError::Overflow),
        }
    }

    #[cfg(test)]
    pub(crate) fn enqueue_direct(&self, index: usize, task: Task) {
        self.shared.workers[index].enqueue(task);
    }
}

impl<W: FixedWorker> Drop for FixedPool<W> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Cursor search budget: zero with a single worker (nowhere to move),
/// otherwise a quarter of the workers capped at four steps.
fn cursor_move_limit(workers: usize) -> usize {
    if workers == 1 {
        0
    } else {
        (workers / 4).clamp(1, 4)
    }
}
