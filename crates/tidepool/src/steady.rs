//! Steady pool: queue-swap workers
//!
//! Each worker pairs a producer-side public queue with a consumer-side
//! private buffer. The worker takes work by swapping the two queue
//! headers under a spin lock - O(1) regardless of how many tasks move -
//! and then commits to draining everything it swapped in. Stealing moves
//! a victim's whole public queue in one swap.
//!
//! Suited to steady, high-volume streams of short uniform tasks, and to
//! serving as a core pool whose overflow is rehomed into a
//! [`DynamicPool`](crate::DynamicPool) cache tier via the refuse
//! callback.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use tidepool_core::spinlock::SpinLock;
use tidepool_core::task::Task;

use crate::fixed::{FixedPool, FixedWorker, PoolShared};
use crate::worker::WorkerCore;

/// Fixed pool with queue-swap workers.
pub type SteadyPool = FixedPool<SwapWorker>;

/// A worker with paired public/buffer queues.
///
/// Only the public queue is shared; the buffer lives on the worker
/// thread's stack and needs no lock.
pub struct SwapWorker {
    public_q: SpinLock<VecDeque<Task>>,
    core: WorkerCore,
}

impl SwapWorker {
    /// Swap the public queue into the worker's private buffer.
    ///
    /// Unconditional: an empty public queue swaps an empty buffer back.
    /// Returns whether the buffer now holds tasks.
    fn try_swap_in(&self, buffer: &mut VecDeque<Task>) -> bool {
        {
            let mut public = self.public_q.lock();
            std::mem::swap(&mut *public, buffer);
        }
        !buffer.is_empty()
    }

    /// Give the whole public queue to a stealing peer.
    ///
    /// Non-blocking: fails if the lock is contended or the queue is
    /// empty. On success the entire contents swap into the thief's
    /// (empty) buffer and the task count transfers with them.
    fn try_hand_off(&self, thief: &WorkerCore, thief_buffer: &mut VecDeque<Task>) -> bool {
        let taken = match self.public_q.try_lock() {
            Some(mut public) => {
                if public.is_empty() {
                    return false;
                }
                std::mem::swap(&mut *public, thief_buffer);
                thief_buffer.len()
            }
            None => return false,
        };
        self.core.transfer(thief, taken as isize);
        true
    }

    /// Drain the private buffer, debiting the count per task.
    ///
    /// Once a worker has swapped in, it executes everything it found
    /// before checking any flag again.
    fn run_buffer(&self, buffer: &mut VecDeque<Task>) {
        while let Some(task) = buffer.pop_front() {
            task.run();
            self.core.finish_one();
        }
    }
}

impl FixedWorker for SwapWorker {
    fn new() -> Self {
        SwapWorker {
            public_q: SpinLock::new(VecDeque::new()),
            core: WorkerCore::new(),
        }
    }

    fn core(&self) -> &WorkerCore {
        &self.core
    }

    fn enqueue(&self, task: Task) {
        let mut public = self.public_q.lock();
        public.push_back(task);
        self.core.add(1);
    }

    fn enqueue_batch(&self, tasks: Vec<Task>) {
        let n = tasks.len();
        let mut public = self.public_q.lock();
        public.extend(tasks);
        self.core.add(n as isize);
    }

    fn run(shared: Arc<PoolShared<Self>>, index: usize) {
        let mut buffer: VecDeque<Task> = VecDeque::new();
        let me = &shared.workers[index];

        while !shared.stopping.load(Ordering::Acquire) {
            if me.core.count() == 0 {
                // Quiescence requested: keep signalling until released.
                if me.core.is_waiting() {
                    me.core.signal_done();
                    thread::yield_now();
                    continue;
                }

                if shared.steal_enabled.load(Ordering::Acquire) {
                    let n = shared.workers.len();
                    let budget = shared.steal_max.load(Ordering::Relaxed);
                    let mut victim = index;
                    for _ in 0..budget {
                        victim = (victim + 1) % n;
                        if shared.workers[victim].try_hand_off(&me.core, &mut buffer) {
                            me.run_buffer(&mut buffer);
                            break;
                        }
                    }
                    if me.core.count() != 0 || me.core.is_waiting() {
                        continue;
                    }
                }
                thread::yield_now();
            } else if me.try_swap_in(&mut buffer) {
                me.run_buffer(&mut buffer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DynamicPool;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_submit_for_return_minimal() {
        let mut pool = SteadyPool::new(4, 0);
        let handle = pool.submit_for_return(|| 2023);
        assert_eq!(handle.get(), Some(2023));
        pool.close();
    }

    #[test]
    fn test_batched_counting() {
        const TOTAL: usize = 100_000;
        const BATCH: usize = 10;

        let mut pool = SteadyPool::new(4, 0);
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
    fn test_overflow_rehomed_into_dynamic_pool() {
        // Core pool: 4 workers, 10 slots each. Cache tier: 2 workers.
        let mut core = SteadyPool::new(4, 40);
        let cache = Arc::new(DynamicPool::new(2));

        let executed = Arc::new(AtomicUsize::new(0));
        let overflowed = Arc::new(AtomicUsize::new(0));

        let puller = core.overflow_puller();
        let rehome_to = Arc::clone(&cache);
        let overflow_seen = Arc::clone(&overflowed);
        core.set_refuse_callback(move || {
            let tasks = puller.pull();
            overflow_seen.fetch_add(tasks.len(), Ordering::Relaxed);
            rehome_to.submit_batch(tasks).unwrap();
        })
        .unwrap();

        for _ in 0..43 {
            let executed = Arc::clone(&executed);
            core.submit(move || {
                std::thread::sleep(Duration::from_millis(5));
                executed.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }

        core.wait_for_tasks();
        cache.wait_for_tasks();

        assert_eq!(executed.load(Ordering::Relaxed), 43);
        assert_eq!(overflowed.load(Ordering::Relaxed), 3);
        core.close();
    }

    #[test]
    fn test_batch_admission_boundary() {
        // 2 workers, 2 slots each. Gate the tasks so capacity stays
        // occupied for the whole batch admission.
        let mut pool = SteadyPool::new(2, 4);
        let gate = Arc::new(AtomicBool::new(false));
        let executed = Arc::new(AtomicUsize::new(0));
        let overflowed = Arc::new(AtomicUsize::new(0));

        let puller = pool.overflow_puller();
        let overflow_seen = Arc::clone(&overflowed);
        pool.set_refuse_callback(move || {
            overflow_seen.fetch_add(puller.pull().len(), Ordering::Relaxed);
        })
        .unwrap();

        let tasks: Vec<Task> = (0..5)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let executed = Arc::clone(&executed);
                Task::new(move || {
                    while !gate.load(Ordering::Acquire) {
                        thread::yield_now();
                    }
                    executed.fetch_add(1, Ordering::Relaxed);
                })
            })
            .collect();
        pool.submit_batch(tasks).unwrap();

        gate.store(true, Ordering::Release);
        pool.wait_for_tasks();

        assert_eq!(overflowed.load(Ordering::Relaxed), 1);
        assert_eq!(executed.load(Ordering::Relaxed), 4);
        pool.close();
    }

    #[test]
    fn test_fifo_per_worker() {
        // A single worker executes its queue strictly in enqueue order.
        let mut pool = SteadyPool::new(1, 0);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..100 {
            let order = Arc::clone(&order);
            pool.submit(move || {
                order.lock().push(i);
            })
            .unwrap();
        }

        pool.wait_for_tasks();
        let seen = order.lock();
        assert_eq!(*seen, (0..100).collect::<Vec<_>>());
        drop(seen);
        pool.close();
    }

    #[test]
    fn test_steal_spreads_a_hot_worker() {
        let mut pool = SteadyPool::new(4, 0);
        pool.enable_steal(3).unwrap();

        let executed = Arc::new(AtomicUsize::new(0));
        const N: usize = 64;

        // Load one worker directly; the others must take the rest.
        for _ in 0..N {
            let executed = Arc::clone(&executed);
            pool.enqueue_direct(
                0,
                Task::new(move || {
                    std::thread::sleep(Duration::from_millis(1));
                    executed.fetch_add(1, Ordering::Relaxed);
                }),
            );
        }

        pool.wait_for_tasks();
        assert_eq!(executed.load(Ordering::Relaxed), N);
        pool.close();
    }

    #[test]
    fn test_result_set_collects_in_order() {
        use crate::ResultSet;

        let mut pool = SteadyPool::new(4, 0);
        let mut set = ResultSet::new();
        for i in 0..5 {
            set.push(pool.submit_for_return(move || i));
        }
        assert_eq!(
            set.get(),
            vec![Some(0), Some(1), Some(2), Some(3), Some(4)]
        );
        pool.close();
    }

    #[test]
    fn test_tasks_remaining_reaches_zero() {
        let mut pool = SteadyPool::new(2, 0);
        for _ in 0..50 {
            pool.submit(|| {
                std::thread::sleep(Duration::from_micros(100));
            })
            .unwrap();
        }
        pool.wait_for_tasks();
        assert_eq!(pool.tasks_remaining(), 0);
        pool.close();
    }
}
