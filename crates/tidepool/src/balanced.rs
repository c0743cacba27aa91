//! Balanced pool: single-queue donation workers
//!
//! Each worker owns one mutex-guarded queue and an in-flight slot on its
//! thread's stack. Donation moves exactly one task at a time, so every
//! queued task remains stealable until the moment it loads - the pool
//! degrades gracefully when task durations are uneven, at the cost of
//! more producer/worker contention than the queue-swap design.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tidepool_core::task::Task;

use crate::fixed::{FixedPool, FixedWorker, PoolShared};
use crate::worker::WorkerCore;

/// Fixed pool with single-queue donation workers.
pub type BalancedPool = FixedPool<DonateWorker>;

/// A worker with one shared queue.
pub struct DonateWorker {
    queue: Mutex<VecDeque<Task>>,
    core: WorkerCore,
}

impl DonateWorker {
    /// Pop the front task into the in-flight slot.
    fn try_load(&self, slot: &mut Task) -> bool {
        let mut queue = self.queue.lock();
        match queue.pop_front() {
            Some(task) => {
                drop(queue);
                *slot = task;
                true
            }
            None => false,
        }
    }

    /// Donate one task to a stealing peer.
    ///
    /// Non-blocking: fails if the lock is contended or the queue is
    /// empty. Exactly one task and one unit of count move.
    fn try_donate(&self, thief: &WorkerCore, slot: &mut Task) -> bool {
        let task = match self.queue.try_lock() {
            Some(mut queue) => match queue.pop_front() {
                Some(task) => task,
                None => return false,
            },
            None => return false,
        };
        *slot = task;
        self.core.transfer(thief, 1);
        true
    }

    /// Execute the in-flight task and debit the count.
    fn run_in_flight(&self, slot: &mut Task) {
        slot.take().run();
        self.core.finish_one();
    }
}

impl FixedWorker for DonateWorker {
    fn new() -> Self {
        DonateWorker {
            queue: Mutex::new(VecDeque::new()),
            core: WorkerCore::new(),
        }
    }

    fn core(&self) -> &WorkerCore {
        &self.core
    }

    fn enqueue(&self, task: Task) {
        let mut queue = self.queue.lock();
        queue.push_back(task);
        self.core.add(1);
    }

    fn enqueue_batch(&self, tasks: Vec<Task>) {
        let n = tasks.len();
        let mut queue = self.queue.lock();
        queue.extend(tasks);
        self.core.add(n as isize);
    }

    fn run(shared: Arc<PoolShared<Self>>, index: usize) {
        let mut slot = Task::empty();
        let me = &shared.workers[index];

        while !shared.stopping.load(Ordering::Acquire) {
            if me.core.count() == 0 {
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
                        if shared.workers[victim].try_donate(&me.core, &mut slot) {
                            // One task per donation, then back to the loop.
                            me.run_in_flight(&mut slot);
                            break;
                        }
                    }
                    if me.core.count() != 0 || me.core.is_waiting() {
                        continue;
                    }
                }
                thread::yield_now();
            } else if me.try_load(&mut slot) {
                me.run_in_flight(&mut slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_submit_and_return() {
        let mut pool = BalancedPool::new(4, 0);
        let handle = pool.submit_for_return(|| 2023);
        assert_eq!(handle.get(), Some(2023));
        pool.close();
    }

    #[test]
    fn test_batched_counting() {
        const TOTAL: usize = 10_000;
        const BATCH: usize = 10;

        let mut pool = BalancedPool::new(4, 0);
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
    fn test_donation_spreads_from_one_worker() {
        const N: usize = 64;

        let mut pool = BalancedPool::new(4, 0);
        pool.enable_steal(3).unwrap();

        let executed = Arc::new(AtomicUsize::new(0));
        let executors = Arc::new(Mutex::new(HashSet::new()));

        // Load everything onto worker 0, bypassing the cursor.
        for _ in 0..N {
            let executed = Arc::clone(&executed);
            let executors = Arc::clone(&executors);
            pool.enqueue_direct(
                0,
                Task::new(move || {
                    let name = thread::current()
                        .name()
                        .map(str::to_owned)
                        .unwrap_or_default();
                    executors.lock().insert(name);
                    thread::sleep(Duration::from_millis(2));
                    executed.fetch_add(1, Ordering::Relaxed);
                }),
            );
        }

        pool.wait_for_tasks();

        assert_eq!(executed.load(Ordering::Relaxed), N);
        // Every idle worker must have taken at least one donation.
        assert_eq!(executors.lock().len(), 4);
        pool.close();
    }

    #[test]
    fn test_capacity_respected() {
        use std::sync::atomic::AtomicBool;

        // 2 workers, 1 slot each. Gate both slots, then overflow.
        let mut pool = BalancedPool::new(2, 2);
        let gate = Arc::new(AtomicBool::new(false));

        for _ in 0..2 {
            let gate = Arc::clone(&gate);
            pool.submit(move || {
                while !gate.load(Ordering::Acquire) {
                    thread::yield_now();
                }
            })
            .unwrap();
        }

        assert_eq!(
            pool.submit(|| {}),
            Err(tidepool_core::PoolError::Overflow)
        );

        gate.store(true, Ordering::Release);
        pool.wait_for_tasks();
        assert_eq!(pool.tasks_remaining(), 0);
        pool.close();
    }

    #[test]
    fn test_fifo_per_worker() {
        let mut pool = BalancedPool::new(1, 0);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let order = Arc::clone(&order);
            pool.submit(move || {
                order.lock().push(i);
            })
            .unwrap();
        }

        pool.wait_for_tasks();
        assert_eq!(*order.lock(), (0..100).collect::<Vec<_>>());
        pool.close();
    }
}
