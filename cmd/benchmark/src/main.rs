//! Benchmark suite for the pool engines
//!
//! Compares single-submit and batch throughput across the three
//! variants.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tidepool::{BalancedPool, DynamicPool, SteadyPool, Task};
use tidepool_core::util::Stopwatch;

const WORKERS: usize = 4;
const TASKS: usize = 200_000;
const BATCH: usize = 100;

fn main() {
    println!("=== tidepool benchmarks ===\n");
    println!("workers: {}, tasks per run: {}\n", WORKERS, TASKS);

    bench("steady / single", |counter| {
        let mut pool = SteadyPool::new(WORKERS, 0);
        drive_single(counter, |t| pool.submit_task(t).unwrap());
        pool.wait_for_tasks();
        pool.close();
    });

    bench("steady / batch", |counter| {
        let mut pool = SteadyPool::new(WORKERS, 0);
        drive_batches(counter, |b| pool.submit_batch(b).unwrap());
        pool.wait_for_tasks();
        pool.close();
    });

    bench("balanced / single", |counter| {
        let mut pool = BalancedPool::new(WORKERS, 0);
        drive_single(counter, |t| pool.submit_task(t).unwrap());
        pool.wait_for_tasks();
        pool.close();
    });

    bench("balanced / batch", |counter| {
        let mut pool = BalancedPool::new(WORKERS, 0);
        drive_batches(counter, |b| pool.submit_batch(b).unwrap());
        pool.wait_for_tasks();
        pool.close();
    });

    bench("dynamic / single", |counter| {
        let mut pool = DynamicPool::new(WORKERS);
        drive_single(counter, |t| pool.submit_task(t).unwrap());
        pool.wait_for_tasks();
        pool.close();
    });

    bench("dynamic / batch", |counter| {
        let mut pool = DynamicPool::new(WORKERS);
        drive_batches(counter, |b| pool.submit_batch(b).unwrap());
        pool.wait_for_tasks();
        pool.close();
    });

    println!("\n=== benchmarks complete ===");
}

fn bench<F: FnOnce(&Arc<AtomicU64>)>(name: &str, run: F) {
    println!("Benchmark: {}", name);
    println!("{}", "-".repeat(40));

    let counter = Arc::new(AtomicU64::new(0));
    let sw = Stopwatch::start();
    run(&counter);
    let elapsed = sw.elapsed();

    assert_eq!(counter.load(Ordering::Relaxed) as usize, TASKS);
    println!("  Total time:  {:?}", elapsed);
    println!(
        "  Rate:        {:.0} tasks/sec\n",
        TASKS as f64 / elapsed.as_secs_f64()
    );
}

fn drive_single<F: FnMut(Task)>(counter: &Arc<AtomicU64>, mut submit: F) {
    for _ in 0..TASKS {
        let counter = Arc::clone(counter);
        submit(Task::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
    }
}

fn drive_batches<F: FnMut(Vec<Task>)>(counter: &Arc<AtomicU64>, mut submit: F) {
    for _ in 0..(TASKS / BATCH) {
        let batch: Vec<Task> = (0..BATCH)
            .map(|_| {
                let counter = Arc::clone(counter);
                Task::new(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
            })
            .collect();
        submit(batch);
    }
}
