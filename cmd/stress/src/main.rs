//! Stress test - high-volume counting workload
//!
//! Pushes a large number of trivial tasks through a chosen pool variant
//! and verifies the count.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tidepool::{BalancedPool, DynamicPool, SteadyPool, Task};
use tidepool_core::util::Stopwatch;

fn main() {
    let variant = std::env::args().nth(1).unwrap_or_else(|| "steady".to_string());
    let num_tasks: usize = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1_000_000);
    let workers: usize = std::env::args()
        .nth(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    println!("=== tidepool stress ===\n");
    println!(
        "variant: {}, tasks: {}, workers: {}",
        variant, num_tasks, workers
    );

    let counter = Arc::new(AtomicU64::new(0));
    let sw = Stopwatch::start();

    match variant.as_str() {
        "steady" => {
            let mut pool = SteadyPool::new(workers, 0);
            run_batches(&counter, num_tasks, |batch| {
                pool.submit_batch(batch).unwrap()
            });
            pool.wait_for_tasks();
            pool.close();
        }
        "balanced" => {
            let mut pool = BalancedPool::new(workers, 0);
            run_batches(&counter, num_tasks, |batch| {
                pool.submit_batch(batch).unwrap()
            });
            pool.wait_for_tasks();
            pool.close();
        }
        "dynamic" => {
            let mut pool = DynamicPool::new(workers.max(1));
            run_batches(&counter, num_tasks, |batch| {
                pool.submit_batch(batch).unwrap()
            });
            pool.wait_for_tasks();
            pool.close();
        }
        other => {
            eprintln!("unknown variant '{}' (steady | balanced | dynamic)", other);
            std::process::exit(2);
        }
    }

    let elapsed = sw.elapsed();
    let counted = counter.load(Ordering::Relaxed);

    println!("\nCounted:     {} / {}", counted, num_tasks);
    println!("Total time:  {:?}", elapsed);
    println!(
        "Rate:        {:.0} tasks/sec",
        num_tasks as f64 / elapsed.as_secs_f64()
    );

    assert_eq!(counted as usize, num_tasks, "lost or duplicated tasks");
    println!("\nOK");
}

fn run_batches<F: FnMut(Vec<Task>)>(counter: &Arc<AtomicU64>, total: usize, mut submit: F) {
    const BATCH: usize = 64;

    let mut remaining = total;
    while remaining > 0 {
        let n = remaining.min(BATCH);
        let batch: Vec<Task> = (0..n)
            .map(|_| {
                let counter = Arc::clone(counter);
                Task::new(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                })
            })
            .collect();
        submit(batch);
        remaining -= n;
    }
}
