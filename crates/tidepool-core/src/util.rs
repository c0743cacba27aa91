//! Test and demo helpers
//!
//! Purely functional utilities used by the cmd/ drivers and the pool
//! tests. Nothing here shares state with a pool instance.

use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Synchronised line-oriented stdout printer.
///
/// Interleaving-safe output for demos and tests where several workers
/// print concurrently.
pub struct SyncStream {
    guard: Mutex<()>,
}

impl SyncStream {
    pub const fn new() -> Self {
        SyncStream {
            guard: Mutex::new(()),
        }
    }

    /// Print one line atomically.
    pub fn print(&self, line: &str) {
        let _g = self.guard.lock().unwrap();
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let _ = writeln!(out, "{}", line);
    }
}

impl Default for SyncStream {
    fn default() -> Self {
        SyncStream::new()
    }
}

/// Sleep the calling thread for `n` milliseconds.
#[inline]
pub fn sleep_for_millis(n: u64) {
    std::thread::sleep(Duration::from_millis(n));
}

/// Sleep the calling thread for `n` seconds.
#[inline]
pub fn sleep_for_seconds(n: u64) {
    std::thread::sleep(Duration::from_secs(n));
}

/// Invoke a closure `n` times.
#[inline]
pub fn repeat<F: FnMut()>(mut f: F, n: usize) {
    for _ in 0..n {
        f();
    }
}

/// Elapsed-time helper for the benchmark driver.
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Stopwatch {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed milliseconds as a float, for rate reports.
    pub fn millis(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1e3
    }
}
