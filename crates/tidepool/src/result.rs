//! One-shot result handles for `submit_for_return`

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{bounded, Receiver};
use tidepool_core::task::Task;

/// A one-shot channel conveying the return value of a submitted callable.
///
/// Produced by `submit_for_return`. Getting the result waits until the
/// task has executed, then yields the returned value; a panic escaping
/// the task body is captured and re-raised at [`get`](ResultHandle::get).
///
/// An empty handle (the overflow case) signals its emptiness instead of
/// blocking. Dropping a handle never blocks the worker that executes the
/// task.
pub struct ResultHandle<R> {
    rx: Option<Receiver<thread::Result<R>>>,
}

impl<R: Send + 'static> ResultHandle<R> {
    /// Wrap a callable into a task that drives a new handle.
    pub(crate) fn package<F>(f: F) -> (Task, ResultHandle<R>)
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let task = Task::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f));
            // The receiver may already be dropped; the value is discarded.
            let _ = tx.send(result);
        });
        (task, ResultHandle { rx: Some(rx) })
    }

    /// An empty handle, produced when admission fails.
    pub(crate) fn empty() -> Self {
        ResultHandle { rx: None }
    }

    /// True if this handle will never carry a value.
    pub fn is_empty(&self) -> bool {
        self.rx.is_none()
    }

    /// Wait for the task and take its return value.
    ///
    /// Returns `None` without blocking if the handle is empty, or if the
    /// task was discarded before it could execute (pool closed, overflow
    /// buffer overwritten).
    ///
    /// # Panics
    ///
    /// Re-raises a panic that escaped the task body.
    pub fn get(self) -> Option<R> {
        let rx = self.rx?;
        match rx.recv() {
            Ok(Ok(value)) => Some(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => None,
        }
    }
}

/// An ordered collection of result handles.
///
/// Push handles as tasks are submitted, then take all values at once.
pub struct ResultSet<R> {
    handles: Vec<ResultHandle<R>>,
}

impl<R: Send + 'static> ResultSet<R> {
    pub fn new() -> Self {
        ResultSet {
            handles: Vec::new(),
        }
    }

    pub fn push(&mut self, handle: ResultHandle<R>) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every handle in insertion order.
    pub fn get(self) -> Vec<Option<R>> {
        self.handles.into_iter().map(ResultHandle::get).collect()
    }
}

impl<R: Send + 'static> Default for ResultSet<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_and_get() {
        let (task, handle) = ResultHandle::package(|| 2023);
        task.run();
        assert!(!handle.is_empty());
        assert_eq!(handle.get(), Some(2023));
    }

    #[test]
    fn test_empty_handle() {
        let handle: ResultHandle<i32> = ResultHandle::empty();
        assert!(handle.is_empty());
        assert_eq!(handle.get(), None);
    }

    #[test]
    fn test_discarded_task_yields_none() {
        let (task, handle) = ResultHandle::package(|| 1);
        drop(task);
        assert_eq!(handle.get(), None);
    }

    #[test]
    fn test_dropped_handle_does_not_block_run() {
        let (task, handle) = ResultHandle::package(|| 7);
        drop(handle);
        task.run();
    }

    #[test]
    #[should_panic(expected = "task body failed")]
    fn test_panic_propagates_at_get() {
        let (task, handle) = ResultHandle::package(|| -> i32 {
            panic!("task body failed");
        });
        task.run();
        let _ = handle.get();
    }

    #[test]
    fn test_result_set_ordered() {
        let mut set = ResultSet::new();
        let mut tasks = Vec::new();
        for i in 0..5 {
            let (task, handle) = ResultHandle::package(move || i);
            tasks.push(task);
            set.push(handle);
        }
        assert_eq!(set.len(), 5);

        // Execute out of order; results stay in insertion order.
        for task in tasks.into_iter().rev() {
            task.run();
        }
        let values = set.get();
        assert_eq!(values, vec![Some(0), Some(1), Some(2), Some(3), Some(4)]);
    }
}
