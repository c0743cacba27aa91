//! Type-erased task objects
//!
//! Every queue entry in a pool is one `Task`: an owned, move-only handle
//! to exactly one nullary callable. The general form boxes the callable
//! behind a single dynamic dispatch; plain function pointers are stored
//! inline without an allocation.

use core::fmt;

/// A move-only holder of one nullary callable.
///
/// A task either holds a callable or is empty. Running a task consumes
/// it; running an empty task panics. There is no `Clone` - a task lives
/// in exactly one place at a time (a producer frame, a queue entry, or
/// an in-flight execution slot) and every transfer is a move.
///
/// The callable must own everything it touches (`'static`), so a task
/// can never smuggle a borrow of a caller-owned value into a worker.
pub struct Task {
    repr: TaskRepr,
}

enum TaskRepr {
    Empty,
    /// Inline plain function pointer. No allocation, no indirection
    /// beyond the call itself.
    Fn(fn()),
    /// Heap-allocated callable behind one virtual call.
    Boxed(Box<dyn FnOnce() + Send + 'static>),
}

impl Task {
    /// Create a task from any owned nullary callable.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task {
            repr: TaskRepr::Boxed(Box::new(f)),
        }
    }

    /// Create a task from a plain function pointer, stored inline.
    ///
    /// Behaviourally identical to [`Task::new`]; skips the allocation.
    pub fn from_fn(f: fn()) -> Self {
        Task {
            repr: TaskRepr::Fn(f),
        }
    }

    /// Create an empty task.
    pub const fn empty() -> Self {
        Task {
            repr: TaskRepr::Empty,
        }
    }

    /// Replace the held callable with a new one.
    ///
    /// The previous callable, if any, is dropped without being run.
    pub fn reset<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.repr = TaskRepr::Boxed(Box::new(f));
    }

    /// True if this task holds no callable.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self.repr, TaskRepr::Empty)
    }

    /// Move the callable out, leaving this task empty.
    #[inline]
    pub fn take(&mut self) -> Task {
        core::mem::replace(self, Task::empty())
    }

    /// Consume the task and invoke its callable.
    ///
    /// # Panics
    ///
    /// Panics if the task is empty.
    pub fn run(self) {
        match self.repr {
            TaskRepr::Empty => panic!("attempted to run an empty task"),
            TaskRepr::Fn(f) => f(),
            TaskRepr::Boxed(f) => f(),
        }
    }
}

impl Default for Task {
    fn default() -> Self {
        Task::empty()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.repr {
            TaskRepr::Empty => "empty",
            TaskRepr::Fn(_) => "fn",
            TaskRepr::Boxed(_) => "boxed",
        };
        f.debug_struct("Task").field("repr", &state).finish()
    }
}
