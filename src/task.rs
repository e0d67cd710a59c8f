//! Units of work.
//!
//! A task is an opaque closure queued for later execution on a worker thread.
//! Submission is fire-and-forget: nothing flows back to the submitter once the
//! task has been accepted.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// A unit of work to be executed by a worker thread.
pub struct Task {
    work: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    /// Creates a new task with the given work function.
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task {
            work: Box::new(work),
        }
    }

    /// Executes the task on the calling thread.
    pub fn run(self) {
        (self.work)();
    }

    /// Executes the task, containing any panic it raises.
    ///
    /// Returns false if the task panicked. Worker loops use this so one faulty
    /// task does not take the thread and every queued task down with it.
    pub(crate) fn run_contained(self) -> bool {
        panic::catch_unwind(AssertUnwindSafe(self.work)).is_ok()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_task_execution() {
        let executed = Arc::new(AtomicBool::new(false));
        let executed_clone = executed.clone();

        let task = Task::new(move || {
            executed_clone.store(true, Ordering::SeqCst);
        });

        task.run();
        assert!(executed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_contained_panic() {
        let task = Task::new(|| panic!("Intentional panic for testing"));
        assert!(!task.run_contained());

        let task = Task::new(|| {});
        assert!(task.run_contained());
    }
}
