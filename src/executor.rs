//! Executor handles.
//!
//! An executor is the only thing collaborators ever see of an execution
//! context: a named, cloneable handle that accepts tasks.

use crate::error::SubmitError;
use crate::queue::TaskQueue;
use crate::task::Task;
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

/// Something that accepts tasks for later execution.
pub trait TaskExecutor: Send + Sync {
    /// Name under which the executor is registered.
    fn name(&self) -> &str;

    /// Enqueues a task. Never runs it on the calling thread.
    fn defer(&self, task: Task) -> Result<(), SubmitError>;

    /// Runs a task, inline when the executor allows it and the caller is
    /// already one of its worker threads, otherwise like [`TaskExecutor::defer`].
    fn execute(&self, task: Task) -> Result<(), SubmitError> {
        self.defer(task)
    }
}

/// Shared, non-owning handle onto an executor of a live context.
pub type ExecutorRef = Arc<dyn TaskExecutor>;

/// Closure-taking conveniences over [`TaskExecutor`].
pub trait TaskExecutorExt: TaskExecutor {
    fn defer_fn<F>(&self, work: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.defer(Task::new(work))
    }

    fn execute_fn<F>(&self, work: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute(Task::new(work))
    }
}

impl<E: TaskExecutor + ?Sized> TaskExecutorExt for E {}

thread_local! {
    static CURRENT_CONTEXT: Cell<u64> = const { Cell::new(0) };
}

/// Marks the calling thread as a worker of execution context `id`.
pub(crate) fn enter_context(id: u64) {
    CURRENT_CONTEXT.with(|current| current.set(id));
}

fn current_context() -> u64 {
    CURRENT_CONTEXT.with(|current| current.get())
}

/// Whether the calling thread is a worker of some execution context.
pub(crate) fn on_worker_thread() -> bool {
    current_context() != 0
}

/// Executor that pushes into one queue of an execution context.
pub struct QueueExecutor {
    name: String,
    context_id: u64,
    queue: Arc<TaskQueue>,
    inline_when_on_worker: bool,
    report_on_failure: bool,
}

impl QueueExecutor {
    pub(crate) fn new(
        name: impl Into<String>,
        context_id: u64,
        queue: Arc<TaskQueue>,
        inline_when_on_worker: bool,
        report_on_failure: bool,
    ) -> Self {
        QueueExecutor {
            name: name.into(),
            context_id,
            queue,
            inline_when_on_worker,
            report_on_failure,
        }
    }

    /// Name of the queue the executor feeds.
    pub fn queue_name(&self) -> &str {
        self.queue.name()
    }
}

impl TaskExecutor for QueueExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn defer(&self, task: Task) -> Result<(), SubmitError> {
        self.queue.try_push(task).inspect_err(|err| {
            if self.report_on_failure {
                tracing::warn!(
                    executor = %self.name,
                    queue = %self.queue.name(),
                    capacity = self.queue.capacity(),
                    "Task submission rejected: {}",
                    err
                );
            }
        })
    }

    fn execute(&self, task: Task) -> Result<(), SubmitError> {
        if self.inline_when_on_worker && current_context() == self.context_id {
            task.run();
            return Ok(());
        }
        self.defer(task)
    }
}

impl fmt::Debug for QueueExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueExecutor")
            .field("name", &self.name)
            .field("queue", &self.queue.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueuePolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_defer_enqueues() {
        let queue = Arc::new(TaskQueue::new("q", QueuePolicy::LockfreeMpmc, 2));
        let exec = QueueExecutor::new("exec", 7, queue.clone(), true, false);

        exec.defer_fn(|| {}).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(exec.name(), "exec");
        assert_eq!(exec.queue_name(), "q");
    }

    #[test]
    fn test_execute_runs_inline_on_owner_thread() {
        let queue = Arc::new(TaskQueue::new("q", QueuePolicy::LockfreeMpmc, 2));
        let exec = QueueExecutor::new("exec", 42, queue.clone(), true, false);
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = ran.clone();
        exec.execute_fn(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(queue.len(), 1, "not a worker thread, must enqueue");

        enter_context(42);
        let ran_clone = ran.clone();
        exec.execute_fn(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        enter_context(0);

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_backpressure_surfaces_to_caller() {
        let queue = Arc::new(TaskQueue::new("q", QueuePolicy::LockfreeSpsc, 1));
        let exec = QueueExecutor::new("exec", 1, queue, false, true);

        assert!(exec.defer_fn(|| {}).is_ok());
        assert_eq!(exec.defer_fn(|| {}), Err(SubmitError::QueueFull));
    }
}
