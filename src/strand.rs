//! Strands.
//!
//! A strand serializes several logical task streams over a shared executor
//! without owning a thread. Tasks pushed into a strand run in submission
//! order, one at a time, even when the underlying executor is served by many
//! worker threads.
//!
//! The strand keeps a count of pending tasks. The producer that moves the count
//! from zero to one dispatches a drain job to the underlying executor; the
//! drain job runs queued tasks until the count returns to zero. Since only the
//! 0 -> 1 transition dispatches, at most one drain job exists at any time.
//!
//! A task accepted by a strand queue is never dropped because the shared
//! executor is full. If the drain job cannot be dispatched, the strand is
//! marked stalled and keeps its tasks. The next submission, or the strand
//! stopping, dispatches the drain job again. Only a stopped shared executor
//! makes the strand discard what it holds.

use crate::error::SubmitError;
use crate::executor::{ExecutorRef, TaskExecutor};
use crate::queue::TaskQueue;
use crate::task::Task;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Default number of tasks a drain job runs before yielding the worker.
pub const DEFAULT_STRAND_MAX_BATCH: usize = 128;

/// Ordering layer over a shared executor.
pub struct TaskStrand {
    name: String,
    /// Highest priority first.
    queues: Vec<Arc<TaskQueue>>,
    pending: AtomicUsize,
    /// Tasks are pending but no drain job exists.
    stalled: AtomicBool,
    out: ExecutorRef,
    max_batch: usize,
}

impl TaskStrand {
    /// Creates a strand over `out`. Queue 0 is drained first.
    pub fn new(
        name: impl Into<String>,
        out: ExecutorRef,
        queues: Vec<Arc<TaskQueue>>,
        max_batch: usize,
    ) -> Arc<Self> {
        Arc::new(TaskStrand {
            name: name.into(),
            queues,
            pending: AtomicUsize::new(0),
            stalled: AtomicBool::new(false),
            out,
            max_batch: max_batch.max(1),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queues(&self) -> &[Arc<TaskQueue>] {
        &self.queues
    }

    /// Number of tasks accepted but not yet run.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::Acquire)
    }

    /// Stops every strand queue. Tasks already accepted are still drained: a
    /// stalled strand retries its drain job until the shared executor takes it.
    pub fn request_stop(self: &Arc<Self>) {
        self.stop_queues();

        while self.stalled.swap(false, Ordering::AcqRel) {
            match self.dispatch() {
                Ok(()) => break,
                Err(SubmitError::QueueFull) => {
                    self.stalled.store(true, Ordering::Release);
                    thread::yield_now();
                }
                Err(err) => {
                    self.abandon(err);
                    break;
                }
            }
        }
    }

    fn stop_queues(&self) {
        for queue in &self.queues {
            queue.request_stop();
        }
    }

    fn push(self: &Arc<Self>, queue_index: usize, task: Task) -> Result<(), SubmitError> {
        self.queues[queue_index].try_push(task)?;

        // Stalled implies a non-zero count, so at most one condition holds.
        if self.pending.fetch_add(1, Ordering::AcqRel) == 0 || self.stalled.swap(false, Ordering::AcqRel) {
            return self.dispatch_or_stall();
        }
        Ok(())
    }

    /// Dispatches the drain job on behalf of the caller holding the strand.
    fn dispatch_or_stall(self: &Arc<Self>) -> Result<(), SubmitError> {
        match self.dispatch() {
            Ok(()) => Ok(()),
            Err(SubmitError::QueueFull) => {
                self.stalled.store(true, Ordering::Release);
                tracing::warn!(
                    strand = %self.name,
                    executor = %self.out.name(),
                    pending = self.pending(),
                    "Strand stalled, executor queue is full"
                );
                Ok(())
            }
            Err(err) => {
                self.abandon(err);
                Err(err)
            }
        }
    }

    /// The shared executor is gone; nothing queued can run anymore.
    fn abandon(&self, err: SubmitError) {
        self.stop_queues();
        let discarded = self.discard_pending();
        tracing::error!(
            strand = %self.name,
            executor = %self.out.name(),
            discarded,
            "Failed to dispatch strand: {}",
            err
        );
    }

    fn dispatch(self: &Arc<Self>) -> Result<(), SubmitError> {
        let strand = Arc::clone(self);
        self.out.defer(Task::new(move || strand.run_pending()))
    }

    fn pop_next(&self) -> Option<Task> {
        self.queues.iter().find_map(|queue| queue.try_pop())
    }

    fn run_pending(self: Arc<Self>) {
        let mut count = self.pending.load(Ordering::Acquire);
        let mut ran = 0;

        loop {
            let batch = count.min(self.max_batch - ran);
            for _ in 0..batch {
                // Every counted task was pushed before it was counted.
                if let Some(task) = self.pop_next() {
                    if !task.run_contained() {
                        tracing::error!(strand = %self.name, "Strand task panicked");
                    }
                }
            }
            ran += batch;

            let previous = self.pending.fetch_sub(batch, Ordering::AcqRel);
            count = previous - batch;
            if count == 0 {
                return;
            }

            if ran >= self.max_batch {
                // Give other work on the shared executor a chance to run.
                if self.dispatch().is_ok() {
                    return;
                }
                ran = 0;
            }
        }
    }

    fn discard_pending(&self) -> usize {
        let mut discarded = 0;
        let mut count = self.pending.load(Ordering::Acquire);
        while count > 0 {
            for _ in 0..count {
                if self.pop_next().is_some() {
                    discarded += 1;
                }
            }
            let previous = self.pending.fetch_sub(count, Ordering::AcqRel);
            count = previous - count;
        }
        discarded
    }
}

impl fmt::Debug for TaskStrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskStrand")
            .field("name", &self.name)
            .field("queues", &self.queues.len())
            .field("pending", &self.pending())
            .field("stalled", &self.is_stalled())
            .finish()
    }
}

/// Executor feeding one queue of a [`TaskStrand`].
pub struct StrandExecutor {
    name: String,
    strand: Arc<TaskStrand>,
    queue_index: usize,
}

impl StrandExecutor {
    /// Creates an executor pushing into queue `queue_index` of `strand`.
    pub fn new(strand: &Arc<TaskStrand>, queue_index: usize) -> Self {
        StrandExecutor {
            name: strand.queues[queue_index].name().to_string(),
            strand: Arc::clone(strand),
            queue_index,
        }
    }

    /// One executor per strand queue, highest priority first.
    pub fn for_each_queue(strand: &Arc<TaskStrand>) -> Vec<StrandExecutor> {
        (0..strand.queues.len())
            .map(|index| StrandExecutor::new(strand, index))
            .collect()
    }

    pub fn strand(&self) -> &Arc<TaskStrand> {
        &self.strand
    }
}

impl TaskExecutor for StrandExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn defer(&self, task: Task) -> Result<(), SubmitError> {
        self.strand.push(self.queue_index, task)
    }
}
