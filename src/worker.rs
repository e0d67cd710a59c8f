//! Live execution contexts.
//!
//! Worker threads repeatedly take the next task from the queues of their
//! context and run it to completion. Queues are scanned highest priority
//! first, so a lower-priority queue is only served while every higher one is
//! empty. A single worker over a single locking queue blocks on the queue;
//! every other worker polls and sleeps for the context's wait interval when
//! idle.
//!
//! Lower-priority queues can starve under sustained high-priority load. There
//! is no fairness mechanism.

use crate::affinity::CpuMask;
use crate::error::ContextError;
use crate::executor::{enter_context, ExecutorRef};
use crate::queue::TaskQueue;
use crate::strand::TaskStrand;
use crate::task::Task;
use crate::thread::spawn_worker_thread;
use crate::ThreadPriority;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Queues served by the workers of one context, highest priority first.
pub(crate) struct QueueSet {
    queues: Vec<Arc<TaskQueue>>,
}

impl QueueSet {
    pub(crate) fn new(queues: Vec<Arc<TaskQueue>>) -> Self {
        QueueSet { queues }
    }

    fn pop_next(&self) -> Option<Task> {
        self.queues.iter().find_map(|queue| queue.try_pop())
    }

    /// The queue to block on, when the workers may block at all.
    fn blocking_queue(&self) -> Option<&TaskQueue> {
        match self.queues.as_slice() {
            [queue] if queue.policy().is_blocking() => Some(queue),
            _ => None,
        }
    }

    fn request_stop(&self) {
        for queue in &self.queues {
            queue.request_stop();
        }
    }

    fn clear(&self) -> usize {
        self.queues.iter().map(|queue| queue.clear()).sum()
    }
}

/// Capabilities shared by every kind of live context.
pub trait ExecutionContext: Send {
    fn name(&self) -> &str;

    /// Executors registered by the context, in declaration order.
    fn executors(&self) -> &[(String, ExecutorRef)];

    fn nof_workers(&self) -> usize;

    /// Stops accepting tasks, drains what is queued and joins every thread.
    /// Calling it again does nothing.
    fn stop(&mut self);

    fn is_stopped(&self) -> bool;
}

/// Threads, queues and executors of one context.
pub(crate) struct ContextCore {
    name: String,
    id: u64,
    queues: Arc<QueueSet>,
    shutdown: Arc<AtomicBool>,
    threads: Vec<(String, JoinHandle<()>)>,
    nof_workers: usize,
    strands: Vec<Arc<TaskStrand>>,
    executors: Vec<(String, ExecutorRef)>,
    stopped: bool,
}

impl ContextCore {
    pub(crate) fn next_id() -> u64 {
        NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)
    }

    /// Spawns `nof_workers` threads over `queues`. If any thread fails to
    /// spawn, the ones already running are stopped and joined.
    pub(crate) fn start(
        name: &str,
        id: u64,
        queues: QueueSet,
        nof_workers: usize,
        worker_mask: impl Fn(usize) -> CpuMask,
        priority: ThreadPriority,
        wait_interval: Duration,
    ) -> Result<Self, ContextError> {
        let mut core = ContextCore {
            name: name.to_string(),
            id,
            queues: Arc::new(queues),
            shutdown: Arc::new(AtomicBool::new(false)),
            threads: Vec::with_capacity(nof_workers),
            nof_workers,
            strands: Vec::new(),
            executors: Vec::new(),
            stopped: false,
        };

        for index in 0..nof_workers {
            let thread_name = if nof_workers == 1 {
                name.to_string()
            } else {
                format!("{name}#{index}")
            };

            let queues = Arc::clone(&core.queues);
            let shutdown = Arc::clone(&core.shutdown);
            let loop_name = thread_name.clone();
            let spawned = spawn_worker_thread(thread_name.clone(), worker_mask(index), priority, move || {
                run_loop(&loop_name, id, &queues, &shutdown, wait_interval);
            });

            match spawned {
                Ok(handle) => core.threads.push((thread_name, handle)),
                Err(source) => {
                    core.stop();
                    return Err(ContextError::Spawn {
                        context: name.to_string(),
                        thread: thread_name,
                        source,
                    });
                }
            }
        }

        Ok(core)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn add_executor(&mut self, name: String, executor: ExecutorRef) {
        self.executors.push((name, executor));
    }

    pub(crate) fn add_strand(&mut self, strand: Arc<TaskStrand>) {
        self.strands.push(strand);
    }

    pub(crate) fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        // Strands first, so nothing new reaches the worker queues through them.
        for strand in &self.strands {
            strand.request_stop();
        }
        self.shutdown.store(true, Ordering::Release);
        self.queues.request_stop();

        let mut failed = 0;
        for (thread_name, handle) in self.threads.drain(..) {
            if handle.join().is_err() {
                failed += 1;
                tracing::error!(context = %self.name, thread = %thread_name, "Worker thread panicked");
            }
        }

        let discarded = self.queues.clear();
        if discarded > 0 {
            tracing::warn!(context = %self.name, discarded, "Discarded tasks left after stop");
        }
        tracing::info!(context = %self.name, failed, "Execution context stopped");
    }
}

impl Drop for ContextCore {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(thread_name: &str, context_id: u64, queues: &QueueSet, shutdown: &AtomicBool, wait_interval: Duration) {
    enter_context(context_id);
    let blocking = queues.blocking_queue();

    loop {
        let task = match blocking {
            Some(queue) => queue.pop_blocking(),
            None => queues.pop_next(),
        };

        match task {
            Some(task) => {
                if !task.run_contained() {
                    tracing::error!(thread = %thread_name, "Task panicked");
                }
            }
            None => {
                // Queues are empty; exit once stop was requested.
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                if blocking.is_none() {
                    thread::sleep(wait_interval);
                }
            }
        }
    }
}

macro_rules! impl_execution_context {
    ($ty:ty) => {
        impl ExecutionContext for $ty {
            fn name(&self) -> &str {
                &self.core.name
            }

            fn executors(&self) -> &[(String, ExecutorRef)] {
                &self.core.executors
            }

            fn nof_workers(&self) -> usize {
                self.core.nof_workers
            }

            fn stop(&mut self) {
                self.core.stop();
            }

            fn is_stopped(&self) -> bool {
                self.core.stopped
            }
        }
    };
}

/// One thread over one queue (plus any dedicated executor queues).
pub struct TaskWorker {
    pub(crate) core: ContextCore,
}

/// Several threads sharing one queue per priority.
pub struct TaskWorkerPool {
    pub(crate) core: ContextCore,
}

/// One thread over several queues of distinct priority.
pub struct PriorityMultiqueueWorker {
    pub(crate) core: ContextCore,
}

impl_execution_context!(TaskWorker);
impl_execution_context!(TaskWorkerPool);
impl_execution_context!(PriorityMultiqueueWorker);

/// A live execution context of any kind.
pub enum LiveContext {
    SingleWorker(TaskWorker),
    WorkerPool(TaskWorkerPool),
    PriorityMultiqueueWorker(PriorityMultiqueueWorker),
}

impl LiveContext {
    fn inner(&self) -> &dyn ExecutionContext {
        match self {
            LiveContext::SingleWorker(ctx) => ctx,
            LiveContext::WorkerPool(ctx) => ctx,
            LiveContext::PriorityMultiqueueWorker(ctx) => ctx,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ExecutionContext {
        match self {
            LiveContext::SingleWorker(ctx) => ctx,
            LiveContext::WorkerPool(ctx) => ctx,
            LiveContext::PriorityMultiqueueWorker(ctx) => ctx,
        }
    }

    /// Looks up one of the context's executors by name.
    pub fn executor(&self, name: &str) -> Option<ExecutorRef> {
        self.executors()
            .iter()
            .find(|(executor_name, _)| executor_name == name)
            .map(|(_, executor)| Arc::clone(executor))
    }

    pub fn executor_names(&self) -> Vec<String> {
        self.executors().iter().map(|(name, _)| name.clone()).collect()
    }
}

impl ExecutionContext for LiveContext {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn executors(&self) -> &[(String, ExecutorRef)] {
        self.inner().executors()
    }

    fn nof_workers(&self) -> usize {
        self.inner().nof_workers()
    }

    fn stop(&mut self) {
        self.inner_mut().stop();
    }

    fn is_stopped(&self) -> bool {
        self.inner().is_stopped()
    }
}
