//! Execution context descriptors.
//!
//! Pure data describing the threads, queues and named executors of one
//! execution context. Descriptors own no OS resources; the factory turns them
//! into live contexts.

use crate::affinity::CpuMask;
use crate::error::ConfigError;
use crate::queue::QueuePolicy;
use crate::strand::DEFAULT_STRAND_MAX_BATCH;
use crate::ThreadPriority;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Poll interval of idle workers over non-blocking queues.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_micros(10);

/// Rank of a queue inside a multi-queue context. Higher values drain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskPriority(pub i8);

impl TaskPriority {
    pub const MAX: TaskPriority = TaskPriority(0);

    /// `n` steps below [`TaskPriority::MAX`].
    pub const fn below_max(n: u8) -> TaskPriority {
        TaskPriority(0i8.saturating_sub_unsigned(n))
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::MAX
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            f.write_str("max")
        } else {
            write!(f, "max{}", self.0)
        }
    }
}

/// A bounded queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDescriptor {
    pub name: String,
    pub policy: QueuePolicy,
    pub size: usize,
    /// Ignored by single workers.
    pub priority: TaskPriority,
}

impl QueueDescriptor {
    pub fn new(name: impl Into<String>, policy: QueuePolicy, size: usize) -> Self {
        QueueDescriptor {
            name: name.into(),
            policy,
            size,
            priority: TaskPriority::MAX,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// A strand layered over an executor. Each queue becomes an executor named
/// after the queue; queue 0 is drained first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrandDescriptor {
    pub name: String,
    pub queues: Vec<QueueDescriptor>,
    pub max_batch: usize,
}

impl StrandDescriptor {
    pub fn new(name: impl Into<String>, queues: Vec<QueueDescriptor>) -> Self {
        StrandDescriptor {
            name: name.into(),
            queues,
            max_batch: DEFAULT_STRAND_MAX_BATCH,
        }
    }

    /// Strand with a single queue whose executor is called `executor_name`.
    pub fn single(executor_name: impl Into<String>, policy: QueuePolicy, size: usize) -> Self {
        let name = executor_name.into();
        StrandDescriptor::new(name.clone(), vec![QueueDescriptor::new(name, policy, size)])
    }
}

/// A named executor bound to one queue of its context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorDescriptor {
    pub name: String,
    /// Selects the queue in worker pools and multi-queue workers.
    pub priority: TaskPriority,
    pub strands: Vec<StrandDescriptor>,
    /// Gives the executor a private queue of this capacity instead of sharing
    /// the queue of its priority.
    pub dedicated_queue_size: Option<usize>,
    pub report_on_failure: bool,
    pub inline_when_on_worker: bool,
}

impl ExecutorDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        ExecutorDescriptor {
            name: name.into(),
            priority: TaskPriority::MAX,
            strands: Vec::new(),
            dedicated_queue_size: None,
            report_on_failure: true,
            inline_when_on_worker: false,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_strand(mut self, strand: StrandDescriptor) -> Self {
        self.strands.push(strand);
        self
    }

    pub fn with_strands(mut self, strands: impl IntoIterator<Item = StrandDescriptor>) -> Self {
        self.strands.extend(strands);
        self
    }

    pub fn with_dedicated_queue(mut self, size: usize) -> Self {
        self.dedicated_queue_size = Some(size);
        self
    }

    pub fn inline_when_on_worker(mut self) -> Self {
        self.inline_when_on_worker = true;
        self
    }

    pub fn silent_on_failure(mut self) -> Self {
        self.report_on_failure = false;
        self
    }
}

/// One thread, one queue.
#[derive(Debug, Clone)]
pub struct SingleWorkerDescriptor {
    pub name: String,
    pub queue: QueueDescriptor,
    pub executors: Vec<ExecutorDescriptor>,
    pub mask: CpuMask,
    pub priority: ThreadPriority,
    pub wait_interval: Option<Duration>,
}

/// N threads sharing one queue per priority.
#[derive(Debug, Clone)]
pub struct WorkerPoolDescriptor {
    pub name: String,
    pub nof_workers: usize,
    pub queues: Vec<QueueDescriptor>,
    pub executors: Vec<ExecutorDescriptor>,
    /// Empty, one mask shared by all workers, or one per worker.
    pub masks: Vec<CpuMask>,
    pub priority: ThreadPriority,
    pub wait_interval: Option<Duration>,
}

/// One thread serving several queues, highest priority first.
#[derive(Debug, Clone)]
pub struct PriorityMultiqueueWorkerDescriptor {
    pub name: String,
    pub queues: Vec<QueueDescriptor>,
    pub executors: Vec<ExecutorDescriptor>,
    pub mask: CpuMask,
    pub priority: ThreadPriority,
    pub wait_interval: Option<Duration>,
}

/// Declarative description of one execution context.
#[derive(Debug, Clone)]
pub enum ExecutionContextDescriptor {
    SingleWorker(SingleWorkerDescriptor),
    WorkerPool(WorkerPoolDescriptor),
    PriorityMultiqueueWorker(PriorityMultiqueueWorkerDescriptor),
}

impl ExecutionContextDescriptor {
    pub fn name(&self) -> &str {
        match self {
            Self::SingleWorker(d) => &d.name,
            Self::WorkerPool(d) => &d.name,
            Self::PriorityMultiqueueWorker(d) => &d.name,
        }
    }

    pub fn queues(&self) -> &[QueueDescriptor] {
        match self {
            Self::SingleWorker(d) => std::slice::from_ref(&d.queue),
            Self::WorkerPool(d) => &d.queues,
            Self::PriorityMultiqueueWorker(d) => &d.queues,
        }
    }

    pub fn executors(&self) -> &[ExecutorDescriptor] {
        match self {
            Self::SingleWorker(d) => &d.executors,
            Self::WorkerPool(d) => &d.executors,
            Self::PriorityMultiqueueWorker(d) => &d.executors,
        }
    }

    pub fn nof_workers(&self) -> usize {
        match self {
            Self::WorkerPool(d) => d.nof_workers,
            _ => 1,
        }
    }

    pub fn thread_priority(&self) -> ThreadPriority {
        match self {
            Self::SingleWorker(d) => d.priority,
            Self::WorkerPool(d) => d.priority,
            Self::PriorityMultiqueueWorker(d) => d.priority,
        }
    }

    pub fn wait_interval(&self) -> Duration {
        let interval = match self {
            Self::SingleWorker(d) => d.wait_interval,
            Self::WorkerPool(d) => d.wait_interval,
            Self::PriorityMultiqueueWorker(d) => d.wait_interval,
        };
        interval.unwrap_or(DEFAULT_WAIT_INTERVAL)
    }

    /// CPU mask of worker thread `index`.
    pub fn worker_mask(&self, index: usize) -> CpuMask {
        match self {
            Self::SingleWorker(d) => d.mask,
            Self::PriorityMultiqueueWorker(d) => d.mask,
            Self::WorkerPool(d) => match d.masks.len() {
                0 => CpuMask::new(),
                1 => d.masks[0],
                _ => d.masks[index],
            },
        }
    }

    /// Index into [`Self::queues`] of the shared queue `executor` feeds.
    pub fn queue_index_for(&self, executor: &ExecutorDescriptor) -> Option<usize> {
        match self {
            Self::SingleWorker(_) => Some(0),
            _ => self.queues().iter().position(|q| q.priority == executor.priority),
        }
    }

    /// Every executor name the live context will register: executors first,
    /// then their strand queues.
    pub fn declared_executor_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for executor in self.executors() {
            names.push(executor.name.clone());
            for strand in &executor.strands {
                names.extend(strand.queues.iter().map(|q| q.name.clone()));
            }
        }
        names
    }

    /// Checks the descriptor for structural errors. Nothing is created until
    /// this passes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name().is_empty() {
            return Err(ConfigError::InvalidDescriptor("context name is empty".into()));
        }
        if self.queues().is_empty() {
            return Err(ConfigError::InvalidDescriptor("no queues declared".into()));
        }
        if self.executors().is_empty() {
            return Err(ConfigError::InvalidDescriptor("no executors declared".into()));
        }

        if let Self::WorkerPool(d) = self {
            if d.nof_workers == 0 {
                return Err(ConfigError::InvalidDescriptor("worker pool with zero workers".into()));
            }
            if d.masks.len() > 1 && d.masks.len() != d.nof_workers {
                return Err(ConfigError::InvalidDescriptor(format!(
                    "{} CPU masks given for {} workers",
                    d.masks.len(),
                    d.nof_workers
                )));
            }
        }

        let nof_workers = self.nof_workers();
        let mut priorities = HashSet::new();
        for queue in self.queues() {
            check_queue(queue)?;
            if !priorities.insert(queue.priority) {
                return Err(ConfigError::DuplicatePriority(queue.priority.0));
            }
            if let Some(max) = queue.policy.max_consumers() {
                if nof_workers > max {
                    return Err(ConfigError::TooManyConsumers {
                        queue: queue.name.clone(),
                        policy: queue.policy,
                        workers: nof_workers,
                    });
                }
            }
        }

        let mut producers = vec![0usize; self.queues().len()];
        for executor in self.executors() {
            let index = self
                .queue_index_for(executor)
                .ok_or_else(|| ConfigError::UnknownPriority {
                    executor: executor.name.clone(),
                    priority: executor.priority.0,
                })?;

            match executor.dedicated_queue_size {
                Some(0) => return Err(ConfigError::ZeroCapacity(executor.name.clone())),
                Some(_) => {}
                None => producers[index] += 1,
            }

            for strand in &executor.strands {
                if strand.queues.is_empty() {
                    return Err(ConfigError::InvalidDescriptor(format!(
                        "strand '{}' has no queues",
                        strand.name
                    )));
                }
                for queue in &strand.queues {
                    check_queue(queue)?;
                }
            }
        }

        for (queue, bound) in self.queues().iter().zip(producers) {
            if let Some(max) = queue.policy.max_producers() {
                if bound > max {
                    return Err(ConfigError::TooManyProducers {
                        queue: queue.name.clone(),
                        policy: queue.policy,
                        max,
                        bound,
                    });
                }
            }
        }

        let mut names = HashSet::new();
        for name in self.declared_executor_names() {
            if !names.insert(name.clone()) {
                return Err(ConfigError::DuplicateExecutor(name));
            }
        }

        Ok(())
    }
}

fn check_queue(queue: &QueueDescriptor) -> Result<(), ConfigError> {
    if queue.size == 0 {
        return Err(ConfigError::ZeroCapacity(queue.name.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(queues: Vec<QueueDescriptor>, executors: Vec<ExecutorDescriptor>) -> ExecutionContextDescriptor {
        ExecutionContextDescriptor::WorkerPool(WorkerPoolDescriptor {
            name: "pool".into(),
            nof_workers: 2,
            queues,
            executors,
            masks: Vec::new(),
            priority: ThreadPriority::Normal,
            wait_interval: None,
        })
    }

    fn multiqueue(queues: Vec<QueueDescriptor>, executors: Vec<ExecutorDescriptor>) -> ExecutionContextDescriptor {
        ExecutionContextDescriptor::PriorityMultiqueueWorker(PriorityMultiqueueWorkerDescriptor {
            name: "mq".into(),
            queues,
            executors,
            mask: CpuMask::new(),
            priority: ThreadPriority::Normal,
            wait_interval: None,
        })
    }

    #[test]
    fn test_task_priority_ordering() {
        assert!(TaskPriority::MAX > TaskPriority::below_max(1));
        assert!(TaskPriority::below_max(1) > TaskPriority::below_max(2));
        assert_eq!(TaskPriority::below_max(200), TaskPriority(i8::MIN));
        assert_eq!(TaskPriority::below_max(2).to_string(), "max-2");
    }

    #[test]
    fn test_declared_names_include_strands() {
        let desc = pool(
            vec![QueueDescriptor::new("q", QueuePolicy::LockfreeMpmc, 8)],
            vec![ExecutorDescriptor::new("exec")
                .with_strand(StrandDescriptor::single("s1", QueuePolicy::LockfreeMpmc, 4))
                .with_strand(StrandDescriptor::new(
                    "s2",
                    vec![
                        QueueDescriptor::new("s2_hi", QueuePolicy::LockfreeMpmc, 4),
                        QueueDescriptor::new("s2_lo", QueuePolicy::LockfreeMpmc, 4),
                    ],
                ))],
        );
        desc.validate().unwrap();
        assert_eq!(desc.declared_executor_names(), vec!["exec", "s1", "s2_hi", "s2_lo"]);
    }

    #[test]
    fn test_spsc_rejects_second_producer() {
        let desc = multiqueue(
            vec![QueueDescriptor::new("slot", QueuePolicy::LockfreeSpsc, 8)],
            vec![ExecutorDescriptor::new("a"), ExecutorDescriptor::new("b")],
        );
        assert!(matches!(
            desc.validate(),
            Err(ConfigError::TooManyProducers { max: 1, bound: 2, .. })
        ));
    }

    #[test]
    fn test_spsc_accepts_dedicated_second_producer() {
        let desc = multiqueue(
            vec![QueueDescriptor::new("slot", QueuePolicy::LockfreeSpsc, 8)],
            vec![ExecutorDescriptor::new("a"), ExecutorDescriptor::new("b").with_dedicated_queue(4)],
        );
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_single_consumer_queue_in_pool_rejected() {
        let desc = pool(
            vec![QueueDescriptor::new("q", QueuePolicy::LockingMpsc, 8)],
            vec![ExecutorDescriptor::new("exec")],
        );
        assert!(matches!(desc.validate(), Err(ConfigError::TooManyConsumers { workers: 2, .. })));
    }

    #[test]
    fn test_unknown_priority_rejected() {
        let desc = multiqueue(
            vec![QueueDescriptor::new("q", QueuePolicy::LockfreeMpmc, 8)],
            vec![ExecutorDescriptor::new("exec").with_priority(TaskPriority::below_max(1))],
        );
        assert!(matches!(desc.validate(), Err(ConfigError::UnknownPriority { priority: -1, .. })));
    }

    #[test]
    fn test_duplicate_priority_rejected() {
        let desc = multiqueue(
            vec![
                QueueDescriptor::new("a", QueuePolicy::LockfreeMpmc, 8),
                QueueDescriptor::new("b", QueuePolicy::LockfreeMpmc, 8),
            ],
            vec![ExecutorDescriptor::new("exec")],
        );
        assert!(matches!(desc.validate(), Err(ConfigError::DuplicatePriority(0))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let desc = multiqueue(
            vec![QueueDescriptor::new("q", QueuePolicy::LockfreeMpmc, 0)],
            vec![ExecutorDescriptor::new("exec")],
        );
        assert!(matches!(desc.validate(), Err(ConfigError::ZeroCapacity(name)) if name == "q"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let desc = pool(
            vec![QueueDescriptor::new("q", QueuePolicy::LockfreeMpmc, 8)],
            vec![ExecutorDescriptor::new("exec").with_strand(StrandDescriptor::single(
                "exec",
                QueuePolicy::LockfreeMpmc,
                4,
            ))],
        );
        assert!(matches!(desc.validate(), Err(ConfigError::DuplicateExecutor(name)) if name == "exec"));
    }

    #[test]
    fn test_mask_count_mismatch_rejected() {
        let mut desc = WorkerPoolDescriptor {
            name: "pool".into(),
            nof_workers: 3,
            queues: vec![QueueDescriptor::new("q", QueuePolicy::LockfreeMpmc, 8)],
            executors: vec![ExecutorDescriptor::new("exec")],
            masks: vec![CpuMask::single(0), CpuMask::single(1)],
            priority: ThreadPriority::Normal,
            wait_interval: None,
        };
        assert!(ExecutionContextDescriptor::WorkerPool(desc.clone()).validate().is_err());

        desc.masks.push(CpuMask::single(2));
        let desc = ExecutionContextDescriptor::WorkerPool(desc);
        assert!(desc.validate().is_ok());
        assert_eq!(desc.worker_mask(2), CpuMask::single(2));
    }
}
