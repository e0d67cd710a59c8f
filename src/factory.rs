//! Turns descriptors into live execution contexts.

use crate::descriptor::ExecutionContextDescriptor;
use crate::error::ContextError;
use crate::executor::{ExecutorRef, QueueExecutor, TaskExecutor};
use crate::queue::TaskQueue;
use crate::strand::{StrandExecutor, TaskStrand};
use crate::worker::{ContextCore, LiveContext, PriorityMultiqueueWorker, QueueSet, TaskWorker, TaskWorkerPool};
use std::sync::Arc;

/// Creates the threads, queues and executors described by `descriptor`.
///
/// The descriptor is validated before anything is created. On success the
/// context registers exactly the names of
/// [`ExecutionContextDescriptor::declared_executor_names`].
pub fn create_execution_context(descriptor: &ExecutionContextDescriptor) -> Result<LiveContext, ContextError> {
    let name = descriptor.name();
    descriptor.validate().map_err(|source| ContextError::InvalidDescriptor {
        context: name.to_string(),
        source,
    })?;

    let shared: Vec<Arc<TaskQueue>> = descriptor
        .queues()
        .iter()
        .map(|queue| Arc::new(TaskQueue::new(queue.name.clone(), queue.policy, queue.size)))
        .collect();

    // Dedicated queues inherit the policy of their tier.
    let mut dedicated: Vec<Option<Arc<TaskQueue>>> = Vec::with_capacity(descriptor.executors().len());
    let mut tier_of: Vec<usize> = Vec::with_capacity(descriptor.executors().len());
    for executor in descriptor.executors() {
        let tier = descriptor.queue_index_for(executor).unwrap_or_default();
        tier_of.push(tier);
        dedicated.push(executor.dedicated_queue_size.map(|size| {
            Arc::new(TaskQueue::new(
                format!("{}_queue", executor.name),
                descriptor.queues()[tier].policy,
                size,
            ))
        }));
    }

    // Highest priority tier first, each followed by its dedicated queues.
    let mut tiers: Vec<usize> = (0..shared.len()).collect();
    tiers.sort_by(|&a, &b| descriptor.queues()[b].priority.cmp(&descriptor.queues()[a].priority));
    let mut ordered = Vec::new();
    for tier in tiers {
        ordered.push(Arc::clone(&shared[tier]));
        for (queue, &queue_tier) in dedicated.iter().zip(&tier_of) {
            if let Some(queue) = queue.as_ref().filter(|_| queue_tier == tier) {
                ordered.push(Arc::clone(queue));
            }
        }
    }

    let id = ContextCore::next_id();
    let mut core = ContextCore::start(
        name,
        id,
        QueueSet::new(ordered),
        descriptor.nof_workers(),
        |index| descriptor.worker_mask(index),
        descriptor.thread_priority(),
        descriptor.wait_interval(),
    )?;

    for ((executor, tier), dedicated) in descriptor.executors().iter().zip(tier_of).zip(dedicated) {
        let queue = dedicated.unwrap_or_else(|| Arc::clone(&shared[tier]));
        let handle: ExecutorRef = Arc::new(QueueExecutor::new(
            executor.name.clone(),
            id,
            queue,
            executor.inline_when_on_worker,
            executor.report_on_failure,
        ));
        core.add_executor(executor.name.clone(), Arc::clone(&handle));

        for strand_desc in &executor.strands {
            let queues = strand_desc
                .queues
                .iter()
                .map(|queue| Arc::new(TaskQueue::new(queue.name.clone(), queue.policy, queue.size)))
                .collect();
            let strand = TaskStrand::new(strand_desc.name.clone(), Arc::clone(&handle), queues, strand_desc.max_batch);
            for strand_executor in StrandExecutor::for_each_queue(&strand) {
                let strand_name = strand_executor.name().to_string();
                core.add_executor(strand_name, Arc::new(strand_executor));
            }
            core.add_strand(strand);
        }
    }

    tracing::info!(
        context = %name,
        id = core.id(),
        workers = descriptor.nof_workers(),
        queues = descriptor.queues().len(),
        executors = descriptor.declared_executor_names().len(),
        cpu_mask = %descriptor.worker_mask(0),
        priority = ?descriptor.thread_priority(),
        "Execution context created"
    );

    let context = match descriptor {
        ExecutionContextDescriptor::SingleWorker(_) => LiveContext::SingleWorker(TaskWorker { core }),
        ExecutionContextDescriptor::WorkerPool(_) => LiveContext::WorkerPool(TaskWorkerPool { core }),
        ExecutionContextDescriptor::PriorityMultiqueueWorker(_) => {
            LiveContext::PriorityMultiqueueWorker(PriorityMultiqueueWorker { core })
        }
    };
    debug_assert_eq!(context.executor_names(), descriptor.declared_executor_names());
    Ok(context)
}
