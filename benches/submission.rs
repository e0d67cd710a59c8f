//! Submission throughput benchmark using criterion.
//!
//! Measures the cost of pushing tiny tasks through each queue policy, with and
//! without a strand in between, until every one of them has run.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ranexec::{
    ExecutionContextDescriptor, ExecutorDescriptor, ExecutorRef, QueueDescriptor, QueuePolicy, StrandDescriptor,
    TaskExecutionManager, TaskExecutorExt, ThreadPriority, WorkerPoolDescriptor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TASK_COUNT: usize = 100_000;

fn pool(policy: QueuePolicy, nof_workers: usize) -> TaskExecutionManager {
    let mut manager = TaskExecutionManager::new();
    let descriptor = ExecutionContextDescriptor::WorkerPool(WorkerPoolDescriptor {
        name: "bench".into(),
        nof_workers,
        queues: vec![QueueDescriptor::new("bench_queue", policy, TASK_COUNT)],
        executors: vec![ExecutorDescriptor::new("bench_exec").with_strand(StrandDescriptor::single(
            "bench_strand_exec",
            QueuePolicy::LockfreeMpmc,
            TASK_COUNT,
        ))],
        masks: Vec::new(),
        priority: ThreadPriority::Normal,
        wait_interval: Some(Duration::from_micros(1)),
    });
    assert!(manager.add_execution_context(&descriptor));
    manager
}

/// Submits `TASK_COUNT` tasks and spins until all of them ran.
fn submit_and_wait(executor: &ExecutorRef) {
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..TASK_COUNT {
        // Retry on back-pressure; the queue holds the whole batch anyway.
        while executor
            .defer_fn({
                let done = done.clone();
                move || {
                    std::hint::black_box(1 + 1);
                    done.fetch_add(1, Ordering::Relaxed);
                }
            })
            .is_err()
        {
            std::hint::spin_loop();
        }
    }
    while done.load(Ordering::Relaxed) < TASK_COUNT {
        std::hint::spin_loop();
    }
}

fn bench_queue_policies(c: &mut Criterion) {
    let num_threads = num_cpus::get().clamp(1, 4);

    let mut group = c.benchmark_group("submission");
    group.throughput(Throughput::Elements(TASK_COUNT as u64));
    group.sample_size(10);

    for (label, policy) in [
        ("lockfree_mpmc", QueuePolicy::LockfreeMpmc),
        ("moodycamel_mpmc", QueuePolicy::MoodycamelMpmc),
        ("locking_mpmc", QueuePolicy::LockingMpmc),
    ] {
        let mut manager = pool(policy, num_threads);
        let executor = manager.executor("bench_exec");
        group.bench_function(BenchmarkId::new(label, num_threads), |b| b.iter(|| submit_and_wait(&executor)));
        manager.stop();
    }

    group.finish();
}

fn bench_strand(c: &mut Criterion) {
    let num_threads = num_cpus::get().clamp(1, 4);
    let mut manager = pool(QueuePolicy::LockfreeMpmc, num_threads);
    let strand = manager.executor("bench_strand_exec");

    let mut group = c.benchmark_group("submission_strand");
    group.throughput(Throughput::Elements(TASK_COUNT as u64));
    group.sample_size(10);
    group.bench_function(BenchmarkId::new("strand_over_pool", num_threads), |b| {
        b.iter(|| submit_and_wait(&strand))
    });
    group.finish();

    manager.stop();
}

criterion_group!(benches, bench_queue_policies, bench_strand);
criterion_main!(benches);
