use ranexec::{
    create_execution_context, CpuMask, ExecutionContext, ExecutionContextDescriptor, ExecutorDescriptor,
    QueueDescriptor, QueuePolicy, SingleWorkerDescriptor, StrandDescriptor, SubmitError, TaskExecutionManager,
    TaskExecutorExt, TaskPriority, ThreadPriority, WorkerPoolDescriptor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn pool(name: &str, nof_workers: usize) -> ExecutionContextDescriptor {
    ExecutionContextDescriptor::WorkerPool(WorkerPoolDescriptor {
        name: name.into(),
        nof_workers,
        queues: vec![
            QueueDescriptor::new(format!("{name}_high"), QueuePolicy::LockfreeMpmc, 1024),
            QueueDescriptor::new(format!("{name}_low"), QueuePolicy::MoodycamelMpmc, 1024)
                .with_priority(TaskPriority::below_max(1)),
        ],
        executors: vec![
            ExecutorDescriptor::new(format!("{name}_high_exec")),
            ExecutorDescriptor::new(format!("{name}_low_exec"))
                .with_priority(TaskPriority::below_max(1))
                .with_strand(StrandDescriptor::single(format!("{name}_strand_exec"), QueuePolicy::LockfreeMpmc, 64)),
        ],
        masks: Vec::new(),
        priority: ThreadPriority::Normal,
        wait_interval: Some(Duration::from_micros(50)),
    })
}

#[test]
fn test_stop_immediately_after_creation() {
    let mut context = create_execution_context(&pool("idle", 4)).unwrap();
    context.stop();
    assert!(context.is_stopped());
}

#[test]
fn test_stop_twice_is_noop() {
    let mut context = create_execution_context(&pool("twice", 2)).unwrap();
    context.stop();
    context.stop();
    assert!(context.is_stopped());
}

#[test]
fn test_every_executor_rejects_after_stop() {
    let mut context = create_execution_context(&pool("rejects", 2)).unwrap();
    let executors: Vec<_> = context.executors().iter().map(|(_, e)| e.clone()).collect();
    assert_eq!(executors.len(), 3);

    context.stop();
    for executor in executors {
        assert_eq!(executor.defer_fn(|| {}), Err(SubmitError::Stopped));
        assert_eq!(executor.execute_fn(|| {}), Err(SubmitError::Stopped));
    }
}

#[test]
fn test_stop_drains_queued_work() {
    let mut context = create_execution_context(&pool("drain", 2)).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    // 1. Queue slow tasks on every executor
    for name in ["drain_high_exec", "drain_low_exec", "drain_strand_exec"] {
        let executor = context.executor(name).unwrap();
        for _ in 0..20 {
            let counter = counter.clone();
            executor
                .defer_fn(move || {
                    std::thread::sleep(Duration::from_micros(200));
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
    }

    // 2. Stop returns only after the workers finished them
    context.stop();
    assert_eq!(counter.load(Ordering::SeqCst), 60);
}

#[test]
fn test_single_blocking_worker_wakes_on_stop() {
    let descriptor = ExecutionContextDescriptor::SingleWorker(SingleWorkerDescriptor {
        name: "sleeper".into(),
        queue: QueueDescriptor::new("sleeper_queue", QueuePolicy::LockingMpsc, 16),
        executors: vec![ExecutorDescriptor::new("sleeper_exec")],
        mask: CpuMask::new(),
        priority: ThreadPriority::Normal,
        wait_interval: None,
    });
    let mut context = create_execution_context(&descriptor).unwrap();

    // The worker is parked on the condition variable; stop must not hang.
    std::thread::sleep(Duration::from_millis(10));
    context.stop();
    assert!(context.is_stopped());
}

#[test]
fn test_manager_stop_and_drop() {
    let mut manager = TaskExecutionManager::new();
    assert!(manager.add_execution_context(&pool("first", 2)));
    assert!(manager.add_execution_context(&pool("second", 1)));
    let executor = manager.executor("second_low_exec");

    manager.stop();
    manager.stop();
    assert!(manager.is_stopped());
    assert_eq!(executor.defer_fn(|| {}), Err(SubmitError::Stopped));

    // No contexts can join a stopped manager.
    assert!(!manager.add_execution_context(&pool("third", 1)));
    assert!(manager.executors().get("third_high_exec").is_none());

    // Dropping a running manager joins its workers.
    let mut manager = TaskExecutionManager::new();
    assert!(manager.add_execution_context(&pool("dropped", 2)));
    drop(manager);
}

#[test]
fn test_rapid_create_stop_cycles() {
    for i in 0..20 {
        let mut context = create_execution_context(&pool(&format!("cycle{i}"), 2)).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        context
            .executor(&format!("cycle{i}_high_exec"))
            .unwrap()
            .defer_fn(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        context.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
