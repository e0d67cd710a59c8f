//! Bounded task queues.
//!
//! Every queue is bounded. A push into a full queue fails immediately and
//! leaves the queue untouched: that is the back-pressure signal handed back to
//! the submitter. Locking queues additionally let a single consumer block on
//! a condition variable instead of polling.

use crate::error::SubmitError;
use crate::task::Task;
use crossbeam::deque::{Injector, Steal};
use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Concurrency policy of a task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Mutex-protected, many producers, one consumer.
    LockingMpsc,
    /// Mutex-protected, many producers, many consumers.
    LockingMpmc,
    /// Lock-free bounded ring, many producers, many consumers.
    LockfreeMpmc,
    /// Lock-free bounded ring, one producer, one consumer.
    LockfreeSpsc,
    /// Lock-free segmented queue with an explicit bound.
    MoodycamelMpmc,
}

impl QueuePolicy {
    /// Whether a consumer may block on the queue rather than poll it.
    pub fn is_blocking(self) -> bool {
        matches!(self, QueuePolicy::LockingMpsc | QueuePolicy::LockingMpmc)
    }

    /// Maximum number of producer executors that may be bound to the queue.
    pub fn max_producers(self) -> Option<usize> {
        match self {
            QueuePolicy::LockfreeSpsc => Some(1),
            _ => None,
        }
    }

    /// Maximum number of worker threads that may drain the queue.
    pub fn max_consumers(self) -> Option<usize> {
        match self {
            QueuePolicy::LockingMpsc | QueuePolicy::LockfreeSpsc => Some(1),
            _ => None,
        }
    }
}

enum Storage {
    Locking {
        items: Mutex<VecDeque<Task>>,
        not_empty: Condvar,
    },
    Ring(ArrayQueue<Task>),
    Segmented {
        items: Injector<Task>,
        len: AtomicUsize,
    },
}

/// A bounded queue of tasks with one of the [`QueuePolicy`] behaviours.
pub struct TaskQueue {
    name: String,
    policy: QueuePolicy,
    capacity: usize,
    storage: Storage,
    stopped: AtomicBool,
}

impl TaskQueue {
    /// Creates a new queue. `capacity` must be non-zero; descriptors are
    /// validated before any queue is built.
    pub fn new(name: impl Into<String>, policy: QueuePolicy, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let storage = match policy {
            QueuePolicy::LockingMpsc | QueuePolicy::LockingMpmc => Storage::Locking {
                items: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
                not_empty: Condvar::new(),
            },
            QueuePolicy::LockfreeMpmc | QueuePolicy::LockfreeSpsc => {
                Storage::Ring(ArrayQueue::new(capacity))
            }
            QueuePolicy::MoodycamelMpmc => Storage::Segmented {
                items: Injector::new(),
                len: AtomicUsize::new(0),
            },
        };

        TaskQueue {
            name: name.into(),
            policy,
            capacity,
            storage,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueues a task, failing without side effects if the queue is full or
    /// stopped.
    pub fn try_push(&self, task: Task) -> Result<(), SubmitError> {
        if self.is_stopped() {
            return Err(SubmitError::Stopped);
        }

        match &self.storage {
            Storage::Locking { items, not_empty } => {
                let mut items = lock(items);
                // Re-checked under the lock so nothing lands after the final drain.
                if self.is_stopped() {
                    return Err(SubmitError::Stopped);
                }
                if items.len() >= self.capacity {
                    return Err(SubmitError::QueueFull);
                }
                items.push_back(task);
                drop(items);
                not_empty.notify_one();
                Ok(())
            }
            Storage::Ring(ring) => ring.push(task).map_err(|_| SubmitError::QueueFull),
            Storage::Segmented { items, len } => {
                if len.fetch_add(1, Ordering::AcqRel) >= self.capacity {
                    len.fetch_sub(1, Ordering::AcqRel);
                    return Err(SubmitError::QueueFull);
                }
                items.push(task);
                Ok(())
            }
        }
    }

    /// Dequeues the oldest task without blocking.
    pub fn try_pop(&self) -> Option<Task> {
        match &self.storage {
            Storage::Locking { items, .. } => lock(items).pop_front(),
            Storage::Ring(ring) => ring.pop(),
            Storage::Segmented { items, len } => loop {
                match items.steal() {
                    Steal::Success(task) => {
                        len.fetch_sub(1, Ordering::AcqRel);
                        return Some(task);
                    }
                    Steal::Empty => return None,
                    Steal::Retry => continue,
                }
            },
        }
    }

    /// Dequeues the oldest task, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is stopped and empty. Non-blocking
    /// policies never wait and behave like [`TaskQueue::try_pop`].
    pub fn pop_blocking(&self) -> Option<Task> {
        match &self.storage {
            Storage::Locking { items, not_empty } => {
                let guard = lock(items);
                let mut guard = not_empty
                    .wait_while(guard, |items| items.is_empty() && !self.is_stopped())
                    .unwrap_or_else(PoisonError::into_inner);
                guard.pop_front()
            }
            _ => self.try_pop(),
        }
    }

    /// Stops accepting new tasks and wakes every blocked consumer. Tasks that
    /// are already queued stay queued.
    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Storage::Locking { items, not_empty } = &self.storage {
            let _guard = lock(items);
            not_empty.notify_all();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Locking { items, .. } => lock(items).len(),
            Storage::Ring(ring) => ring.len(),
            Storage::Segmented { len, .. } => len.load(Ordering::Acquire),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every queued task and returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut discarded = 0;
        while self.try_pop().is_some() {
            discarded += 1;
        }
        discarded
    }
}

fn lock(items: &Mutex<VecDeque<Task>>) -> MutexGuard<'_, VecDeque<Task>> {
    items.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    const ALL_POLICIES: [QueuePolicy; 5] = [
        QueuePolicy::LockingMpsc,
        QueuePolicy::LockingMpmc,
        QueuePolicy::LockfreeMpmc,
        QueuePolicy::LockfreeSpsc,
        QueuePolicy::MoodycamelMpmc,
    ];

    fn recording_task(log: &Arc<Mutex<Vec<usize>>>, value: usize) -> Task {
        let log = log.clone();
        Task::new(move || log.lock().unwrap().push(value))
    }

    #[test]
    fn test_fifo_order_for_every_policy() {
        for policy in ALL_POLICIES {
            let queue = TaskQueue::new("fifo", policy, 16);
            let log = Arc::new(Mutex::new(Vec::new()));
            for i in 0..10 {
                queue.try_push(recording_task(&log, i)).unwrap();
            }
            while let Some(task) = queue.try_pop() {
                task.run();
            }
            assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>(), "{policy:?}");
        }
    }

    #[test]
    fn test_full_queue_rejects_without_side_effects() {
        for policy in ALL_POLICIES {
            let queue = TaskQueue::new("full", policy, 4);
            let log = Arc::new(Mutex::new(Vec::new()));
            for i in 0..4 {
                queue.try_push(recording_task(&log, i)).unwrap();
            }

            assert_eq!(
                queue.try_push(recording_task(&log, 99)),
                Err(SubmitError::QueueFull),
                "{policy:?}"
            );
            assert_eq!(queue.len(), 4);

            while let Some(task) = queue.try_pop() {
                task.run();
            }
            assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3], "{policy:?}");
        }
    }

    #[test]
    fn test_stopped_queue_rejects_push() {
        for policy in ALL_POLICIES {
            let queue = TaskQueue::new("stopped", policy, 4);
            queue.try_push(Task::new(|| {})).unwrap();
            queue.request_stop();

            assert_eq!(queue.try_push(Task::new(|| {})), Err(SubmitError::Stopped));
            // Already queued work is kept for draining.
            assert_eq!(queue.len(), 1);
            assert_eq!(queue.clear(), 1);
        }
    }

    #[test]
    fn test_blocking_pop_wakes_on_stop() {
        let queue = Arc::new(TaskQueue::new("blocking", QueuePolicy::LockingMpsc, 4));
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop_blocking().is_none())
        };

        thread::sleep(Duration::from_millis(20));
        queue.request_stop();
        assert!(consumer.join().unwrap());
    }

    #[test]
    fn test_blocking_pop_wakes_on_push() {
        let queue = Arc::new(TaskQueue::new("blocking", QueuePolicy::LockingMpmc, 4));
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop_blocking().is_some())
        };

        thread::sleep(Duration::from_millis(20));
        queue.try_push(Task::new(|| {})).unwrap();
        assert!(consumer.join().unwrap());
    }

    #[test]
    fn test_policy_constraints() {
        assert_eq!(QueuePolicy::LockfreeSpsc.max_producers(), Some(1));
        assert_eq!(QueuePolicy::LockfreeMpmc.max_producers(), None);
        assert_eq!(QueuePolicy::LockingMpsc.max_consumers(), Some(1));
        assert!(QueuePolicy::LockingMpmc.is_blocking());
        assert!(!QueuePolicy::MoodycamelMpmc.is_blocking());
    }
}
