//! Per-thread object pool.
//!
//! Hands out exactly one pre-built instance to each distinct calling thread,
//! up to a fixed capacity. Lookups by an already registered thread are a scan
//! over the published prefix of the owner table with no locking. A new thread
//! claims the next slot, writes its token into the slot, then publishes the
//! slot by advancing the published count from its index to index + 1. Threads
//! registering concurrently publish in claim order.
//!
//! Slots are never reclaimed. Exceeding the capacity is fatal.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Sleep between attempts to publish a claimed slot.
const PUBLISH_RETRY_INTERVAL: Duration = Duration::from_micros(1);

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Process-unique, non-zero identifier of the calling thread.
fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

/// Fixed set of instances bound lazily, one per thread.
pub struct ConcurrentThreadLocalPool<T> {
    objects: Box<[T]>,
    /// Token of the thread owning each slot, 0 while free.
    owners: Box<[AtomicU64]>,
    next_free: AtomicUsize,
    published: AtomicUsize,
}

impl<T> ConcurrentThreadLocalPool<T> {
    pub fn new(objects: Vec<T>) -> Self {
        let owners = objects.iter().map(|_| AtomicU64::new(0)).collect();
        ConcurrentThreadLocalPool {
            objects: objects.into_boxed_slice(),
            owners,
            next_free: AtomicUsize::new(0),
            published: AtomicUsize::new(0),
        }
    }

    /// Builds `capacity` instances with `make(slot)`.
    pub fn from_fn(capacity: usize, make: impl FnMut(usize) -> T) -> Self {
        Self::new((0..capacity).map(make).collect())
    }

    pub fn capacity(&self) -> usize {
        self.objects.len()
    }

    /// Threads bound so far.
    pub fn nof_registered(&self) -> usize {
        self.published.load(Ordering::Acquire)
    }

    /// Returns the instance bound to the calling thread, binding a free one on
    /// first use.
    pub fn get(&self) -> &T {
        let token = current_thread_token();

        let published = self.published.load(Ordering::Acquire);
        if let Some(index) = self.owners[..published]
            .iter()
            .position(|owner| owner.load(Ordering::Relaxed) == token)
        {
            return &self.objects[index];
        }

        let index = self.next_free.fetch_add(1, Ordering::AcqRel);
        crate::report_fatal_error_if_not!(
            index < self.objects.len(),
            "Thread-local pool of {} instances exhausted",
            self.objects.len()
        );
        self.owners[index].store(token, Ordering::Relaxed);

        while self
            .published
            .compare_exchange_weak(index, index + 1, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            thread::sleep(PUBLISH_RETRY_INTERVAL);
        }
        tracing::trace!(slot = index, "Thread bound to pool slot");

        &self.objects[index]
    }
}
