//! # ranexec - Task Execution Core for a Multi-Cell RAN Stack
//!
//! Every processing stage of the stack runs as a task submitted to a named
//! **executor**. Executors are backed by OS threads organized into single
//! workers, worker pools and priority multi-queue workers, each pinned to a CPU
//! set and optionally running under real-time scheduling.
//!
//! ## Architecture
//!
//! - **Descriptors**: declarative description of one execution context
//!   (threads, bounded queues, named executors, strands)
//! - **Factory**: turns a descriptor into a live context
//! - **Task Execution Manager**: owns the live contexts and the executor registry
//! - **Strands**: per-stream ordering over a shared executor without a thread
//! - **Worker Manager**: builds the whole topology from one configuration and
//!   hands out executor mappers to the subsystems
//! - **Thread-local pool**: one pre-built instance per calling thread
//!
//! ## Example
//!
//! ```no_run
//! use ranexec::{TaskExecutorExt, WorkerManager, WorkerManagerConfig};
//!
//! let mut workers = WorkerManager::new(WorkerManagerConfig::default());
//!
//! workers
//!     .low_prio_executor()
//!     .defer_fn(|| println!("Hello from the low-priority pool"))
//!     .expect("queue full");
//!
//! workers.stop();
//! ```

pub mod affinity;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod factory;
pub mod fatal;
pub mod logging;
pub mod manager;
pub mod mappers;
pub mod queue;
pub mod strand;
pub mod task;
pub mod thread;
pub mod thread_local_pool;
pub mod topology;
pub mod worker;
pub mod worker_manager;

use serde::{Deserialize, Serialize};

/// OS scheduling class of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPriority {
    /// Default time-sharing scheduling.
    #[default]
    Normal,
    /// Highest `SCHED_FIFO` priority.
    Max,
    /// `SCHED_FIFO`, this many levels below the highest.
    BelowMax(u8),
}

pub use affinity::{AffinityManager, AffinityRole, CpuMask, PinningPolicy, RoleAffinityConfig};
pub use config::WorkerManagerConfig;
pub use descriptor::{
    ExecutionContextDescriptor, ExecutorDescriptor, PriorityMultiqueueWorkerDescriptor, QueueDescriptor,
    SingleWorkerDescriptor, StrandDescriptor, TaskPriority, WorkerPoolDescriptor,
};
pub use error::{ConfigError, ContextError, Error, Result, SubmitError};
pub use executor::{ExecutorRef, TaskExecutor, TaskExecutorExt};
pub use factory::create_execution_context;
pub use manager::{ExecutorRegistry, TaskExecutionManager};
pub use queue::QueuePolicy;
pub use task::Task;
pub use thread_local_pool::ConcurrentThreadLocalPool;
pub use worker::{ExecutionContext, LiveContext};
pub use worker_manager::{ExecutorRole, WorkerManager};
