//! Error types.
//!
//! Configuration and creation errors are only ever produced while the executor
//! topology is being built. Submission errors are the single steady-state
//! failure and are always handed back to the submitter.

use crate::queue::QueuePolicy;
use thiserror::Error;

/// Inconsistencies in a descriptor or in the startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An executor name appears more than once.
    #[error("Executor name '{0}' is declared more than once")]
    DuplicateExecutor(String),

    /// A queue was declared with zero capacity.
    #[error("Queue '{0}' must have a capacity greater than zero")]
    ZeroCapacity(String),

    /// More producer executors are bound to a queue than its policy allows.
    #[error("Queue '{queue}' with policy {policy:?} accepts at most {max} producer executor(s), {bound} bound")]
    TooManyProducers {
        queue: String,
        policy: QueuePolicy,
        max: usize,
        bound: usize,
    },

    /// More worker threads drain a queue than its policy allows.
    #[error("Queue '{queue}' with policy {policy:?} cannot be drained by {workers} worker threads")]
    TooManyConsumers {
        queue: String,
        policy: QueuePolicy,
        workers: usize,
    },

    /// An executor references a priority that no queue serves.
    #[error("Executor '{executor}' targets priority {priority} which has no queue")]
    UnknownPriority { executor: String, priority: i8 },

    /// Two queues of the same context share a priority.
    #[error("Priority {0} is served by more than one queue")]
    DuplicatePriority(i8),

    /// The descriptor is structurally invalid.
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// More than one radio unit variant was configured.
    #[error("Only one radio unit may be configured, found {0}")]
    MultipleRadioUnits(usize),

    /// A per-cell list does not match the number of cells.
    #[error("'{field}' lists {given} entries but {expected} cells are configured")]
    CellCountMismatch {
        field: &'static str,
        given: usize,
        expected: usize,
    },

    /// A configuration field holds an unusable value.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// A CPU list string could not be parsed.
    #[error("Invalid CPU list '{0}'")]
    InvalidCpuList(String),

    /// The configuration file could not be read.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure to materialize an execution context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The descriptor was rejected before any resource was created.
    #[error("Invalid descriptor for execution context '{context}': {source}")]
    InvalidDescriptor {
        context: String,
        #[source]
        source: ConfigError,
    },

    /// An OS thread could not be created.
    #[error("Failed to spawn thread '{thread}' of execution context '{context}': {source}")]
    Spawn {
        context: String,
        thread: String,
        #[source]
        source: std::io::Error,
    },

    /// The manager has already been stopped.
    #[error("Cannot add execution context '{0}': task execution manager is stopped")]
    ManagerStopped(String),
}

/// Rejected task submission.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The bounded queue is at capacity.
    #[error("queue is full")]
    QueueFull,

    /// The owning context no longer accepts tasks.
    #[error("executor is stopped")]
    Stopped,
}

/// Top-level error returned while building the worker topology.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Context(#[from] ContextError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
