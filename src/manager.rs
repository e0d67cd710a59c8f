//! Ownership of every live context and of the executor registry.

use crate::descriptor::ExecutionContextDescriptor;
use crate::error::{ConfigError, ContextError};
use crate::executor::ExecutorRef;
use crate::factory::create_execution_context;
use crate::worker::{ExecutionContext, LiveContext};
use std::collections::HashMap;
use std::sync::Arc;

/// Executor handles by name. Populated during startup, read-only afterwards.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, ExecutorRef>,
}

impl ExecutorRegistry {
    pub fn get(&self, name: &str) -> Option<&ExecutorRef> {
        self.executors.get(name)
    }

    /// Returns the executor called `name`. An unknown name is a wiring defect
    /// and aborts.
    pub fn executor(&self, name: &str) -> ExecutorRef {
        match self.executors.get(name) {
            Some(executor) => Arc::clone(executor),
            None => crate::report_fatal_error!("Could not find executor '{}'", name),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    fn insert(&mut self, name: String, executor: ExecutorRef) {
        self.executors.insert(name, executor);
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Owns the live execution contexts of the process.
#[derive(Default)]
pub struct TaskExecutionManager {
    contexts: Vec<LiveContext>,
    registry: ExecutorRegistry,
    stopped: bool,
}

impl TaskExecutionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context and registers its executors. Returns false on a name
    /// collision or if the context could not be created.
    pub fn add_execution_context(&mut self, descriptor: &ExecutionContextDescriptor) -> bool {
        match self.try_add_execution_context(descriptor) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(context = %descriptor.name(), "Failed to add execution context: {}", err);
                false
            }
        }
    }

    /// Like [`Self::add_execution_context`], with the reason of the failure.
    pub fn try_add_execution_context(&mut self, descriptor: &ExecutionContextDescriptor) -> Result<(), ContextError> {
        if self.stopped {
            return Err(ContextError::ManagerStopped(descriptor.name().to_string()));
        }

        // Collisions are checked before any thread exists.
        if let Some(name) = descriptor
            .declared_executor_names()
            .into_iter()
            .find(|name| self.registry.contains(name))
        {
            return Err(ContextError::InvalidDescriptor {
                context: descriptor.name().to_string(),
                source: ConfigError::DuplicateExecutor(name),
            });
        }

        let context = create_execution_context(descriptor)?;
        for (name, executor) in context.executors() {
            self.registry.insert(name.clone(), Arc::clone(executor));
        }
        self.contexts.push(context);
        Ok(())
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Shorthand for `executors().executor(name)`.
    pub fn executor(&self, name: &str) -> ExecutorRef {
        self.registry.executor(name)
    }

    pub fn contexts(&self) -> &[LiveContext] {
        &self.contexts
    }

    pub fn context(&self, name: &str) -> Option<&LiveContext> {
        self.contexts.iter().find(|context| context.name() == name)
    }

    /// Stops every context, most recently created first, and joins their
    /// threads. Later calls do nothing.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        tracing::info!(contexts = self.contexts.len(), "Stopping task execution manager");
        for context in self.contexts.iter_mut().rev() {
            context.stop();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Drop for TaskExecutionManager {
    fn drop(&mut self) {
        self.stop();
    }
}
