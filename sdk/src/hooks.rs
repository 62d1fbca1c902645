//! Observer hooks for dispatch and task execution
//!
//! Hooks are per-instance ordered observer lists, injected at construction
//! of a [`Dispatcher`](crate::dispatcher::Dispatcher) or
//! [`Worker`](crate::worker::Worker). Nothing here is process-global.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ExecutionFailure, HookError};
use crate::task::Task;

/// Observer of the dispatch side.
///
/// All methods default to no-ops. An error returned from any method aborts
/// the dispatch before anything reaches the broker.
#[async_trait]
pub trait DispatchHook: Send + Sync {
    /// Called first on every dispatch; the task may still be mutated here
    async fn before_task_dispatched(&self, _task: &mut Task) -> Result<(), HookError> {
        Ok(())
    }

    /// Called immediately before the task's byte form is frozen
    async fn before_task_serialization(&self, _task: &Task) -> Result<(), HookError> {
        Ok(())
    }
}

/// Observer of the worker side.
///
/// The first three methods run inside the caught section of the consume
/// loop: an error fails the current task (rejected, errored signal) but the
/// worker keeps going. The two `on_task_*` terminal methods run after the
/// delivery is settled; an error from them stops the worker itself, since
/// no further failure-handling step exists at that point.
#[async_trait]
pub trait WorkerHook: Send + Sync {
    /// Called once the payload has been deserialized into a task
    async fn after_task_unserialization(&self, _task: &Task) -> Result<(), HookError> {
        Ok(())
    }

    /// Called immediately before the executor runs
    async fn before_task_execution(&self, _task: &Task) -> Result<(), HookError> {
        Ok(())
    }

    /// Called after the executor succeeded, before the delivery is settled
    async fn before_task_finished(&self, _task: &Task) -> Result<(), HookError> {
        Ok(())
    }

    /// Called when a task completed and its delivery was acknowledged
    async fn on_task_success(
        &self,
        _task: &Task,
        _dispatcher_notified: bool,
    ) -> Result<(), HookError> {
        Ok(())
    }

    /// Called when a task failed and its delivery was rejected.
    /// `task` is `None` when the payload never deserialized.
    async fn on_task_error(
        &self,
        _task: Option<&Task>,
        _failure: &ExecutionFailure,
        _dispatcher_notified: bool,
    ) -> Result<(), HookError> {
        Ok(())
    }
}

/// Ordered list of dispatch observers, fired in registration order.
/// The first error short-circuits the rest of the chain.
#[derive(Default, Clone)]
pub struct DispatchHookChain {
    hooks: Vec<Arc<dyn DispatchHook>>,
}

impl DispatchHookChain {
    /// Create a new empty chain
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Append a hook to the end of the chain
    pub fn add(&mut self, hook: impl DispatchHook + 'static) {
        self.hooks.push(Arc::new(hook));
    }

    /// Append an already-shared hook
    pub fn add_arc(&mut self, hook: Arc<dyn DispatchHook>) {
        self.hooks.push(hook);
    }

    /// Get the number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[async_trait]
impl DispatchHook for DispatchHookChain {
    async fn before_task_dispatched(&self, task: &mut Task) -> Result<(), HookError> {
        for hook in &self.hooks {
            hook.before_task_dispatched(task).await?;
        }
        Ok(())
    }

    async fn before_task_serialization(&self, task: &Task) -> Result<(), HookError> {
        for hook in &self.hooks {
            hook.before_task_serialization(task).await?;
        }
        Ok(())
    }
}

/// Ordered list of worker observers, fired in registration order.
/// The first error short-circuits the rest of the chain.
#[derive(Default, Clone)]
pub struct WorkerHookChain {
    hooks: Vec<Arc<dyn WorkerHook>>,
}

impl WorkerHookChain {
    /// Create a new empty chain
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Append a hook to the end of the chain
    pub fn add(&mut self, hook: impl WorkerHook + 'static) {
        self.hooks.push(Arc::new(hook));
    }

    /// Append an already-shared hook
    pub fn add_arc(&mut self, hook: Arc<dyn WorkerHook>) {
        self.hooks.push(hook);
    }

    /// Get the number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Check if the chain is empty
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[async_trait]
impl WorkerHook for WorkerHookChain {
    async fn after_task_unserialization(&self, task: &Task) -> Result<(), HookError> {
        for hook in &self.hooks {
            hook.after_task_unserialization(task).await?;
        }
        Ok(())
    }

    async fn before_task_execution(&self, task: &Task) -> Result<(), HookError> {
        for hook in &self.hooks {
            hook.before_task_execution(task).await?;
        }
        Ok(())
    }

    async fn before_task_finished(&self, task: &Task) -> Result<(), HookError> {
        for hook in &self.hooks {
            hook.before_task_finished(task).await?;
        }
        Ok(())
    }

    async fn on_task_success(
        &self,
        task: &Task,
        dispatcher_notified: bool,
    ) -> Result<(), HookError> {
        for hook in &self.hooks {
            hook.on_task_success(task, dispatcher_notified).await?;
        }
        Ok(())
    }

    async fn on_task_error(
        &self,
        task: Option<&Task>,
        failure: &ExecutionFailure,
        dispatcher_notified: bool,
    ) -> Result<(), HookError> {
        for hook in &self.hooks {
            hook.on_task_error(task, failure, dispatcher_notified).await?;
        }
        Ok(())
    }
}

/// A hook that does nothing (useful for testing)
pub struct NoOpHook;

#[async_trait]
impl DispatchHook for NoOpHook {}

#[async_trait]
impl WorkerHook for NoOpHook {}

/// A hook that logs task lifecycle events using tracing
pub struct LoggingHook {
    level: tracing::Level,
}

impl LoggingHook {
    /// Create a logging hook that logs at INFO level
    pub fn info() -> Self {
        Self {
            level: tracing::Level::INFO,
        }
    }

    /// Create a logging hook that logs at DEBUG level
    pub fn debug() -> Self {
        Self {
            level: tracing::Level::DEBUG,
        }
    }
}

impl Default for LoggingHook {
    fn default() -> Self {
        Self::info()
    }
}

#[async_trait]
impl DispatchHook for LoggingHook {
    async fn before_task_dispatched(&self, task: &mut Task) -> Result<(), HookError> {
        match self.level {
            tracing::Level::DEBUG => {
                tracing::debug!(task = %task, "Dispatching task");
            }
            _ => {
                tracing::info!(task = %task, "Dispatching task");
            }
        }
        Ok(())
    }

    async fn before_task_serialization(&self, task: &Task) -> Result<(), HookError> {
        match self.level {
            tracing::Level::DEBUG => {
                tracing::debug!(task = %task, "Serializing task");
            }
            _ => {
                tracing::info!(task = %task, "Serializing task");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WorkerHook for LoggingHook {
    async fn after_task_unserialization(&self, task: &Task) -> Result<(), HookError> {
        match self.level {
            tracing::Level::DEBUG => {
                tracing::debug!(task = %task, "Task received");
            }
            _ => {
                tracing::info!(task = %task, "Task received");
            }
        }
        Ok(())
    }

    async fn before_task_execution(&self, task: &Task) -> Result<(), HookError> {
        match self.level {
            tracing::Level::DEBUG => {
                tracing::debug!(task = %task, "Executing task");
            }
            _ => {
                tracing::info!(task = %task, "Executing task");
            }
        }
        Ok(())
    }

    async fn before_task_finished(&self, task: &Task) -> Result<(), HookError> {
        match self.level {
            tracing::Level::DEBUG => {
                tracing::debug!(task = %task, "Task finished");
            }
            _ => {
                tracing::info!(task = %task, "Task finished");
            }
        }
        Ok(())
    }

    async fn on_task_success(
        &self,
        task: &Task,
        dispatcher_notified: bool,
    ) -> Result<(), HookError> {
        match self.level {
            tracing::Level::DEBUG => {
                tracing::debug!(task = %task, dispatcher_notified, "Task completed");
            }
            _ => {
                tracing::info!(task = %task, dispatcher_notified, "Task completed");
            }
        }
        Ok(())
    }

    async fn on_task_error(
        &self,
        task: Option<&Task>,
        failure: &ExecutionFailure,
        dispatcher_notified: bool,
    ) -> Result<(), HookError> {
        let task = task.map(|t| t.to_string());
        tracing::error!(
            task = task.as_deref().unwrap_or("<undecodable>"),
            error = %failure,
            dispatcher_notified,
            "Task failed"
        );
        Ok(())
    }
}
