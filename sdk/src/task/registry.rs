//! TaskHandlerRegistry - handlers for named tasks

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, ExecutionFailure};
use crate::task::{Task, TaskExecutor};

/// Type alias for boxed task handler functions
pub type BoxedTaskHandler = Box<
    dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value, ExecutionFailure>> + Send>>
        + Send
        + Sync,
>;

/// Registry of handlers for [`Task::Named`], itself usable as the worker's
/// [`TaskExecutor`].
///
/// This is how applications run work that is not a service call without
/// widening the task sum: register an async handler per task name and
/// dispatch `Task::Named` carrying that name.
#[derive(Default)]
pub struct TaskHandlerRegistry {
    handlers: RwLock<HashMap<String, BoxedTaskHandler>>,
}

impl TaskHandlerRegistry {
    /// Create a new empty handler registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a unique task name
    pub fn register<F, Fut>(&self, name: impl Into<String>, handler: F) -> Result<(), ConfigError>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ExecutionFailure>> + Send + 'static,
    {
        let name = name.into();
        let mut handlers = self.handlers.write();

        if handlers.contains_key(&name) {
            return Err(ConfigError::InvalidConfiguration(format!(
                "Task '{}' is already registered. Each task name must be unique within a registry.",
                name
            )));
        }

        handlers.insert(name, Box::new(move |input| Box::pin(handler(input))));
        Ok(())
    }

    /// Check if a task name has a handler
    pub fn has(&self, name: &str) -> bool {
        self.handlers.read().contains_key(name)
    }

    /// Get all registered task names
    pub fn registered_names(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }

    /// Get the number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

#[async_trait]
impl TaskExecutor for TaskHandlerRegistry {
    async fn execute(&self, task: &Task) -> Result<(), ExecutionFailure> {
        match task {
            Task::Named { name, input } => {
                // The produced future owns its state, so the lock is not
                // held across the await.
                let pending = {
                    let handlers = self.handlers.read();
                    let handler = handlers
                        .get(name)
                        .ok_or_else(|| ExecutionFailure::UnknownTaskName(name.clone()))?;
                    handler(input.clone())
                };
                pending.await?;
                debug!(task = %name, "task handler completed");
                Ok(())
            }
            Task::ServiceCall { .. } => {
                Err(ExecutionFailure::UnsupportedTask { kind: task.kind() })
            }
        }
    }
}

impl fmt::Debug for TaskHandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandlerRegistry")
            .field("handlers", &self.registered_names())
            .finish()
    }
}
