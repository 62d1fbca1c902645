//! TaskExecutor - the seam between a worker and application code

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, ExecutionFailure};
use crate::task::Task;

/// Executes consumed tasks on behalf of a worker.
///
/// An executor declares what it supports by matching on the task variant;
/// a variant it does not handle is reported as
/// [`ExecutionFailure::UnsupportedTask`] so the worker can reject the
/// delivery instead of silently swallowing it.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<(), ExecutionFailure>;
}

/// A named application service callable through [`ServiceCallExecutor`].
///
/// The returned value is discarded by the executor: queued work has no
/// caller waiting on it. Services that want to report results do so
/// through their own side effects.
#[async_trait]
pub trait Service: Send + Sync {
    async fn call(&self, method: &str, args: &[Value]) -> Result<Value, ExecutionFailure>;
}

/// Resolves service names to implementations
pub trait ServiceLocator: Send + Sync {
    fn get(&self, name: &str) -> Option<Arc<dyn Service>>;
}

/// `HashMap`-backed [`ServiceLocator`].
/// Workers register their service implementations here.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
}

impl ServiceRegistry {
    /// Create a new empty service registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service under a unique name
    pub fn register(
        &self,
        name: impl Into<String>,
        service: Arc<dyn Service>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        let mut services = self.services.write();

        if services.contains_key(&name) {
            return Err(ConfigError::InvalidConfiguration(format!(
                "Service '{}' is already registered. Each service name must be unique within a locator.",
                name
            )));
        }

        services.insert(name, service);
        Ok(())
    }

    /// Check if a service name is registered
    pub fn has(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    /// Get all registered service names
    pub fn registered_names(&self) -> Vec<String> {
        self.services.read().keys().cloned().collect()
    }

    /// Get the number of registered services
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl ServiceLocator for ServiceRegistry {
    fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.services.read().get(name).cloned()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.registered_names())
            .finish()
    }
}

/// Executor for [`Task::ServiceCall`]: looks the service up in a locator
/// and invokes the named method with the task's arguments.
#[derive(Debug)]
pub struct ServiceCallExecutor<L> {
    locator: L,
}

impl<L: ServiceLocator> ServiceCallExecutor<L> {
    pub fn new(locator: L) -> Self {
        Self { locator }
    }
}

#[async_trait]
impl<L: ServiceLocator> TaskExecutor for ServiceCallExecutor<L> {
    async fn execute(&self, task: &Task) -> Result<(), ExecutionFailure> {
        match task {
            Task::ServiceCall {
                service,
                method,
                args,
            } => {
                let resolved = self
                    .locator
                    .get(service)
                    .ok_or_else(|| ExecutionFailure::UnknownService(service.clone()))?;
                resolved.call(method, args).await?;
                debug!(service = %service, method = %method, "service call completed");
                Ok(())
            }
            Task::Named { .. } => Err(ExecutionFailure::UnsupportedTask { kind: task.kind() }),
        }
    }
}
