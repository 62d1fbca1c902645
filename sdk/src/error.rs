//! Error types for the Drover SDK
//!
//! Each operation family carries its own error enum, so a caller can match
//! on exactly the failures that operation can produce instead of sifting
//! one catch-all type.

// Re-export core error types
pub use drover_core::CoreError;

/// Error raised by a dispatch or worker hook.
///
/// Hooks turn their own failures into this type; the surrounding
/// operation decides whether it is recoverable (pre-completion hooks) or
/// fatal (terminal hooks).
#[derive(Debug, thiserror::Error)]
#[error("hook failed: {0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Invalid dispatcher, worker, or registry setup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Errors surfaced when publishing a task
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Broker communication failed
    #[error("Broker error: {0}")]
    Broker(#[from] CoreError),

    /// Task could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A dispatch hook refused the task
    #[error("{0}")]
    Hook(#[from] HookError),
}

/// Errors that abort a worker's consume loop.
///
/// Task-level failures never appear here; they are settled per delivery
/// and reported through hooks. Only broker trouble, a failing terminal
/// hook, or a second concurrent `work` call stop the loop.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Broker communication failed
    #[error("Broker error: {0}")]
    Broker(#[from] CoreError),

    /// A terminal hook failed after a task was settled
    #[error("Terminal hook failed: {0}")]
    TerminalHook(#[source] HookError),

    /// The worker was asked to consume while already consuming
    #[error("Worker is already running")]
    AlreadyRunning,
}

/// Why a consumed task could not be completed.
///
/// Every variant is caught by the worker loop: the delivery is rejected
/// without requeue and a waiting dispatcher, if any, receives an errored
/// signal. Other tasks keep flowing.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionFailure {
    /// Task payload could not be deserialized
    #[error("Task deserialization failed: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// A per-task hook failed before the task was settled
    #[error("{0}")]
    Hook(#[from] HookError),

    /// The executor does not handle this task variant
    #[error("Executor does not support {kind} tasks")]
    UnsupportedTask { kind: &'static str },

    /// No service registered under the requested name
    #[error("Service not found: {0}")]
    UnknownService(String),

    /// The service exists but does not expose the method
    #[error("Method not found: {service}::{method}")]
    UnknownMethod { service: String, method: String },

    /// No handler registered under the task name
    #[error("No handler for task: {0}")]
    UnknownTaskName(String),

    /// The task body ran and reported failure
    #[error("Task failed: {0}")]
    Failed(String),
}

impl ExecutionFailure {
    /// Failure reported by the task body itself
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
