//! Drover SDK for Rust
//!
//! This SDK provides broker-backed work queues for Rust applications:
//! dispatchers publish serialized tasks to a durable queue, workers consume
//! and execute them one at a time, and a dispatcher can optionally wait a
//! bounded time for a specific task to complete.
//!
//! The broker abstraction and wait-protocol primitives live in
//! `drover-core`; this crate adds the task model, executors, hooks, and the
//! [`Dispatcher`] / [`Worker`] pair built on top of them.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hooks;
pub mod task;
pub mod worker;

// Re-export commonly used types
pub use error::{ConfigError, CoreError, DispatchError, ExecutionFailure, HookError, WorkerError};

// Re-export broker types
pub use drover_core::{Broker, Consumer, Delivery, MemoryBroker, Publication, QueueOptions};

// Re-export config types
pub use config::{DispatcherConfig, WorkerConfig, DEFAULT_QUEUE};

// Re-export dispatcher types
pub use dispatcher::{Dispatcher, WaitOutcome};

// Re-export hook types
pub use hooks::{
    DispatchHook, DispatchHookChain, LoggingHook, NoOpHook, WorkerHook, WorkerHookChain,
};

// Re-export task types
pub use task::executor::{
    Service, ServiceCallExecutor, ServiceLocator, ServiceRegistry, TaskExecutor,
};
pub use task::model::Task;
pub use task::registry::{BoxedTaskHandler, TaskHandlerRegistry};

// Re-export worker types
pub use worker::Worker;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{DispatcherConfig, WorkerConfig, DEFAULT_QUEUE};
    pub use crate::dispatcher::{Dispatcher, WaitOutcome};
    pub use crate::error::{
        ConfigError, CoreError, DispatchError, ExecutionFailure, HookError, WorkerError,
    };
    pub use crate::hooks::{
        DispatchHook, DispatchHookChain, LoggingHook, NoOpHook, WorkerHook, WorkerHookChain,
    };
    pub use crate::task::executor::{
        Service, ServiceCallExecutor, ServiceLocator, ServiceRegistry, TaskExecutor,
    };
    pub use crate::task::model::Task;
    pub use crate::task::registry::{BoxedTaskHandler, TaskHandlerRegistry};
    pub use crate::worker::Worker;
    pub use drover_core::{Broker, Consumer, Delivery, MemoryBroker, Publication, QueueOptions};
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{json, Map, Value};
    pub use uuid::Uuid;
}
