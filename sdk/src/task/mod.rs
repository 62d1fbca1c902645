//! Task model and execution types

pub mod executor;
pub mod model;
pub mod registry;

pub use executor::{Service, ServiceCallExecutor, ServiceLocator, ServiceRegistry, TaskExecutor};
pub use model::Task;
pub use registry::TaskHandlerRegistry;
