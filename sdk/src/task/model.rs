//! The serializable task model

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A unit of work published to a queue.
///
/// A task is a pure message: it names what should happen and carries the
/// data needed to do it, never any logic. It is fully defined at
/// construction, serialized once at dispatch, deserialized once by the
/// consuming worker, and dropped after execution. The JSON wire form is
/// self-describing through the `kind` tag:
///
/// ```json
/// {"kind": "service_call", "service": "mailer", "method": "send", "args": ["hi"]}
/// {"kind": "named", "name": "resize-image", "input": {"width": 800}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    /// Invoke a method on a registered service with positional arguments
    ServiceCall {
        service: String,
        method: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Free-form task routed to the handler registered under `name`
    Named { name: String, input: Value },
}

impl Task {
    /// Task that calls `method` on the service registered as `service`
    pub fn service_call(
        service: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Task::ServiceCall {
            service: service.into(),
            method: method.into(),
            args,
        }
    }

    /// Task routed by name to a registered handler
    pub fn named(name: impl Into<String>, input: Value) -> Self {
        Task::Named {
            name: name.into(),
            input,
        }
    }

    /// Stable variant name, identical to the wire tag
    pub fn kind(&self) -> &'static str {
        match self {
            Task::ServiceCall { .. } => "service_call",
            Task::Named { .. } => "named",
        }
    }

    /// Serialize to the JSON wire form
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from the JSON wire form
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::ServiceCall {
                service, method, ..
            } => write!(f, "service call {}::{}", service, method),
            Task::Named { name, .. } => write!(f, "task {}", name),
        }
    }
}
