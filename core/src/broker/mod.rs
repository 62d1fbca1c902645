//! Broker abstraction: the capability set the work queue is built on
//!
//! The protocol needs only a small set of broker primitives: durable
//! point-to-point queues with manual acknowledge/reject, fanout channels
//! that copy one message to every bound queue, broker-named exclusive
//! queues, a non-blocking "get one message or none" receive, and a
//! per-message persistence flag. [`Broker`] captures exactly that set so
//! the dispatch and worker layers stay independent of any concrete broker
//! product. [`memory::MemoryBroker`] is the in-process implementation.

mod delivery;
pub mod memory;

pub use delivery::{Delivery, Publication};
pub use memory::MemoryBroker;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::CoreResult;

/// Shape of a queue at declare time.
///
/// `name: None` asks the broker to generate a unique name (returned by
/// [`Broker::declare_queue`]). Redeclaring an existing queue with the same
/// shape is a no-op; redeclaring with a different shape is an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    pub name: Option<String>,
    /// Queue survives a broker restart (its persistent messages with it)
    pub durable: bool,
    /// Private to the declaring party
    pub exclusive: bool,
    /// Removed when no longer in use
    pub auto_delete: bool,
}

impl QueueOptions {
    /// A named, durable work queue shared by dispatchers and workers
    pub fn work_queue(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            durable: true,
            exclusive: false,
            auto_delete: false,
        }
    }

    /// The dispatcher's private reply queue: broker-named, transient,
    /// exclusive, auto-deleting
    pub fn reply_queue() -> Self {
        Self {
            name: None,
            durable: false,
            exclusive: true,
            auto_delete: true,
        }
    }

    /// The worker's echo queue: broker-named and durable, so it survives
    /// until the worker gets around to its notification attempt
    pub fn echo_queue() -> Self {
        Self {
            name: None,
            durable: true,
            exclusive: false,
            auto_delete: false,
        }
    }
}

/// The broker capability set.
///
/// Implementations must give every queue FIFO order and must apply a fanout
/// publish to all bound queues as one atomic step, so that any two observers
/// see signal messages in the same order. The synchronous-wait race
/// resolution depends on that ordering.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare a queue, returning its (possibly broker-generated) name
    async fn declare_queue(&self, options: QueueOptions) -> CoreResult<String>;

    /// Delete a queue and any bindings pointing at it
    async fn delete_queue(&self, queue: &str) -> CoreResult<()>;

    /// Declare a fanout channel. Fanouts auto-delete once their last bound
    /// queue goes away (a never-bound fanout stays).
    async fn declare_fanout(&self, name: &str) -> CoreResult<()>;

    /// Delete a fanout channel; bound queues are left untouched
    async fn delete_fanout(&self, name: &str) -> CoreResult<()>;

    /// Bind a queue to a fanout channel
    async fn bind(&self, queue: &str, fanout: &str) -> CoreResult<()>;

    /// Publish a message directly to a queue
    async fn publish(&self, queue: &str, publication: Publication) -> CoreResult<()>;

    /// Publish a message to every queue bound to the fanout channel
    async fn publish_to_fanout(&self, fanout: &str, publication: Publication) -> CoreResult<()>;

    /// Non-blocking receive: pop one message if the queue has any.
    /// The message is auto-acknowledged; there is nothing to ack later.
    async fn get(&self, queue: &str) -> CoreResult<Option<Delivery>>;

    /// Open a manual-acknowledgment consumer with a prefetch limit of one
    async fn consume(&self, queue: &str) -> CoreResult<Box<dyn Consumer>>;
}

/// A prefetch-limited, manual-acknowledgment subscription to one queue.
///
/// At most one delivery is outstanding at a time: [`Consumer::next`] hands
/// out nothing until the previous delivery has been acked or rejected.
/// Dropping a consumer with an outstanding delivery returns that delivery
/// to the front of its queue.
#[async_trait]
pub trait Consumer: Send {
    /// Wait up to `timeout` for the next delivery. Returns `None` on
    /// timeout, including when blocked behind an unacknowledged delivery.
    async fn next(&mut self, timeout: Duration) -> CoreResult<Option<Delivery>>;

    /// Acknowledge a delivery, removing it from the queue for good
    async fn ack(&mut self, delivery: &Delivery) -> CoreResult<()>;

    /// Reject a delivery without requeue; the message is dropped
    async fn reject(&mut self, delivery: &Delivery) -> CoreResult<()>;
}
