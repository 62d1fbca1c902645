//! # Drover Core
//!
//! Transport-level building blocks for the Drover work-queue library.
//!
//! This crate defines the broker capability surface the rest of Drover is
//! written against, an in-memory broker implementation with real queue and
//! fanout semantics, and the reply-channel vocabulary used by the
//! synchronous wait protocol. It knows nothing about tasks, executors, or
//! hooks; those live in the SDK.
//!
//! ## What's in Core vs SDK
//!
//! **Core** contains transport-level components:
//! - The [`Broker`] and [`Consumer`] traits and their delivery envelopes
//! - Queue declaration shapes (durable work queues, exclusive reply
//!   queues, worker echo queues)
//! - [`MemoryBroker`], a lock-per-operation in-process broker
//! - Wait-protocol signals, reply descriptors, and polling helpers
//!
//! **SDK** contains application-level components:
//! - The task model and its serialization
//! - Dispatcher and worker with their hook points
//! - Task executors and registries
//!
//! ## Modules
//!
//! - [`broker`] - Broker traits, queue options, and the in-memory broker
//! - [`reply`] - Signals, reply descriptors, and reply-queue polling
//! - [`error`] - Core error types

pub mod broker;
pub mod error;
pub mod reply;

// Re-export broker types
pub use broker::{Broker, Consumer, Delivery, MemoryBroker, Publication, QueueOptions};

// Re-export error types
pub use error::{CoreError, CoreResult};

// Re-export reply-channel types
pub use reply::{
    poll_for_delivery, ReplyDescriptor, Signal, RACE_RESOLUTION_WINDOW, SIGNAL_POLL_INTERVAL,
};
