//! Core error types for the drover work queue
//!
//! Errors at this layer are broker-communication failures: a queue or fanout
//! channel that does not exist, a declare that collides with an incompatible
//! queue, or a delivery handed back with a tag the broker is not holding.
//! Higher-level crates wrap these errors rather than extend them.

/// Core error type for broker operations
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Queue does not exist
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    /// Fanout channel does not exist
    #[error("fanout channel not found: {0}")]
    FanoutNotFound(String),

    /// Declare collided with an existing queue of different shape
    #[error("queue already exists with different options: {0}")]
    QueueExists(String),

    /// Acknowledge/reject referenced a delivery the broker is not holding
    #[error("unknown delivery tag: {0}")]
    UnknownDeliveryTag(u64),

    /// Reply descriptor did not match the `fanout;queue` wire form
    #[error("malformed reply descriptor: {0:?}")]
    MalformedReplyDescriptor(String),

    /// Generic broker error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for broker operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;
