//! Configuration for dispatchers and workers
//!
//! The interval defaults are the wait-protocol constants; overriding them
//! changes protocol timing for the instance they configure, nothing else.

use std::time::Duration;

use drover_core::{RACE_RESOLUTION_WINDOW, SIGNAL_POLL_INTERVAL};

use crate::error::ConfigError;

/// Work queue name used when none is configured
pub const DEFAULT_QUEUE: &str = "tasks";

/// Configuration for a [`Dispatcher`](crate::dispatcher::Dispatcher)
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Name of the durable work queue tasks are published to
    pub queue: String,
    /// Interval between reply-queue polls while waiting for completion
    pub poll_interval: Duration,
    /// How long to keep polling after publishing a timeout marker, in case
    /// the completion signal crossed it in flight
    pub race_window: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            poll_interval: SIGNAL_POLL_INTERVAL,
            race_window: RACE_RESOLUTION_WINDOW,
        }
    }
}

impl DispatcherConfig {
    /// Create a configuration for the given work queue, with validation
    pub fn new(queue: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            queue: queue.into(),
            ..Self::default()
        };

        if config.queue.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "queue name must not be empty".to_string(),
            ));
        }

        Ok(config)
    }

    /// Set the wait-loop poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the race-resolution window
    pub fn with_race_window(mut self, window: Duration) -> Self {
        self.race_window = window;
        self
    }
}

/// Configuration for a [`Worker`](crate::worker::Worker)
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name of the durable work queue tasks are consumed from
    pub queue: String,
    /// How long each consume-loop iteration blocks waiting for a delivery
    /// before re-checking for a stop request
    pub poll_interval: Duration,
    /// How long to poll the echo queue for confirmation that a published
    /// signal reached the broker
    pub echo_window: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            poll_interval: SIGNAL_POLL_INTERVAL,
            echo_window: RACE_RESOLUTION_WINDOW,
        }
    }
}

impl WorkerConfig {
    /// Create a configuration for the given work queue, with validation
    pub fn new(queue: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            queue: queue.into(),
            ..Self::default()
        };

        if config.queue.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "queue name must not be empty".to_string(),
            ));
        }

        Ok(config)
    }

    /// Set the consume-loop poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the echo-confirmation window
    pub fn with_echo_window(mut self, window: Duration) -> Self {
        self.echo_window = window;
        self
    }
}
