//! Reply-channel vocabulary for the synchronous wait protocol
//!
//! A dispatcher that waits for completion sets up a temporary fanout with
//! two bound queues: its own exclusive reply queue and a queue the worker
//! polls for the echo of its own signal. The pair is advertised to the
//! worker through a [`ReplyDescriptor`] carried on the task delivery.
//! Signals themselves are single-word bodies published to the fanout, so
//! both queues observe them in the same order and the two processes agree
//! on who won a close race.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::broker::{Broker, Delivery};
use crate::error::{CoreError, CoreResult};

/// Interval between reply-queue polls while a dispatcher waits
pub const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Grace window used on both sides after a timeout is declared: the
/// dispatcher keeps polling this long for a signal that crossed its
/// timeout marker in flight, and the worker polls its echo queue this
/// long to learn whether the dispatcher was still listening.
pub const RACE_RESOLUTION_WINDOW: Duration = Duration::from_millis(500);

/// Completion signal exchanged over a reply fanout.
///
/// `Finished` and `Errored` are published by the worker once a task has
/// been settled; `Timeout` is published by the dispatcher to its own
/// fanout when it gives up waiting, so the worker can observe that the
/// wait ended before the work did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Finished,
    Errored,
    Timeout,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Finished => "finished",
            Signal::Errored => "errored",
            Signal::Timeout => "timeout",
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }

    /// Parse a signal body. Anything other than the three known words is
    /// not a signal and yields `None`.
    pub fn parse(body: &[u8]) -> Option<Signal> {
        match body {
            b"finished" => Some(Signal::Finished),
            b"errored" => Some(Signal::Errored),
            b"timeout" => Some(Signal::Timeout),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names of the fanout and echo queue a waiting dispatcher created,
/// encoded onto the task delivery so the worker knows where to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyDescriptor {
    pub fanout: String,
    pub echo_queue: String,
}

const DESCRIPTOR_SEPARATOR: char = ';';

impl ReplyDescriptor {
    pub fn new(fanout: impl Into<String>, echo_queue: impl Into<String>) -> Self {
        Self {
            fanout: fanout.into(),
            echo_queue: echo_queue.into(),
        }
    }

    /// Wire form carried in the delivery's reply-to field
    pub fn encode(&self) -> String {
        format!("{}{}{}", self.fanout, DESCRIPTOR_SEPARATOR, self.echo_queue)
    }

    /// Parse the wire form. Exactly two non-empty segments are required.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let mut parts = raw.split(DESCRIPTOR_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(fanout), Some(echo_queue), None)
                if !fanout.is_empty() && !echo_queue.is_empty() =>
            {
                Ok(Self::new(fanout, echo_queue))
            }
            _ => Err(CoreError::MalformedReplyDescriptor(raw.to_string())),
        }
    }
}

impl fmt::Display for ReplyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Poll a queue with `get` until a delivery shows up or `timeout` elapses.
///
/// The first probe happens immediately, so a zero timeout still performs
/// one check. Between probes the caller-supplied `interval` is slept,
/// clamped so the final probe lands on the deadline rather than past it.
pub async fn poll_for_delivery(
    broker: &dyn Broker,
    queue: &str,
    timeout: Duration,
    interval: Duration,
) -> CoreResult<Option<Delivery>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(delivery) = broker.get(queue).await? {
            return Ok(Some(delivery));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
