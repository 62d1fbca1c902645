//! Message envelopes: what goes into a queue and what comes back out

use std::fmt;

/// An outbound message, before the broker has accepted it.
///
/// The payload is opaque bytes; serialization is the publisher's concern.
/// `persistent` asks the broker to keep the message across a restart
/// (meaningful only on durable queues). `reply_to` carries the encoded
/// reply descriptor for dispatches that wait for completion.
#[derive(Clone)]
pub struct Publication {
    pub payload: Vec<u8>,
    pub persistent: bool,
    pub reply_to: Option<String>,
}

impl Publication {
    /// Create a transient publication with no reply descriptor
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            persistent: false,
            reply_to: None,
        }
    }

    /// Mark the message to survive a broker restart
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    /// Attach an encoded reply descriptor
    pub fn with_reply_to(mut self, descriptor: impl Into<String>) -> Self {
        self.reply_to = Some(descriptor.into());
        self
    }
}

impl fmt::Debug for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publication")
            .field("payload_len", &self.payload.len())
            .field("persistent", &self.persistent)
            .field("reply_to", &self.reply_to)
            .finish()
    }
}

/// An inbound message: a [`Publication`] plus the broker-assigned tag.
///
/// The tag identifies this delivery for acknowledge/reject. Ownership of the
/// message transfers to the receiver on delivery and is released back to the
/// broker by ack (gone for good) or reject (dropped, no requeue).
#[derive(Clone)]
pub struct Delivery {
    pub tag: u64,
    pub payload: Vec<u8>,
    pub persistent: bool,
    pub reply_to: Option<String>,
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("tag", &self.tag)
            .field("payload_len", &self.payload.len())
            .field("persistent", &self.persistent)
            .field("reply_to", &self.reply_to)
            .finish()
    }
}
