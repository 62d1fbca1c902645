//! In-process broker with queue, fanout, and manual-acknowledgment semantics
//!
//! Backs the test suite and single-process deployments. Every operation
//! takes one lock over the whole broker state, which gives the property the
//! wait protocol leans on: a fanout publish lands in all bound queues as one
//! atomic step, so every queue observes signals in the same total order.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::broker::{Broker, Consumer, Delivery, Publication, QueueOptions};
use crate::error::{CoreError, CoreResult};

/// In-memory [`Broker`] implementation.
///
/// Cloning is cheap and shares the underlying state, so tests and embedders
/// can keep one handle for introspection while another is inside a
/// dispatcher or worker. `restart()` models a broker restart for exercising
/// the persistence flag; it assumes no consumer is active at that moment.
/// Exclusive queues are exclusive by convention only: all handles share one
/// state, and nothing stops another party from reading them.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    arrivals: Arc<Notify>,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, Queue>,
    fanouts: HashMap<String, Fanout>,
    next_tag: u64,
}

struct Queue {
    durable: bool,
    exclusive: bool,
    auto_delete: bool,
    ready: VecDeque<QueuedMessage>,
    unacked: usize,
    rejected: u64,
}

impl Queue {
    fn matches(&self, options: &QueueOptions) -> bool {
        self.durable == options.durable
            && self.exclusive == options.exclusive
            && self.auto_delete == options.auto_delete
    }
}

#[derive(Clone)]
struct QueuedMessage {
    payload: Vec<u8>,
    persistent: bool,
    reply_to: Option<String>,
}

impl From<Publication> for QueuedMessage {
    fn from(publication: Publication) -> Self {
        Self {
            payload: publication.payload,
            persistent: publication.persistent,
            reply_to: publication.reply_to,
        }
    }
}

struct Fanout {
    bindings: Vec<String>,
    ever_bound: bool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a broker restart: transient queues disappear, durable queues
    /// keep only their persistent messages, and bindings to removed queues
    /// are pruned (auto-deleting fanouts that lose their last binding).
    pub fn restart(&self) {
        let mut state = self.state.lock();
        state.queues.retain(|_, queue| queue.durable);
        for queue in state.queues.values_mut() {
            queue.ready.retain(|message| message.persistent);
            queue.unacked = 0;
        }
        let removed: Vec<String> = {
            let live = &state.queues;
            state
                .fanouts
                .values()
                .flat_map(|fanout| fanout.bindings.iter())
                .filter(|queue| !live.contains_key(*queue))
                .cloned()
                .collect()
        };
        for queue in removed {
            prune_queue_bindings(&mut state, &queue);
        }
        debug!("memory broker restarted");
        self.arrivals.notify_waiters();
    }

    /// Whether a queue currently exists
    pub fn queue_exists(&self, queue: &str) -> bool {
        self.state.lock().queues.contains_key(queue)
    }

    /// Whether a fanout channel currently exists
    pub fn fanout_exists(&self, fanout: &str) -> bool {
        self.state.lock().fanouts.contains_key(fanout)
    }

    /// Number of ready (undelivered) messages in a queue
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.len())
            .unwrap_or(0)
    }

    /// Number of delivered-but-unacknowledged messages in a queue
    pub fn unacked_count(&self, queue: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.unacked)
            .unwrap_or(0)
    }

    /// Number of rejected deliveries dropped from a queue so far
    pub fn rejected_count(&self, queue: &str) -> u64 {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(|q| q.rejected)
            .unwrap_or(0)
    }

    /// Names of all live queues, sorted
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of all live fanout channels, sorted
    pub fn fanout_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().fanouts.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Remove a deleted queue from all fanout binding lists, auto-deleting any
/// fanout that had bindings and now has none.
fn prune_queue_bindings(state: &mut BrokerState, removed: &str) {
    let mut emptied = Vec::new();
    for (name, fanout) in state.fanouts.iter_mut() {
        fanout.bindings.retain(|queue| queue != removed);
        if fanout.ever_bound && fanout.bindings.is_empty() {
            emptied.push(name.clone());
        }
    }
    for name in emptied {
        state.fanouts.remove(&name);
        debug!(fanout = %name, "fanout auto-deleted after losing last binding");
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_queue(&self, options: QueueOptions) -> CoreResult<String> {
        let mut state = self.state.lock();
        let name = match &options.name {
            Some(name) => {
                if let Some(existing) = state.queues.get(name) {
                    if existing.matches(&options) {
                        return Ok(name.clone());
                    }
                    return Err(CoreError::QueueExists(name.clone()));
                }
                name.clone()
            }
            None => format!("gen-{}", Uuid::new_v4().simple()),
        };
        state.queues.insert(
            name.clone(),
            Queue {
                durable: options.durable,
                exclusive: options.exclusive,
                auto_delete: options.auto_delete,
                ready: VecDeque::new(),
                unacked: 0,
                rejected: 0,
            },
        );
        debug!(queue = %name, durable = options.durable, exclusive = options.exclusive, "queue declared");
        Ok(name)
    }

    async fn delete_queue(&self, queue: &str) -> CoreResult<()> {
        let mut state = self.state.lock();
        if state.queues.remove(queue).is_none() {
            return Err(CoreError::QueueNotFound(queue.to_string()));
        }
        prune_queue_bindings(&mut state, queue);
        debug!(queue = %queue, "queue deleted");
        drop(state);
        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn declare_fanout(&self, name: &str) -> CoreResult<()> {
        let mut state = self.state.lock();
        state.fanouts.entry(name.to_string()).or_insert(Fanout {
            bindings: Vec::new(),
            ever_bound: false,
        });
        debug!(fanout = %name, "fanout declared");
        Ok(())
    }

    async fn delete_fanout(&self, name: &str) -> CoreResult<()> {
        let mut state = self.state.lock();
        if state.fanouts.remove(name).is_none() {
            return Err(CoreError::FanoutNotFound(name.to_string()));
        }
        debug!(fanout = %name, "fanout deleted");
        Ok(())
    }

    async fn bind(&self, queue: &str, fanout: &str) -> CoreResult<()> {
        let mut state = self.state.lock();
        if !state.queues.contains_key(queue) {
            return Err(CoreError::QueueNotFound(queue.to_string()));
        }
        let entry = state
            .fanouts
            .get_mut(fanout)
            .ok_or_else(|| CoreError::FanoutNotFound(fanout.to_string()))?;
        if !entry.bindings.iter().any(|bound| bound == queue) {
            entry.bindings.push(queue.to_string());
        }
        entry.ever_bound = true;
        Ok(())
    }

    async fn publish(&self, queue: &str, publication: Publication) -> CoreResult<()> {
        let mut state = self.state.lock();
        let entry = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| CoreError::QueueNotFound(queue.to_string()))?;
        entry.ready.push_back(publication.into());
        drop(state);
        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn publish_to_fanout(&self, fanout: &str, publication: Publication) -> CoreResult<()> {
        let mut state = self.state.lock();
        let bindings = state
            .fanouts
            .get(fanout)
            .ok_or_else(|| CoreError::FanoutNotFound(fanout.to_string()))?
            .bindings
            .clone();
        let message = QueuedMessage::from(publication);
        for queue in bindings {
            if let Some(entry) = state.queues.get_mut(&queue) {
                entry.ready.push_back(message.clone());
            }
        }
        drop(state);
        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn get(&self, queue: &str) -> CoreResult<Option<Delivery>> {
        let mut state = self.state.lock();
        let popped = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| CoreError::QueueNotFound(queue.to_string()))?
            .ready
            .pop_front();
        Ok(popped.map(|message| {
            state.next_tag += 1;
            Delivery {
                tag: state.next_tag,
                payload: message.payload,
                persistent: message.persistent,
                reply_to: message.reply_to,
            }
        }))
    }

    async fn consume(&self, queue: &str) -> CoreResult<Box<dyn Consumer>> {
        if !self.queue_exists(queue) {
            return Err(CoreError::QueueNotFound(queue.to_string()));
        }
        Ok(Box::new(MemoryConsumer {
            queue: queue.to_string(),
            state: Arc::clone(&self.state),
            arrivals: Arc::clone(&self.arrivals),
            outstanding: None,
        }))
    }
}

struct MemoryConsumer {
    queue: String,
    state: Arc<Mutex<BrokerState>>,
    arrivals: Arc<Notify>,
    outstanding: Option<Delivery>,
}

impl MemoryConsumer {
    /// Pop the next ready message unless a delivery is already outstanding
    fn try_deliver(&mut self) -> CoreResult<Option<Delivery>> {
        let mut state = self.state.lock();
        let popped = {
            let queue = state
                .queues
                .get_mut(&self.queue)
                .ok_or_else(|| CoreError::QueueNotFound(self.queue.clone()))?;
            if self.outstanding.is_some() {
                None
            } else {
                match queue.ready.pop_front() {
                    Some(message) => {
                        queue.unacked += 1;
                        Some(message)
                    }
                    None => None,
                }
            }
        };
        Ok(popped.map(|message| {
            state.next_tag += 1;
            let delivery = Delivery {
                tag: state.next_tag,
                payload: message.payload,
                persistent: message.persistent,
                reply_to: message.reply_to,
            };
            self.outstanding = Some(delivery.clone());
            delivery
        }))
    }

    fn settle(&mut self, delivery: &Delivery, rejected: bool) -> CoreResult<()> {
        match self.outstanding.take() {
            Some(outstanding) if outstanding.tag == delivery.tag => {
                let mut state = self.state.lock();
                if let Some(queue) = state.queues.get_mut(&self.queue) {
                    queue.unacked = queue.unacked.saturating_sub(1);
                    if rejected {
                        queue.rejected += 1;
                    }
                }
                Ok(())
            }
            other => {
                self.outstanding = other;
                Err(CoreError::UnknownDeliveryTag(delivery.tag))
            }
        }
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn next(&mut self, timeout: Duration) -> CoreResult<Option<Delivery>> {
        let deadline = Instant::now() + timeout;
        let arrivals = Arc::clone(&self.arrivals);
        loop {
            // Arm the wakeup before checking, so a publish that lands
            // between the check and the wait is not missed.
            let notified = arrivals.notified();
            if let Some(delivery) = self.try_deliver()? {
                return Ok(Some(delivery));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> CoreResult<()> {
        self.settle(delivery, false)
    }

    async fn reject(&mut self, delivery: &Delivery) -> CoreResult<()> {
        self.settle(delivery, true)
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        // An unacknowledged delivery goes back to the front of its queue,
        // preserving at-least-once across a dying consumer.
        if let Some(delivery) = self.outstanding.take() {
            let mut state = self.state.lock();
            if let Some(queue) = state.queues.get_mut(&self.queue) {
                queue.unacked = queue.unacked.saturating_sub(1);
                queue.ready.push_front(QueuedMessage {
                    payload: delivery.payload,
                    persistent: delivery.persistent,
                    reply_to: delivery.reply_to,
                });
            }
            drop(state);
            self.arrivals.notify_waiters();
        }
    }
}
