//! Dispatcher - publishes tasks and optionally waits for completion

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use drover_core::{poll_for_delivery, Broker, Publication, QueueOptions, ReplyDescriptor, Signal};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::hooks::{DispatchHook, DispatchHookChain};
use crate::task::Task;

/// Outcome of a synchronous dispatch.
///
/// Exactly one outcome is produced per wait. The call site additionally
/// sees `None` when no outcome exists at all: a zero wait, or no
/// recognizable signal arriving even inside the race window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The worker reported successful completion within the wait
    Completed,
    /// The worker reported a task failure within the wait
    Errored,
    /// No signal arrived in time; the task may still be running
    TimedOut,
}

/// The temporary channel set backing one synchronous dispatch
struct WaitSession {
    fanout: String,
    reply_queue: String,
    echo_queue: String,
}

impl WaitSession {
    fn descriptor(&self) -> ReplyDescriptor {
        ReplyDescriptor::new(self.fanout.clone(), self.echo_queue.clone())
    }
}

/// Publishes tasks to a work queue.
///
/// [`dispatch`](Dispatcher::dispatch) is fire-and-forget.
/// [`dispatch_and_wait`](Dispatcher::dispatch_and_wait) additionally opens
/// a temporary reply channel and blocks, bounded by a timeout, until the
/// consuming worker signals completion over it. All methods take `&self`;
/// one dispatcher can be shared across tasks.
pub struct Dispatcher {
    broker: Arc<dyn Broker>,
    config: DispatcherConfig,
    hooks: DispatchHookChain,
}

impl Dispatcher {
    /// Create a dispatcher with no hooks
    pub fn new(broker: Arc<dyn Broker>, config: DispatcherConfig) -> Self {
        Self::with_hooks(broker, config, DispatchHookChain::new())
    }

    /// Create a dispatcher with an observer chain
    pub fn with_hooks(
        broker: Arc<dyn Broker>,
        config: DispatcherConfig,
        hooks: DispatchHookChain,
    ) -> Self {
        Self {
            broker,
            config,
            hooks,
        }
    }

    /// The work queue this dispatcher publishes to
    pub fn queue(&self) -> &str {
        &self.config.queue
    }

    /// Publish a task for background execution and return immediately.
    ///
    /// The task is serialized after the dispatch hooks ran and published
    /// persistently: it survives a broker restart until a worker settles
    /// it. Nothing reaches the broker if a hook refuses the task.
    pub async fn dispatch(&self, mut task: Task) -> Result<(), DispatchError> {
        self.hooks.before_task_dispatched(&mut task).await?;
        self.hooks.before_task_serialization(&task).await?;

        self.publish(&task, None).await
    }

    /// Publish a task and wait up to `timeout` for the worker's signal.
    ///
    /// A zero `timeout` degrades to [`dispatch`](Dispatcher::dispatch):
    /// nothing is created, nothing is awaited, and the result is
    /// `Ok(None)`. Otherwise the wait observes exactly one
    /// [`WaitOutcome`], or `None` in the pathological case where neither
    /// a completion signal nor the dispatcher's own timeout marker comes
    /// back (logged at warn level).
    pub async fn dispatch_and_wait(
        &self,
        mut task: Task,
        timeout: Duration,
    ) -> Result<Option<WaitOutcome>, DispatchError> {
        if timeout.is_zero() {
            self.dispatch(task).await?;
            return Ok(None);
        }

        self.hooks.before_task_dispatched(&mut task).await?;
        self.hooks.before_task_serialization(&task).await?;

        let session = self.open_session().await?;
        self.publish(&task, Some(session.descriptor().encode()))
            .await?;

        let outcome = self.wait_for_signal(&session, timeout).await?;

        // The private reply queue has served its purpose in every outcome.
        self.broker.delete_queue(&session.reply_queue).await?;

        Ok(outcome)
    }

    /// Declare the fanout and its two bound queues for one wait
    async fn open_session(&self) -> Result<WaitSession, DispatchError> {
        let broker = self.broker.as_ref();

        let fanout = format!("reply-{}", Uuid::new_v4().simple());
        broker.declare_fanout(&fanout).await?;

        let reply_queue = broker.declare_queue(QueueOptions::reply_queue()).await?;
        broker.bind(&reply_queue, &fanout).await?;

        let echo_queue = broker.declare_queue(QueueOptions::echo_queue()).await?;
        broker.bind(&echo_queue, &fanout).await?;

        debug!(
            fanout = %fanout,
            reply_queue = %reply_queue,
            echo_queue = %echo_queue,
            "wait session opened"
        );

        Ok(WaitSession {
            fanout,
            reply_queue,
            echo_queue,
        })
    }

    async fn publish(&self, task: &Task, reply_to: Option<String>) -> Result<(), DispatchError> {
        let payload = task.encode()?;

        let mut publication = Publication::new(payload).persistent();
        if let Some(reply_to) = reply_to {
            publication = publication.with_reply_to(reply_to);
        }

        self.broker.publish(&self.config.queue, publication).await?;
        debug!(task = %task, queue = %self.config.queue, "task published");
        Ok(())
    }

    async fn wait_for_signal(
        &self,
        session: &WaitSession,
        timeout: Duration,
    ) -> Result<Option<WaitOutcome>, DispatchError> {
        let broker = self.broker.as_ref();

        let mut delivery = poll_for_delivery(
            broker,
            &session.reply_queue,
            timeout,
            self.config.poll_interval,
        )
        .await?;

        if delivery.is_none() {
            // Nothing yet: push a timeout marker through the fanout, then
            // give a completion that crossed it in flight one more window.
            // Queue order settles the race: both bound queues see the
            // fanout's messages in the same order, so whichever signal was
            // published first is the one both sides read first.
            broker
                .publish_to_fanout(
                    &session.fanout,
                    Publication::new(Signal::Timeout.as_bytes()),
                )
                .await?;

            delivery = poll_for_delivery(
                broker,
                &session.reply_queue,
                self.config.race_window,
                self.config.poll_interval,
            )
            .await?;
        }

        match delivery.as_ref().and_then(|d| Signal::parse(&d.payload)) {
            Some(Signal::Finished) => {
                broker.delete_fanout(&session.fanout).await?;
                debug!(fanout = %session.fanout, "task completed within wait");
                Ok(Some(WaitOutcome::Completed))
            }
            Some(Signal::Errored) => {
                broker.delete_fanout(&session.fanout).await?;
                debug!(fanout = %session.fanout, "task errored within wait");
                Ok(Some(WaitOutcome::Errored))
            }
            Some(Signal::Timeout) => {
                // Our own marker came back first: a genuine timeout. The
                // fanout stays up because a worker still in flight needs
                // it to reach its echo queue.
                debug!(fanout = %session.fanout, "wait timed out");
                Ok(Some(WaitOutcome::TimedOut))
            }
            None => {
                warn!(
                    fanout = %session.fanout,
                    "no recognizable signal after the timeout marker"
                );
                Ok(None)
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("queue", &self.config.queue)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
