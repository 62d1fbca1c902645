//! Worker - consumes tasks from a queue and executes them

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use drover_core::{poll_for_delivery, Broker, Consumer, Delivery, Publication, ReplyDescriptor, Signal};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{ExecutionFailure, WorkerError};
use crate::hooks::{WorkerHook, WorkerHookChain};
use crate::task::{Task, TaskExecutor};

/// How a single delivery ended
enum TaskOutcome {
    Completed(Task),
    /// The task is `None` when the payload never deserialized
    Failed(Option<Task>, ExecutionFailure),
}

/// Consumes tasks from a work queue, strictly one at a time.
///
/// Each delivery is deserialized, run through the executor, then
/// acknowledged (success) or rejected without requeue (failure). A
/// delivery carrying a reply descriptor additionally gets the completion
/// signalled back to the waiting dispatcher, best-effort. Task failures
/// never stop the worker; broker failures and failing terminal hooks do.
pub struct Worker {
    broker: Arc<dyn Broker>,
    executor: Arc<dyn TaskExecutor>,
    config: WorkerConfig,
    hooks: WorkerHookChain,
    worker_id: Uuid,
    running: AtomicBool,
}

impl Worker {
    /// Create a worker with no hooks
    pub fn new(broker: Arc<dyn Broker>, executor: Arc<dyn TaskExecutor>, config: WorkerConfig) -> Self {
        Self::with_hooks(broker, executor, config, WorkerHookChain::new())
    }

    /// Create a worker with an observer chain
    pub fn with_hooks(
        broker: Arc<dyn Broker>,
        executor: Arc<dyn TaskExecutor>,
        config: WorkerConfig,
        hooks: WorkerHookChain,
    ) -> Self {
        Self {
            broker,
            executor,
            config,
            hooks,
            worker_id: Uuid::new_v4(),
            running: AtomicBool::new(false),
        }
    }

    /// Unique id of this worker instance, for log correlation
    pub fn worker_id(&self) -> Uuid {
        self.worker_id
    }

    /// Whether the consume loop is currently active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask a running worker to exit once the current delivery is settled.
    /// An idle worker notices within one poll interval.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Consume and execute tasks, at most `max_tasks` of them (forever
    /// when `None`), until stopped.
    ///
    /// Exactly one delivery is in flight at any moment: the next task is
    /// not fetched before the previous one is settled and its completion
    /// notification delivered. Only one `work` call may be active per
    /// worker instance.
    pub async fn work(&self, max_tasks: Option<usize>) -> Result<(), WorkerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(WorkerError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        info!(worker_id = %self.worker_id, queue = %self.config.queue, "worker started");

        let mut consumer = self.broker.consume(&self.config.queue).await?;
        let mut remaining = max_tasks;

        while self.running.load(Ordering::SeqCst) {
            if remaining == Some(0) {
                break;
            }

            let delivery = match consumer.next(self.config.poll_interval).await? {
                Some(delivery) => delivery,
                None => continue,
            };

            self.handle_delivery(consumer.as_mut(), delivery).await?;

            if let Some(count) = remaining.as_mut() {
                *count -= 1;
            }
        }

        info!(worker_id = %self.worker_id, "worker stopped");
        Ok(())
    }

    async fn handle_delivery(
        &self,
        consumer: &mut dyn Consumer,
        delivery: Delivery,
    ) -> Result<(), WorkerError> {
        // A malformed descriptor means the dispatcher cannot be reached,
        // not that the task is bad: process the delivery as plain
        // fire-and-forget work.
        let reply = match delivery.reply_to.as_deref() {
            Some(raw) => match ReplyDescriptor::parse(raw) {
                Ok(descriptor) => Some(descriptor),
                Err(err) => {
                    warn!(worker_id = %self.worker_id, error = %err, "ignoring malformed reply descriptor");
                    None
                }
            },
            None => None,
        };

        let outcome = self.run_task(&delivery.payload).await;

        let signal = match &outcome {
            TaskOutcome::Completed(_) => {
                consumer.ack(&delivery).await?;
                Signal::Finished
            }
            TaskOutcome::Failed(_, _) => {
                consumer.reject(&delivery).await?;
                Signal::Errored
            }
        };

        let dispatcher_notified = match &reply {
            Some(reply) => self.notify_dispatcher(reply, signal).await?,
            None => false,
        };

        match outcome {
            TaskOutcome::Completed(task) => {
                debug!(
                    worker_id = %self.worker_id,
                    task = %task,
                    dispatcher_notified,
                    "task completed"
                );
                self.hooks
                    .on_task_success(&task, dispatcher_notified)
                    .await
                    .map_err(WorkerError::TerminalHook)?;
            }
            TaskOutcome::Failed(task, failure) => {
                debug!(
                    worker_id = %self.worker_id,
                    error = %failure,
                    dispatcher_notified,
                    "task failed"
                );
                self.hooks
                    .on_task_error(task.as_ref(), &failure, dispatcher_notified)
                    .await
                    .map_err(WorkerError::TerminalHook)?;
            }
        }

        Ok(())
    }

    /// Run one payload through deserialization, hooks, and the executor.
    /// Everything in here is a task failure, never a worker failure.
    async fn run_task(&self, payload: &[u8]) -> TaskOutcome {
        let task = match Task::decode(payload) {
            Ok(task) => task,
            Err(err) => return TaskOutcome::Failed(None, err.into()),
        };

        match self.execute_with_hooks(&task).await {
            Ok(()) => TaskOutcome::Completed(task),
            Err(failure) => TaskOutcome::Failed(Some(task), failure),
        }
    }

    async fn execute_with_hooks(&self, task: &Task) -> Result<(), ExecutionFailure> {
        self.hooks.after_task_unserialization(task).await?;
        self.hooks.before_task_execution(task).await?;
        self.executor.execute(task).await?;
        self.hooks.before_task_finished(task).await?;
        Ok(())
    }

    /// Publish the completion signal and confirm it reached the broker.
    ///
    /// Both queues bound to the fanout observe its messages in the same
    /// order, so reading our own signal first from the echo queue means
    /// the dispatcher read it first too; reading the dispatcher's timeout
    /// marker means it gave up before we finished. The echo queue is
    /// deleted in every case, it exists for exactly one notification.
    async fn notify_dispatcher(
        &self,
        reply: &ReplyDescriptor,
        signal: Signal,
    ) -> Result<bool, WorkerError> {
        let broker = self.broker.as_ref();

        broker
            .publish_to_fanout(&reply.fanout, Publication::new(signal.as_bytes()))
            .await?;

        let echoed = poll_for_delivery(
            broker,
            &reply.echo_queue,
            self.config.echo_window,
            self.config.poll_interval,
        )
        .await?;

        if echoed.is_none() {
            warn!(
                worker_id = %self.worker_id,
                fanout = %reply.fanout,
                "own completion signal never echoed back"
            );
        }

        let notified = matches!(
            &echoed,
            Some(delivery) if Signal::parse(&delivery.payload) == Some(signal)
        );

        broker.delete_queue(&reply.echo_queue).await?;

        Ok(notified)
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("worker_id", &self.worker_id)
            .field("queue", &self.config.queue)
            .field("hooks", &self.hooks.len())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Clears the running flag on every exit path of `work`
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
