//! Test harness for E2E tests
//!
//! Provides a memory broker with the work queue already provisioned, plus
//! dispatcher and worker builders preconfigured with short protocol
//! intervals so wait cycles complete quickly. Queue topology is declared
//! here because neither dispatchers nor workers declare the work queue
//! themselves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use drover_sdk::config::{DispatcherConfig, WorkerConfig};
use drover_sdk::dispatcher::Dispatcher;
use drover_sdk::error::{ExecutionFailure, HookError, WorkerError};
use drover_sdk::hooks::{DispatchHookChain, WorkerHook, WorkerHookChain};
use drover_sdk::task::{Task, TaskExecutor};
use drover_sdk::worker::Worker;
use drover_sdk::{Broker, MemoryBroker, QueueOptions};
use parking_lot::Mutex;

/// Poll interval for dispatchers and workers under test
pub const FAST_POLL: Duration = Duration::from_millis(10);
/// Race-resolution and echo-confirmation window under test
pub const FAST_WINDOW: Duration = Duration::from_millis(80);

/// Test harness owning the broker and the provisioned work queue.
pub struct TestHarness {
    broker: Arc<MemoryBroker>,
    queue: String,
}

impl TestHarness {
    /// Create a harness with the default work queue declared.
    pub async fn new() -> Self {
        Self::with_queue("tasks").await
    }

    /// Create a harness with a specifically named work queue declared.
    pub async fn with_queue(queue: &str) -> Self {
        crate::init_tracing();

        let broker = Arc::new(MemoryBroker::new());
        broker
            .declare_queue(QueueOptions::work_queue(queue))
            .await
            .expect("Failed to declare work queue");

        Self {
            broker,
            queue: queue.to_string(),
        }
    }

    pub fn broker(&self) -> Arc<MemoryBroker> {
        Arc::clone(&self.broker)
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::new(&self.queue)
            .expect("Failed to build dispatcher config")
            .with_poll_interval(FAST_POLL)
            .with_race_window(FAST_WINDOW)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::new(&self.queue)
            .expect("Failed to build worker config")
            .with_poll_interval(FAST_POLL)
            .with_echo_window(FAST_WINDOW)
    }

    /// Dispatcher with shortened protocol intervals
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.broker(), self.dispatcher_config())
    }

    /// Dispatcher with shortened protocol intervals and the given hooks
    pub fn dispatcher_with_hooks(&self, hooks: DispatchHookChain) -> Dispatcher {
        Dispatcher::with_hooks(self.broker(), self.dispatcher_config(), hooks)
    }

    /// Worker with shortened protocol intervals
    pub fn worker(&self, executor: Arc<dyn TaskExecutor>) -> Worker {
        Worker::new(self.broker(), executor, self.worker_config())
    }

    /// Worker with shortened protocol intervals and the given hooks
    pub fn worker_with_hooks(
        &self,
        executor: Arc<dyn TaskExecutor>,
        hooks: WorkerHookChain,
    ) -> Worker {
        Worker::with_hooks(self.broker(), executor, self.worker_config(), hooks)
    }

    /// Worker wired to a fresh [`RecordingWorkerHook`], returned alongside
    /// it for assertions after the run.
    pub fn recording_worker(
        &self,
        executor: Arc<dyn TaskExecutor>,
    ) -> (Worker, Arc<RecordingWorkerHook>) {
        let recorder = Arc::new(RecordingWorkerHook::default());
        let mut hooks = WorkerHookChain::new();
        hooks.add_arc(Arc::clone(&recorder) as Arc<dyn WorkerHook>);
        (self.worker_with_hooks(executor, hooks), recorder)
    }
}

/// Move a worker onto a background task and hand back a shared reference
/// for `stop()` plus the join handle for the loop's result.
pub fn spawn_worker(
    worker: Worker,
    max_tasks: Option<usize>,
) -> (Arc<Worker>, tokio::task::JoinHandle<Result<(), WorkerError>>) {
    let worker = Arc::new(worker);
    let handle = tokio::spawn({
        let worker = Arc::clone(&worker);
        async move { worker.work(max_tasks).await }
    });
    (worker, handle)
}

/// Terminal-hook recorder: collects every success and failure a worker
/// reports, with the dispatcher-notified flag observed for each.
#[derive(Default)]
pub struct RecordingWorkerHook {
    successes: Mutex<Vec<(Task, bool)>>,
    errors: Mutex<Vec<(Option<Task>, String, bool)>>,
}

impl RecordingWorkerHook {
    pub fn successes(&self) -> Vec<(Task, bool)> {
        self.successes.lock().clone()
    }

    pub fn errors(&self) -> Vec<(Option<Task>, String, bool)> {
        self.errors.lock().clone()
    }
}

#[async_trait]
impl WorkerHook for RecordingWorkerHook {
    async fn on_task_success(&self, task: &Task, notified: bool) -> Result<(), HookError> {
        self.successes.lock().push((task.clone(), notified));
        Ok(())
    }

    async fn on_task_error(
        &self,
        task: Option<&Task>,
        failure: &ExecutionFailure,
        notified: bool,
    ) -> Result<(), HookError> {
        self.errors
            .lock()
            .push((task.cloned(), failure.to_string(), notified));
        Ok(())
    }
}
