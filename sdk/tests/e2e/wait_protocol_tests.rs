//! Synchronous-wait E2E tests
//!
//! Exercises the reply protocol between a waiting dispatcher and the
//! worker that takes its task: completion inside the wait, worker
//! failure, genuine timeout with late completion, the signal/marker
//! race, and session cleanup in each outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use drover_core::{CoreResult, Signal};
use drover_sdk::config::{DispatcherConfig, WorkerConfig};
use drover_sdk::dispatcher::{Dispatcher, WaitOutcome};
use drover_sdk::hooks::{WorkerHook, WorkerHookChain};
use drover_sdk::task::Task;
use drover_sdk::worker::Worker;
use drover_sdk::{Broker, Consumer, Delivery, MemoryBroker, Publication, QueueOptions};
use serde_json::json;

use crate::fixtures::tasks::arithmetic_registry;
use crate::harness::{spawn_worker, RecordingWorkerHook, TestHarness};
use crate::{with_timeout, TEST_TIMEOUT};

/// Delegates to the memory broker, slipping one extra message onto the
/// fanout just before the first timeout marker goes out. Fanout publishes
/// append to every bound queue in publish order, so the injected message
/// is what both sides read first.
struct InjectingBroker {
    inner: Arc<MemoryBroker>,
    inject: Vec<u8>,
    armed: AtomicBool,
}

impl InjectingBroker {
    fn new(inner: Arc<MemoryBroker>, inject: &[u8]) -> Self {
        Self {
            inner,
            inject: inject.to_vec(),
            armed: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Broker for InjectingBroker {
    async fn declare_queue(&self, options: QueueOptions) -> CoreResult<String> {
        self.inner.declare_queue(options).await
    }

    async fn delete_queue(&self, queue: &str) -> CoreResult<()> {
        self.inner.delete_queue(queue).await
    }

    async fn declare_fanout(&self, name: &str) -> CoreResult<()> {
        self.inner.declare_fanout(name).await
    }

    async fn delete_fanout(&self, name: &str) -> CoreResult<()> {
        self.inner.delete_fanout(name).await
    }

    async fn bind(&self, queue: &str, fanout: &str) -> CoreResult<()> {
        self.inner.bind(queue, fanout).await
    }

    async fn publish(&self, queue: &str, publication: Publication) -> CoreResult<()> {
        self.inner.publish(queue, publication).await
    }

    async fn publish_to_fanout(&self, fanout: &str, publication: Publication) -> CoreResult<()> {
        if publication.payload == Signal::Timeout.as_bytes()
            && self.armed.swap(false, Ordering::SeqCst)
        {
            self.inner
                .publish_to_fanout(fanout, Publication::new(self.inject.clone()))
                .await?;
        }
        self.inner.publish_to_fanout(fanout, publication).await
    }

    async fn get(&self, queue: &str) -> CoreResult<Option<Delivery>> {
        self.inner.get(queue).await
    }

    async fn consume(&self, queue: &str) -> CoreResult<Box<dyn Consumer>> {
        self.inner.consume(queue).await
    }
}

/// Completion inside the wait: the dispatcher sees it, the worker learns
/// it was seen, and the whole session tears itself down.
#[tokio::test]
async fn test_wait_completes_before_timeout() {
    with_timeout(TEST_TIMEOUT, "test_wait_completes_before_timeout", async {
        let harness = TestHarness::new().await;
        let (worker, recorder) = harness.recording_worker(arithmetic_registry());
        let (_worker, worker_handle) = spawn_worker(worker, Some(1));

        let outcome = harness
            .dispatcher()
            .dispatch_and_wait(Task::named("add", json!({"a": 3, "b": 4})), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(outcome, Some(WaitOutcome::Completed));

        worker_handle.await.unwrap().unwrap();

        let successes = recorder.successes();
        assert_eq!(successes.len(), 1);
        assert!(successes[0].1, "worker must see its signal acknowledged");

        // No session leftovers: only the work queue survives, empty.
        let broker = harness.broker();
        assert_eq!(broker.queue_names(), vec!["tasks"]);
        assert!(broker.fanout_names().is_empty());
        assert_eq!(broker.queue_depth("tasks"), 0);
        assert_eq!(broker.unacked_count("tasks"), 0);
    })
    .await;
}

/// A task failure inside the wait comes back as an errored outcome, with
/// the same cleanup as success.
#[tokio::test]
async fn test_wait_reports_worker_failure() {
    with_timeout(TEST_TIMEOUT, "test_wait_reports_worker_failure", async {
        let harness = TestHarness::new().await;
        let (worker, recorder) = harness.recording_worker(arithmetic_registry());
        let (_worker, worker_handle) = spawn_worker(worker, Some(1));

        let outcome = harness
            .dispatcher()
            .dispatch_and_wait(
                Task::named("fail", json!({"reason": "no disk"})),
                Duration::from_secs(2),
            )
            .await
            .unwrap();
        assert_eq!(outcome, Some(WaitOutcome::Errored));

        worker_handle.await.unwrap().unwrap();

        let errors = recorder.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].1.contains("no disk"));
        assert!(errors[0].2, "worker must see its signal acknowledged");

        let broker = harness.broker();
        assert_eq!(broker.rejected_count("tasks"), 1);
        assert_eq!(broker.queue_names(), vec!["tasks"]);
        assert!(broker.fanout_names().is_empty());
    })
    .await;
}

/// No worker inside the wait: the dispatcher times out and keeps the
/// fanout up; the worker that finishes later reads the timeout marker
/// first, learns nobody was notified, and its cleanup removes the last
/// session pieces.
#[tokio::test]
async fn test_timeout_then_late_completion() {
    with_timeout(TEST_TIMEOUT, "test_timeout_then_late_completion", async {
        let harness = TestHarness::new().await;
        let dispatcher = harness.dispatcher();

        let outcome = dispatcher
            .dispatch_and_wait(Task::named("add", json!({"a": 1, "b": 1})), Duration::from_millis(40))
            .await
            .unwrap();
        assert_eq!(outcome, Some(WaitOutcome::TimedOut));

        // The fanout and the echo queue stay up for the worker still to
        // come; the dispatcher's private reply queue is already gone.
        let broker = harness.broker();
        assert_eq!(broker.queue_names().len(), 2);
        assert_eq!(broker.fanout_names().len(), 1);

        let (worker, recorder) = harness.recording_worker(arithmetic_registry());
        worker.work(Some(1)).await.unwrap();

        let successes = recorder.successes();
        assert_eq!(successes.len(), 1);
        assert!(
            !successes[0].1,
            "the timeout marker was first in line, so the dispatcher was gone"
        );

        // Deleting the echo queue dropped the fanout's last binding.
        assert_eq!(broker.queue_names(), vec!["tasks"]);
        assert!(broker.fanout_names().is_empty());
    })
    .await;
}

/// The completion signal beats the timeout marker onto the fanout: queue
/// order makes the dispatcher read the completion and report success.
#[tokio::test]
async fn test_completion_wins_race_with_timeout_marker() {
    with_timeout(
        TEST_TIMEOUT,
        "test_completion_wins_race_with_timeout_marker",
        async {
            let harness = TestHarness::new().await;
            let rigged: Arc<dyn Broker> = Arc::new(InjectingBroker::new(
                harness.broker(),
                Signal::Finished.as_bytes(),
            ));
            let dispatcher = Dispatcher::new(rigged, harness.dispatcher_config());

            let outcome = dispatcher
                .dispatch_and_wait(Task::named("add", json!(null)), Duration::from_millis(30))
                .await
                .unwrap();
            assert_eq!(outcome, Some(WaitOutcome::Completed));

            // Completion cleanup ran: fanout and reply queue deleted. The
            // echo queue lingers for the (simulated) worker to collect.
            let broker = harness.broker();
            assert!(broker.fanout_names().is_empty());
            assert_eq!(broker.queue_names().len(), 2);
        },
    )
    .await;
}

/// Garbage on the reply queue is no outcome at all, but the private
/// reply queue still gets deleted on the way out.
#[tokio::test]
async fn test_unrecognizable_signal_reports_no_outcome() {
    with_timeout(
        TEST_TIMEOUT,
        "test_unrecognizable_signal_reports_no_outcome",
        async {
            let harness = TestHarness::new().await;
            let rigged: Arc<dyn Broker> =
                Arc::new(InjectingBroker::new(harness.broker(), b"jibberish"));
            let dispatcher = Dispatcher::new(rigged, harness.dispatcher_config());

            let outcome = dispatcher
                .dispatch_and_wait(Task::named("add", json!(null)), Duration::from_millis(30))
                .await
                .unwrap();
            assert_eq!(outcome, None);

            // Anomaly cleanup is asymmetric: the reply queue is deleted,
            // the fanout and echo queue are not.
            let broker = harness.broker();
            assert_eq!(broker.fanout_names().len(), 1);
            assert_eq!(broker.queue_names().len(), 2);
        },
    )
    .await;
}

/// Two waits in flight at once get isolated sessions; one worker settles
/// both and every session resource disappears.
#[tokio::test]
async fn test_concurrent_waits_use_isolated_sessions() {
    with_timeout(
        TEST_TIMEOUT,
        "test_concurrent_waits_use_isolated_sessions",
        async {
            let harness = TestHarness::new().await;
            let (worker, recorder) = harness.recording_worker(arithmetic_registry());
            let (_worker, worker_handle) = spawn_worker(worker, Some(2));

            let dispatcher = Arc::new(harness.dispatcher());
            let wait_a = tokio::spawn({
                let dispatcher = Arc::clone(&dispatcher);
                async move {
                    dispatcher
                        .dispatch_and_wait(
                            Task::named("add", json!({"a": 1, "b": 2})),
                            Duration::from_secs(5),
                        )
                        .await
                }
            });
            let wait_b = tokio::spawn({
                let dispatcher = Arc::clone(&dispatcher);
                async move {
                    dispatcher
                        .dispatch_and_wait(
                            Task::named("add", json!({"a": 3, "b": 4})),
                            Duration::from_secs(5),
                        )
                        .await
                }
            });

            assert_eq!(wait_a.await.unwrap().unwrap(), Some(WaitOutcome::Completed));
            assert_eq!(wait_b.await.unwrap().unwrap(), Some(WaitOutcome::Completed));
            worker_handle.await.unwrap().unwrap();

            let successes = recorder.successes();
            assert_eq!(successes.len(), 2);
            assert!(successes.iter().all(|(_, notified)| *notified));

            let broker = harness.broker();
            assert_eq!(broker.queue_names(), vec!["tasks"]);
            assert!(broker.fanout_names().is_empty());
        },
    )
    .await;
}

/// Timeout then late completion at the stock intervals: the primary
/// window drains in full before the timeout marker goes out, and the
/// worker that arrives afterwards finds the marker ahead of its signal.
#[tokio::test]
async fn test_timeout_with_default_protocol_timing() {
    with_timeout(
        TEST_TIMEOUT,
        "test_timeout_with_default_protocol_timing",
        async {
            let harness = TestHarness::new().await;
            let dispatcher = Dispatcher::new(
                harness.broker(),
                DispatcherConfig::new(harness.queue()).unwrap(),
            );

            let started = Instant::now();
            let outcome = dispatcher
                .dispatch_and_wait(Task::named("add", json!(null)), Duration::from_millis(350))
                .await
                .unwrap();
            let elapsed = started.elapsed();

            assert_eq!(outcome, Some(WaitOutcome::TimedOut));
            assert!(elapsed >= Duration::from_millis(350), "elapsed {:?}", elapsed);
            assert!(elapsed < Duration::from_secs(2), "elapsed {:?}", elapsed);

            // The late worker runs at stock intervals as well and finds
            // the timeout marker ahead of its own signal.
            let recorder = Arc::new(RecordingWorkerHook::default());
            let mut hooks = WorkerHookChain::new();
            hooks.add_arc(Arc::clone(&recorder) as Arc<dyn WorkerHook>);
            let worker = Worker::with_hooks(
                harness.broker(),
                arithmetic_registry(),
                WorkerConfig::new(harness.queue()).unwrap(),
                hooks,
            );
            worker.work(Some(1)).await.unwrap();

            let successes = recorder.successes();
            assert_eq!(successes.len(), 1);
            assert!(!successes[0].1);
            assert!(harness.broker().fanout_names().is_empty());
        },
    )
    .await;
}
