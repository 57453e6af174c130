//! # Scheduler: public surface of the order-preserving retry scheduler.
//!
//! The [`Scheduler`] owns the event bus, the [`SubscriberSet`], the order state
//! (assigner and index), the processor registry and the retry coordinator. The
//! backend drives delivery; the scheduler only starts and stops it.
//!
//! ## High-level architecture
//! ```text
//! add_job(name, payload) ─► OrderAssigner.next_order() ─► JobData::original(.., retry config)
//!                              └─► backend.enqueue(attempts = 1) ─► OrderIndex.record ─► JobAdded
//!
//! start():
//!   worker token = runtime_token.child_token()
//!   spawn backend.deliver(OrderedWorker, concurrency, token)
//!                  │
//!                  └─► OrderedWorker.handle(envelope) ─► Processor ─► JobOutcome
//!                                                      └─► RetryCoordinator (failures)
//!
//! ordered_counts() / cleanup() / rebuild_index() ─► StatsProjector ─► backend listings
//!
//! Event flow:
//!   Scheduler / OrderedWorker / RetryCoordinator ── publish ──► Bus
//!        ──► subscriber_listener ──► SubscriberSet::emit ──► subscribers
//!
//! close():
//!   mark closed ─► cancel worker token ─► join deliver loop
//!   ─► backend.release_scheduler() ─► backend.close() ─► SchedulerClosed
//!   ─► runtime_token.cancel() ─► join listener (drains bus, then subscriber queues)
//! ```
//!
//! ## Rules
//! - `add_job`, `start`, `pause`, `resume`, `ordered_counts`, `cleanup` and
//!   `rebuild_index` fail with [`SchedulerError::NotInitialized`] before
//!   [`Scheduler::initialize`].
//! - After `close()` the same operations fail with [`SchedulerError::Closed`].
//! - No handler is newly invoked once `close()` has begun; handlers already
//!   running are not awaited.
//! - Processor failures never surface here; backend errors are propagated verbatim.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendRef, EnqueueOptions};
use crate::core::builder::SchedulerBuilder;
use crate::core::config::{RetryConfig, SchedulerConfig};
use crate::core::registry::ProcessorRegistry;
use crate::core::worker::{OrderedWorker, WorkerStats};
use crate::error::SchedulerError;
use crate::events::{Bus, Event, EventKind};
use crate::jobs::{AttemptId, JobData, ProcessorRef};
use crate::order::{OrderAssigner, OrderIndex};
use crate::retry::RetryCoordinator;
use crate::stats::{OrderedCounts, StatsProjector};
use crate::subscribers::SubscriberSet;

/// Handle to the running delivery loop.
struct WorkerHandle {
    join: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Order-preserving retry scheduler bound to one backend queue.
pub struct Scheduler {
    cfg: SchedulerConfig,
    backend: BackendRef,
    bus: Bus,
    listener: Mutex<Option<JoinHandle<()>>>,

    registry: Arc<ProcessorRegistry>,
    assigner: OrderAssigner,
    index: Arc<OrderIndex>,
    coordinator: Arc<RetryCoordinator>,
    projector: StatsProjector,
    retry: RwLock<RetryConfig>,

    initialized: AtomicBool,
    closed: AtomicBool,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<WorkerHandle>>,
    runtime_token: CancellationToken,
}

impl Scheduler {
    /// Creates a builder with the given configuration.
    pub fn builder(cfg: SchedulerConfig) -> SchedulerBuilder {
        SchedulerBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: SchedulerConfig,
        backend: BackendRef,
        bus: Bus,
        runtime_token: CancellationToken,
        listener: JoinHandle<()>,
    ) -> Self {
        let index = Arc::new(OrderIndex::new());
        let coordinator = Arc::new(RetryCoordinator::new(
            Arc::clone(&backend),
            Arc::clone(&index),
            bus.clone(),
            cfg.backoff,
        ));
        let projector = StatsProjector::new(Arc::clone(&backend), Arc::clone(&index));
        let retry = RwLock::new(cfg.retry);

        Self {
            cfg,
            backend,
            bus,
            listener: Mutex::new(Some(listener)),
            registry: Arc::new(ProcessorRegistry::new()),
            assigner: OrderAssigner::new(),
            index,
            coordinator,
            projector,
            retry,
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            runtime_token,
        }
    }

    /// Subscribes to the bus and forwards events to the subscriber set.
    ///
    /// Runs until `token` is cancelled, then drains what is left and shuts the
    /// subscriber workers down once their queues are empty.
    pub(crate) fn subscriber_listener(
        bus: &Bus,
        set: SubscriberSet,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let mut rx = bus.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = token.cancelled() => break,
                }
            }
            while let Ok(ev) = rx.try_recv() {
                set.emit(&ev);
            }
            set.shutdown().await;
        })
    }

    fn publish(&self, ev: Event) {
        self.bus.publish(ev.with_queue(self.cfg.queue_name.as_str()));
    }

    /// Rejects `operation` when the scheduler is closed or not initialized.
    fn ensure_ready(&self, operation: &'static str) -> Result<(), SchedulerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::Closed);
        }
        if !self.initialized.load(Ordering::Acquire) {
            return Err(SchedulerError::NotInitialized { operation });
        }
        Ok(())
    }

    /// Connects the backend. Idempotent.
    pub async fn initialize(&self) -> Result<(), SchedulerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::Closed);
        }
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        self.backend.connect().await?;
        if !self.initialized.swap(true, Ordering::AcqRel) {
            self.publish(Event::new(EventKind::SchedulerInitialized));
        }
        Ok(())
    }

    /// Registers `processor` for job `name`; a later registration replaces it.
    ///
    /// Allowed before [`initialize`](Self::initialize).
    pub async fn register_processor(
        &self,
        name: impl Into<String>,
        processor: ProcessorRef,
    ) -> Result<(), SchedulerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SchedulerError::Closed);
        }
        let name = name.into();
        if name.is_empty() {
            return Err(SchedulerError::InvalidJobName);
        }

        let replaced = self.registry.register(name.as_str(), processor).await;
        let ev = Event::new(EventKind::ProcessorRegistered).with_job(name);
        self.publish(if replaced { ev.with_reason("replaced") } else { ev });
        Ok(())
    }

    /// Submits a new lineage with default delivery options.
    pub async fn add_job(&self, name: &str, payload: Value) -> Result<AttemptId, SchedulerError> {
        self.add_job_with(name, payload, EnqueueOptions::default())
            .await
    }

    /// Submits a new lineage.
    ///
    /// Assigns the next lineage order, captures the current retry configuration
    /// into the job data and enqueues a single-attempt job. `opts.attempts` is
    /// always overridden to 1.
    pub async fn add_job_with(
        &self,
        name: &str,
        payload: Value,
        opts: EnqueueOptions,
    ) -> Result<AttemptId, SchedulerError> {
        self.ensure_ready("add_job")?;
        if name.is_empty() {
            return Err(SchedulerError::InvalidJobName);
        }

        let order = self.assigner.next_order()?;
        let retry = *self.retry.read().await;
        let data = JobData::original(payload, order, retry.max_retries, retry.retry_delay);

        let id = self
            .backend
            .enqueue(name, &data, opts.single_attempt())
            .await?;
        self.index.record(id.clone(), order).await;

        self.publish(
            Event::new(EventKind::JobAdded)
                .with_job(name)
                .with_attempt_id(&id)
                .with_order(order)
                .with_retry(0, retry.max_retries),
        );
        Ok(id)
    }

    /// Replaces the retry configuration used for lineages submitted from now on.
    pub async fn set_retry_config(&self, retry: RetryConfig) {
        *self.retry.write().await = retry;
    }

    pub async fn retry_config(&self) -> RetryConfig {
        *self.retry.read().await
    }

    /// Starts the delivery loop. Idempotent while the loop is running.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.ensure_ready("start")?;

        let mut slot = self.worker.lock().await;
        if self.running.load(Ordering::Acquire) {
            return Ok(());
        }

        let worker = Arc::new(OrderedWorker::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.coordinator),
            self.bus.clone(),
            self.cfg.no_processor,
        ));
        let cancel = self.runtime_token.child_token();
        let concurrency = self.cfg.concurrency_clamped();
        let backend = Arc::clone(&self.backend);
        let bus = self.bus.clone();
        let running = Arc::clone(&self.running);
        let queue: Arc<str> = Arc::from(self.cfg.queue_name.as_str());

        running.store(true, Ordering::Release);
        self.publish(Event::new(EventKind::WorkerStarted).with_count(concurrency as u64));

        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let res = backend.deliver(worker, concurrency, token).await;
            running.store(false, Ordering::Release);

            let ev = Event::new(EventKind::WorkerStopped).with_queue(queue);
            bus.publish(match res {
                Ok(()) => ev,
                Err(e) => ev.with_reason(e.to_string()),
            });
        });

        *slot = Some(WorkerHandle { join, cancel });
        Ok(())
    }

    /// Pauses delivery at the backend; queued and delayed work is kept.
    pub async fn pause(&self) -> Result<(), SchedulerError> {
        self.ensure_ready("pause")?;
        self.backend.pause().await?;
        self.publish(Event::new(EventKind::QueuePaused));
        Ok(())
    }

    /// Resumes delivery at the backend.
    pub async fn resume(&self) -> Result<(), SchedulerError> {
        self.ensure_ready("resume")?;
        self.backend.resume().await?;
        self.publish(Event::new(EventKind::QueueResumed));
        Ok(())
    }

    /// Point-in-time snapshot with waiting/delayed lists sorted by lineage order.
    pub async fn ordered_counts(&self) -> Result<OrderedCounts, SchedulerError> {
        self.ensure_ready("ordered_counts")?;
        Ok(self.projector.ordered_counts(self.assigner.peek()).await?)
    }

    /// Drops order index entries of attempts that are Completed or Failed at the
    /// backend. Idempotent; backend state is untouched.
    pub async fn cleanup(&self) -> Result<usize, SchedulerError> {
        self.ensure_ready("cleanup")?;
        let removed = self.projector.cleanup().await?;
        self.publish(Event::new(EventKind::IndexCleaned).with_count(removed as u64));
        Ok(removed)
    }

    /// Rebuilds the order index from backend state and moves the order assigner
    /// past every order already in use. Returns the number of entries recorded.
    pub async fn rebuild_index(&self) -> Result<usize, SchedulerError> {
        self.ensure_ready("rebuild_index")?;
        let (recorded, highest) = self.projector.rebuild_index().await?;
        if let Some(order) = highest {
            self.assigner.advance_past(order);
        }
        Ok(recorded)
    }

    /// Stops delivery and releases backend resources. Idempotent.
    ///
    /// Order: stop the worker, release the delay scheduler, close the queue.
    /// Returns once every subscriber has handled the events published so far.
    pub async fn close(&self) -> Result<(), SchedulerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let worker = self.worker.lock().await.take();
        if let Some(handle) = worker {
            handle.cancel.cancel();
            if let Err(e) = handle.join.await {
                self.running.store(false, Ordering::Release);
                self.publish(
                    Event::new(EventKind::WorkerStopped)
                        .with_reason(format!("delivery task failed: {e}")),
                );
            }
        }

        let res = self.release_backend().await;
        self.publish(Event::new(EventKind::SchedulerClosed));
        self.runtime_token.cancel();

        let listener = self.listener.lock().await.take();
        if let Some(listener) = listener {
            // Nobody is left to report a crashed listener to.
            let _ = listener.await;
        }
        res
    }

    async fn release_backend(&self) -> Result<(), SchedulerError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        self.backend.release_scheduler().await?;
        self.backend.close().await?;
        Ok(())
    }

    /// Snapshot of the worker loop state.
    pub async fn stats(&self) -> WorkerStats {
        WorkerStats {
            running: self.running.load(Ordering::Acquire),
            queue_name: self.cfg.queue_name.clone(),
            concurrency: self.cfg.concurrency_clamped(),
            registered_names: self.registry.names().await,
        }
    }

    /// Raw receiver of every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Order of an attempt, from the advisory index.
    pub async fn order_of(&self, attempt: &str) -> Option<u64> {
        self.index.get(attempt).await
    }

    /// Number of entries in the advisory order index.
    pub async fn index_len(&self) -> usize {
        self.index.len().await
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.cfg
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
