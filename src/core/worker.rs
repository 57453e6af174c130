//! # OrderedWorker: the delivery callback handed to the backend.
//!
//! The backend drives the loop; the worker handles one envelope per call.
//!
//! ## Per delivery
//! ```text
//! handle(envelope)                                  (may be cut short by a stall)
//!   ├─► publish JobProcessing
//!   └─► registry.get(name)
//!         ├─ Some(p) → p.process(payload, envelope)   (panics become JobError::Fail)
//!         └─ None    → Err(NoProcessor)
//!
//! settle(envelope, result)                          (runs to completion)
//!   ├─► JobOutcome::classify(result, no_processor policy)
//!   ├─ Success(v)  → publish JobCompleted → Ok(v)                   backend: Completed
//!   └─ failure     → publish JobFailed
//!                    → coordinator.handle_failure(envelope, outcome)
//!                    → Err(error)                                    backend: Failed
//! ```
//!
//! ## Rules
//! - The retry decision is taken before the failure is reported to the backend,
//!   so the resubmitted attempt exists by the time the failed one is visible.
//! - The retry decision lives in `settle`, outside the backend's stall timeout, so
//!   a lineage is never resubmitted twice for the same failed attempt.
//! - A failed resubmission never turns a processor failure into a backend error;
//!   the attempt is still reported as failed with the processor's reason.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;

use crate::backend::Delivery;
use crate::core::registry::ProcessorRegistry;
use crate::error::JobError;
use crate::events::{Bus, Event, EventKind};
use crate::jobs::{JobEnvelope, JobOutcome};
use crate::policies::NoProcessorPolicy;
use crate::retry::RetryCoordinator;

/// Snapshot of the worker loop state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    /// True between `start()` and `close()` (or the backend ending delivery).
    pub running: bool,
    pub queue_name: String,
    /// Effective delivery concurrency.
    pub concurrency: usize,
    /// Registered job names, sorted.
    pub registered_names: Vec<String>,
}

/// Delivery callback: processor lookup, invocation and outcome routing.
pub struct OrderedWorker {
    registry: Arc<ProcessorRegistry>,
    coordinator: Arc<RetryCoordinator>,
    bus: Bus,
    no_processor: NoProcessorPolicy,
}

impl OrderedWorker {
    pub fn new(
        registry: Arc<ProcessorRegistry>,
        coordinator: Arc<RetryCoordinator>,
        bus: Bus,
        no_processor: NoProcessorPolicy,
    ) -> Self {
        Self {
            registry,
            coordinator,
            bus,
            no_processor,
        }
    }

    /// Runs the registered processor for `envelope`.
    async fn invoke(&self, envelope: &JobEnvelope) -> Result<Value, JobError> {
        let Some(processor) = self.registry.get(&envelope.name).await else {
            return Err(JobError::NoProcessor {
                name: envelope.name.clone(),
            });
        };

        let fut = processor.process(envelope.payload(), envelope);
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(res) => res,
            Err(panic) => Err(JobError::fail(panic_message(panic.as_ref()))),
        }
    }
}

#[async_trait]
impl Delivery for OrderedWorker {
    async fn handle(&self, envelope: JobEnvelope) -> Result<Value, JobError> {
        self.bus
            .publish(Event::for_attempt(EventKind::JobProcessing, &envelope));
        self.invoke(&envelope).await
    }

    async fn settle(
        &self,
        envelope: &JobEnvelope,
        result: Result<Value, JobError>,
    ) -> Result<Value, JobError> {
        let outcome = JobOutcome::classify(result, self.no_processor);

        let error = match &outcome {
            JobOutcome::Success(value) => {
                self.bus
                    .publish(Event::for_attempt(EventKind::JobCompleted, envelope));
                return Ok(value.clone());
            }
            JobOutcome::RetryableFailure(e) | JobOutcome::TerminalFailure(e) => e.clone(),
        };

        self.bus.publish(
            Event::for_attempt(EventKind::JobFailed, envelope).with_reason(error.to_string()),
        );
        match self.coordinator.handle_failure(envelope, &outcome).await {
            Ok(_decision) => {}
            // Published as RetrySubmitFailed; the attempt still fails with the
            // processor's reason, not the backend's.
            Err(_submit) => {}
        }
        Err(error)
    }

    fn on_stalled(&self, envelope: &JobEnvelope) {
        self.bus
            .publish(Event::for_attempt(EventKind::JobStalled, envelope));
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("processor panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, EnqueueOptions, MemoryBackend};
    use crate::jobs::{JobData, JobStatus, ProcessorFn};
    use crate::order::OrderIndex;
    use crate::policies::BackoffPolicy;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        backend: MemoryBackend,
        registry: Arc<ProcessorRegistry>,
        bus: Bus,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                backend: MemoryBackend::new(),
                registry: Arc::new(ProcessorRegistry::new()),
                bus: Bus::new(64),
            }
        }

        fn worker(&self, policy: NoProcessorPolicy) -> OrderedWorker {
            let coordinator = RetryCoordinator::new(
                Arc::new(self.backend.clone()),
                Arc::new(OrderIndex::new()),
                self.bus.clone(),
                BackoffPolicy::default(),
            );
            OrderedWorker::new(
                Arc::clone(&self.registry),
                Arc::new(coordinator),
                self.bus.clone(),
                policy,
            )
        }

        /// Full delivery of one attempt, as the backend drives it.
        async fn deliver(
            &self,
            policy: NoProcessorPolicy,
            envelope: JobEnvelope,
        ) -> Result<Value, JobError> {
            let worker = self.worker(policy);
            let res = worker.handle(envelope.clone()).await;
            worker.settle(&envelope, res).await
        }

        async fn envelope(&self, name: &str) -> JobEnvelope {
            let data = JobData::original(json!({"k": 1}), 0, 2, Duration::from_secs(1));
            let id = self
                .backend
                .enqueue(name, &data, EnqueueOptions::default())
                .await
                .unwrap();
            self.backend.job(id.as_str()).await.unwrap()
        }
    }

    #[tokio::test]
    async fn success_returns_processor_value() {
        let f = Fixture::new();
        f.registry
            .register(
                "echo",
                ProcessorFn::arc(|payload: Value, _env: JobEnvelope| async move {
                    Ok::<Value, JobError>(payload)
                }),
            )
            .await;
        let mut rx = f.bus.subscribe();

        let env = f.envelope("echo").await;
        let out = f.deliver(NoProcessorPolicy::default(), env).await;
        assert_eq!(out, Ok(json!({"k": 1})));

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::JobProcessing);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::JobCompleted);
    }

    #[tokio::test]
    async fn failure_schedules_retry_before_reporting() {
        let f = Fixture::new();
        f.registry
            .register(
                "flaky",
                ProcessorFn::arc(|_payload: Value, _env: JobEnvelope| async move {
                    Err::<Value, JobError>(JobError::fail("boom"))
                }),
            )
            .await;
        let mut rx = f.bus.subscribe();

        let env = f.envelope("flaky").await;
        let out = f.deliver(NoProcessorPolicy::default(), env).await;
        assert_eq!(out, Err(JobError::fail("boom")));

        let delayed = f
            .backend
            .list_jobs(JobStatus::Delayed, 0..10)
            .await
            .unwrap();
        assert_eq!(delayed.len(), 1);
        assert_eq!(delayed[0].retry_count(), 1);

        let kinds: Vec<EventKind> = [
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
        ]
        .iter()
        .map(|e| e.kind)
        .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::JobProcessing,
                EventKind::JobFailed,
                EventKind::RetryScheduled
            ]
        );
    }

    #[tokio::test]
    async fn handle_alone_never_resubmits() {
        let f = Fixture::new();
        f.registry
            .register(
                "flaky",
                ProcessorFn::arc(|_payload: Value, _env: JobEnvelope| async move {
                    Err::<Value, JobError>(JobError::fail("boom"))
                }),
            )
            .await;

        let env = f.envelope("flaky").await;
        let worker = f.worker(NoProcessorPolicy::default());
        let out = worker.handle(env.clone()).await;
        assert_eq!(out, Err(JobError::fail("boom")));
        assert_eq!(f.backend.counts().await.unwrap().delayed, 0);

        let settled = worker.settle(&env, out).await;
        assert_eq!(settled, Err(JobError::fail("boom")));
        assert_eq!(f.backend.counts().await.unwrap().delayed, 1);
    }

    #[tokio::test]
    async fn missing_processor_consumes_retry_by_default() {
        let f = Fixture::new();
        let env = f.envelope("ghost").await;
        let out = f.deliver(NoProcessorPolicy::ConsumeRetry, env).await;
        assert_eq!(
            out,
            Err(JobError::NoProcessor {
                name: "ghost".into()
            })
        );
        assert_eq!(f.backend.counts().await.unwrap().delayed, 1);
    }

    #[tokio::test]
    async fn missing_processor_fails_fast_when_configured() {
        let f = Fixture::new();
        let mut rx = f.bus.subscribe();
        let env = f.envelope("ghost").await;
        let out = f.deliver(NoProcessorPolicy::FailFast, env).await;
        assert!(out.is_err());
        assert_eq!(f.backend.counts().await.unwrap().delayed, 0);

        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::JobDiscarded);
    }

    #[tokio::test]
    async fn processor_panic_becomes_retryable_failure() {
        let f = Fixture::new();
        f.registry
            .register(
                "panicky",
                ProcessorFn::arc(|_payload: Value, _env: JobEnvelope| async move {
                    if true {
                        panic!("kaboom");
                    }
                    Ok::<Value, JobError>(Value::Null)
                }),
            )
            .await;

        let env = f.envelope("panicky").await;
        let out = f.deliver(NoProcessorPolicy::default(), env).await;
        assert_eq!(out, Err(JobError::fail("processor panicked: kaboom")));
        assert_eq!(f.backend.counts().await.unwrap().delayed, 1);
    }

    #[tokio::test]
    async fn stall_is_published() {
        let f = Fixture::new();
        let mut rx = f.bus.subscribe();
        let env = f.envelope("any").await;
        f.worker(NoProcessorPolicy::default()).on_stalled(&env);
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::JobStalled);
        assert_eq!(ev.order, Some(0));
    }
}
