mod common;

use std::ops::Range;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{call_log, calls, config, recording, scheduler, wait_counts};
use ordervisor::{
    AttemptId, Backend, BackendError, DeliveryRef, EnqueueOptions, Event, EventKind, JobData,
    JobEnvelope, JobError, JobStatus, MemoryBackend, ProcessorFn, Scheduler, SchedulerConfig,
    SchedulerError, StatusCounts, Subscribe,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn operations_require_initialize() {
    let scheduler =
        Scheduler::builder(SchedulerConfig::default()).build(Arc::new(MemoryBackend::new()));

    let err = scheduler.add_job("job", json!(null)).await.unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::NotInitialized {
            operation: "add_job"
        }
    ));
    assert_eq!(err.as_label(), "scheduler_not_initialized");
    assert!(matches!(
        scheduler.start().await,
        Err(SchedulerError::NotInitialized { .. })
    ));
    assert!(matches!(
        scheduler.ordered_counts().await,
        Err(SchedulerError::NotInitialized { .. })
    ));
    assert!(matches!(
        scheduler.cleanup().await,
        Err(SchedulerError::NotInitialized { .. })
    ));
    assert!(matches!(
        scheduler.pause().await,
        Err(SchedulerError::NotInitialized { .. })
    ));

    // Registration is allowed up front.
    let log = call_log();
    scheduler
        .register_processor("job", recording(log, |_| false))
        .await
        .unwrap();
    scheduler.initialize().await.unwrap();
    scheduler.add_job("job", json!(null)).await.unwrap();
}

#[tokio::test]
async fn empty_job_name_is_rejected() {
    let (scheduler, _backend) = scheduler(SchedulerConfig::default()).await;
    assert!(matches!(
        scheduler.add_job("", json!(null)).await,
        Err(SchedulerError::InvalidJobName)
    ));
    assert!(matches!(
        scheduler
            .register_processor("", recording(call_log(), |_| false))
            .await,
        Err(SchedulerError::InvalidJobName)
    ));
}

#[tokio::test(start_paused = true)]
async fn last_registration_wins() {
    let (scheduler, backend) = scheduler(SchedulerConfig::default()).await;
    for version in [1, 2] {
        scheduler
            .register_processor(
                "versioned",
                ProcessorFn::arc(move |_payload: Value, _env: JobEnvelope| async move {
                    Ok::<Value, JobError>(json!(version))
                }),
            )
            .await
            .unwrap();
    }

    let id = scheduler.add_job("versioned", json!(null)).await.unwrap();
    scheduler.start().await.unwrap();
    wait_counts(&scheduler, |c| c.completed == 1).await;

    let job = backend.job(id.as_str()).await.unwrap();
    assert_eq!(job.return_value, Some(json!(2)));
    assert_eq!(scheduler.stats().await.registered_names, vec!["versioned"]);
    scheduler.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cleanup_removes_only_terminal_entries() {
    let (scheduler, _backend) = scheduler(config(1, Duration::from_secs(1))).await;
    let log = call_log();
    scheduler
        .register_processor(
            "task",
            recording(log.clone(), |env| env.retry_count() == 0 && env.lineage_order() == 1),
        )
        .await
        .unwrap();

    scheduler.add_job("task", json!(null)).await.unwrap();
    scheduler.add_job("task", json!(null)).await.unwrap();
    scheduler.start().await.unwrap();
    wait_counts(&scheduler, |c| c.completed == 2).await;

    scheduler.pause().await.unwrap();
    let pending = scheduler.add_job("task", json!(null)).await.unwrap();
    // Two originals, one retry, one pending original.
    assert_eq!(scheduler.index_len().await, 4);

    assert_eq!(scheduler.cleanup().await.unwrap(), 3);
    assert_eq!(scheduler.index_len().await, 1);
    assert_eq!(scheduler.order_of(pending.as_str()).await, Some(2));
    assert_eq!(scheduler.cleanup().await.unwrap(), 0);

    let counts = scheduler.ordered_counts().await.unwrap();
    assert_eq!(counts.completed, 2);
    assert_eq!(counts.waiting, 1);
    scheduler.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn pause_holds_delivery_until_resume() {
    let (scheduler, _backend) = scheduler(SchedulerConfig::default()).await;
    let log = call_log();
    scheduler
        .register_processor("task", recording(log.clone(), |_| false))
        .await
        .unwrap();
    scheduler.start().await.unwrap();
    scheduler.pause().await.unwrap();

    scheduler.add_job("task", json!(null)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(calls(&log).is_empty());

    scheduler.resume().await.unwrap();
    wait_counts(&scheduler, |c| c.completed == 1).await;
    assert_eq!(calls(&log), vec![(0, 0)]);
    scheduler.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn close_stops_delivery_and_releases_backend() {
    let (scheduler, backend) = scheduler(SchedulerConfig::default()).await;
    let log = call_log();
    scheduler
        .register_processor("task", recording(log.clone(), |_| false))
        .await
        .unwrap();
    let mut events = scheduler.subscribe();

    scheduler.start().await.unwrap();
    assert!(scheduler.stats().await.running);
    scheduler.pause().await.unwrap();
    scheduler.add_job("task", json!(null)).await.unwrap();

    scheduler.close().await.unwrap();
    assert!(scheduler.is_closed());
    assert!(backend.is_closed());
    assert!(!scheduler.stats().await.running);
    assert!(calls(&log).is_empty());

    assert!(matches!(
        scheduler.add_job("task", json!(null)).await,
        Err(SchedulerError::Closed)
    ));
    // Idempotent.
    scheduler.close().await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(ev) = events.try_recv() {
        kinds.push(ev.kind);
    }
    let stopped = kinds.iter().position(|k| *k == EventKind::WorkerStopped);
    let closed = kinds.iter().position(|k| *k == EventKind::SchedulerClosed);
    assert!(stopped.is_some() && closed.is_some());
    assert!(stopped < closed);
}

#[tokio::test(start_paused = true)]
async fn concurrency_above_one_runs_jobs_in_parallel() {
    let cfg = SchedulerConfig {
        concurrency: 2,
        ..SchedulerConfig::default()
    };
    let (scheduler, _backend) = scheduler(cfg).await;

    let running = Arc::new(Mutex::new((0usize, 0usize)));
    let tracker = Arc::clone(&running);
    scheduler
        .register_processor(
            "slow",
            ProcessorFn::arc(move |_payload: Value, _env: JobEnvelope| {
                let tracker = Arc::clone(&tracker);
                async move {
                    {
                        let mut g = tracker.lock().unwrap();
                        g.0 += 1;
                        g.1 = g.1.max(g.0);
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    tracker.lock().unwrap().0 -= 1;
                    Ok::<Value, JobError>(Value::Null)
                }
            }),
        )
        .await
        .unwrap();

    for _ in 0..6 {
        scheduler.add_job("slow", json!(null)).await.unwrap();
    }
    scheduler.start().await.unwrap();
    wait_counts(&scheduler, |c| c.completed == 6).await;

    assert_eq!(running.lock().unwrap().1, 2);
    assert_eq!(scheduler.stats().await.concurrency, 2);
    scheduler.close().await.unwrap();
}

#[tokio::test]
async fn rebuild_index_continues_orders_after_restart() {
    let backend = MemoryBackend::new();
    let first = Scheduler::builder(SchedulerConfig::default()).build(Arc::new(backend.clone()));
    first.initialize().await.unwrap();
    for _ in 0..3 {
        first.add_job("job", json!(null)).await.unwrap();
    }

    let second = Scheduler::builder(SchedulerConfig::default()).build(Arc::new(backend.clone()));
    second.initialize().await.unwrap();
    assert_eq!(second.index_len().await, 0);
    assert_eq!(
        second.ordered_counts().await.unwrap().total_lineages_submitted,
        0
    );
    assert_eq!(second.rebuild_index().await.unwrap(), 3);
    assert_eq!(
        second.ordered_counts().await.unwrap().total_lineages_submitted,
        3
    );

    let id = second.add_job("job", json!(null)).await.unwrap();
    assert_eq!(second.order_of(id.as_str()).await, Some(3));
    assert_eq!(
        second.ordered_counts().await.unwrap().total_lineages_submitted,
        4
    );
}

#[tokio::test]
async fn enqueue_options_pass_through_except_attempts() {
    let (scheduler, backend) = scheduler(SchedulerConfig::default()).await;
    let opts = EnqueueOptions {
        attempts: Some(5),
        ..EnqueueOptions::delayed(Duration::from_secs(30)).with_priority(1)
    };
    let id = scheduler.add_job_with("job", json!(null), opts).await.unwrap();

    let job = backend.job(id.as_str()).await.unwrap();
    assert_eq!(job.status, JobStatus::Delayed);
    assert_eq!(job.priority, Some(1));
    assert_eq!(backend.counts().await.unwrap().delayed, 1);
}

#[derive(Default)]
struct Collect {
    kinds: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl Subscribe for Collect {
    async fn on_event(&self, ev: &Event) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.kinds.lock().unwrap().push(ev.kind);
    }

    fn name(&self) -> &'static str {
        "collect"
    }
}

#[tokio::test(start_paused = true)]
async fn subscribers_receive_lifecycle_events() {
    let collect = Arc::new(Collect::default());
    let scheduler = Scheduler::builder(SchedulerConfig::default())
        .with_subscriber(collect.clone())
        .build(Arc::new(MemoryBackend::new()));
    scheduler.initialize().await.unwrap();
    scheduler
        .register_processor("task", recording(call_log(), |_| false))
        .await
        .unwrap();
    scheduler.add_job("task", json!(null)).await.unwrap();
    scheduler.start().await.unwrap();
    wait_counts(&scheduler, |c| c.completed == 1).await;
    scheduler.close().await.unwrap();

    // close() returns only once subscribers have seen everything up to SchedulerClosed.
    let kinds = collect.kinds.lock().unwrap().clone();
    assert_eq!(kinds.last(), Some(&EventKind::SchedulerClosed));
    for expected in [
        EventKind::SchedulerInitialized,
        EventKind::ProcessorRegistered,
        EventKind::JobAdded,
        EventKind::WorkerStarted,
        EventKind::JobProcessing,
        EventKind::JobCompleted,
        EventKind::SchedulerClosed,
    ] {
        assert!(kinds.contains(&expected), "missing {expected:?} in {kinds:?}");
    }
}

/// Backend whose delivery loop crashes as soon as it starts.
struct CrashingDelivery(MemoryBackend);

#[async_trait]
impl Backend for CrashingDelivery {
    async fn enqueue(
        &self,
        name: &str,
        data: &JobData,
        opts: EnqueueOptions,
    ) -> Result<AttemptId, BackendError> {
        self.0.enqueue(name, data, opts).await
    }

    async fn deliver(
        &self,
        _handler: DeliveryRef,
        _concurrency: usize,
        _token: CancellationToken,
    ) -> Result<(), BackendError> {
        panic!("delivery loop crashed")
    }

    async fn list_jobs(
        &self,
        status: JobStatus,
        range: Range<usize>,
    ) -> Result<Vec<JobEnvelope>, BackendError> {
        self.0.list_jobs(status, range).await
    }

    async fn counts(&self) -> Result<StatusCounts, BackendError> {
        self.0.counts().await
    }

    async fn pause(&self) -> Result<(), BackendError> {
        self.0.pause().await
    }

    async fn resume(&self) -> Result<(), BackendError> {
        self.0.resume().await
    }

    async fn release_scheduler(&self) -> Result<(), BackendError> {
        self.0.release_scheduler().await
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.0.close().await
    }
}

#[tokio::test]
async fn crashed_delivery_loop_is_reported_on_close() {
    let scheduler = Scheduler::builder(SchedulerConfig::default())
        .build(Arc::new(CrashingDelivery(MemoryBackend::new())));
    scheduler.initialize().await.unwrap();
    let mut events = scheduler.subscribe();

    scheduler.start().await.unwrap();
    tokio::task::yield_now().await;
    scheduler.close().await.unwrap();
    assert!(!scheduler.is_running());

    let mut stopped = Vec::new();
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::WorkerStopped {
            stopped.push(ev.reason.as_deref().unwrap_or_default().to_string());
        }
    }
    assert_eq!(stopped.len(), 1);
    assert!(stopped[0].starts_with("delivery task failed"), "{stopped:?}");
}
