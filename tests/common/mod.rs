#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ordervisor::{
    JobEnvelope, JobError, MemoryBackend, OrderedCounts, ProcessorFn, ProcessorRef, RetryConfig,
    Scheduler, SchedulerConfig,
};
use serde_json::{Value, json};

/// `(lineage order, retry count)` of every invocation, in invocation order.
pub type CallLog = Arc<Mutex<Vec<(u64, u32)>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<(u64, u32)> {
    log.lock().unwrap().clone()
}

/// Processor that records each call and fails when `fail` says so.
pub fn recording<F>(log: CallLog, fail: F) -> ProcessorRef
where
    F: Fn(&JobEnvelope) -> bool + Send + Sync + 'static,
{
    let fail = Arc::new(fail);
    ProcessorFn::arc(move |_payload: Value, env: JobEnvelope| {
        let log = Arc::clone(&log);
        let fail = Arc::clone(&fail);
        async move {
            log.lock()
                .unwrap()
                .push((env.lineage_order(), env.retry_count()));
            if (*fail)(&env) {
                Err(JobError::fail("programmed failure"))
            } else {
                Ok(json!({ "order": env.lineage_order() }))
            }
        }
    })
}

pub fn config(max_retries: u32, retry_delay: Duration) -> SchedulerConfig {
    SchedulerConfig {
        retry: RetryConfig::new(max_retries, retry_delay),
        ..SchedulerConfig::default()
    }
}

/// Builds and initializes a scheduler over a fresh in-process backend.
pub async fn scheduler(cfg: SchedulerConfig) -> (Arc<Scheduler>, MemoryBackend) {
    let backend = MemoryBackend::new();
    let scheduler = Scheduler::builder(cfg).build(Arc::new(backend.clone()));
    scheduler.initialize().await.unwrap();
    (scheduler, backend)
}

/// Polls `ordered_counts()` until `pred` holds (up to 100s of virtual time).
pub async fn wait_counts<P>(scheduler: &Scheduler, pred: P) -> OrderedCounts
where
    P: Fn(&OrderedCounts) -> bool,
{
    for _ in 0..10_000 {
        let counts = scheduler.ordered_counts().await.unwrap();
        if pred(&counts) {
            return counts;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
