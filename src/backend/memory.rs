//! # In-process queue backend.
//!
//! [`MemoryBackend`] keeps every attempt in a map guarded by one async mutex and
//! drives delivery with tokio timers, so tests can run retries on virtual time.
//!
//! ## Architecture
//! ```text
//! enqueue ──► Delayed (ready_at) ──[timer]──► Waiting (FIFO, priority first)
//!                                                │
//! deliver loop:                                  ▼
//!   acquire permit (≤ concurrency) ──► pop Waiting ──► Active ──► spawn handler.handle()
//!                                                                   ├─ settle Ok  ──► Completed
//!                                                                   ├─ settle Err ──► Failed | Waiting (attempts left)
//!                                                                   └─ stall ─► Waiting | Failed (max_stalled)
//! ```
//!
//! ## Rules
//! - Data is stored in its encoded JSON form, as a durable backend would.
//! - Ties between ready jobs are broken by arrival, never by lineage order.
//! - While paused nothing is activated; delayed jobs still become waiting.
//! - After `release_scheduler()` delayed jobs stay delayed.
//! - The stall timeout bounds `Delivery::handle` only; `settle` always finishes.
//! - After `close()` every operation fails with [`BackendError::Closed`].

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::{Backend, DeliveryRef, EnqueueOptions, StatusCounts};
use crate::error::{BackendError, JobError};
use crate::jobs::{AttemptId, JobData, JobEnvelope, JobStatus};

/// Configuration of the in-process backend.
#[derive(Clone, Debug)]
pub struct MemoryBackendConfig {
    /// Maximum time an attempt may run before it is considered stalled (`None` = never).
    pub stall_timeout: Option<Duration>,
    /// Stalls tolerated per attempt before it is failed.
    pub max_stalled: u32,
}

impl Default for MemoryBackendConfig {
    /// No stall detection, one tolerated stall.
    fn default() -> Self {
        Self {
            stall_timeout: None,
            max_stalled: 1,
        }
    }
}

/// In-process backend. Cheap to clone; clones share the same queue.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cfg: MemoryBackendConfig,
    state: Mutex<State>,
    ready: Notify,
    paused: AtomicBool,
    released: AtomicBool,
    closed: AtomicBool,
}

#[derive(Default)]
struct State {
    jobs: HashMap<AttemptId, Stored>,
    waiting: VecDeque<AttemptId>,
    delayed: BTreeSet<(Instant, u64, AttemptId)>,
    next_id: u64,
}

struct Stored {
    name: String,
    data: Value,
    status: JobStatus,
    delay: Duration,
    priority: Option<u32>,
    attempts: u32,
    attempts_made: u32,
    stalled: u32,
    arrival: u64,
    enqueued_at: SystemTime,
    failed_reason: Option<String>,
    return_value: Option<Value>,
}

impl Stored {
    fn envelope(&self, id: &AttemptId) -> Result<JobEnvelope, BackendError> {
        Ok(JobEnvelope {
            id: id.clone(),
            name: self.name.clone(),
            data: JobData::decode(&self.data)?,
            status: self.status,
            delay: self.delay,
            priority: self.priority,
            enqueued_at: self.enqueued_at,
            failed_reason: self.failed_reason.clone(),
            return_value: self.return_value.clone(),
        })
    }
}

impl State {
    /// Queues `id` as waiting: prioritized jobs go before any job with a larger
    /// priority or none; equal priorities keep arrival order.
    fn push_waiting(&mut self, id: AttemptId, priority: Option<u32>) {
        let pos = match priority {
            None => self.waiting.len(),
            Some(p) => self
                .waiting
                .iter()
                .position(|other| {
                    self.jobs
                        .get(other)
                        .is_none_or(|j| j.priority.is_none_or(|q| q > p))
                })
                .unwrap_or(self.waiting.len()),
        };
        self.waiting.insert(pos, id);
    }

    /// Moves delayed jobs whose time has come to the waiting list.
    fn promote_due(&mut self, now: Instant) {
        while let Some(first) = self.delayed.first() {
            if first.0 > now {
                break;
            }
            let Some((_, _, id)) = self.delayed.pop_first() else {
                break;
            };
            let priority = match self.jobs.get_mut(&id) {
                Some(job) => {
                    job.status = JobStatus::Waiting;
                    job.priority
                }
                None => continue,
            };
            self.push_waiting(id, priority);
        }
    }

    fn next_wake(&self) -> Option<Instant> {
        self.delayed.first().map(|(at, _, _)| *at)
    }

    /// Pops the next waiting job and marks it active.
    fn activate_next(&mut self) -> Option<JobEnvelope> {
        while let Some(id) = self.waiting.pop_front() {
            let Some(job) = self.jobs.get_mut(&id) else {
                continue;
            };
            job.status = JobStatus::Active;
            job.attempts_made += 1;
            match job.envelope(&id) {
                Ok(env) => return Some(env),
                Err(e) => {
                    job.status = JobStatus::Failed;
                    job.failed_reason = Some(e.to_string());
                }
            }
        }
        None
    }

    /// Results only land on active attempts; a late result for an attempt that
    /// was already stalled and re-queued is dropped.
    fn complete(&mut self, id: &AttemptId, value: Value) {
        if let Some(job) = self.jobs.get_mut(id).filter(|j| j.status == JobStatus::Active) {
            job.status = JobStatus::Completed;
            job.return_value = Some(value);
        }
    }

    fn fail(&mut self, id: &AttemptId, reason: String) {
        let retry = match self.jobs.get_mut(id).filter(|j| j.status == JobStatus::Active) {
            Some(job) if job.attempts_made < job.attempts => {
                job.status = JobStatus::Waiting;
                job.failed_reason = Some(reason);
                Some(job.priority)
            }
            Some(job) => {
                job.status = JobStatus::Failed;
                job.failed_reason = Some(reason);
                None
            }
            None => None,
        };
        if let Some(priority) = retry {
            self.push_waiting(id.clone(), priority);
        }
    }

    fn stall(&mut self, id: &AttemptId, max_stalled: u32, reason: String) {
        let again = match self.jobs.get_mut(id).filter(|j| j.status == JobStatus::Active) {
            Some(job) => {
                job.stalled += 1;
                if job.stalled > max_stalled {
                    job.status = JobStatus::Failed;
                    job.failed_reason = Some(reason);
                    None
                } else {
                    job.status = JobStatus::Waiting;
                    job.attempts_made = job.attempts_made.saturating_sub(1);
                    Some(job.priority)
                }
            }
            None => None,
        };
        if let Some(priority) = again {
            self.push_waiting(id.clone(), priority);
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(cfg: MemoryBackendConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                ..Inner::default()
            }),
        }
    }

    /// Reads one attempt by id.
    pub async fn job(&self, id: &str) -> Option<JobEnvelope> {
        let state = self.inner.state.lock().await;
        state
            .jobs
            .get_key_value(id)
            .and_then(|(id, job)| job.envelope(id).ok())
    }

    /// All attempts, ordered by arrival.
    pub async fn all_jobs(&self) -> Vec<JobEnvelope> {
        let state = self.inner.state.lock().await;
        let mut jobs: Vec<(&AttemptId, &Stored)> = state.jobs.iter().collect();
        jobs.sort_by_key(|(_, j)| j.arrival);
        jobs.into_iter()
            .filter_map(|(id, job)| job.envelope(id).ok())
            .collect()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.is_closed() {
            Err(BackendError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Inner {
    /// Waits for the next job to activate. `None` when cancelled or closed.
    async fn next_ready(&self, token: &CancellationToken) -> Option<JobEnvelope> {
        loop {
            let wake = {
                let mut state = self.state.lock().await;
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
                let released = self.released.load(Ordering::Acquire);
                if !released {
                    state.promote_due(Instant::now());
                }
                if !self.paused.load(Ordering::Acquire) {
                    if let Some(env) = state.activate_next() {
                        return Some(env);
                    }
                }
                if released { None } else { state.next_wake() }
            };

            let timer = async {
                match wake {
                    Some(at) => time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = self.ready.notified() => {}
                _ = timer => {}
                _ = token.cancelled() => return None,
            }
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn connect(&self) -> Result<(), BackendError> {
        self.ensure_open()
    }

    async fn enqueue(
        &self,
        name: &str,
        data: &JobData,
        opts: EnqueueOptions,
    ) -> Result<AttemptId, BackendError> {
        self.ensure_open()?;
        let encoded = data.encode()?;
        let delay = opts.delay.unwrap_or(Duration::ZERO);

        let mut state = self.inner.state.lock().await;
        state.next_id += 1;
        let arrival = state.next_id;
        let id = AttemptId::new(arrival.to_string());

        let status = if delay.is_zero() {
            JobStatus::Waiting
        } else {
            JobStatus::Delayed
        };
        state.jobs.insert(
            id.clone(),
            Stored {
                name: name.to_string(),
                data: encoded,
                status,
                delay,
                priority: opts.priority,
                attempts: opts.attempts.unwrap_or(1).max(1),
                attempts_made: 0,
                stalled: 0,
                arrival,
                enqueued_at: SystemTime::now(),
                failed_reason: None,
                return_value: None,
            },
        );
        match status {
            JobStatus::Delayed => {
                state
                    .delayed
                    .insert((Instant::now() + delay, arrival, id.clone()));
            }
            _ => state.push_waiting(id.clone(), opts.priority),
        }
        drop(state);

        self.inner.ready.notify_one();
        Ok(id)
    }

    async fn deliver(
        &self,
        handler: DeliveryRef,
        concurrency: usize,
        token: CancellationToken,
    ) -> Result<(), BackendError> {
        self.ensure_open()?;
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));

        loop {
            let permit = tokio::select! {
                res = Arc::clone(&permits).acquire_owned() => match res {
                    Ok(permit) => permit,
                    Err(_closed) => break,
                },
                _ = token.cancelled() => break,
            };
            let Some(envelope) = self.inner.next_ready(&token).await else {
                break;
            };

            let inner = Arc::clone(&self.inner);
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let id = envelope.id.clone();
                let res = match inner.cfg.stall_timeout {
                    Some(limit) => time::timeout(limit, handler.handle(envelope.clone()))
                        .await
                        .ok(),
                    None => Some(handler.handle(envelope.clone()).await),
                };

                match res {
                    Some(res) => {
                        let res = handler.settle(&envelope, res).await;
                        let mut state = inner.state.lock().await;
                        match res {
                            Ok(value) => state.complete(&id, value),
                            Err(e) => state.fail(&id, e.to_string()),
                        }
                    }
                    None => {
                        let mut state = inner.state.lock().await;
                        handler.on_stalled(&envelope);
                        let limit = inner.cfg.stall_timeout.unwrap_or_default();
                        let reason = JobError::Timeout { timeout: limit }.to_string();
                        state.stall(&id, inner.cfg.max_stalled, reason);
                    }
                }
                drop(permit);
                inner.ready.notify_one();
            });
        }
        Ok(())
    }

    async fn list_jobs(
        &self,
        status: JobStatus,
        range: Range<usize>,
    ) -> Result<Vec<JobEnvelope>, BackendError> {
        self.ensure_open()?;
        let state = self.inner.state.lock().await;

        let mut matching: Vec<(&AttemptId, &Stored)> = match status {
            JobStatus::Waiting => state
                .waiting
                .iter()
                .filter_map(|id| state.jobs.get_key_value(id))
                .collect(),
            _ => {
                let mut v: Vec<_> = state
                    .jobs
                    .iter()
                    .filter(|(_, j)| j.status == status)
                    .collect();
                v.sort_by_key(|(_, j)| j.arrival);
                v
            }
        };

        let end = range.end.min(matching.len());
        let start = range.start.min(end);
        matching
            .drain(start..end)
            .map(|(id, job)| job.envelope(id))
            .collect()
    }

    async fn counts(&self) -> Result<StatusCounts, BackendError> {
        self.ensure_open()?;
        let state = self.inner.state.lock().await;
        let mut counts = StatusCounts::default();
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Waiting => counts.waiting += 1,
                JobStatus::Active => counts.active += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Delayed => counts.delayed += 1,
            }
        }
        Ok(counts)
    }

    async fn pause(&self) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.inner.paused.store(true, Ordering::Release);
        Ok(())
    }

    async fn resume(&self) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.inner.paused.store(false, Ordering::Release);
        self.inner.ready.notify_one();
        Ok(())
    }

    async fn release_scheduler(&self) -> Result<(), BackendError> {
        self.ensure_open()?;
        self.inner.released.store(true, Ordering::Release);
        self.inner.ready.notify_one();
        Ok(())
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.ready.notify_one();
        Ok(())
    }
}
