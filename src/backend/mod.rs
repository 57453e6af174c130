//! # Queue backend contract.
//!
//! The scheduler never stores jobs itself. A [`Backend`] persists attempts,
//! delays them, delivers ready ones to a [`Delivery`] callback with bounded
//! concurrency, and reports per-status listings and counts.
//!
//! ## Contract
//! ```text
//! enqueue(name, data, opts{delay?, priority?, attempts?}) -> AttemptId
//! deliver(handler, concurrency, token)   runs until token is cancelled or the backend closes
//!     for each ready job:  handler.handle(envelope)          bounded by the stall timeout
//!                          handler.settle(envelope, result)  never cancelled by it
//!                            Ok  → attempt Completed (value stored)
//!                            Err → attempt Failed (reason stored), or re-queued while
//!                                  attempts_made < opts.attempts (backend-native retry)
//!     stall detected:      handler.on_stalled(envelope), attempt re-delivered
//!                          (settle is skipped for the stalled run)
//! list_jobs(status, range) -> [envelope]   ordered by backend arrival
//! counts() -> { waiting, active, completed, failed, delayed }
//! pause() / resume()                       stop/restart delivery, keep queued work
//! release_scheduler() then close()         two-stage shutdown
//! ```
//!
//! The scheduler always enqueues with `attempts = 1`; all retries are decided by
//! the retry coordinator.
//!
//! [`MemoryBackend`] is an in-process implementation for tests, demos and
//! single-process deployments that do not need durability.

mod memory;

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{BackendError, JobError};
use crate::jobs::{AttemptId, JobData, JobEnvelope, JobStatus};

pub use memory::{MemoryBackend, MemoryBackendConfig};

/// Shared backend handle.
pub type BackendRef = Arc<dyn Backend>;

/// Shared delivery callback handle.
pub type DeliveryRef = Arc<dyn Delivery>;

/// Per-submission delivery options passed through to the backend.
///
/// Orthogonal to lineage ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Delay before the attempt becomes ready (`None` or zero = ready now).
    pub delay: Option<Duration>,
    /// Backend priority (lower is served first).
    pub priority: Option<u32>,
    /// Backend-native delivery attempts. The scheduler forces `Some(1)`.
    pub attempts: Option<u32>,
}

impl EnqueueOptions {
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Same options with backend-native retries disabled.
    pub(crate) fn single_attempt(mut self) -> Self {
        self.attempts = Some(1);
        self
    }
}

/// Per-status job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
}

impl StatusCounts {
    /// Count for a single status.
    pub fn get(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Waiting => self.waiting,
            JobStatus::Active => self.active,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Delayed => self.delayed,
        }
    }
}

/// # Delivery callback invoked by the backend for each ready job.
///
/// Delivery of one attempt has two steps. [`handle`](Delivery::handle) does the
/// work and may be abandoned by a stall timeout. [`settle`](Delivery::settle)
/// runs to completion once `handle` has returned; side effects that must happen
/// exactly once per attempt belong there.
#[async_trait]
pub trait Delivery: Send + Sync + 'static {
    /// Runs one attempt.
    async fn handle(&self, envelope: JobEnvelope) -> Result<Value, JobError>;

    /// Reacts to the result of [`handle`](Delivery::handle). The returned value
    /// becomes the attempt's completion value or failure reason at the backend.
    async fn settle(
        &self,
        _envelope: &JobEnvelope,
        result: Result<Value, JobError>,
    ) -> Result<Value, JobError> {
        result
    }

    /// Called when the backend gives up waiting on an attempt and re-delivers it.
    fn on_stalled(&self, _envelope: &JobEnvelope) {}
}

/// # Durable queue backend.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Checks that the backend is reachable. Called once by `Scheduler::initialize`.
    async fn connect(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Stores a new attempt and returns its id.
    async fn enqueue(
        &self,
        name: &str,
        data: &JobData,
        opts: EnqueueOptions,
    ) -> Result<AttemptId, BackendError>;

    /// Delivers ready jobs to `handler` with at most `concurrency` in flight.
    ///
    /// Returns when `token` is cancelled or the backend is closed. Attempts already
    /// handed to `handler` are not awaited.
    async fn deliver(
        &self,
        handler: DeliveryRef,
        concurrency: usize,
        token: CancellationToken,
    ) -> Result<(), BackendError>;

    /// Jobs currently in `status`, ordered by arrival, sliced by `range`.
    async fn list_jobs(
        &self,
        status: JobStatus,
        range: Range<usize>,
    ) -> Result<Vec<JobEnvelope>, BackendError>;

    async fn counts(&self) -> Result<StatusCounts, BackendError>;

    async fn pause(&self) -> Result<(), BackendError>;

    async fn resume(&self) -> Result<(), BackendError>;

    /// Releases the delay scheduling resource; delayed jobs stop being promoted.
    async fn release_scheduler(&self) -> Result<(), BackendError>;

    /// Releases the queue itself. Further calls fail with [`BackendError::Closed`].
    async fn close(&self) -> Result<(), BackendError>;
}
