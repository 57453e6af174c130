//! # Runtime events emitted by the scheduler, worker and retry coordinator.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Lifecycle events**: scheduler/worker/queue state (initialized, started, paused, closed)
//! - **Job events**: one attempt's flow (added, processing, completed, failed, stalled)
//! - **Retry events**: coordinator decisions (retry scheduled, exhausted, discarded)
//! - **Subscriber events**: fan-out health (overflow, panic)
//!
//! The [`Event`] struct carries additional metadata such as the job name, attempt id,
//! lineage order, retry counters and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use ordervisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RetryScheduled)
//!     .with_job("email")
//!     .with_order(3)
//!     .with_retry(1, 3)
//!     .with_delay(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::RetryScheduled);
//! assert_eq!(ev.job.as_deref(), Some("email"));
//! assert_eq!(ev.delay_ms, Some(5_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::jobs::{AttemptId, JobEnvelope};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Lifecycle events ===
    /// Scheduler connected to its backend.
    ///
    /// Sets: `queue`
    SchedulerInitialized,

    /// Worker loop started delivering jobs.
    ///
    /// Sets: `queue`, `count` (concurrency)
    WorkerStarted,

    /// Worker loop stopped (close or backend end of stream).
    ///
    /// Sets: `queue`, `reason` (only when the backend ended with an error)
    WorkerStopped,

    /// Delivery paused at the backend.
    ///
    /// Sets: `queue`
    QueuePaused,

    /// Delivery resumed at the backend.
    ///
    /// Sets: `queue`
    QueueResumed,

    /// Scheduler closed; backend resources released.
    ///
    /// Sets: `queue`
    SchedulerClosed,

    /// A processor was registered (or replaced) for a job name.
    ///
    /// Sets: `job`, `reason` = `"replaced"` when it overwrote a previous processor
    ProcessorRegistered,

    // === Job events ===
    /// Original submission accepted by the backend.
    ///
    /// Sets: `job`, `attempt_id`, `order`, `retry_count`, `max_retries`
    JobAdded,

    /// Attempt delivered to its processor.
    ///
    /// Sets: `job`, `attempt_id`, `order`, `retry_count`, `max_retries`
    JobProcessing,

    /// Attempt completed successfully.
    ///
    /// Sets: `job`, `attempt_id`, `order`, `retry_count`, `max_retries`
    JobCompleted,

    /// Attempt failed.
    ///
    /// Sets: `job`, `attempt_id`, `order`, `retry_count`, `max_retries`, `reason`
    JobFailed,

    /// Backend detected a stalled attempt (processor exceeded the stall timeout).
    ///
    /// Sets: `job`, `attempt_id`, `order`, `retry_count`, `max_retries`
    JobStalled,

    // === Retry events ===
    /// Next attempt of the lineage submitted with a delay.
    ///
    /// Sets: `job`, `attempt_id` (new attempt), `order`, `retry_count` (new), `max_retries`,
    /// `delay_ms`, `reason` (last failure)
    RetryScheduled,

    /// Lineage ran out of retries; its final state is failed.
    ///
    /// Sets: `job`, `attempt_id`, `order`, `retry_count`, `max_retries`, `reason`
    RetryExhausted,

    /// Lineage failed with a non-retryable error; no retry regardless of budget.
    ///
    /// Sets: `job`, `attempt_id`, `order`, `retry_count`, `max_retries`, `reason`
    JobDiscarded,

    /// Retry resubmission itself failed at the backend.
    ///
    /// Sets: `job`, `attempt_id` (failed attempt), `order`, `reason`
    RetrySubmitFailed,

    /// Order index entries removed for terminal attempts.
    ///
    /// Sets: `queue`, `count`
    IndexCleaned,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `job` (subscriber name), `reason` (panic info)
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `job` (subscriber name), `reason`
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Queue name.
    pub queue: Option<Arc<str>>,
    /// Job name (or subscriber name for subscriber events).
    pub job: Option<Arc<str>>,
    /// Backend attempt id.
    pub attempt_id: Option<Arc<str>>,
    /// Lineage order tag.
    pub order: Option<u64>,
    /// Retry count of the attempt.
    pub retry_count: Option<u32>,
    /// Retry budget of the lineage.
    pub max_retries: Option<u32>,
    /// Retry delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Generic counter (concurrency, removed entries...).
    pub count: Option<u64>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            queue: None,
            job: None,
            attempt_id: None,
            order: None,
            retry_count: None,
            max_retries: None,
            delay_ms: None,
            count: None,
            reason: None,
        }
    }

    /// Creates an event describing one attempt (name, id, order and retry counters).
    pub fn for_attempt(kind: EventKind, envelope: &JobEnvelope) -> Self {
        Event::new(kind)
            .with_job(envelope.name.as_str())
            .with_attempt_id(&envelope.id)
            .with_order(envelope.lineage_order())
            .with_retry(envelope.retry_count(), envelope.max_retries())
    }

    #[inline]
    pub fn with_queue(mut self, queue: impl Into<Arc<str>>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    #[inline]
    pub fn with_job(mut self, job: impl Into<Arc<str>>) -> Self {
        self.job = Some(job.into());
        self
    }

    #[inline]
    pub fn with_attempt_id(mut self, id: &AttemptId) -> Self {
        self.attempt_id = Some(Arc::from(id.as_str()));
        self
    }

    #[inline]
    pub fn with_order(mut self, order: u64) -> Self {
        self.order = Some(order);
        self
    }

    /// Attaches retry counters.
    #[inline]
    pub fn with_retry(mut self, retry_count: u32, max_retries: u32) -> Self {
        self.retry_count = Some(retry_count);
        self.max_retries = Some(max_retries);
        self
    }

    /// Attaches a retry delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    #[inline]
    pub fn with_count(mut self, n: u64) -> Self {
        self.count = Some(n);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_job(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_job(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::JobAdded);
        let b = Event::new(EventKind::JobAdded);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn delay_saturates_at_u32() {
        let ev = Event::new(EventKind::RetryScheduled).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }
}
