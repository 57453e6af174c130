//! # LogWriter: events as structured `tracing` records.
//!
//! Maps every [`Event`] to one `tracing` record with the event's metadata as
//! fields. Installing a `tracing` subscriber (formatting, filtering) is left to
//! the application.
//!
//! | Level  | Events |
//! |--------|--------|
//! | `info` | lifecycle, processor registration, job added/completed, retry scheduled, index cleaned |
//! | `debug`| job processing |
//! | `warn` | job failed, job stalled, subscriber overflow |
//! | `error`| retry exhausted, job discarded, retry submission failed, subscriber panicked |

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber that forwards events to `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let queue = e.queue.as_deref().unwrap_or("-");
        let job = e.job.as_deref().unwrap_or("-");
        let attempt = e.attempt_id.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::SchedulerInitialized => info!(queue, "scheduler initialized"),
            EventKind::WorkerStarted => {
                info!(queue, concurrency = e.count, "worker started")
            }
            EventKind::WorkerStopped => info!(queue, reason, "worker stopped"),
            EventKind::QueuePaused => info!(queue, "queue paused"),
            EventKind::QueueResumed => info!(queue, "queue resumed"),
            EventKind::SchedulerClosed => info!(queue, "scheduler closed"),
            EventKind::ProcessorRegistered => info!(job, reason, "processor registered"),
            EventKind::JobAdded => info!(
                job,
                attempt,
                order = e.order,
                max_retries = e.max_retries,
                "job added"
            ),
            EventKind::JobProcessing => debug!(
                job,
                attempt,
                order = e.order,
                retry_count = e.retry_count,
                "processing job"
            ),
            EventKind::JobCompleted => info!(
                job,
                attempt,
                order = e.order,
                retry_count = e.retry_count,
                "job completed"
            ),
            EventKind::JobFailed => warn!(
                job,
                attempt,
                order = e.order,
                retry_count = e.retry_count,
                max_retries = e.max_retries,
                reason,
                "job failed"
            ),
            EventKind::JobStalled => warn!(job, attempt, order = e.order, "job stalled"),
            EventKind::RetryScheduled => info!(
                job,
                attempt,
                order = e.order,
                retry_count = e.retry_count,
                max_retries = e.max_retries,
                delay_ms = e.delay_ms,
                "retry scheduled"
            ),
            EventKind::RetryExhausted => error!(
                job,
                attempt,
                order = e.order,
                retry_count = e.retry_count,
                reason,
                "retries exhausted"
            ),
            EventKind::JobDiscarded => error!(
                job,
                attempt,
                order = e.order,
                reason,
                "job discarded without retry"
            ),
            EventKind::RetrySubmitFailed => error!(
                job,
                attempt,
                order = e.order,
                reason,
                "retry submission failed"
            ),
            EventKind::IndexCleaned => info!(queue, removed = e.count, "order index cleaned"),
            EventKind::SubscriberOverflow => warn!(subscriber = job, reason, "subscriber dropped event"),
            EventKind::SubscriberPanicked => error!(subscriber = job, reason, "subscriber panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
