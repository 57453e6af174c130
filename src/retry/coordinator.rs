//! # Retry coordinator: the single owner of retry decisions.
//!
//! Invoked by the ordered worker for every failed attempt, before the failure is
//! reported back to the backend.
//!
//! ## Decision
//! ```text
//! handle_failure(envelope, outcome)
//!   ├─ TerminalFailure               → Discarded   (JobDiscarded)
//!   ├─ retry_count >= max_retries    → Exhausted   (RetryExhausted)
//!   └─ otherwise:
//!        data' = data.next_attempt(envelope.id)       same payload/order/budget, retry_count + 1
//!        delay = backoff.delay(data.retry_delay(), data.retry_count)
//!        backend.enqueue(name, data', {delay, attempts: 1})
//!          ├─ Ok(id)  → index.record(id, order) → Resubmitted (RetryScheduled)
//!          └─ Err(e)  → RetrySubmitFailed, error returned
//! ```
//!
//! ## Rules
//! - At most `max_retries` resubmissions per lineage; total attempts ≤ `max_retries + 1`.
//! - Resubmissions are always single-attempt at the backend and always delayed by
//!   the policy-shaped lineage delay (zero delay means ready at once).
//! - Backend failures are reported, never retried here.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BackendRef, EnqueueOptions};
use crate::error::{BackendError, JobError};
use crate::events::{Bus, Event, EventKind};
use crate::jobs::{AttemptId, JobEnvelope, JobOutcome};
use crate::order::OrderIndex;
use crate::policies::BackoffPolicy;

/// What the coordinator did with a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Next attempt of the lineage submitted.
    Resubmitted {
        /// Backend id of the new attempt.
        attempt_id: AttemptId,
        /// Retry count carried by the new attempt.
        retry_count: u32,
        /// Delay requested for the new attempt.
        delay: Duration,
    },
    /// Budget spent; the lineage ends failed.
    Exhausted,
    /// Non-retryable failure; the lineage ends failed regardless of budget.
    Discarded,
    /// The attempt succeeded; nothing to do.
    NotNeeded,
}

impl RetryDecision {
    /// True when the lineage has reached its final failed state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryDecision::Exhausted | RetryDecision::Discarded)
    }
}

/// Decides and performs lineage retries.
pub struct RetryCoordinator {
    backend: BackendRef,
    index: Arc<OrderIndex>,
    bus: Bus,
    backoff: BackoffPolicy,
}

impl RetryCoordinator {
    pub fn new(backend: BackendRef, index: Arc<OrderIndex>, bus: Bus, backoff: BackoffPolicy) -> Self {
        Self {
            backend,
            index,
            bus,
            backoff,
        }
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Handles the outcome of one attempt.
    ///
    /// Returns the decision taken, or the backend error if the resubmission could
    /// not be stored.
    pub async fn handle_failure(
        &self,
        envelope: &JobEnvelope,
        outcome: &JobOutcome,
    ) -> Result<RetryDecision, BackendError> {
        let error = match outcome {
            JobOutcome::Success(_) => return Ok(RetryDecision::NotNeeded),
            JobOutcome::TerminalFailure(e) => {
                self.publish_terminal(EventKind::JobDiscarded, envelope, e);
                return Ok(RetryDecision::Discarded);
            }
            JobOutcome::RetryableFailure(e) => e,
        };

        if envelope.data.is_exhausted() {
            self.publish_terminal(EventKind::RetryExhausted, envelope, error);
            return Ok(RetryDecision::Exhausted);
        }

        let next = envelope.data.next_attempt(&envelope.id);
        let delay = self
            .backoff
            .delay(envelope.data.retry_delay(), envelope.data.retry_count);
        let opts = EnqueueOptions {
            priority: envelope.priority,
            ..EnqueueOptions::delayed(delay)
        }
        .single_attempt();

        let attempt_id = match self.backend.enqueue(&envelope.name, &next, opts).await {
            Ok(id) => id,
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::RetrySubmitFailed)
                        .with_job(envelope.name.as_str())
                        .with_attempt_id(&envelope.id)
                        .with_order(envelope.lineage_order())
                        .with_reason(e.to_string()),
                );
                return Err(e);
            }
        };
        self.index
            .record(attempt_id.clone(), next.lineage_order)
            .await;

        self.bus.publish(
            Event::new(EventKind::RetryScheduled)
                .with_job(envelope.name.as_str())
                .with_attempt_id(&attempt_id)
                .with_order(next.lineage_order)
                .with_retry(next.retry_count, next.max_retries)
                .with_delay(delay)
                .with_reason(error.to_string()),
        );

        Ok(RetryDecision::Resubmitted {
            attempt_id,
            retry_count: next.retry_count,
            delay,
        })
    }

    fn publish_terminal(&self, kind: EventKind, envelope: &JobEnvelope, error: &JobError) {
        self.bus
            .publish(Event::for_attempt(kind, envelope).with_reason(error.to_string()));
    }
}
