//! # Job envelope: one delivery attempt plus its lineage metadata.
//!
//! A *lineage* is the logical job identified by one `lineage_order`. It spans the
//! original submission and every retry of it. Each submission to the backend is an
//! *attempt* and gets its own backend-assigned [`AttemptId`].
//!
//! ```text
//! add_job("email", p)      retry #1                 retry #2
//! ┌──────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ id: 7            │     │ id: 12           │     │ id: 19           │
//! │ lineage_order: 3 │ ──► │ lineage_order: 3 │ ──► │ lineage_order: 3 │
//! │ retry_count: 0   │     │ retry_count: 1   │     │ retry_count: 2   │
//! │ previous: -      │     │ previous: 7      │     │ previous: 12     │
//! └──────────────────┘     └──────────────────┘     └──────────────────┘
//! ```
//!
//! ## Rules
//! - `lineage_order`, `payload`, `max_retries` and `retry_delay_ms` are fixed at the
//!   original submission and copied unchanged into every retry.
//! - `retry_count` grows by exactly one per resubmission.
//! - [`JobData`] is what the backend persists; it is the durable source of truth for
//!   the order tag. The in-memory [`OrderIndex`](crate::OrderIndex) is only a cache.

use std::borrow::Borrow;
use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;

/// Backend-assigned identifier of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(String);

impl AttemptId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AttemptId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AttemptId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for AttemptId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Job status as reported by the backend (not locally authoritative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Ready, waiting for a worker.
    Waiting,
    /// Not ready until its delay elapses.
    Delayed,
    /// Currently delivered to a processor.
    Active,
    /// Finished successfully.
    Completed,
    /// Finished with a failure (this attempt).
    Failed,
}

impl JobStatus {
    /// All statuses, in reporting order.
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Waiting,
        JobStatus::Active,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Delayed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Delayed => "delayed",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// `Completed` and `Failed` are terminal for an attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted job data: user payload plus ordering and retry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobData {
    /// Opaque user payload, identical across all attempts of a lineage.
    pub payload: Value,
    /// Order tag assigned at the original submission.
    pub lineage_order: u64,
    /// Attempts already made for this lineage before this one.
    pub retry_count: u32,
    /// Retry budget captured at the original submission.
    pub max_retries: u32,
    /// Base retry delay captured at the original submission (milliseconds).
    pub retry_delay_ms: u64,
    /// Attempt this one retries, if any (audit only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_attempt_id: Option<AttemptId>,
}

impl JobData {
    /// Data for the first attempt of a new lineage.
    pub fn original(
        payload: Value,
        lineage_order: u64,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            payload,
            lineage_order,
            retry_count: 0,
            max_retries,
            retry_delay_ms: retry_delay.as_millis().min(u128::from(u64::MAX)) as u64,
            previous_attempt_id: None,
        }
    }

    /// Data for the next attempt of the same lineage.
    pub fn next_attempt(&self, previous: &AttemptId) -> Self {
        Self {
            payload: self.payload.clone(),
            lineage_order: self.lineage_order,
            retry_count: self.retry_count.saturating_add(1),
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
            previous_attempt_id: Some(previous.clone()),
        }
    }

    /// True once the lineage has no retries left.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    #[inline]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Encodes into the JSON shape stored by backends.
    pub fn encode(&self) -> Result<Value, BackendError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decodes from the JSON shape stored by backends.
    pub fn decode(value: &Value) -> Result<Self, BackendError> {
        Ok(Self::deserialize(value)?)
    }
}

/// One concrete attempt as seen by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct JobEnvelope {
    /// Backend-assigned id of this attempt.
    pub id: AttemptId,
    /// Logical job type used to find the processor.
    pub name: String,
    /// Payload and lineage metadata.
    pub data: JobData,
    /// Backend-reported status at read time.
    pub status: JobStatus,
    /// Delivery delay requested at enqueue time.
    pub delay: Duration,
    /// Backend priority passed through from [`EnqueueOptions`](crate::EnqueueOptions).
    pub priority: Option<u32>,
    /// When the backend accepted this attempt.
    pub enqueued_at: SystemTime,
    /// Failure reason reported for this attempt, if it failed.
    pub failed_reason: Option<String>,
    /// Completion value returned by the processor, if it completed.
    pub return_value: Option<Value>,
}

impl JobEnvelope {
    #[inline]
    pub fn lineage_order(&self) -> u64 {
        self.data.lineage_order
    }

    #[inline]
    pub fn retry_count(&self) -> u32 {
        self.data.retry_count
    }

    #[inline]
    pub fn max_retries(&self) -> u32 {
        self.data.max_retries
    }

    #[inline]
    pub fn payload(&self) -> &Value {
        &self.data.payload
    }
}
