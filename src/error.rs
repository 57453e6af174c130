//! Error types used by the ordervisor scheduler, its backends and job processors.
//!
//! This module defines three error enums:
//!
//! - [`SchedulerError`]: errors surfaced to callers of the scheduler API.
//! - [`JobError`]: errors raised by a single job attempt (processor side).
//! - [`BackendError`]: errors reported by the queue backend collaborator.
//!
//! All of them provide helper methods (`as_label`, `as_message`) for logging/metrics.
//! [`JobError::is_retryable`] drives the retry decision in the coordinator.

use std::time::Duration;
use thiserror::Error;

/// # Errors surfaced to callers of the scheduler.
///
/// Processor failures never show up here: they are contained by the retry
/// coordinator. Only usage errors and backend communication errors escape.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// An operation was invoked before [`Scheduler::initialize`](crate::Scheduler::initialize).
    #[error("scheduler not initialized (operation: {operation})")]
    NotInitialized {
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// Job names must be non-empty.
    #[error("job name must not be empty")]
    InvalidJobName,

    /// The order counter reached `u64::MAX`; no further lineages can be tagged.
    #[error("lineage order counter exhausted")]
    OrderExhausted,

    /// The scheduler was closed and cannot be used anymore.
    #[error("scheduler closed")]
    Closed,

    /// The backend rejected or failed the request; propagated verbatim.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl SchedulerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use ordervisor::SchedulerError;
    ///
    /// let err = SchedulerError::NotInitialized { operation: "add_job" };
    /// assert_eq!(err.as_label(), "scheduler_not_initialized");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SchedulerError::NotInitialized { .. } => "scheduler_not_initialized",
            SchedulerError::InvalidJobName => "scheduler_invalid_job_name",
            SchedulerError::OrderExhausted => "scheduler_order_exhausted",
            SchedulerError::Closed => "scheduler_closed",
            SchedulerError::Backend(_) => "scheduler_backend",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SchedulerError::NotInitialized { operation } => {
                format!("`{operation}` called before initialize()")
            }
            SchedulerError::InvalidJobName => "empty job name".to_string(),
            SchedulerError::OrderExhausted => "no lineage orders left".to_string(),
            SchedulerError::Closed => "scheduler closed".to_string(),
            SchedulerError::Backend(e) => format!("backend: {}", e.as_message()),
        }
    }
}

/// # Errors produced by a single job attempt.
///
/// Returned by [`Processor::process`](crate::Processor::process) or produced by the
/// worker itself (missing processor). `Fail` and `Timeout` are retryable up to the
/// lineage budget, `Fatal` never is.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Attempt failed but may succeed if retried.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error; the lineage fails immediately regardless of budget.
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// No processor is registered for the delivered job name.
    #[error("no processor registered for job '{name}'")]
    NoProcessor {
        /// Job name that had no processor.
        name: String,
    },

    /// Attempt exceeded the backend stall timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },
}

impl JobError {
    /// Shorthand for a retryable failure.
    pub fn fail(error: impl Into<String>) -> Self {
        JobError::Fail {
            error: error.into(),
        }
    }

    /// Shorthand for a terminal failure.
    pub fn fatal(error: impl Into<String>) -> Self {
        JobError::Fatal {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use ordervisor::JobError;
    ///
    /// let err = JobError::NoProcessor { name: "email".into() };
    /// assert_eq!(err.as_label(), "job_no_processor");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::Fail { .. } => "job_failed",
            JobError::Fatal { .. } => "job_fatal",
            JobError::NoProcessor { .. } => "job_no_processor",
            JobError::Timeout { .. } => "job_timeout",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            JobError::Fail { error } => format!("error: {error}"),
            JobError::Fatal { error } => format!("fatal: {error}"),
            JobError::NoProcessor { name } => format!("no processor: {name}"),
            JobError::Timeout { timeout } => format!("timeout: {timeout:?}"),
        }
    }

    /// Indicates whether the error may be retried within the lineage budget.
    ///
    /// `Fail` and `Timeout` are retryable, `Fatal` is not. `NoProcessor` is
    /// reported as retryable here; whether it actually consumes a retry is decided
    /// by [`NoProcessorPolicy`](crate::NoProcessorPolicy).
    ///
    /// # Example
    /// ```
    /// use ordervisor::JobError;
    ///
    /// assert!(JobError::fail("boom").is_retryable());
    /// assert!(!JobError::fatal("nope").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        !matches!(self, JobError::Fatal { .. })
    }
}

/// # Errors reported by a queue backend.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend refused the request (validation, quota, unknown job...).
    #[error("backend rejected request: {reason}")]
    Rejected {
        /// Backend-provided reason.
        reason: String,
    },

    /// The backend could not be reached.
    #[error("backend unavailable: {reason}")]
    Unavailable {
        /// Backend-provided reason.
        reason: String,
    },

    /// The backend (or one of its resources) was already closed.
    #[error("backend closed")]
    Closed,

    /// Job data could not be encoded or decoded.
    #[error("job data codec: {reason}")]
    Codec {
        /// Underlying serde error.
        reason: String,
    },
}

impl BackendError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BackendError::Rejected { .. } => "backend_rejected",
            BackendError::Unavailable { .. } => "backend_unavailable",
            BackendError::Closed => "backend_closed",
            BackendError::Codec { .. } => "backend_codec",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            BackendError::Rejected { reason } => format!("rejected: {reason}"),
            BackendError::Unavailable { reason } => format!("unavailable: {reason}"),
            BackendError::Closed => "closed".to_string(),
            BackendError::Codec { reason } => format!("codec: {reason}"),
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Codec {
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_pass_through_scheduler_error() {
        let err: SchedulerError = BackendError::Closed.into();
        assert_eq!(err.as_label(), "scheduler_backend");
        assert_eq!(err.to_string(), "backend closed");
    }

    #[test]
    fn only_fatal_is_not_retryable() {
        assert!(JobError::fail("x").is_retryable());
        assert!(JobError::Timeout { timeout: Duration::from_secs(1) }.is_retryable());
        assert!(JobError::NoProcessor { name: "x".into() }.is_retryable());
        assert!(!JobError::fatal("x").is_retryable());
    }

    #[test]
    fn codec_errors_convert() {
        let bad = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = BackendError::from(bad);
        assert_eq!(err.as_label(), "backend_codec");
    }
}
