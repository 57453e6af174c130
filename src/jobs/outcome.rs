//! # Attempt outcome classification.
//!
//! The worker turns each processor result into a [`JobOutcome`]; the retry
//! coordinator only ever sees the failure variants.

use serde_json::Value;

use crate::error::JobError;
use crate::policies::NoProcessorPolicy;

/// Result of one attempt, after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Processor returned a completion value.
    Success(Value),
    /// Attempt failed; the lineage may be retried within its budget.
    RetryableFailure(JobError),
    /// Attempt failed; the lineage must not be retried regardless of budget.
    TerminalFailure(JobError),
}

impl JobOutcome {
    /// Classifies a processor result.
    ///
    /// `NoProcessor` errors are retryable under [`NoProcessorPolicy::ConsumeRetry`]
    /// and terminal under [`NoProcessorPolicy::FailFast`].
    pub fn classify(res: Result<Value, JobError>, no_processor: NoProcessorPolicy) -> Self {
        match res {
            Ok(v) => JobOutcome::Success(v),
            Err(e @ JobError::NoProcessor { .. }) => match no_processor {
                NoProcessorPolicy::ConsumeRetry => JobOutcome::RetryableFailure(e),
                NoProcessorPolicy::FailFast => JobOutcome::TerminalFailure(e),
            },
            Err(e) if e.is_retryable() => JobOutcome::RetryableFailure(e),
            Err(e) => JobOutcome::TerminalFailure(e),
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&JobError> {
        match self {
            JobOutcome::Success(_) => None,
            JobOutcome::RetryableFailure(e) | JobOutcome::TerminalFailure(e) => Some(e),
        }
    }
}
