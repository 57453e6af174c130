//! # Policy for deliveries whose job name has no registered processor.
//!
//! - [`NoProcessorPolicy::ConsumeRetry`] the failure counts against the lineage
//!   budget like any processor failure (default).
//! - [`NoProcessorPolicy::FailFast`] the lineage fails at once; retrying cannot help
//!   unless a processor is registered in the meantime.

/// What to do with a delivery that has no processor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NoProcessorPolicy {
    /// Treat as a retryable failure (consumes one retry).
    #[default]
    ConsumeRetry,
    /// Treat as a terminal failure.
    FailFast,
}
