//! Retry shaping policies.
//!
//! This module groups the knobs that control **how long** to wait before a
//! lineage's next attempt and **whether** a missing processor consumes a retry.
//!
//! ## Contents
//! - [`BackoffPolicy`] how retry delays evolve from the lineage's base delay (factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid thundering herd
//! - [`NoProcessorPolicy`] retry accounting for jobs without a processor
//!
//! ## Quick wiring
//! ```text
//! SchedulerConfig { backoff: BackoffPolicy, no_processor: NoProcessorPolicy, .. }
//!      └─► RetryCoordinator uses backoff.delay(envelope.retry_delay(), retry_count)
//!      └─► OrderedWorker uses no_processor to classify missing-processor failures
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → factor=1.0 (constant), max uncapped, jitter=None,
//!   i.e. every retry waits exactly the lineage's `retry_delay`.
//! - `NoProcessorPolicy::ConsumeRetry`.

mod backoff;
mod jitter;
mod no_processor;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use no_processor::NoProcessorPolicy;
