//! # Scheduler configuration.
//!
//! [`SchedulerConfig`] holds the settings fixed at build time; [`RetryConfig`] is the
//! part that may change at runtime through
//! [`Scheduler::set_retry_config`](crate::Scheduler::set_retry_config).
//!
//! ## Sentinel values
//! - `concurrency = 0` → treated as 1 (serialized delivery)
//! - `retry_delay = 0s` → retries become ready immediately
//! - `max_retries = 0` → the first failure is terminal

use std::time::Duration;

use crate::policies::{BackoffPolicy, NoProcessorPolicy};

/// Retry budget and base delay captured into each new lineage.
///
/// Changing it affects only lineages submitted afterwards: both values are copied
/// into the lineage's first attempt and carried unchanged by every retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of resubmissions per lineage.
    pub max_retries: u32,
    /// Base delay before a retry becomes ready.
    pub retry_delay: Duration,
}

impl RetryConfig {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }
}

impl Default for RetryConfig {
    /// `max_retries = 3`, `retry_delay = 60s`.
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(60),
        }
    }
}

/// Configuration of one scheduler instance.
///
/// ## Field semantics
/// - `queue_name`: label attached to lifecycle events and worker stats
/// - `concurrency`: delivery concurrency (`0` = 1); values above 1 give up serialized execution
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `retry`: initial retry settings for new lineages
/// - `backoff`: shaping of the retry delay (default keeps it constant)
/// - `no_processor`: whether a missing processor consumes a retry or fails the lineage
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over repeating sentinel checks.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// Queue name used in events and stats.
    pub queue_name: String,

    /// Maximum number of attempts handled at the same time.
    ///
    /// - `0` or `1` = strictly serialized handler invocations
    /// - `n > 1` = up to `n` at once; execution order is no longer serialized
    pub concurrency: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Retry settings applied to lineages submitted after initialization.
    pub retry: RetryConfig,

    /// Retry delay shaping.
    pub backoff: BackoffPolicy,

    /// Handling of deliveries whose name has no processor.
    pub no_processor: NoProcessorPolicy,
}

impl SchedulerConfig {
    /// Effective delivery concurrency (at least 1).
    #[inline]
    pub fn concurrency_clamped(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// True when handler invocations are serialized.
    #[inline]
    pub fn is_serialized(&self) -> bool {
        self.concurrency_clamped() == 1
    }
}

impl Default for SchedulerConfig {
    /// Default configuration:
    ///
    /// - `queue_name = "ordered-jobs"`
    /// - `concurrency = 1` (serialized)
    /// - `bus_capacity = 1024`
    /// - `retry = RetryConfig::default()` (3 retries, 60s apart)
    /// - `backoff = BackoffPolicy::default()` (constant delay)
    /// - `no_processor = NoProcessorPolicy::ConsumeRetry`
    fn default() -> Self {
        Self {
            queue_name: "ordered-jobs".to_string(),
            concurrency: 1,
            bus_capacity: 1024,
            retry: RetryConfig::default(),
            backoff: BackoffPolicy::default(),
            no_processor: NoProcessorPolicy::default(),
        }
    }
}
