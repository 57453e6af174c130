//! # Backoff policy for lineage retries.
//!
//! Each lineage carries its own base delay (`retry_delay`, captured at the original
//! submission). [`BackoffPolicy`] shapes the delay of the `n`-th retry from it:
//!
//! ```text
//! delay(n) = jitter( min(retry_delay × factor^n, max) )      n = retry_count of the failed attempt
//! ```
//!
//! The default (`factor = 1.0`, no cap, no jitter) keeps every retry at exactly
//! `retry_delay`, however long it is.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use ordervisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     factor: 2.0,
//!     max: Duration::from_secs(10),
//!     jitter: JitterPolicy::None,
//! };
//! let base = Duration::from_millis(100);
//!
//! assert_eq!(backoff.delay(base, 0), Duration::from_millis(100));
//! assert_eq!(backoff.delay(base, 1), Duration::from_millis(200));
//! assert_eq!(backoff.delay(base, 10), Duration::from_secs(10));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry delay shaping on top of a lineage's base delay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Multiplicative growth factor per retry (`1.0` = constant).
    pub factor: f64,
    /// Maximum delay cap (`Duration::MAX` = uncapped).
    pub max: Duration,
    /// Jitter applied after capping.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Constant delay: `factor = 1.0`, uncapped, no jitter.
    fn default() -> Self {
        Self {
            factor: 1.0,
            max: Duration::MAX,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay before the retry that follows attempt `retry_count`.
    ///
    /// Non-finite or negative intermediate values clamp to [`BackoffPolicy::max`].
    pub fn delay(&self, base: Duration, retry_count: u32) -> Duration {
        if self.factor == 1.0 {
            return self.jitter.apply(base.min(self.max));
        }

        let exp = retry_count.min(i32::MAX as u32) as i32;
        let unclamped = base.as_secs_f64() * self.factor.powi(exp);
        let capped = if unclamped.is_finite() && unclamped >= 0.0 {
            Duration::try_from_secs_f64(unclamped)
                .map_or(self.max, |d| d.min(self.max))
        } else {
            self.max
        };
        self.jitter.apply(capped)
    }
}
