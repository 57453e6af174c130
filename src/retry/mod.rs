//! Lineage retry handling.
//!
//! [`RetryCoordinator`] is the only component allowed to resubmit a lineage;
//! backend-native retries are always disabled.

mod coordinator;

pub use coordinator::{RetryCoordinator, RetryDecision};
