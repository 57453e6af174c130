//! # Lineage order assigner.
//!
//! Issues one order tag per original submission: strictly increasing, gap-free,
//! never reused. Built on a single atomic counter, the same way event sequence
//! numbers are produced.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::SchedulerError;

/// Monotonic order tag source.
#[derive(Debug, Default)]
pub struct OrderAssigner {
    next: AtomicU64,
}

impl OrderAssigner {
    /// Starts at order `0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts at an explicit order (e.g. after rebuilding from backend state).
    pub fn starting_at(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next),
        }
    }

    /// Returns the next order tag.
    ///
    /// Fails with [`SchedulerError::OrderExhausted`] instead of wrapping at `u64::MAX`.
    pub fn next_order(&self) -> Result<u64, SchedulerError> {
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_add(1))
            .map_err(|_| SchedulerError::OrderExhausted)
    }

    /// Order that the next call to [`next_order`](Self::next_order) will return.
    ///
    /// Equals the number of lineages tagged so far when starting from `0`.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }

    /// Moves the counter forward so that it never issues `order` or anything below.
    ///
    /// Never moves it backward.
    pub fn advance_past(&self, order: u64) {
        let floor = order.saturating_add(1);
        self.next.fetch_max(floor, Ordering::AcqRel);
    }
}
