//! # Order index: advisory attempt → lineage order cache.
//!
//! Maps attempt ids to their lineage order for monitoring and cleanup. It is
//! never consulted for dispatch or retry decisions: the order tag also lives in
//! the persisted [`JobData`](crate::JobData), so the index can be lost or rebuilt
//! at any time without affecting correctness.
//!
//! ## Rules
//! - Populated on every original submission and every retry resubmission.
//! - Entries leave only through [`OrderIndex::remove_many`] (cleanup) or
//!   [`OrderIndex::replace_all`] (rebuild).
//! - A single `RwLock` guards the map; submissions from callers and from the
//!   worker's retry path may race.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::jobs::AttemptId;

/// Thread-safe attempt → order map.
#[derive(Debug, Default)]
pub struct OrderIndex {
    entries: RwLock<HashMap<AttemptId, u64>>,
}

impl OrderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or overwrites) the order of an attempt.
    pub async fn record(&self, attempt: AttemptId, order: u64) {
        self.entries.write().await.insert(attempt, order);
    }

    pub async fn get(&self, attempt: &str) -> Option<u64> {
        self.entries.read().await.get(attempt).copied()
    }

    /// Removes the given attempts; returns how many entries were present.
    pub async fn remove_many<'a, I>(&self, attempts: I) -> usize
    where
        I: IntoIterator<Item = &'a AttemptId>,
    {
        let mut entries = self.entries.write().await;
        attempts
            .into_iter()
            .filter(|id| entries.remove(id.as_str()).is_some())
            .count()
    }

    /// Replaces the whole map (rebuild from backend state).
    pub async fn replace_all(&self, fresh: HashMap<AttemptId, u64>) {
        *self.entries.write().await = fresh;
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Sorted `(order, attempt)` pairs.
    pub async fn snapshot(&self) -> Vec<(u64, AttemptId)> {
        let entries = self.entries.read().await;
        let mut out: Vec<(u64, AttemptId)> =
            entries.iter().map(|(id, order)| (*order, id.clone())).collect();
        out.sort_unstable();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retries_map_to_the_same_order() {
        let index = OrderIndex::new();
        index.record(AttemptId::from("1"), 0).await;
        index.record(AttemptId::from("2"), 1).await;
        index.record(AttemptId::from("3"), 1).await;

        assert_eq!(index.get("3").await, Some(1));
        assert_eq!(
            index.snapshot().await,
            vec![
                (0, AttemptId::from("1")),
                (1, AttemptId::from("2")),
                (1, AttemptId::from("3")),
            ]
        );
    }

    #[tokio::test]
    async fn remove_many_counts_only_present_entries() {
        let index = OrderIndex::new();
        index.record(AttemptId::from("a"), 0).await;
        index.record(AttemptId::from("b"), 1).await;

        let gone = [AttemptId::from("a"), AttemptId::from("zzz")];
        assert_eq!(index.remove_many(&gone).await, 1);
        assert_eq!(index.remove_many(&gone).await, 0);
        assert_eq!(index.len().await, 1);
        assert_eq!(index.get("b").await, Some(1));
    }
}
