//! # Stats projector: order-sorted views over backend state.
//!
//! Builds [`OrderedCounts`] from several backend queries. The result is a
//! point-in-time snapshot with no consistency across those queries.
//!
//! ## Lineage-level counts
//! A failed attempt that was followed by a retry is *superseded*: the lineage
//! continues in its successor. `failed` counts only attempts that end their
//! lineage, so a lineage that failed once and then succeeded shows up in
//! `completed` only. The raw per-attempt numbers stay available in
//! [`OrderedCounts::attempts`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::backend::{BackendRef, StatusCounts};
use crate::error::BackendError;
use crate::jobs::{AttemptId, JobEnvelope, JobStatus};
use crate::order::OrderIndex;

/// One pending attempt, tagged with its lineage order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedJob {
    pub id: AttemptId,
    pub name: String,
    pub order: u64,
    pub retry_count: u32,
    /// Requested delay; set for delayed attempts only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<Duration>,
}

impl OrderedJob {
    fn from_envelope(envelope: &JobEnvelope, with_delay: bool) -> Self {
        Self {
            id: envelope.id.clone(),
            name: envelope.name.clone(),
            order: envelope.lineage_order(),
            retry_count: envelope.retry_count(),
            delay: with_delay.then_some(envelope.delay),
        }
    }
}

/// Snapshot of queue state for monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedCounts {
    pub waiting: usize,
    pub active: usize,
    /// Lineages whose last attempt completed.
    pub completed: usize,
    /// Lineages whose last attempt failed (superseded attempts excluded).
    pub failed: usize,
    pub delayed: usize,
    /// Waiting attempts sorted ascending by lineage order.
    pub ordered_waiting: Vec<OrderedJob>,
    /// Delayed attempts sorted ascending by lineage order.
    pub ordered_delayed: Vec<OrderedJob>,
    /// Lineage orders issued so far. Survives a restart once `rebuild_index`
    /// has moved the order assigner past the orders found at the backend.
    pub total_lineages_submitted: u64,
    /// Raw backend counts per attempt.
    pub attempts: StatusCounts,
}

/// Reads backend listings and projects them into [`OrderedCounts`].
pub struct StatsProjector {
    backend: BackendRef,
    index: Arc<OrderIndex>,
}

impl StatsProjector {
    pub fn new(backend: BackendRef, index: Arc<OrderIndex>) -> Self {
        Self { backend, index }
    }

    /// Builds the ordered snapshot.
    pub async fn ordered_counts(
        &self,
        total_lineages_submitted: u64,
    ) -> Result<OrderedCounts, BackendError> {
        let attempts = self.backend.counts().await?;

        let mut ordered_waiting: Vec<OrderedJob> = self
            .list_all(JobStatus::Waiting, attempts.waiting)
            .await?
            .iter()
            .map(|e| OrderedJob::from_envelope(e, false))
            .collect();
        let mut ordered_delayed: Vec<OrderedJob> = self
            .list_all(JobStatus::Delayed, attempts.delayed)
            .await?
            .iter()
            .map(|e| OrderedJob::from_envelope(e, true))
            .collect();
        ordered_waiting.sort_by_key(|j| j.order);
        ordered_delayed.sort_by_key(|j| j.order);

        let failed = self.lineage_failures(&attempts).await?;

        Ok(OrderedCounts {
            waiting: attempts.waiting,
            active: attempts.active,
            completed: attempts.completed,
            failed,
            delayed: attempts.delayed,
            ordered_waiting,
            ordered_delayed,
            total_lineages_submitted,
            attempts,
        })
    }

    /// Removes index entries of attempts that are Completed or Failed at the
    /// backend. Returns how many entries were removed.
    pub async fn cleanup(&self) -> Result<usize, BackendError> {
        let counts = self.backend.counts().await?;
        let mut terminal = self.list_all(JobStatus::Completed, counts.completed).await?;
        terminal.extend(self.list_all(JobStatus::Failed, counts.failed).await?);

        Ok(self.index.remove_many(terminal.iter().map(|e| &e.id)).await)
    }

    /// Repopulates the index from the attempts that are still pending at the
    /// backend (waiting, delayed, active).
    ///
    /// Returns the number of entries recorded and the highest lineage order seen
    /// across all statuses, if any.
    pub async fn rebuild_index(&self) -> Result<(usize, Option<u64>), BackendError> {
        let counts = self.backend.counts().await?;
        let mut fresh = HashMap::new();
        let mut highest: Option<u64> = None;

        for status in JobStatus::ALL {
            for envelope in self.list_all(status, counts.get(status)).await? {
                let order = envelope.lineage_order();
                highest = highest.max(Some(order));
                if !status.is_terminal() {
                    fresh.insert(envelope.id, order);
                }
            }
        }

        let recorded = fresh.len();
        self.index.replace_all(fresh).await;
        Ok((recorded, highest))
    }

    /// Failed attempts that no other attempt names as its predecessor.
    async fn lineage_failures(&self, counts: &StatusCounts) -> Result<usize, BackendError> {
        if counts.failed == 0 {
            return Ok(0);
        }
        let mut superseded: HashSet<AttemptId> = HashSet::new();
        for status in JobStatus::ALL {
            for envelope in self.list_all(status, counts.get(status)).await? {
                if let Some(prev) = envelope.data.previous_attempt_id {
                    superseded.insert(prev);
                }
            }
        }

        let failed = self.list_all(JobStatus::Failed, counts.failed).await?;
        Ok(failed
            .iter()
            .filter(|e| !superseded.contains(&e.id))
            .count())
    }

    /// Lists every job in `status`. `hint` is the expected count; listings may
    /// have grown since, so the range is left open-ended.
    async fn list_all(
        &self,
        status: JobStatus,
        hint: usize,
    ) -> Result<Vec<JobEnvelope>, BackendError> {
        let mut out = Vec::with_capacity(hint);
        let page = hint.max(64);
        loop {
            let start = out.len();
            let batch = self.backend.list_jobs(status, start..start + page).await?;
            let done = batch.len() < page;
            out.extend(batch);
            if done {
                return Ok(out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, EnqueueOptions, MemoryBackend};
    use crate::jobs::JobData;
    use serde_json::json;

    async fn enqueue(backend: &MemoryBackend, order: u64, delay: Option<Duration>) -> AttemptId {
        let data = JobData::original(json!(null), order, 3, Duration::from_secs(5));
        let opts = EnqueueOptions {
            delay,
            ..EnqueueOptions::default()
        };
        backend.enqueue("job", &data, opts).await.unwrap()
    }

    #[tokio::test]
    async fn lists_are_sorted_by_lineage_order() {
        let backend = MemoryBackend::new();
        for order in [4, 1, 3] {
            enqueue(&backend, order, None).await;
        }
        for order in [5, 0, 2] {
            enqueue(&backend, order, Some(Duration::from_secs(30))).await;
        }

        let projector = StatsProjector::new(Arc::new(backend), Arc::new(OrderIndex::new()));
        let counts = projector.ordered_counts(6).await.unwrap();

        let waiting: Vec<u64> = counts.ordered_waiting.iter().map(|j| j.order).collect();
        let delayed: Vec<u64> = counts.ordered_delayed.iter().map(|j| j.order).collect();
        assert_eq!(waiting, vec![1, 3, 4]);
        assert_eq!(delayed, vec![0, 2, 5]);
        assert_eq!(counts.waiting, 3);
        assert_eq!(counts.delayed, 3);
        assert_eq!(counts.total_lineages_submitted, 6);
        assert!(counts.ordered_waiting.iter().all(|j| j.delay.is_none()));
        assert!(
            counts
                .ordered_delayed
                .iter()
                .all(|j| j.delay == Some(Duration::from_secs(30)))
        );
    }

    #[tokio::test]
    async fn paging_collects_everything() {
        let backend = MemoryBackend::new();
        for order in (0..150).rev() {
            enqueue(&backend, order, None).await;
        }
        let projector = StatsProjector::new(Arc::new(backend), Arc::new(OrderIndex::new()));
        let counts = projector.ordered_counts(150).await.unwrap();
        assert_eq!(counts.ordered_waiting.len(), 150);
        assert_eq!(counts.ordered_waiting[0].order, 0);
        assert_eq!(counts.ordered_waiting[149].order, 149);
    }

    #[tokio::test]
    async fn rebuild_records_pending_attempts() {
        let backend = MemoryBackend::new();
        let a = enqueue(&backend, 3, None).await;
        let b = enqueue(&backend, 9, Some(Duration::from_secs(1))).await;
        let index = Arc::new(OrderIndex::new());
        index.record(AttemptId::new("stale"), 1).await;

        let projector = StatsProjector::new(Arc::new(backend), Arc::clone(&index));
        let (recorded, highest) = projector.rebuild_index().await.unwrap();
        assert_eq!(recorded, 2);
        assert_eq!(highest, Some(9));
        assert_eq!(index.get(a.as_str()).await, Some(3));
        assert_eq!(index.get(b.as_str()).await, Some(9));
        assert_eq!(index.get("stale").await, None);
    }

    #[tokio::test]
    async fn empty_backend_gives_empty_snapshot() {
        let projector = StatsProjector::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(OrderIndex::new()),
        );
        let counts = projector.ordered_counts(0).await.unwrap();
        assert_eq!(counts.failed, 0);
        assert!(counts.ordered_waiting.is_empty());
        assert!(counts.ordered_delayed.is_empty());
        assert_eq!(counts.attempts, StatusCounts::default());
    }
}
