//! # ordervisor
//!
//! **Ordervisor** is an order-preserving retry scheduler for async job queues.
//!
//! Every submitted job gets a stable lineage order tag. When a job fails, the
//! scheduler resubmits it with a delay, carrying the same tag, the same payload
//! and a bounded retry budget, and it reports pending and delayed work sorted
//! by that tag. Storage, delays and delivery belong to a pluggable [`Backend`].
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   add_job(name, payload)
//!          │
//!          ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Scheduler                                                       │
//! │  - OrderAssigner (lineage order tags)                            │
//! │  - OrderIndex (advisory attempt → order cache)                   │
//! │  - ProcessorRegistry (job name → Processor, last one wins)       │
//! │  - RetryCoordinator (retry vs terminal, delayed resubmission)    │
//! │  - StatsProjector (order-sorted snapshots, index cleanup)        │
//! │  - Bus + SubscriberSet (events → subscribers)                    │
//! └──────┬───────────────────────────────────────────────▲───────────┘
//!        │ enqueue(attempts = 1)                         │ list_jobs / counts
//!        ▼                                               │
//! ┌──────────────────────────────────────────────────────┴───────────┐
//! │  Backend (durable queue: storage, delays, delivery, counts)      │
//! └──────┬───────────────────────────────────────────────────────────┘
//!        │ deliver(OrderedWorker, concurrency)
//!        ▼
//!   OrderedWorker ──► Processor::process(payload, envelope)
//!        ├─ Ok(value) ──► attempt Completed
//!        └─ Err(e)    ──► RetryCoordinator ──► enqueue(delay, same order, retry_count + 1)
//!                         └─► attempt Failed
//! ```
//!
//! ### Lineage
//! ```text
//! order 3: attempt #1 (retry 0) ─fail─► attempt #2 (retry 1, +delay) ─fail─► ... ─► retry = max_retries
//!                                                                                 └─fail─► RetryExhausted
//! ```
//!
//! ## Ordering guarantee
//! With `concurrency = 1` handler invocations are strictly serialized. Ready jobs
//! are delivered in backend arrival order; a delayed retry does not hold back jobs
//! with a higher order. The lineage order is a tag for reporting, not a gate.
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                     |
//! |-------------------|----------------------------------------------------------|----------------------------------------|
//! | **Scheduling**    | Lifecycle, submission, monitoring                        | [`Scheduler`], [`SchedulerBuilder`]    |
//! | **Jobs**          | Attempts, lineage data, processors                       | [`JobEnvelope`], [`Processor`], [`ProcessorFn`] |
//! | **Retries**       | Retry decisions and delay shaping                        | [`RetryCoordinator`], [`BackoffPolicy`] |
//! | **Backends**      | Queue contract and an in-process implementation          | [`Backend`], [`MemoryBackend`]         |
//! | **Subscriber API**| Hook into lifecycle events                               | [`Subscribe`], [`Event`]               |
//! | **Errors**        | Typed errors for callers, attempts and backends          | [`SchedulerError`], [`JobError`], [`BackendError`] |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], a `tracing` subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ordervisor::{
//!     JobEnvelope, JobError, MemoryBackend, ProcessorFn, RetryConfig, Scheduler, SchedulerConfig,
//! };
//! use serde_json::{json, Value};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = SchedulerConfig {
//!         retry: RetryConfig::new(3, Duration::from_millis(10)),
//!         ..SchedulerConfig::default()
//!     };
//!     let scheduler = Scheduler::builder(cfg).build(Arc::new(MemoryBackend::new()));
//!
//!     scheduler
//!         .register_processor(
//!             "greet",
//!             ProcessorFn::arc(|payload: Value, _env: JobEnvelope| async move {
//!                 let name = payload["name"].as_str().ok_or_else(|| JobError::fatal("no name"))?;
//!                 Ok::<_, JobError>(json!(format!("hello, {name}")))
//!             }),
//!         )
//!         .await?;
//!
//!     scheduler.initialize().await?;
//!     scheduler.add_job("greet", json!({"name": "world"})).await?;
//!     scheduler.start().await?;
//!
//!     while scheduler.ordered_counts().await?.completed < 1 {
//!         tokio::time::sleep(Duration::from_millis(5)).await;
//!     }
//!     scheduler.close().await?;
//!     Ok(())
//! }
//! ```
mod backend;
mod core;
mod error;
mod events;
mod jobs;
mod order;
mod policies;
mod retry;
mod stats;
mod subscribers;

// ---- Public re-exports ----

pub use backend::{
    Backend, BackendRef, Delivery, DeliveryRef, EnqueueOptions, MemoryBackend,
    MemoryBackendConfig, StatusCounts,
};
pub use core::{
    OrderedWorker, ProcessorRegistry, RetryConfig, Scheduler, SchedulerBuilder, SchedulerConfig,
    WorkerStats,
};
pub use error::{BackendError, JobError, SchedulerError};
pub use events::{Bus, Event, EventKind};
pub use jobs::{
    AttemptId, JobData, JobEnvelope, JobOutcome, JobStatus, Processor, ProcessorFn, ProcessorRef,
};
pub use order::{OrderAssigner, OrderIndex};
pub use policies::{BackoffPolicy, JitterPolicy, NoProcessorPolicy};
pub use retry::{RetryCoordinator, RetryDecision};
pub use stats::{OrderedCounts, OrderedJob, StatsProjector};
pub use subscribers::{Subscribe, SubscriberSet};

// Built-in `tracing` subscriber.
// Disable with: `--no-default-features`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
