//! Scheduler core: configuration, processor registry, worker and lifecycle.
//!
//! The public API from this module is [`Scheduler`] with its [`SchedulerBuilder`],
//! the configuration types and the [`WorkerStats`] snapshot.
//!
//! Internal modules:
//! - [`config`]: scheduler and retry configuration;
//! - [`registry`]: job name → processor mapping (last registration wins);
//! - [`worker`]: delivery callback routing outcomes to the retry coordinator;
//! - [`scheduler`]: lifecycle, submission and monitoring surface;
//! - [`builder`]: wiring of bus, subscribers and backend.

mod builder;
mod config;
mod registry;
mod scheduler;
mod worker;

pub use builder::SchedulerBuilder;
pub use config::{RetryConfig, SchedulerConfig};
pub use registry::ProcessorRegistry;
pub use scheduler::Scheduler;
pub use worker::{OrderedWorker, WorkerStats};
