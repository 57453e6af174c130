//! # Event subscribers.
//!
//! Subscribers observe the events published on the scheduler's
//! [`Bus`](crate::events::Bus) without ever blocking the publishers.
//!
//! ## Architecture
//! ```text
//! Scheduler / OrderedWorker / RetryCoordinator ── publish(Event) ──► Bus
//!                                                                     │
//!                                    Scheduler::subscriber_listener ◄─┘
//!                                                 │
//!                                           SubscriberSet::emit
//!                                     ┌───────────┼───────────┐
//!                                     ▼           ▼           ▼
//!                                 LogWriter    Metrics     Custom ...
//! ```
//!
//! ## Contents
//! - [`Subscribe`] the subscriber trait
//! - [`SubscriberSet`] per-subscriber queues, workers and panic isolation
//! - [`LogWriter`] `tracing` adapter (feature `logging`)

mod embedded;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
