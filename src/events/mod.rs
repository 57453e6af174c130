//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the scheduler, the ordered
//! worker, the retry coordinator and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Scheduler`, `OrderedWorker`, `RetryCoordinator`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Scheduler::subscriber_listener()` (fans out to `SubscriberSet`)
//!   and any receiver obtained from `Scheduler::subscribe()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
