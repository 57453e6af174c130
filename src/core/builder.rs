//! # SchedulerBuilder: wires the bus, subscribers and backend into a [`Scheduler`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::BackendRef;
use crate::core::config::SchedulerConfig;
use crate::core::scheduler::Scheduler;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for constructing a [`Scheduler`].
pub struct SchedulerBuilder {
    cfg: SchedulerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SchedulerBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: SchedulerConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers (logging, metrics, alerts).
    ///
    /// Each subscriber gets its own bounded queue and worker task.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Builds the scheduler on top of `backend`.
    ///
    /// Must be called inside a tokio runtime: subscriber workers and the bus
    /// listener are spawned here. The scheduler still has to be initialized.
    pub fn build(self, backend: BackendRef) -> Arc<Scheduler> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let runtime_token = CancellationToken::new();
        let listener = Scheduler::subscriber_listener(&bus, subs, runtime_token.clone());

        Arc::new(Scheduler::new_internal(
            self.cfg,
            backend,
            bus,
            runtime_token,
            listener,
        ))
    }
}
