//! Monitoring views: order-sorted snapshots and order index cleanup.

mod projector;

pub use projector::{OrderedCounts, OrderedJob, StatsProjector};
