//! Lineage ordering state: the order tag source and the advisory index.

mod assigner;
mod index;

pub use assigner::OrderAssigner;
pub use index::OrderIndex;
