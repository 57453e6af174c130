//! # Job abstractions.
//!
//! This module provides the job-related types:
//! - [`JobEnvelope`] / [`JobData`] - one attempt and its persisted lineage metadata
//! - [`Processor`] - trait for user job handlers
//! - [`ProcessorFn`] - function-based processor implementation
//! - [`ProcessorRef`] - shared reference to a processor (`Arc<dyn Processor>`)
//! - [`JobOutcome`] - classified result of one attempt

mod envelope;
mod outcome;
mod processor;

pub use envelope::{AttemptId, JobData, JobEnvelope, JobStatus};
pub use outcome::JobOutcome;
pub use processor::{Processor, ProcessorFn, ProcessorRef};
