//! # Processor abstraction and function-backed implementation.
//!
//! A [`Processor`] handles every delivered attempt whose job name it was registered
//! under. [`ProcessorFn`] wraps a closure producing a fresh future per attempt.
//! The shared handle type is [`ProcessorRef`].
//!
//! ## Example
//! ```rust
//! use ordervisor::{JobEnvelope, JobError, ProcessorFn, ProcessorRef};
//! use serde_json::{json, Value};
//!
//! let p: ProcessorRef = ProcessorFn::arc(|payload: Value, _envelope: JobEnvelope| async move {
//!     if payload.get("to").is_none() {
//!         return Err(JobError::fatal("missing recipient"));
//!     }
//!     Ok(json!({"sent": true}))
//! });
//! # let _ = p;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::JobError;
use crate::jobs::envelope::JobEnvelope;

/// Shared processor handle.
pub type ProcessorRef = Arc<dyn Processor>;

/// # User-supplied job handler.
///
/// Returns the completion value on success. Returning [`JobError::Fail`] asks for a
/// retry (within the lineage budget); [`JobError::Fatal`] ends the lineage at once.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Processes one attempt. `payload` is the lineage's original payload.
    async fn process(&self, payload: &Value, envelope: &JobEnvelope) -> Result<Value, JobError>;
}

/// Function-backed processor.
#[derive(Debug)]
pub struct ProcessorFn<F> {
    f: F,
}

impl<F> ProcessorFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the processor and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Processor for ProcessorFn<F>
where
    F: Fn(Value, JobEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, JobError>> + Send + 'static,
{
    async fn process(&self, payload: &Value, envelope: &JobEnvelope) -> Result<Value, JobError> {
        (self.f)(payload.clone(), envelope.clone()).await
    }
}
