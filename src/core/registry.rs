//! # Processor registry: job name → processor.
//!
//! ## Rules
//! - One processor per name; registering a name again replaces the previous
//!   processor (last registration wins, no error).
//! - Lookups happen on every delivery, so a processor registered after
//!   `start()` serves the next delivery of its name.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::jobs::ProcessorRef;

/// Thread-safe name → processor mapping.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: RwLock<HashMap<String, ProcessorRef>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `processor` under `name`. Returns `true` if it replaced one.
    pub async fn register(&self, name: impl Into<String>, processor: ProcessorRef) -> bool {
        self.processors
            .write()
            .await
            .insert(name.into(), processor)
            .is_some()
    }

    pub async fn get(&self, name: &str) -> Option<ProcessorRef> {
        self.processors.read().await.get(name).cloned()
    }

    /// Returns sorted list of registered names.
    pub async fn names(&self) -> Vec<String> {
        let processors = self.processors.read().await;
        let mut names: Vec<String> = processors.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub async fn is_empty(&self) -> bool {
        self.processors.read().await.is_empty()
    }
}
