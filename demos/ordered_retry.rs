//! # Example: ordered_retry
//!
//! Six jobs are submitted in order. Lineages 1 and 3 fail on their first attempt
//! and are retried after a fixed delay. Later jobs overtake the delayed retries,
//! yet every attempt keeps the order tag of its lineage.
//!
//! ## Flow
//! ```text
//! add_job × 6 ─► orders 0..=5
//! worker:  0 ✓  1 ✗  2 ✓  3 ✗  4 ✓  5 ✓
//!                 └─► retry (order 1, retry 1, +delay)
//!                           └─► retry (order 3, retry 1, +delay)
//! after delay:  1 ✓  3 ✓
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example ordered_retry
//! ```

use std::sync::Arc;
use std::time::Duration;

use ordervisor::{
    JobEnvelope, JobError, LogWriter, MemoryBackend, ProcessorFn, ProcessorRef, RetryConfig,
    Scheduler, SchedulerConfig, Subscribe,
};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

fn flaky_task() -> ProcessorRef {
    ProcessorFn::arc(|payload: Value, env: JobEnvelope| async move {
        println!(
            "[task] order={} retry={} payload={payload}",
            env.lineage_order(),
            env.retry_count()
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        if matches!(env.lineage_order(), 1 | 3) && env.retry_count() == 0 {
            return Err(JobError::fail("transient upstream error"));
        }
        Ok::<Value, JobError>(json!({ "done": env.lineage_order() }))
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = SchedulerConfig {
        retry: RetryConfig::new(3, Duration::from_secs(2)),
        ..SchedulerConfig::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let scheduler = Scheduler::builder(cfg)
        .with_subscribers(subs)
        .build(Arc::new(MemoryBackend::new()));

    scheduler.initialize().await?;
    scheduler.register_processor("task", flaky_task()).await?;

    for n in 0..6 {
        scheduler.add_job("task", json!({ "n": n })).await?;
    }
    scheduler.start().await?;

    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let counts = scheduler.ordered_counts().await?;
        if counts.completed == 6 {
            println!("{}", serde_json::to_string_pretty(&counts)?);
            break;
        }
        let delayed: Vec<_> = counts
            .ordered_delayed
            .iter()
            .map(|j| (j.order, j.retry_count))
            .collect();
        if !delayed.is_empty() {
            println!("[demo] delayed retries (order, retry): {delayed:?}");
        }
    }

    scheduler.close().await?;
    Ok(())
}
