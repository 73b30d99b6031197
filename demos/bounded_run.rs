//! Bounded-run demo: consume a change feed inside a fixed time window.
//!
//! Seeds an in-memory change source with timestamped documents, then runs a
//! processor with a start/end window. The engine delivers every change up to
//! the end boundary and stops itself when the feed moves past it.
//!
//! ```bash
//! cargo run --example bounded_run
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use feedlock::engine::memory::{InMemoryChangeSource, InMemoryLeaseStore};
use feedlock::engine::{ChangeFeedProcessor, ChangeHandler, HandlerError, ProcessorConfig};
use feedlock::telemetry::{init_logging, LogFormat};
use feedlock::types::ChangeBatch;
use std::time::Duration;
use tracing::info;

/// Prints every delivered document and counts them.
struct PrintingHandler {
    run_count: AtomicU64,
}

#[async_trait]
impl ChangeHandler for PrintingHandler {
    async fn process(&self, batch: &ChangeBatch) -> Result<(), HandlerError> {
        for record in &batch.records {
            let count = self.run_count.fetch_add(1, Ordering::SeqCst);
            info!(
                run_count = count,
                partition_id = %batch.partition_id,
                id = %record.id,
                ts = %record.ts,
                body = %record.body,
                "Change delivered"
            );
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> feedlock::error::Result<()> {
    init_logging(LogFormat::from_env())?;

    // A half-hour window over a feed of sensor readings, one per minute.
    // Readings continue past the window so the boundary stop can be seen.
    let start_time = Utc::now() - ChronoDuration::minutes(60);
    let end_time = start_time + ChronoDuration::minutes(30);

    let source = Arc::new(InMemoryChangeSource::new());
    for minute in 0..45 {
        source
            .push_json(
                "sensors",
                &format!("reading-{:03}", minute),
                start_time + ChronoDuration::minutes(minute),
                serde_json::json!({
                    "device": format!("device-{}", minute % 3),
                    "temperature": 20.0 + (minute % 7) as f64,
                }),
            )
            .await;
    }

    let handler = Arc::new(PrintingHandler {
        run_count: AtomicU64::new(0),
    });

    let config = ProcessorConfig::new("demo-host-001")
        .with_poll_delay(Duration::from_millis(100))
        .with_rebalance_interval(Duration::from_millis(250))
        .with_run_window(start_time, end_time);

    let processor = ChangeFeedProcessor::builder()
        .config(config)
        .source(source)
        .lease_store(Arc::new(InMemoryLeaseStore::new()))
        .handler(handler.clone())
        .build()?;

    processor.start().await?;
    info!(end_time = %end_time, "Processor started; waiting for the run window to close");

    // The run window closes the engine once the feed passes end_time.
    processor.until_stopped().await;
    processor.stop().await?;

    info!(
        delivered = handler.run_count.load(Ordering::SeqCst),
        "Bounded run complete"
    );
    Ok(())
}
