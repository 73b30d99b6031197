//! The change-feed/lease-coordination engine.
//!
//! Claims ownership of source partitions via lease records, polls each owned
//! partition for incremental changes since its checkpoint, delivers ordered
//! batches to a user handler, and persists progress so processing resumes
//! after interruption. The backing document store is an external
//! collaborator reached only through the [`ChangeSource`] and [`LeaseStore`]
//! contracts.
//!
//! # Architecture
//!
//! ```text
//!             ┌──────────────────────────────┐
//!             │     ChangeFeedProcessor      │
//!             │  (rebalance + workers)       │
//!             └──────┬──────────────┬────────┘
//!                    │              │
//!          ┌─────────▼───┐   ┌──────▼───────┐
//!          │ LeaseManager│   │ ChangeSource │
//!          │ LeaseBalancer│  │   adapter    │
//!          └─────────┬───┘   └──────────────┘
//!                    │
//!             ┌──────▼───────┐
//!             │  LeaseStore  │  ← single source of truth for ownership
//!             │   adapter    │    (compare-and-swap writes)
//!             └──────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **Single ownership**: at most one instance holds a non-expired lease
//!   per partition, enforced by optimistic concurrency in the lease store.
//! - **At-least-once delivery**: the checkpoint advances strictly after the
//!   handler succeeds; a crash in between redelivers the batch.
//! - **Ordered delivery per partition**: batches reach the handler in the
//!   source's native order; no cross-partition ordering is promised.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use feedlock::engine::memory::{InMemoryChangeSource, InMemoryLeaseStore};
//! use feedlock::engine::{ChangeFeedProcessor, ChangeHandler, HandlerError, ProcessorConfig};
//! use feedlock::types::ChangeBatch;
//! use async_trait::async_trait;
//!
//! struct MyHandler;
//!
//! #[async_trait]
//! impl ChangeHandler for MyHandler {
//!     async fn process(&self, batch: &ChangeBatch) -> Result<(), HandlerError> {
//!         for record in &batch.records {
//!             println!("{}: {}", record.id, record.body);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let processor = ChangeFeedProcessor::builder()
//!         .config(ProcessorConfig::new("host-1"))
//!         .source(Arc::new(InMemoryChangeSource::new()))
//!         .lease_store(Arc::new(InMemoryLeaseStore::new()))
//!         .handler(Arc::new(MyHandler))
//!         .build()?;
//!
//!     processor.start().await?;
//!     // ... run until done ...
//!     processor.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod background_tasks;
mod balancer;
mod config;
mod error;
mod estimator;
mod lease;
mod lease_manager;
pub mod memory;
pub mod metrics;
mod processor;
pub mod retry;
mod traits;
mod worker_state;

pub use balancer::{BalancePlan, LeaseBalancer};
pub use config::{HandlerErrorPolicy, ProcessorConfig};
pub use error::{EngineError, EngineResult};
pub use estimator::{EstimateReport, LagEstimator, PartitionLag};
pub use lease::Lease;
pub use lease_manager::LeaseManager;
pub use processor::{ChangeFeedProcessor, ChangeFeedProcessorBuilder, WorkerStatus};
pub use traits::{ChangeHandler, ChangeSource, HandlerError, LeaseStore};
pub use worker_state::WorkerState;
