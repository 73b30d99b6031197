//! # Feedlock
//! Change-feed processing engine with lease-based partition coordination.
//!
//! This crate provides the coordination layer that sits above a pluggable
//! document store: partition ownership via lease records, checkpointed
//! incremental polling, ordered batch delivery to a user handler, and
//! rebalancing across a fleet of processor instances sharing the same lease
//! store.
//!
//! # Goals
//! - Easy to understand code
//! - Leverage best in class libraries such as [Tokio](https://tokio.rs/)
//! - Keep ownership correct across independent processes through optimistic
//!   concurrency, never in-process locking
//! - Be a building block for change-feed consumers over any backing store
//!
//! ## Getting started
//! Install `feedlock` to your rust project with `cargo add feedlock` or include the following snippet in your `Cargo.toml` dependencies:
//! ```toml
//! feedlock = "0.1"
//! ```
//!
//! ### Consuming a change feed
//! Implement the [`ChangeHandler`](engine::ChangeHandler) trait to define
//! what happens to each batch of changes, wire up
//! [`ChangeSource`](engine::ChangeSource) and
//! [`LeaseStore`](engine::LeaseStore) adapters for your backing store, and
//! run a [`ChangeFeedProcessor`](engine::ChangeFeedProcessor):
//!
//! ```rust,no_run
//! use feedlock::prelude::*;
//! use std::sync::Arc;
//! use async_trait::async_trait;
//!
//! struct MyHandler;
//!
//! #[async_trait]
//! impl ChangeHandler for MyHandler {
//!     async fn process(&self, batch: &ChangeBatch) -> Result<(), HandlerError> {
//!         for record in &batch.records {
//!             println!("{} @ {}: {}", record.id, record.ts, record.body);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = Arc::new(InMemoryChangeSource::new());
//!     let leases = Arc::new(InMemoryLeaseStore::new());
//!
//!     let processor = ChangeFeedProcessor::builder()
//!         .config(ProcessorConfig::new("host-1"))
//!         .source(source)
//!         .lease_store(leases)
//!         .handler(Arc::new(MyHandler))
//!         .build()?;
//!
//!     processor.start().await?;
//!     processor.until_stopped().await;
//!     processor.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! See `demos/bounded_run.rs` for a complete bounded-run example that stops
//! the engine once the feed reaches a configured end time.

#![forbid(unsafe_code)]

pub mod constants;
pub mod engine;
pub mod error;
pub mod telemetry;
pub mod types;

pub mod prelude {
    //! Main export of engine structures.
    //!
    //! Everything needed to consume a change feed: the processor and its
    //! builder, configuration, the collaborator traits, and the in-memory
    //! adapters for tests and demos.
    pub use crate::engine::memory::{InMemoryChangeSource, InMemoryLeaseStore};
    pub use crate::engine::{
        ChangeFeedProcessor, ChangeFeedProcessorBuilder, ChangeHandler, ChangeSource, EngineError,
        EngineResult, HandlerError, HandlerErrorPolicy, LagEstimator, Lease, LeaseStore,
        ProcessorConfig, WorkerState,
    };
    pub use crate::error::Error;
    pub use crate::types::{ChangeBatch, ChangeRecord, ContinuationToken};
}
