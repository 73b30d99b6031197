//! Collaborator contracts consumed by the engine.
//!
//! The engine reaches its external collaborators only through these traits,
//! allowing:
//! - Different backing stores (a managed document database in production,
//!   [`memory`](super::memory) adapters in tests and demos)
//! - Testing every coordination property without network I/O
//! - Clear separation between coordination logic and store plumbing
//!
//! # Contracts
//!
//! - [`ChangeSource`]: ordered change batches per partition
//! - [`LeaseStore`]: durable lease records with compare-and-swap writes
//! - [`ChangeHandler`]: the application's batch processor

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::EngineResult;
use super::lease::Lease;
use crate::types::{ChangeBatch, ContinuationToken};

/// Reads ordered change batches from source partitions.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Enumerate the source's partition ids.
    ///
    /// Used by the rebalance loop to create lease records for newly
    /// discovered partitions.
    async fn partitions(&self) -> EngineResult<Vec<String>>;

    /// Read the next batch of changes from `partition_id`.
    ///
    /// Polling starts after `token` when one is given, otherwise at the
    /// first change with timestamp `>= start_time`. Returns at most
    /// `max_records` records in the source's native order, together with the
    /// cursor positioned after the last returned record. An empty batch
    /// means no new changes; its `next_token` equals the position polled
    /// from.
    async fn poll(
        &self,
        partition_id: &str,
        token: Option<&ContinuationToken>,
        start_time: DateTime<Utc>,
        max_records: usize,
    ) -> EngineResult<ChangeBatch>;

    /// Count changes between `token` and the current head of the partition
    /// without consuming them.
    ///
    /// Read-only; used by the lag estimator.
    async fn estimate_pending(
        &self,
        partition_id: &str,
        token: Option<&ContinuationToken>,
    ) -> EngineResult<u64>;
}

/// Durable storage for lease records with optimistic-concurrency writes.
///
/// The lease store is the single source of truth for ownership; every
/// mutation goes through [`try_write`](LeaseStore::try_write)'s
/// compare-and-swap. Lost races are expected and reported as
/// [`Conflict`](super::EngineError::Conflict), never as fatal errors.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// All lease records, one per known partition.
    async fn list(&self) -> EngineResult<Vec<Lease>>;

    /// Write `lease` if the stored version matches `expected_version`.
    ///
    /// `None` means create-if-absent. On success the stored record is
    /// returned with its version bumped. A version mismatch (or an existing
    /// record when `None` was expected) fails with
    /// [`Conflict`](super::EngineError::Conflict).
    async fn try_write(&self, lease: Lease, expected_version: Option<u64>) -> EngineResult<Lease>;

    /// Fetch a single lease record.
    ///
    /// The default implementation scans [`list`](LeaseStore::list); stores
    /// with point reads should override it.
    async fn get(&self, partition_id: &str) -> EngineResult<Option<Lease>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|l| l.partition_id == partition_id))
    }
}

/// Failure returned by a [`ChangeHandler`].
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Describe why the batch was rejected.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The application's batch processor.
///
/// Invoked once per batch so side effects can be applied atomically over
/// the batch. The engine knows nothing about the handler's semantics beyond
/// success or failure. Delivery is at-least-once: a crash between delivery
/// and checkpoint redelivers the batch after restart, so handlers must be
/// idempotent (or deduplicate) if exactly-once effects are required.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Process one batch of changes.
    async fn process(&self, batch: &ChangeBatch) -> Result<(), HandlerError>;
}
