//! Error types for the coordination layer.
//!
//! # Error Handling Patterns
//!
//! The engine uses two patterns based on operation criticality:
//!
//! ## Fail-Fast (Propagate Errors)
//!
//! Used where failure must halt the operation:
//! - Lease acquisition and renewal
//! - Checkpoint writes
//! - Engine startup (lease store unreachable)
//!
//! ## Best-Effort (Log and Continue)
//!
//! Used where partial failure is acceptable:
//! - Lease release (the lease expires on its own if the write fails)
//! - Lag estimation for individual partitions
//! - Partition discovery during a rebalance cycle
//!
//! # Recovery Semantics
//!
//! [`Conflict`](EngineError::Conflict) and
//! [`LeaseLost`](EngineError::LeaseLost) are *expected* outcomes of the
//! optimistic-concurrency protocol, never fatal: a conflict means "try a
//! different partition this cycle", a lost lease means "stop processing this
//! partition immediately". Only
//! [`StoreUnavailable`](EngineError::StoreUnavailable) at startup is fatal
//! to the engine as a whole.

use thiserror::Error;

use crate::types::ContinuationToken;

/// Result type for coordination operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the coordination layer.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A concurrent lease write won the race for this partition.
    ///
    /// Recovered locally: skip the partition this cycle, retry a different
    /// one on the next rebalance.
    #[error("lease write conflict for partition {partition_id}")]
    Conflict {
        /// Partition whose lease was contended.
        partition_id: String,
    },

    /// Another instance took ownership of a lease we held.
    ///
    /// The partition loop must stop immediately without checkpointing.
    #[error("lease lost for partition {partition_id}")]
    LeaseLost {
        /// Partition whose lease was taken over.
        partition_id: String,
    },

    /// Transient failure reading from the change source.
    ///
    /// Retried with backoff at the poll step; surfaces as a degraded
    /// partition once retries are exhausted.
    #[error("change source unavailable: {0}")]
    SourceUnavailable(String),

    /// The user handler rejected a batch.
    ///
    /// Policy-dependent: abort the partition loop or skip the batch. Carries
    /// enough context to allow manual replay.
    #[error(
        "handler failed for partition {partition_id} at token {token:?} ({records} records): {message}"
    )]
    HandlerFailure {
        /// Partition whose batch was rejected.
        partition_id: String,
        /// Checkpoint the batch was polled from.
        token: Option<ContinuationToken>,
        /// Number of records in the rejected batch.
        records: usize,
        /// Handler-supplied failure description.
        message: String,
    },

    /// The lease store is unreachable.
    ///
    /// Fatal at startup; during steady state it stalls rebalancing and
    /// renewal until the store recovers. Ownership is presumed lost once the
    /// local TTL would have elapsed without a successful renewal.
    #[error("lease store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The engine is shutting down.
    #[error("engine is shutting down")]
    Shutdown,
}

impl EngineError {
    /// True for transient failures worth retrying with backoff.
    ///
    /// Conflicts and lost leases are *not* retriable: retrying the same
    /// write would fight the optimistic-concurrency protocol instead of
    /// respecting its verdict.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            EngineError::SourceUnavailable(_) | EngineError::StoreUnavailable(_)
        )
    }

    /// True when the error means this instance no longer owns the lease.
    pub fn is_ownership_loss(&self) -> bool {
        matches!(self, EngineError::LeaseLost { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_not_retriable() {
        let err = EngineError::Conflict {
            partition_id: "p0".to_string(),
        };
        assert!(!err.is_retriable());
        assert!(!err.is_ownership_loss());
    }

    #[test]
    fn test_lease_lost_is_ownership_loss() {
        let err = EngineError::LeaseLost {
            partition_id: "p3".to_string(),
        };
        assert!(err.is_ownership_loss());
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_transient_errors_are_retriable() {
        assert!(EngineError::SourceUnavailable("timeout".to_string()).is_retriable());
        assert!(EngineError::StoreUnavailable("refused".to_string()).is_retriable());
    }

    #[test]
    fn test_handler_failure_display_has_replay_context() {
        let err = EngineError::HandlerFailure {
            partition_id: "orders-1".to_string(),
            token: Some(ContinuationToken::new("41")),
            records: 7,
            message: "constraint violation".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("orders-1"));
        assert!(display.contains("41"));
        assert!(display.contains("7 records"));
        assert!(display.contains("constraint violation"));
    }
}
