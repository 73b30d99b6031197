//! Lag estimation across partitions.
//!
//! The estimator reports how far behind processing is: for each lease it
//! asks the change source how many changes sit between the checkpointed
//! continuation token and the current head, without consuming them.
//! Read-only; never mutates lease state.
//!
//! Per-partition failures are reported as `unknown` rather than aborting
//! the whole estimate, so one unreachable partition does not blind the
//! monitoring for the rest of the feed.

use std::sync::Arc;

use tracing::warn;

use super::error::EngineResult;
use super::metrics;
use super::traits::{ChangeSource, LeaseStore};

/// Estimated backlog for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLag {
    /// The partition this estimate covers.
    pub partition_id: String,

    /// Unprocessed change count, or `None` if the source could not be
    /// queried for this partition.
    pub pending: Option<u64>,
}

/// Aggregate lag estimate across all partitions.
#[derive(Debug, Clone, Default)]
pub struct EstimateReport {
    /// Per-partition estimates, in lease store order.
    pub partitions: Vec<PartitionLag>,
}

impl EstimateReport {
    /// Sum of the known per-partition estimates.
    ///
    /// Partitions reporting `unknown` contribute nothing; check
    /// [`unknown_count`](EstimateReport::unknown_count) before treating this
    /// as a complete total.
    pub fn known_total(&self) -> u64 {
        self.partitions.iter().filter_map(|p| p.pending).sum()
    }

    /// Number of partitions whose backlog could not be estimated.
    pub fn unknown_count(&self) -> usize {
        self.partitions.iter().filter(|p| p.pending.is_none()).count()
    }
}

/// Reports aggregate lag (unprocessed change count) across partitions.
pub struct LagEstimator {
    store: Arc<dyn LeaseStore>,
    source: Arc<dyn ChangeSource>,
}

impl LagEstimator {
    /// Create an estimator over the given store and source.
    pub fn new(store: Arc<dyn LeaseStore>, source: Arc<dyn ChangeSource>) -> Self {
        Self { store, source }
    }

    /// Estimate the backlog for every known partition.
    ///
    /// Fails only if the lease store itself cannot be listed; individual
    /// source failures degrade to `unknown` entries.
    pub async fn estimate(&self) -> EngineResult<EstimateReport> {
        let leases = self.store.list().await?;

        let mut partitions = Vec::with_capacity(leases.len());
        for lease in &leases {
            let pending = match self
                .source
                .estimate_pending(&lease.partition_id, lease.continuation_token.as_ref())
                .await
            {
                Ok(count) => Some(count),
                Err(e) => {
                    warn!(
                        partition_id = %lease.partition_id,
                        error = %e,
                        "Could not estimate pending changes"
                    );
                    None
                }
            };
            partitions.push(PartitionLag {
                partition_id: lease.partition_id.clone(),
                pending,
            });
        }

        let report = EstimateReport { partitions };
        metrics::ESTIMATED_LAG.set(report.known_total() as i64);
        Ok(report)
    }
}
